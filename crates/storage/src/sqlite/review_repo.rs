use chrono::{DateTime, Utc};
use learn_core::model::{SessionId, SessionStatus, UserId, WordId};

use super::SqliteRepository;
use super::mapping::{conn, i64_to_u64, id_i64, map_receipt_row};
use super::progress_repo::write_schedule;
use super::session_repo::fetch_session;
use crate::repository::{ReviewCommit, ReviewPersistence, ReviewReceipt, ReviewWrite, StorageError};

#[async_trait::async_trait]
impl ReviewPersistence for SqliteRepository {
    async fn apply_review(
        &self,
        write: ReviewWrite,
        at: DateTime<Utc>,
    ) -> Result<ReviewCommit, StorageError> {
        let user_id = id_i64("user_id", write.record.user_id.value())?;
        let word_id = id_i64("word_id", write.record.word_id.value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        if let Some(answer) = &write.answer {
            let session = fetch_session(&mut *tx, answer.session_id)
                .await?
                .ok_or(StorageError::NotFound)?;
            if session.status() != SessionStatus::InProgress
                || session.user_id() != write.record.user_id
            {
                return Err(StorageError::Conflict);
            }
        }

        let mut record = write.record.clone();
        record.updated_at = at;
        let version = write_schedule(&mut *tx, &record, write.expected_version).await?;

        let mut session = None;
        let mut first_answer = false;
        if let Some(answer) = &write.answer {
            let session_id = answer.session_id.to_string();

            let previous = sqlx::query(
                "SELECT 1 FROM session_answers WHERE session_id = ?1 AND word_id = ?2",
            )
            .bind(&session_id)
            .bind(word_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
            first_answer = previous.is_none();

            // Last rating wins.
            sqlx::query(
                r"
                INSERT INTO session_answers (
                    session_id, word_id, rating, schedule_version, answered_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(session_id, word_id) DO UPDATE SET
                    rating = excluded.rating,
                    schedule_version = excluded.schedule_version,
                    answered_at = excluded.answered_at
                ",
            )
            .bind(&session_id)
            .bind(word_id)
            .bind(i64::from(answer.rating.value()))
            .bind(id_i64("schedule_version", version)?)
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            sqlx::query(
                r"
                UPDATE learning_sessions SET
                    total_reviewed = total_reviewed + ?1,
                    current_index = CASE
                        WHEN current_set = ?2 AND ?3 IS NOT NULL
                            THEN MAX(current_index, MIN(?3 + 1, set_size))
                        ELSE current_index
                    END,
                    updated_at = ?4,
                    version = version + 1
                WHERE id = ?5
                ",
            )
            .bind(i64::from(first_answer))
            .bind(i64::from(answer.set))
            .bind(answer.index_in_set.map(i64::from))
            .bind(at)
            .bind(&session_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            session = fetch_session(&mut *tx, answer.session_id).await?;
        }

        if let Some(request_id) = &write.request_id {
            let state = &write.record.state;
            sqlx::query(
                r"
                INSERT INTO review_receipts (
                    user_id, request_id, word_id, session_id, ease_factor, interval_days,
                    repetitions, next_review_at, correct_count, incorrect_count,
                    last_reviewed_at, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(user_id, request_id) DO NOTHING
                ",
            )
            .bind(user_id)
            .bind(request_id)
            .bind(word_id)
            .bind(write.answer.as_ref().map(|a| a.session_id.to_string()))
            .bind(state.ease_factor())
            .bind(i64::from(state.interval_days()))
            .bind(i64::from(state.repetitions()))
            .bind(state.next_review_at())
            .bind(i64::from(state.correct_count()))
            .bind(i64::from(state.incorrect_count()))
            .bind(state.last_reviewed_at())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;

        Ok(ReviewCommit {
            version,
            session,
            first_answer,
        })
    }

    async fn find_receipt(
        &self,
        user_id: UserId,
        request_id: &str,
    ) -> Result<Option<ReviewReceipt>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                user_id, request_id, word_id, session_id, ease_factor, interval_days,
                repetitions, next_review_at, correct_count, incorrect_count,
                last_reviewed_at, created_at
            FROM review_receipts
            WHERE user_id = ?1 AND request_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_receipt_row).transpose()
    }

    async fn answer_version(
        &self,
        session_id: SessionId,
        word_id: WordId,
    ) -> Result<Option<u64>, StorageError> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT schedule_version FROM session_answers WHERE session_id = ?1 AND word_id = ?2",
        )
        .bind(session_id.to_string())
        .bind(id_i64("word_id", word_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        version
            .map(|v| i64_to_u64("schedule_version", v))
            .transpose()
    }
}
