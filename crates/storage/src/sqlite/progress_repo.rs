use chrono::{DateTime, Utc};
use learn_core::model::{UserId, WordId};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_schedule_row, ser, word_id_from_i64};
use crate::repository::{ProgressFilter, ProgressRepository, ScheduleRecord, StorageError};

const SCHEDULE_COLUMNS: &str = r"
    user_id, word_id, exam, level, ease_factor, interval_days, repetitions,
    next_review_at, correct_count, incorrect_count, last_reviewed_at, version, updated_at
";

/// Compare-and-swap write of one schedule row. Returns the new version.
///
/// `expected_version == None` only succeeds when no row exists yet.
pub(crate) async fn write_schedule(
    db: &mut SqliteConnection,
    record: &ScheduleRecord,
    expected_version: Option<u64>,
) -> Result<u64, StorageError> {
    let user_id = id_i64("user_id", record.user_id.value())?;
    let word_id = id_i64("word_id", record.word_id.value())?;
    let state = &record.state;

    let (sql, new_version) = match expected_version {
        None => (
            r"
            INSERT INTO schedule_states (
                user_id, word_id, exam, level, ease_factor, interval_days, repetitions,
                next_review_at, correct_count, incorrect_count, last_reviewed_at,
                updated_at, version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(user_id, word_id) DO NOTHING
            ",
            1_i64,
        ),
        Some(v) => (
            r"
            UPDATE schedule_states SET
                exam = ?3,
                level = ?4,
                ease_factor = ?5,
                interval_days = ?6,
                repetitions = ?7,
                next_review_at = ?8,
                correct_count = ?9,
                incorrect_count = ?10,
                last_reviewed_at = ?11,
                updated_at = ?12,
                version = ?13
            WHERE user_id = ?1 AND word_id = ?2 AND version = ?13 - 1
            ",
            id_i64("version", v)? + 1,
        ),
    };

    let res = sqlx::query(sql)
        .bind(user_id)
        .bind(word_id)
        .bind(record.target.exam.as_str())
        .bind(i64::from(record.target.level.value()))
        .bind(state.ease_factor())
        .bind(i64::from(state.interval_days()))
        .bind(i64::from(state.repetitions()))
        .bind(state.next_review_at())
        .bind(i64::from(state.correct_count()))
        .bind(i64::from(state.incorrect_count()))
        .bind(state.last_reviewed_at())
        .bind(record.updated_at)
        .bind(new_version)
        .execute(&mut *db)
        .await
        .map_err(conn)?;

    if res.rows_affected() == 0 {
        return Err(StorageError::Conflict);
    }
    u64::try_from(new_version).map_err(ser)
}

impl SqliteRepository {
    /// Word ids for `user_id` matching `condition`, narrowed by the filter.
    ///
    /// `condition` may reference `?5`, bound to `now` when given.
    async fn word_ids_where(
        &self,
        user_id: UserId,
        filter: &ProgressFilter,
        condition: &str,
        order: &str,
        now: Option<DateTime<Utc>>,
    ) -> Result<Vec<WordId>, StorageError> {
        let sql = format!(
            r"
            SELECT word_id FROM schedule_states
            WHERE user_id = ?1
              AND (?2 IS NULL OR exam = ?2)
              AND (?3 IS NULL OR level = ?3)
              AND {condition}
            ORDER BY {order}
            LIMIT ?4
            "
        );

        let (exam, level) = filter.target.as_ref().map_or((None, None), |t| {
            (
                Some(t.exam.as_str().to_owned()),
                Some(i64::from(t.level.value())),
            )
        });

        let mut query = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(exam)
            .bind(level)
            .bind(filter.limit.map_or(-1, i64::from));
        if let Some(now) = now {
            query = query.bind(now);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        rows.iter()
            .map(|row| word_id_from_i64(row.try_get::<i64, _>("word_id").map_err(ser)?))
            .collect()
    }
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Option<ScheduleRecord>, StorageError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedule_states WHERE user_id = ?1 AND word_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(id_i64("word_id", word_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_schedule_row).transpose()
    }

    async fn upsert(
        &self,
        record: &ScheduleRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        let mut c = self.pool.acquire().await.map_err(conn)?;
        write_schedule(&mut *c, record, expected_version).await
    }

    async fn find_due(
        &self,
        user_id: UserId,
        filter: &ProgressFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<WordId>, StorageError> {
        self.word_ids_where(
            user_id,
            filter,
            "next_review_at <= ?5",
            "correct_count ASC, updated_at ASC, word_id ASC",
            Some(now),
        )
        .await
    }

    async fn find_weak(
        &self,
        user_id: UserId,
        filter: &ProgressFilter,
    ) -> Result<Vec<WordId>, StorageError> {
        self.word_ids_where(
            user_id,
            filter,
            "incorrect_count > 0",
            "(incorrect_count - correct_count) DESC, updated_at ASC, word_id ASC",
            None,
        )
        .await
    }
}
