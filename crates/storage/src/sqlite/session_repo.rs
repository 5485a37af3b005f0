use chrono::{DateTime, Utc};
use learn_core::model::{LearningSession, SessionId, SessionStatus, StudyTarget, UserId};
use sqlx::SqliteConnection;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_session_row};
use crate::repository::{SessionRepository, StorageError};

const SESSION_COLUMNS: &str = r"
    id, user_id, exam, level, total_words, set_size, current_set, current_index,
    completed_sets, total_reviewed, status, seed, version, created_at, updated_at, completed_at
";

pub(crate) async fn fetch_session(
    db: &mut SqliteConnection,
    id: SessionId,
) -> Result<Option<LearningSession>, StorageError> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM learning_sessions WHERE id = ?1");
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *db)
        .await
        .map_err(conn)?;
    row.as_ref().map(map_session_row).transpose()
}

async fn fetch_by_target(
    db: &mut SqliteConnection,
    user_id: UserId,
    target: &StudyTarget,
) -> Result<Option<LearningSession>, StorageError> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM learning_sessions WHERE user_id = ?1 AND exam = ?2 AND level = ?3"
    );
    let row = sqlx::query(&sql)
        .bind(id_i64("user_id", user_id.value())?)
        .bind(target.exam.as_str())
        .bind(i64::from(target.level.value()))
        .fetch_optional(&mut *db)
        .await
        .map_err(conn)?;
    row.as_ref().map(map_session_row).transpose()
}

/// Inserts a fresh row at version 1; `ON CONFLICT` makes a concurrent start a no-op.
async fn insert_session(
    db: &mut SqliteConnection,
    session: &LearningSession,
) -> Result<u64, StorageError> {
    let res = sqlx::query(
        r"
        INSERT INTO learning_sessions (
            id, user_id, exam, level, total_words, set_size, current_set, current_index,
            completed_sets, total_reviewed, status, seed, version, created_at, updated_at,
            completed_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13, ?14, ?15)
        ON CONFLICT(user_id, exam, level) DO NOTHING
        ",
    )
    .bind(session.id().to_string())
    .bind(id_i64("user_id", session.user_id().value())?)
    .bind(session.target().exam.as_str())
    .bind(i64::from(session.target().level.value()))
    .bind(i64::from(session.total_words()))
    .bind(i64::from(session.set_size()))
    .bind(i64::from(session.current_set()))
    .bind(i64::from(session.current_index()))
    .bind(i64::from(session.completed_sets()))
    .bind(i64::from(session.total_reviewed()))
    .bind(session.status().as_str())
    .bind(id_i64("seed", session.seed())?)
    .bind(session.created_at())
    .bind(session.updated_at())
    .bind(session.completed_at())
    .execute(&mut *db)
    .await
    .map_err(conn)?;
    Ok(res.rows_affected())
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn get(&self, id: SessionId) -> Result<LearningSession, StorageError> {
        let mut c = self.pool.acquire().await.map_err(conn)?;
        fetch_session(&mut *c, id).await?.ok_or(StorageError::NotFound)
    }

    async fn find_for_target(
        &self,
        user_id: UserId,
        target: &StudyTarget,
    ) -> Result<Option<LearningSession>, StorageError> {
        let mut c = self.pool.acquire().await.map_err(conn)?;
        fetch_by_target(&mut *c, user_id, target).await
    }

    async fn insert_if_absent(
        &self,
        session: &LearningSession,
    ) -> Result<LearningSession, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        insert_session(&mut *tx, session).await?;
        let stored = fetch_by_target(&mut *tx, session.user_id(), session.target())
            .await?
            .ok_or(StorageError::NotFound)?;
        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn replace(&self, session: &LearningSession) -> Result<LearningSession, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Answers go with the old row through the foreign key cascade.
        sqlx::query("DELETE FROM learning_sessions WHERE user_id = ?1 AND exam = ?2 AND level = ?3")
            .bind(id_i64("user_id", session.user_id().value())?)
            .bind(session.target().exam.as_str())
            .bind(i64::from(session.target().level.value()))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        if insert_session(&mut *tx, session).await? == 0 {
            return Err(StorageError::Conflict);
        }
        let stored = fetch_session(&mut *tx, session.id())
            .await?
            .ok_or(StorageError::NotFound)?;
        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn save(&self, session: &LearningSession) -> Result<LearningSession, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let res = sqlx::query(
            r"
            UPDATE learning_sessions SET
                current_set = ?1,
                current_index = ?2,
                completed_sets = ?3,
                total_reviewed = ?4,
                status = ?5,
                updated_at = ?6,
                completed_at = ?7,
                version = version + 1
            WHERE id = ?8 AND version = ?9
            ",
        )
        .bind(i64::from(session.current_set()))
        .bind(i64::from(session.current_index()))
        .bind(i64::from(session.completed_sets()))
        .bind(i64::from(session.total_reviewed()))
        .bind(session.status().as_str())
        .bind(session.updated_at())
        .bind(session.completed_at())
        .bind(session.id().to_string())
        .bind(id_i64("version", session.version())?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let stored = fetch_session(&mut *tx, session.id())
            .await?
            .ok_or(StorageError::NotFound)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn checkpoint(
        &self,
        id: SessionId,
        set: u32,
        index: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        // Monotonic and set-guarded; no version check.
        let res = sqlx::query(
            r"
            UPDATE learning_sessions SET
                current_index = MAX(current_index, MIN(?1, set_size)),
                updated_at = ?2
            WHERE id = ?3 AND status = ?4 AND current_set = ?5 AND current_index < ?1
            ",
        )
        .bind(i64::from(index))
        .bind(at)
        .bind(id.to_string())
        .bind(SessionStatus::InProgress.as_str())
        .bind(i64::from(set))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(res.rows_affected() > 0)
    }
}
