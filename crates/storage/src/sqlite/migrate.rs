use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (words, schedule states, learning sessions with
/// their answers, review receipts, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS words (
                    id INTEGER PRIMARY KEY,
                    headword TEXT NOT NULL,
                    meaning TEXT NOT NULL,
                    exam TEXT NOT NULL,
                    level INTEGER NOT NULL CHECK (level BETWEEN 1 AND 10)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS schedule_states (
                    user_id INTEGER NOT NULL,
                    word_id INTEGER NOT NULL,
                    exam TEXT NOT NULL,
                    level INTEGER NOT NULL,
                    ease_factor REAL NOT NULL CHECK (ease_factor >= 1.3),
                    interval_days INTEGER NOT NULL CHECK (interval_days >= 0),
                    repetitions INTEGER NOT NULL CHECK (repetitions >= 0),
                    next_review_at TEXT NOT NULL,
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    incorrect_count INTEGER NOT NULL CHECK (incorrect_count >= 0),
                    last_reviewed_at TEXT,
                    version INTEGER NOT NULL CHECK (version >= 1),
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, word_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS learning_sessions (
                    id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    exam TEXT NOT NULL,
                    level INTEGER NOT NULL,
                    total_words INTEGER NOT NULL CHECK (total_words > 0),
                    set_size INTEGER NOT NULL CHECK (set_size > 0),
                    current_set INTEGER NOT NULL CHECK (current_set >= 0),
                    current_index INTEGER NOT NULL CHECK (current_index >= 0),
                    completed_sets INTEGER NOT NULL CHECK (completed_sets >= 0),
                    total_reviewed INTEGER NOT NULL CHECK (total_reviewed >= 0),
                    status TEXT NOT NULL,
                    seed INTEGER NOT NULL,
                    version INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    completed_at TEXT,
                    UNIQUE (user_id, exam, level)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS session_answers (
                    session_id TEXT NOT NULL,
                    word_id INTEGER NOT NULL,
                    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                    schedule_version INTEGER NOT NULL,
                    answered_at TEXT NOT NULL,
                    PRIMARY KEY (session_id, word_id),
                    FOREIGN KEY (session_id) REFERENCES learning_sessions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS review_receipts (
                    user_id INTEGER NOT NULL,
                    request_id TEXT NOT NULL,
                    word_id INTEGER NOT NULL,
                    session_id TEXT,
                    ease_factor REAL NOT NULL,
                    interval_days INTEGER NOT NULL,
                    repetitions INTEGER NOT NULL,
                    next_review_at TEXT NOT NULL,
                    correct_count INTEGER NOT NULL,
                    incorrect_count INTEGER NOT NULL,
                    last_reviewed_at TEXT,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, request_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_words_exam_level_id
                    ON words(exam, level, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_schedule_user_next_review
                    ON schedule_states(user_id, next_review_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_schedule_user_target
                    ON schedule_states(user_id, exam, level, correct_count, updated_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|source| SqliteInitError::Migration { version: 1, source })?;
    }

    Ok(())
}
