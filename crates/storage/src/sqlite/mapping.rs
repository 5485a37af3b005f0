use learn_core::model::{
    LearningSession, ScheduleState, SessionId, SessionPosition, SessionStatus, SetLayout,
    StudyTarget, UserId, Word, WordId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{ReviewReceipt, ScheduleRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn word_id_from_i64(v: i64) -> Result<WordId, StorageError> {
    Ok(WordId::new(i64_to_u64("word_id", v)?))
}

pub(crate) fn session_id_from_str(v: &str) -> Result<SessionId, StorageError> {
    v.parse().map_err(ser)
}

fn u32_col(row: &SqliteRow, col: &'static str) -> Result<u32, StorageError> {
    u32_from_i64(col, row.try_get::<i64, _>(col).map_err(ser)?)
}

fn target_cols(row: &SqliteRow) -> Result<StudyTarget, StorageError> {
    let exam: String = row.try_get("exam").map_err(ser)?;
    let level = u32_col(row, "level")?;
    let level = u8::try_from(level).map_err(|_| ser(format!("invalid level: {level}")))?;
    StudyTarget::parse(&exam, level).map_err(ser)
}

/// Reads the schedule columns shared by `schedule_states` and `review_receipts`.
pub(crate) fn map_schedule_state(row: &SqliteRow) -> Result<ScheduleState, StorageError> {
    ScheduleState::from_persisted(
        row.try_get("ease_factor").map_err(ser)?,
        u32_col(row, "interval_days")?,
        u32_col(row, "repetitions")?,
        row.try_get("next_review_at").map_err(ser)?,
        u32_col(row, "correct_count")?,
        u32_col(row, "incorrect_count")?,
        row.try_get("last_reviewed_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_schedule_row(row: &SqliteRow) -> Result<ScheduleRecord, StorageError> {
    Ok(ScheduleRecord {
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        word_id: word_id_from_i64(row.try_get::<i64, _>("word_id").map_err(ser)?)?,
        target: target_cols(row)?,
        state: map_schedule_state(row)?,
        version: i64_to_u64("version", row.try_get::<i64, _>("version").map_err(ser)?)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn map_receipt_row(row: &SqliteRow) -> Result<ReviewReceipt, StorageError> {
    let session_id: Option<String> = row.try_get("session_id").map_err(ser)?;
    Ok(ReviewReceipt {
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        request_id: row.try_get("request_id").map_err(ser)?,
        word_id: word_id_from_i64(row.try_get::<i64, _>("word_id").map_err(ser)?)?,
        session_id: session_id.as_deref().map(session_id_from_str).transpose()?,
        state: map_schedule_state(row)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<LearningSession, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;
    let status = SessionStatus::parse(&status)
        .ok_or_else(|| StorageError::Serialization(format!("invalid status: {status}")))?;

    LearningSession::from_persisted(
        session_id_from_str(&id)?,
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        target_cols(row)?,
        SetLayout::new(u32_col(row, "total_words")?, u32_col(row, "set_size")?),
        SessionPosition::new(u32_col(row, "current_set")?, u32_col(row, "current_index")?),
        u32_col(row, "completed_sets")?,
        u32_col(row, "total_reviewed")?,
        status,
        i64_to_u64("seed", row.try_get::<i64, _>("seed").map_err(ser)?)?,
        i64_to_u64("version", row.try_get::<i64, _>("version").map_err(ser)?)?,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_word_row(row: &SqliteRow) -> Result<Word, StorageError> {
    let target = target_cols(row)?;
    Ok(Word {
        id: word_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        headword: row.try_get("headword").map_err(ser)?,
        meaning: row.try_get("meaning").map_err(ser)?,
        exam: target.exam,
        level: target.level,
    })
}

/// `?N, ?N+1, ...` placeholders for an `IN (...)` list starting at `first`.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
