use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::WordId;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TargetError {
    #[error("exam category must not be empty")]
    EmptyExam,

    #[error("exam category is too long ({len} > {max})")]
    ExamTooLong { len: usize, max: usize },

    #[error("exam category contains invalid characters: {0}")]
    InvalidExam(String),

    #[error("level must be between {min} and {max}, got {provided}")]
    LevelOutOfRange { provided: u8, min: u8, max: u8 },
}

//
// ─── EXAM CATEGORY ────────────────────────────────────────────────────────────
//

/// Exam a word list belongs to (e.g. `TOEIC`, `JLPT`).
///
/// Normalized to upper case so `toeic` and `TOEIC` address the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExamCategory(String);

impl ExamCategory {
    pub const MAX_LEN: usize = 32;

    /// Validate and normalize an exam category.
    ///
    /// # Errors
    ///
    /// Returns `TargetError` if the value is empty, too long, or contains
    /// characters other than ASCII letters, digits, `_` and `-`.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, TargetError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TargetError::EmptyExam);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(TargetError::ExamTooLong {
                len: trimmed.len(),
                max: Self::MAX_LEN,
            });
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(TargetError::InvalidExam(trimmed.to_owned()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExamCategory {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExamCategory> for String {
    fn from(value: ExamCategory) -> Self {
        value.0
    }
}

impl fmt::Display for ExamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── LEVEL ────────────────────────────────────────────────────────────────────
//

/// Difficulty band within an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// # Errors
    ///
    /// Returns `TargetError::LevelOutOfRange` outside `MIN..=MAX`.
    pub fn new(value: u8) -> Result<Self, TargetError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(TargetError::LevelOutOfRange {
                provided: value,
                min: Self::MIN,
                max: Self::MAX,
            })
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Level {
    type Error = TargetError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Level> for u8 {
    fn from(value: Level) -> Self {
        value.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ─── STUDY TARGET ─────────────────────────────────────────────────────────────
//

/// The (exam, level) pair a persisted learning session is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudyTarget {
    pub exam: ExamCategory,
    pub level: Level,
}

impl StudyTarget {
    #[must_use]
    pub fn new(exam: ExamCategory, level: Level) -> Self {
        Self { exam, level }
    }

    /// Parse raw request values into a target.
    ///
    /// # Errors
    ///
    /// Returns `TargetError` if either component is invalid.
    pub fn parse(exam: &str, level: u8) -> Result<Self, TargetError> {
        Ok(Self::new(ExamCategory::new(exam)?, Level::new(level)?))
    }
}

impl fmt::Display for StudyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/L{}", self.exam, self.level)
    }
}

//
// ─── WORD ─────────────────────────────────────────────────────────────────────
//

/// A catalog entry as the study UI needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub id: WordId,
    pub headword: String,
    pub meaning: String,
    pub exam: ExamCategory,
    pub level: Level,
}
