use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::review::Rating;

pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ScheduleError {
    #[error("ease factor {0} is below the {MIN_EASE_FACTOR} floor")]
    EaseBelowFloor(f64),

    #[error("ease factor must be finite")]
    NonFiniteEase,
}

/// Per-(user, word) scheduling record.
///
/// Created on the first review of a word; afterwards only replaced wholesale
/// by the output of [`crate::scheduler::update`] plus the counter bump done by
/// [`ScheduleState::record_result`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleState {
    ease_factor: f64,
    interval_days: u32,
    repetitions: u32,
    next_review_at: DateTime<Utc>,
    correct_count: u32,
    incorrect_count: u32,
    last_reviewed_at: Option<DateTime<Utc>>,
}

impl ScheduleState {
    /// State of a word that has never been reviewed; due immediately.
    #[must_use]
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            ease_factor: INITIAL_EASE_FACTOR,
            interval_days: 0,
            repetitions: 0,
            next_review_at: now,
            correct_count: 0,
            incorrect_count: 0,
            last_reviewed_at: None,
        }
    }

    /// Rehydrate a state from storage.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError` if the ease factor is not finite or sits below the floor.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        ease_factor: f64,
        interval_days: u32,
        repetitions: u32,
        next_review_at: DateTime<Utc>,
        correct_count: u32,
        incorrect_count: u32,
        last_reviewed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ScheduleError> {
        if !ease_factor.is_finite() {
            return Err(ScheduleError::NonFiniteEase);
        }
        if ease_factor < MIN_EASE_FACTOR {
            return Err(ScheduleError::EaseBelowFloor(ease_factor));
        }
        Ok(Self {
            ease_factor,
            interval_days,
            repetitions,
            next_review_at,
            correct_count,
            incorrect_count,
            last_reviewed_at,
        })
    }

    pub(crate) fn with_schedule(
        &self,
        ease_factor: f64,
        interval_days: u32,
        repetitions: u32,
        next_review_at: DateTime<Utc>,
        reviewed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ease_factor,
            interval_days,
            repetitions,
            next_review_at,
            correct_count: self.correct_count,
            incorrect_count: self.incorrect_count,
            last_reviewed_at: Some(reviewed_at),
        }
    }

    /// Bump the correct/incorrect counter for `rating`.
    pub fn record_result(&mut self, rating: Rating) {
        if rating.is_success() {
            self.correct_count = self.correct_count.saturating_add(1);
        } else {
            self.incorrect_count = self.incorrect_count.saturating_add(1);
        }
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }

    #[must_use]
    pub fn ease_factor(&self) -> f64 {
        self.ease_factor
    }

    #[must_use]
    pub fn interval_days(&self) -> u32 {
        self.interval_days
    }

    #[must_use]
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    #[must_use]
    pub fn next_review_at(&self) -> DateTime<Utc> {
        self.next_review_at
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn incorrect_count(&self) -> u32 {
        self.incorrect_count
    }

    #[must_use]
    pub fn last_reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.last_reviewed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn initial_state_matches_defaults() {
        let state = ScheduleState::initial(fixed_now());
        assert_eq!(state.ease_factor(), INITIAL_EASE_FACTOR);
        assert_eq!(state.interval_days(), 0);
        assert_eq!(state.repetitions(), 0);
        assert!(state.is_due(fixed_now()));
        assert_eq!(state.last_reviewed_at(), None);
    }

    #[test]
    fn record_result_only_increments() {
        let mut state = ScheduleState::initial(fixed_now());
        state.record_result(Rating::new(5).unwrap());
        state.record_result(Rating::new(1).unwrap());
        state.record_result(Rating::new(3).unwrap());
        assert_eq!(state.correct_count(), 2);
        assert_eq!(state.incorrect_count(), 1);
    }

    #[test]
    fn persisted_state_rejects_ease_below_floor() {
        let err = ScheduleState::from_persisted(1.1, 1, 0, fixed_now(), 0, 0, None).unwrap_err();
        assert_eq!(err, ScheduleError::EaseBelowFloor(1.1));
        assert!(
            ScheduleState::from_persisted(f64::NAN, 1, 0, fixed_now(), 0, 0, None).is_err()
        );
    }
}
