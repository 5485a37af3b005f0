//! SM-2 style review scheduling.
//!
//! The update is a pure function of the rating, the stored state and the
//! review instant, so it can be tested without storage and re-run safely
//! against the same prior state.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::{MIN_EASE_FACTOR, Rating, ScheduleState};
use crate::time::start_of_day;

/// Interval for the first success after a lapse (or ever).
pub const FIRST_INTERVAL_DAYS: u32 = 1;
/// Interval for the second consecutive success.
pub const SECOND_INTERVAL_DAYS: u32 = 6;
/// Interval after a failed recall: review again tomorrow.
pub const LAPSE_INTERVAL_DAYS: u32 = 1;
/// Upper bound on a single interval (~100 years).
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

//
// ─── EASE ──────────────────────────────────────────────────────────────────────
//

/// Ease adjustment for a successful recall.
///
/// `EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))`: rating 5 adds 0.1,
/// rating 4 leaves ease unchanged, rating 3 subtracts 0.14.
#[must_use]
pub fn ease_delta(rating: Rating) -> f64 {
    let miss = f64::from(Rating::MAX - rating.value());
    0.1 - miss * (0.08 + miss * 0.02)
}

fn clamp_ease(ease: f64) -> f64 {
    ease.max(MIN_EASE_FACTOR)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn grown_interval(previous: u32, ease: f64) -> u32 {
    let grown = (f64::from(previous) * ease).round();
    if grown >= f64::from(MAX_INTERVAL_DAYS) {
        MAX_INTERVAL_DAYS
    } else {
        (grown as u32).max(FIRST_INTERVAL_DAYS)
    }
}

//
// ─── UPDATE ────────────────────────────────────────────────────────────────────
//

/// Apply one review to `state` and return the next scheduling state.
///
/// Success (`rating >= 3`) bumps `repetitions` and grows the interval
/// 1 → 6 → `round(interval * ease)`; failure resets `repetitions` to 0 and the
/// interval to 1 while leaving ease untouched. Ease never drops below 1.3.
/// The due date is midnight of the review day plus the interval.
///
/// Counters are not touched here; see [`ScheduleState::record_result`].
///
/// # Examples
///
/// ```
/// # use learn_core::model::{Rating, ScheduleState};
/// # use learn_core::scheduler::update;
/// let now = learn_core::time::fixed_now();
/// let fresh = ScheduleState::initial(now);
///
/// let first = update(Rating::new(5).unwrap(), &fresh, now);
/// assert_eq!(first.interval_days(), 1);
///
/// let second = update(Rating::new(5).unwrap(), &first, now);
/// assert_eq!(second.interval_days(), 6);
/// ```
#[must_use]
pub fn update(rating: Rating, state: &ScheduleState, reviewed_at: DateTime<Utc>) -> ScheduleState {
    let (ease, interval, repetitions) = if rating.is_success() {
        let repetitions = state.repetitions().saturating_add(1);
        let interval = match repetitions {
            1 => FIRST_INTERVAL_DAYS,
            2 => SECOND_INTERVAL_DAYS,
            _ => grown_interval(state.interval_days(), state.ease_factor()),
        };
        (state.ease_factor() + ease_delta(rating), interval, repetitions)
    } else {
        (state.ease_factor(), LAPSE_INTERVAL_DAYS, 0)
    };

    let next_review_at = start_of_day(reviewed_at) + Duration::days(i64::from(interval));

    state.with_schedule(
        clamp_ease(ease),
        interval,
        repetitions,
        next_review_at,
        reviewed_at,
    )
}

//
// ─── PREVIEW ───────────────────────────────────────────────────────────────────
//

/// Interval a rating would produce, for "next review in N days" hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalPreview {
    pub rating: Rating,
    pub interval_days: u32,
}

/// Intervals for every rating against the same prior state.
#[must_use]
pub fn preview(state: &ScheduleState, reviewed_at: DateTime<Utc>) -> Vec<IntervalPreview> {
    Rating::all()
        .into_iter()
        .map(|rating| IntervalPreview {
            rating,
            interval_days: update(rating, state, reviewed_at).interval_days(),
        })
        .collect()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
