use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur while building a rating from client input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RatingError {
    #[error("rating must be between 1 and 5, got {0}")]
    OutOfRange(i64),
}

//
// ─── RATING ───────────────────────────────────────────────────────────────────
//

/// Self-reported recall quality on the 1–5 scale.
///
/// `3` and above count as a correct answer. The binary "knew it / didn't"
/// buttons map to `5` and `1` respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;
    /// Lowest rating that counts as a successful recall.
    pub const PASS: u8 = 3;

    /// # Errors
    ///
    /// Returns `RatingError::OutOfRange` if `value` is not in `1..=5`.
    pub fn new(value: i64) -> Result<Self, RatingError> {
        match u8::try_from(value) {
            Ok(v) if (Self::MIN..=Self::MAX).contains(&v) => Ok(Self(v)),
            _ => Err(RatingError::OutOfRange(value)),
        }
    }

    /// Collapse a binary answer onto the scale.
    #[must_use]
    pub fn from_recall(knew_it: bool) -> Self {
        if knew_it { Self(Self::MAX) } else { Self(Self::MIN) }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self.0 >= Self::PASS
    }

    /// Every valid rating, lowest first.
    #[must_use]
    pub fn all() -> [Rating; 5] {
        [Self(1), Self(2), Self(3), Self(4), Self(5)]
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(value: Rating) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_one_through_five() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert!(Rating::new(-3).is_err());
        assert_eq!(Rating::new(4).unwrap().value(), 4);
    }

    #[test]
    fn success_threshold_is_three() {
        assert!(!Rating::new(2).unwrap().is_success());
        assert!(Rating::new(3).unwrap().is_success());
    }

    #[test]
    fn binary_recall_maps_to_extremes() {
        assert_eq!(Rating::from_recall(true).value(), 5);
        assert_eq!(Rating::from_recall(false).value(), 1);
    }
}
