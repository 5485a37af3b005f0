use thiserror::Error;

use crate::model::{ParseIdError, RatingError, ScheduleError, SessionStateError, TargetError};

/// Any domain-level validation failure raised by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Rating(#[from] RatingError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
