mod ids;
mod layout;
mod review;
mod schedule;
mod session;
mod word;

pub use ids::{ParseIdError, SessionId, UserId, WordId};
pub use layout::{Advance, SET_SIZE, SessionPosition, SetLayout};
pub use review::{Rating, RatingError};
pub use schedule::{INITIAL_EASE_FACTOR, MIN_EASE_FACTOR, ScheduleError, ScheduleState};
pub use session::{
    CheckpointOutcome, LearningSession, SessionStateError, SessionStatus, SetCompletion,
};
pub use word::{ExamCategory, Level, StudyTarget, TargetError, Word};
