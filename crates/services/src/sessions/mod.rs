mod controller;
mod plan;
mod progress;
mod source;
mod view;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use controller::{
    AnswerInput, AnswerOutcome, CompletedSet, LearningSessionController, ProgressOutcome,
    ProgressUpdate, StartedSession, StudyPass,
};
pub use plan::{SetPlanner, position_in_set, split_into_sets};
pub use progress::SessionProgress;
pub use source::{MAX_PASS_WORDS, StudyMode, WordSource};
pub use view::{PassView, ProgressView, ReviewView, SessionView, StartView};
