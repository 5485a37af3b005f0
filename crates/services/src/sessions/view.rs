use serde::Serialize;

use learn_core::model::{LearningSession, ScheduleState, Word};
use learn_core::scheduler::IntervalPreview;

use super::controller::{AnswerOutcome, ProgressOutcome, StartedSession, StudyPass};
use super::progress::SessionProgress;

/// Presentation-agnostic session snapshot.
///
/// No pre-formatted strings; clients format timestamps themselves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(flatten)]
    pub session: LearningSession,
    pub total_sets: u32,
    pub progress: SessionProgress,
}

impl From<LearningSession> for SessionView {
    fn from(session: LearningSession) -> Self {
        Self {
            total_sets: session.total_sets(),
            progress: SessionProgress::of(&session),
            session,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartView {
    pub session: SessionView,
    pub words: Vec<Word>,
    pub resumed: bool,
}

impl From<StartedSession> for StartView {
    fn from(started: StartedSession) -> Self {
        Self {
            session: started.session.into(),
            words: started.words,
            resumed: started.resumed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub state: ScheduleState,
    pub next_intervals: Vec<IntervalPreview>,
    pub session: Option<SessionView>,
    pub first_answer: bool,
    pub replayed: bool,
}

impl From<AnswerOutcome> for ReviewView {
    fn from(outcome: AnswerOutcome) -> Self {
        Self {
            state: outcome.state,
            next_intervals: outcome.next_intervals,
            session: outcome.session.map(SessionView::from),
            first_answer: outcome.first_answer,
            replayed: outcome.replayed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub session: SessionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_words: Option<Vec<Word>>,
    pub checkpoint_dropped: bool,
}

impl From<ProgressOutcome> for ProgressView {
    fn from(outcome: ProgressOutcome) -> Self {
        Self {
            session: outcome.session.into(),
            next_words: outcome.next_words,
            checkpoint_dropped: outcome.checkpoint_dropped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassView {
    pub mode: &'static str,
    pub session: Option<SessionView>,
    pub total_words: usize,
    pub sets: Vec<Vec<Word>>,
}

impl From<StudyPass> for PassView {
    fn from(pass: StudyPass) -> Self {
        Self {
            mode: pass.mode.name(),
            total_words: pass.total_words(),
            session: pass.session.map(SessionView::from),
            sets: pass.sets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{SessionId, SetLayout, StudyTarget, UserId};
    use learn_core::time::fixed_now;

    #[test]
    fn session_view_serializes_flat_camel_case() {
        let session = LearningSession::start(
            SessionId::new_random(),
            UserId::new(3),
            StudyTarget::parse("TOEIC", 2).unwrap(),
            SetLayout::standard(45),
            9,
            fixed_now(),
        )
        .unwrap();
        let json = serde_json::to_value(SessionView::from(session)).unwrap();

        assert_eq!(json["currentSet"], 0);
        assert_eq!(json["totalSets"], 3);
        assert_eq!(json["status"], "IN_PROGRESS");
        assert_eq!(json["progress"]["remaining"], 45);
        assert!(json.get("seed").is_none());
    }
}
