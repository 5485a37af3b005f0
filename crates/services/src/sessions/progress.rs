use serde::Serialize;

use learn_core::model::LearningSession;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub total_words: u32,
    pub words_passed: u32,
    pub remaining: u32,
    pub percent: f64,
    pub completed_sets: u32,
    pub total_sets: u32,
    pub set_exhausted: bool,
    pub is_complete: bool,
}

impl SessionProgress {
    #[must_use]
    pub fn of(session: &LearningSession) -> Self {
        let total = session.total_words();
        let passed = session.words_passed().min(total);
        let percent = if total == 0 {
            0.0
        } else {
            (f64::from(passed) * 100.0 / f64::from(total) * 10.0).round() / 10.0
        };
        Self {
            total_words: total,
            words_passed: passed,
            remaining: total - passed,
            percent,
            completed_sets: session.completed_sets(),
            total_sets: session.total_sets(),
            set_exhausted: session.is_set_exhausted(),
            is_complete: session.is_completed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{SessionId, SetLayout, StudyTarget, UserId};
    use learn_core::time::fixed_now;

    #[test]
    fn progress_tracks_cursor() {
        let mut session = LearningSession::start(
            SessionId::new_random(),
            UserId::new(1),
            StudyTarget::parse("TOEIC", 1).unwrap(),
            SetLayout::standard(45),
            0,
            fixed_now(),
        )
        .unwrap();
        session.complete_set(0, fixed_now()).unwrap();
        session.mark_answered(4);

        let p = SessionProgress::of(&session);
        assert_eq!(p.words_passed, 25);
        assert_eq!(p.remaining, 20);
        assert!((p.percent - 55.6).abs() < 1e-9);
        assert!(!p.set_exhausted);

        session.complete_set(1, fixed_now()).unwrap();
        session.complete_set(2, fixed_now()).unwrap();
        let done = SessionProgress::of(&session);
        assert!(done.is_complete);
        assert_eq!(done.remaining, 0);
        assert!((done.percent - 100.0).abs() < 1e-9);
    }
}
