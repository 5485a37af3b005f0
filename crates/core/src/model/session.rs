use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{SessionId, UserId};
use crate::model::layout::{SessionPosition, SetLayout};
use crate::model::word::StudyTarget;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("no words available for {0}")]
    EmptyTarget(String),

    #[error("session is already completed")]
    Completed,

    #[error("cannot complete set {requested}: current set is {current}")]
    SetAhead { requested: u32, current: u32 },

    #[error("index {index} is outside the current set of {len} words")]
    IndexOutOfRange { index: u32, len: u32 },

    #[error("invalid persisted session: {0}")]
    InvalidPersistedState(String),
}

//
// ─── STATUS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "NOT_STARTED",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOT_STARTED" => Some(SessionStatus::NotStarted),
            "IN_PROGRESS" => Some(SessionStatus::InProgress),
            "COMPLETED" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

//
// ─── TRANSITION RESULTS ───────────────────────────────────────────────────────
//

/// What a position-only checkpoint did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    Moved,
    /// The requested index was not ahead of the stored one.
    Unchanged,
    /// The checkpoint named a set other than the current one, or the session is done.
    Stale,
}

/// What a set-completion request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCompletion {
    /// Moved to the given next set.
    Advanced { next_set: u32 },
    /// The final set was completed; the session is now `Completed`.
    Finished,
    /// The set had already been completed earlier (retry or second device).
    AlreadyApplied,
}

//
// ─── SESSION ──────────────────────────────────────────────────────────────────
//

/// A user's paginated pass through every word of one (exam, level).
///
/// `total_words` is snapshotted at creation and never changes, so the set
/// layout is fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSession {
    id: SessionId,
    user_id: UserId,
    target: StudyTarget,
    total_words: u32,
    set_size: u32,
    current_set: u32,
    current_index: u32,
    completed_sets: u32,
    total_reviewed: u32,
    status: SessionStatus,
    #[serde(skip)]
    seed: u64,
    #[serde(skip)]
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl LearningSession {
    /// Open a fresh session positioned at the first word.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::EmptyTarget` when `total_words` is zero.
    pub fn start(
        id: SessionId,
        user_id: UserId,
        target: StudyTarget,
        layout: SetLayout,
        seed: u64,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        if layout.total_words() == 0 {
            return Err(SessionStateError::EmptyTarget(target.to_string()));
        }
        Ok(Self {
            id,
            user_id,
            target,
            total_words: layout.total_words(),
            set_size: layout.set_size(),
            current_set: 0,
            current_index: 0,
            completed_sets: 0,
            total_reviewed: 0,
            status: SessionStatus::InProgress,
            seed,
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        })
    }

    /// Rehydrate a session from storage, checking the position invariants.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::InvalidPersistedState` if the stored
    /// position or status is inconsistent with the layout.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        target: StudyTarget,
        layout: SetLayout,
        position: SessionPosition,
        completed_sets: u32,
        total_reviewed: u32,
        status: SessionStatus,
        seed: u64,
        version: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, SessionStateError> {
        let bad = |msg: String| Err(SessionStateError::InvalidPersistedState(msg));
        let total_sets = layout.total_sets();

        match status {
            SessionStatus::Completed if position.current_set != total_sets => {
                return bad(format!(
                    "completed session at set {} of {total_sets}",
                    position.current_set
                ));
            }
            SessionStatus::InProgress | SessionStatus::NotStarted
                if position.current_set >= total_sets =>
            {
                return bad(format!(
                    "set {} out of range for {total_sets} sets",
                    position.current_set
                ));
            }
            _ => {}
        }
        if position.current_index > layout.set_len(position.current_set) {
            return bad(format!("index {} past end of set", position.current_index));
        }
        if completed_sets > total_sets {
            return bad(format!("{completed_sets} completed of {total_sets} sets"));
        }

        Ok(Self {
            id,
            user_id,
            target,
            total_words: layout.total_words(),
            set_size: layout.set_size(),
            current_set: position.current_set,
            current_index: position.current_index,
            completed_sets,
            total_reviewed,
            status,
            seed,
            version,
            created_at,
            updated_at,
            completed_at,
        })
    }

    #[must_use]
    pub fn layout(&self) -> SetLayout {
        SetLayout::new(self.total_words, self.set_size)
    }

    #[must_use]
    pub fn total_sets(&self) -> u32 {
        self.layout().total_sets()
    }

    #[must_use]
    pub fn position(&self) -> SessionPosition {
        SessionPosition::new(self.current_set, self.current_index)
    }

    /// Words in the current set; zero once completed.
    #[must_use]
    pub fn current_set_len(&self) -> u32 {
        self.layout().set_len(self.current_set)
    }

    /// True once every word of the current set has been passed.
    #[must_use]
    pub fn is_set_exhausted(&self) -> bool {
        !self.is_completed() && self.current_index >= self.current_set_len()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// # Errors
    ///
    /// Returns `SessionStateError::Completed` once the session is finished.
    pub fn ensure_accepting_answers(&self) -> Result<(), SessionStateError> {
        if self.is_completed() {
            Err(SessionStateError::Completed)
        } else {
            Ok(())
        }
    }

    /// Move the cursor past the word at `index_in_set` of the current set.
    ///
    /// Never moves backwards; returns whether the cursor changed.
    pub fn mark_answered(&mut self, index_in_set: u32) -> bool {
        if self.is_completed() || index_in_set >= self.current_set_len() {
            return false;
        }
        let next = index_in_set + 1;
        if next > self.current_index {
            self.current_index = next;
            true
        } else {
            false
        }
    }

    /// Count a word answered for the first time in this session.
    pub fn record_first_answer(&mut self) {
        self.total_reviewed = self.total_reviewed.saturating_add(1);
    }

    /// Position-only checkpoint.
    ///
    /// Only raises `current_index`, and only within the set the client names
    /// (when it names one). Never touches `completed_sets` or `status`.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::IndexOutOfRange` if `index` is past the
    /// end of the current set.
    pub fn checkpoint(
        &mut self,
        index: u32,
        expected_set: Option<u32>,
    ) -> Result<CheckpointOutcome, SessionStateError> {
        if self.is_completed() || expected_set.is_some_and(|set| set != self.current_set) {
            return Ok(CheckpointOutcome::Stale);
        }
        let len = self.current_set_len();
        if index > len {
            return Err(SessionStateError::IndexOutOfRange { index, len });
        }
        if index > self.current_index {
            self.current_index = index;
            Ok(CheckpointOutcome::Moved)
        } else {
            Ok(CheckpointOutcome::Unchanged)
        }
    }

    /// Mark `set` finished and move to the next one.
    ///
    /// Completing the last set transitions the session to `Completed` with
    /// `current_set == total_sets`. Completing a set that is already behind
    /// the cursor is a no-op so retries are harmless.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::SetAhead` if `set` is beyond the current set.
    pub fn complete_set(
        &mut self,
        set: u32,
        now: DateTime<Utc>,
    ) -> Result<SetCompletion, SessionStateError> {
        if set < self.current_set || self.is_completed() {
            return if set < self.total_sets() {
                Ok(SetCompletion::AlreadyApplied)
            } else {
                Err(SessionStateError::SetAhead {
                    requested: set,
                    current: self.current_set,
                })
            };
        }
        if set > self.current_set {
            return Err(SessionStateError::SetAhead {
                requested: set,
                current: self.current_set,
            });
        }

        self.completed_sets = self.completed_sets.saturating_add(1);
        self.current_set += 1;
        self.current_index = 0;
        self.updated_at = now;

        if self.current_set >= self.total_sets() {
            self.current_set = self.total_sets();
            self.status = SessionStatus::Completed;
            self.completed_at = Some(now);
            Ok(SetCompletion::Finished)
        } else {
            Ok(SetCompletion::Advanced {
                next_set: self.current_set,
            })
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Copy carrying the version storage assigned on write.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Number of words the cursor has passed across the whole session.
    #[must_use]
    pub fn words_passed(&self) -> u32 {
        if self.is_completed() {
            self.total_words
        } else {
            self.layout().linear(self.position())
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn target(&self) -> &StudyTarget {
        &self.target
    }

    #[must_use]
    pub fn total_words(&self) -> u32 {
        self.total_words
    }

    #[must_use]
    pub fn set_size(&self) -> u32 {
        self.set_size
    }

    #[must_use]
    pub fn current_set(&self) -> u32 {
        self.current_set
    }

    #[must_use]
    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    #[must_use]
    pub fn completed_sets(&self) -> u32 {
        self.completed_sets
    }

    #[must_use]
    pub fn total_reviewed(&self) -> u32 {
        self.total_reviewed
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Seed for the deterministic in-set shuffle.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Optimistic-concurrency version; bumped by storage on every write.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn session(total_words: u32) -> LearningSession {
        LearningSession::start(
            SessionId::new_random(),
            UserId::new(1),
            StudyTarget::parse("TOEIC", 1).unwrap(),
            SetLayout::standard(total_words),
            7,
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn start_rejects_empty_target() {
        let err = LearningSession::start(
            SessionId::new_random(),
            UserId::new(1),
            StudyTarget::parse("TOEIC", 1).unwrap(),
            SetLayout::standard(0),
            0,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionStateError::EmptyTarget(_)));
    }

    #[test]
    fn single_set_session_completes_directly() {
        let mut s = session(20);
        for i in 0..20 {
            s.mark_answered(i);
        }
        assert!(s.is_set_exhausted());

        let outcome = s.complete_set(0, fixed_now()).unwrap();
        assert_eq!(outcome, SetCompletion::Finished);
        assert_eq!(s.status(), SessionStatus::Completed);
        assert_eq!(s.completed_sets(), 1);
        assert_eq!(s.current_set(), s.total_sets());
        assert_eq!(s.current_set_len(), 0);
    }

    #[test]
    fn completing_a_middle_set_resets_index() {
        let mut s = session(45);
        s.checkpoint(12, None).unwrap();
        let outcome = s.complete_set(0, fixed_now()).unwrap();
        assert_eq!(outcome, SetCompletion::Advanced { next_set: 1 });
        assert_eq!(s.position(), SessionPosition::new(1, 0));
        assert_eq!(s.completed_sets(), 1);
        assert_eq!(s.status(), SessionStatus::InProgress);
    }

    #[test]
    fn repeated_completion_is_a_no_op() {
        let mut s = session(45);
        s.complete_set(0, fixed_now()).unwrap();
        assert_eq!(
            s.complete_set(0, fixed_now()).unwrap(),
            SetCompletion::AlreadyApplied
        );
        assert_eq!(s.completed_sets(), 1);
        assert!(matches!(
            s.complete_set(2, fixed_now()),
            Err(SessionStateError::SetAhead { requested: 2, current: 1 })
        ));
    }

    #[test]
    fn completion_retry_after_finish_is_harmless() {
        let mut s = session(5);
        s.complete_set(0, fixed_now()).unwrap();
        assert_eq!(
            s.complete_set(0, fixed_now()).unwrap(),
            SetCompletion::AlreadyApplied
        );
        assert_eq!(s.completed_sets(), 1);
    }

    #[test]
    fn checkpoint_never_regresses() {
        let mut s = session(45);
        assert_eq!(s.checkpoint(8, None).unwrap(), CheckpointOutcome::Moved);
        assert_eq!(s.checkpoint(3, None).unwrap(), CheckpointOutcome::Unchanged);
        assert_eq!(s.current_index(), 8);
        assert!(matches!(
            s.checkpoint(21, None),
            Err(SessionStateError::IndexOutOfRange { index: 21, len: 20 })
        ));
    }

    #[test]
    fn stale_checkpoint_from_previous_set_is_ignored() {
        let mut s = session(45);
        s.complete_set(0, fixed_now()).unwrap();
        assert_eq!(s.checkpoint(15, Some(0)).unwrap(), CheckpointOutcome::Stale);
        assert_eq!(s.position(), SessionPosition::new(1, 0));
        assert_eq!(s.completed_sets(), 1);
    }

    #[test]
    fn mark_answered_only_moves_forward() {
        let mut s = session(45);
        assert!(s.mark_answered(4));
        assert!(!s.mark_answered(2));
        assert_eq!(s.current_index(), 5);
        assert!(!s.mark_answered(25));
    }

    #[test]
    fn completed_session_rejects_answers() {
        let mut s = session(3);
        s.complete_set(0, fixed_now()).unwrap();
        assert_eq!(
            s.ensure_accepting_answers(),
            Err(SessionStateError::Completed)
        );
        assert_eq!(s.words_passed(), 3);
    }

    #[test]
    fn persisted_state_is_validated() {
        let err = LearningSession::from_persisted(
            SessionId::new_random(),
            UserId::new(1),
            StudyTarget::parse("TOEIC", 1).unwrap(),
            SetLayout::standard(45),
            SessionPosition::new(3, 0),
            2,
            0,
            SessionStatus::InProgress,
            0,
            0,
            fixed_now(),
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SessionStateError::InvalidPersistedState(_)));
    }
}
