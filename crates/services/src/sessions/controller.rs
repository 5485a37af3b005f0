use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use learn_core::model::{
    CheckpointOutcome, LearningSession, Rating, SET_SIZE, ScheduleState, SessionId, SetCompletion,
    SetLayout, StudyTarget, UserId, Word, WordId,
};
use learn_core::scheduler::IntervalPreview;
use storage::Storage;
use storage::repository::{
    ProgressRepository, ReviewPersistence, SessionAnswer, SessionRepository, StorageError,
    WordCatalog,
};

use super::plan::{SetPlanner, position_in_set, split_into_sets};
use super::source::{StudyMode, WordSource};
use crate::Clock;
use crate::error::{ReviewServiceError, SessionError};
use crate::review_service::{ReviewRequest, ReviewService};

/// Attempts for a set completion racing another writer on the session version.
const MAX_COMPLETION_ATTEMPTS: u32 = 3;

//
// ─── INPUTS / OUTCOMES ─────────────────────────────────────────────────────────
//

/// A session plus the words of its current set.
#[derive(Debug, Clone, PartialEq)]
pub struct StartedSession {
    pub session: LearningSession,
    /// Empty when the session is already completed.
    pub words: Vec<Word>,
    /// True when an existing session was returned instead of a new one.
    pub resumed: bool,
}

/// One rating, inside a session or standalone.
#[derive(Debug, Clone)]
pub struct AnswerInput {
    pub session_id: Option<SessionId>,
    pub word_id: WordId,
    pub rating: Rating,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub state: ScheduleState,
    /// Interval each rating would give on the word's next review.
    pub next_intervals: Vec<IntervalPreview>,
    pub session: Option<LearningSession>,
    pub first_answer: bool,
    pub replayed: bool,
}

/// Which set a completion report refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedSet {
    /// The set the stored session is on when the report arrives.
    Current,
    /// An explicit set; reporting one that is already behind is a no-op.
    Index(u32),
}

/// Client progress report.
///
/// `completed_set` wins when both it and `current_index` are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub current_index: Option<u32>,
    pub current_set: Option<u32>,
    pub completed_set: Option<CompletedSet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressOutcome {
    pub session: LearningSession,
    /// Words of the new current set after a completion; empty once finished.
    pub next_words: Option<Vec<Word>>,
    /// The checkpoint was not stored (stale set, raced, or write failure).
    pub checkpoint_dropped: bool,
}

/// Snapshot of a study pass split into sets.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyPass {
    pub mode: StudyMode,
    /// Only set for `StudyMode::Catalog`.
    pub session: Option<LearningSession>,
    pub sets: Vec<Vec<Word>>,
}

impl StudyPass {
    #[must_use]
    pub fn total_words(&self) -> usize {
        self.sets.iter().map(Vec::len).sum()
    }
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Orchestrates persisted learning sessions: start or resume, answers,
/// checkpoints and set completion.
#[derive(Clone)]
pub struct LearningSessionController {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    progress: Arc<dyn ProgressRepository>,
    reviews: Arc<dyn ReviewPersistence>,
    words: Arc<dyn WordCatalog>,
    planner: SetPlanner,
    review_service: ReviewService,
}

impl LearningSessionController {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        progress: Arc<dyn ProgressRepository>,
        reviews: Arc<dyn ReviewPersistence>,
        words: Arc<dyn WordCatalog>,
    ) -> Self {
        Self {
            clock,
            sessions,
            progress,
            reviews,
            words,
            planner: SetPlanner::new(),
            review_service: ReviewService::new().with_clock(clock),
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.reviews),
            Arc::clone(&storage.words),
        )
    }

    #[must_use]
    pub fn with_planner(mut self, planner: SetPlanner) -> Self {
        self.planner = planner;
        self
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Start a session for `target`, or resume the existing one.
    ///
    /// Without `restart` this is idempotent: the stored session comes back
    /// untouched together with the words of its current set. With `restart`
    /// any stored session is dropped and a fresh one replaces it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyTarget` if the catalog has no words for the
    /// target, or `SessionError::Storage` on repository failures.
    pub async fn start(
        &self,
        user_id: UserId,
        target: StudyTarget,
        restart: bool,
    ) -> Result<StartedSession, SessionError> {
        if !restart {
            if let Some(existing) = self.sessions.find_for_target(user_id, &target).await? {
                let words = self.next_set_words(&existing).await?;
                debug!(
                    user_id = user_id.value(),
                    session_id = %existing.id(),
                    current_set = existing.current_set(),
                    "resuming learning session"
                );
                return Ok(StartedSession {
                    session: existing,
                    words,
                    resumed: true,
                });
            }
        }

        let total = self.words.count(&target).await?;
        let seed = u64::from(rand::rng().random::<u32>());
        let fresh = LearningSession::start(
            SessionId::new_random(),
            user_id,
            target,
            SetLayout::standard(total),
            seed,
            self.now(),
        )?;

        let stored = if restart {
            self.sessions.replace(&fresh).await?
        } else {
            self.sessions.insert_if_absent(&fresh).await?
        };
        let resumed = stored.id() != fresh.id();
        info!(
            user_id = user_id.value(),
            session_id = %stored.id(),
            target = %stored.target(),
            total_words = stored.total_words(),
            restart,
            resumed,
            "learning session started"
        );

        let words = self.next_set_words(&stored).await?;
        Ok(StartedSession {
            session: stored,
            words,
            resumed,
        })
    }

    /// Load a session owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if the session does not exist or
    /// belongs to someone else.
    pub async fn get_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<LearningSession, SessionError> {
        match self.sessions.get(session_id).await {
            Ok(session) if session.user_id() == user_id => Ok(session),
            Ok(_) | Err(StorageError::NotFound) => Err(SessionError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Rate a word and, inside a session, move the cursor past it.
    ///
    /// The schedule row, the session answer and the new position are
    /// written together; nothing moves if the write fails.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` for a finished session,
    /// `SessionError::NotFound` for an unknown session,
    /// `SessionError::WordOutsideTarget` for a word of another exam or level,
    /// or the review error.
    pub async fn record_answer(
        &self,
        user_id: UserId,
        input: AnswerInput,
    ) -> Result<AnswerOutcome, SessionError> {
        let mut request = ReviewRequest::new(user_id, input.word_id, input.rating)
            .with_request_id(input.request_id);

        if let Some(session_id) = input.session_id {
            let session = self.get_session(user_id, session_id).await?;
            session.ensure_accepting_answers()?;
            let set_words = self
                .planner
                .words_for_set(self.words.as_ref(), &session, session.current_set())
                .await?;
            let index_in_set = position_in_set(&set_words, input.word_id);
            if index_in_set.is_none() {
                self.ensure_in_target(&session, input.word_id).await?;
            }
            request = request.in_session(SessionAnswer {
                session_id,
                set: session.current_set(),
                index_in_set,
                rating: input.rating,
            });
        }

        let result = self
            .review_service
            .review_persisted(
                request,
                self.progress.as_ref(),
                self.reviews.as_ref(),
                self.words.as_ref(),
            )
            .await;

        let persisted = match (result, input.session_id) {
            (Ok(persisted), _) => persisted,
            (Err(ReviewServiceError::Storage(StorageError::Conflict)), Some(session_id)) => {
                // The session may have been finished by a concurrent request.
                let current = self.get_session(user_id, session_id).await?;
                current.ensure_accepting_answers()?;
                return Err(StorageError::Conflict.into());
            }
            (Err(ReviewServiceError::Storage(StorageError::NotFound)), Some(_)) => {
                return Err(SessionError::NotFound);
            }
            (Err(err), _) => return Err(err.into()),
        };

        let session = match (persisted.session, input.session_id) {
            (Some(session), _) => Some(session),
            (None, Some(session_id)) => Some(self.get_session(user_id, session_id).await?),
            (None, None) => None,
        };

        debug!(
            user_id = user_id.value(),
            word_id = input.word_id.value(),
            rating = input.rating.value(),
            first_answer = persisted.first_answer,
            replayed = persisted.replayed,
            "answer recorded"
        );

        Ok(AnswerOutcome {
            next_intervals: self.review_service.preview(&persisted.state),
            state: persisted.state,
            session,
            first_answer: persisted.first_answer,
            replayed: persisted.replayed,
        })
    }

    /// Words from other sets still count toward the session, words from
    /// another exam or level do not.
    async fn ensure_in_target(
        &self,
        session: &LearningSession,
        word_id: WordId,
    ) -> Result<(), SessionError> {
        let word = self
            .words
            .get_many(&[word_id])
            .await?
            .into_iter()
            .next()
            .ok_or(ReviewServiceError::WordNotFound(word_id.value()))?;
        if StudyTarget::new(word.exam, word.level) == *session.target() {
            Ok(())
        } else {
            Err(SessionError::WordOutsideTarget {
                word: word_id.value(),
                target: session.target().to_string(),
            })
        }
    }

    /// Apply a client progress report.
    ///
    /// A `completed_set` finishes that set under the session version and
    /// returns the words of the next one. `CompletedSet::Current` is resolved
    /// against the session as loaded, so a concurrent completion of the same
    /// set turns it into a no-op instead of skipping a set. A bare `current_index` is a
    /// best-effort checkpoint: it only moves forward within the current set,
    /// and a failed write is logged and reported as dropped.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidPosition` for a set ahead of the cursor
    /// or an index past the end of the set, `SessionError::NotFound` for an
    /// unknown session, or `SessionError::Storage` if the session cannot be read.
    pub async fn update_progress(
        &self,
        user_id: UserId,
        session_id: SessionId,
        update: ProgressUpdate,
    ) -> Result<ProgressOutcome, SessionError> {
        let session = self.get_session(user_id, session_id).await?;

        if let Some(mark) = update.completed_set {
            let set = match mark {
                CompletedSet::Index(set) => set,
                CompletedSet::Current if session.is_completed() => {
                    return Ok(ProgressOutcome {
                        session,
                        next_words: None,
                        checkpoint_dropped: false,
                    });
                }
                CompletedSet::Current => session.current_set(),
            };
            return self.complete_set(user_id, session, set).await;
        }

        let Some(index) = update.current_index else {
            return Ok(ProgressOutcome {
                session,
                next_words: None,
                checkpoint_dropped: false,
            });
        };

        let mut moved = session.clone();
        match moved.checkpoint(index, update.current_set)? {
            CheckpointOutcome::Unchanged => Ok(ProgressOutcome {
                session,
                next_words: None,
                checkpoint_dropped: false,
            }),
            CheckpointOutcome::Stale => {
                debug!(
                    session_id = %session_id,
                    current_set = session.current_set(),
                    reported_set = ?update.current_set,
                    "stale checkpoint ignored"
                );
                Ok(ProgressOutcome {
                    session,
                    next_words: None,
                    checkpoint_dropped: true,
                })
            }
            CheckpointOutcome::Moved => {
                let now = self.now();
                match self
                    .sessions
                    .checkpoint(session_id, moved.current_set(), index, now)
                    .await
                {
                    Ok(true) => {
                        moved.touch(now);
                        Ok(ProgressOutcome {
                            session: moved,
                            next_words: None,
                            checkpoint_dropped: false,
                        })
                    }
                    Ok(false) => Ok(ProgressOutcome {
                        session,
                        next_words: None,
                        checkpoint_dropped: true,
                    }),
                    Err(err) => {
                        warn!(
                            error = %err,
                            session_id = %session_id,
                            index,
                            "checkpoint dropped"
                        );
                        Ok(ProgressOutcome {
                            session,
                            next_words: None,
                            checkpoint_dropped: true,
                        })
                    }
                }
            }
        }
    }

    async fn complete_set(
        &self,
        user_id: UserId,
        mut session: LearningSession,
        set: u32,
    ) -> Result<ProgressOutcome, SessionError> {
        let mut attempt = 1;
        let saved = loop {
            let mut next = session.clone();
            match next.complete_set(set, self.now())? {
                SetCompletion::AlreadyApplied => {
                    return Ok(ProgressOutcome {
                        session,
                        next_words: None,
                        checkpoint_dropped: false,
                    });
                }
                SetCompletion::Advanced { .. } | SetCompletion::Finished => {}
            }
            match self.sessions.save(&next).await {
                Ok(saved) => break saved,
                Err(StorageError::Conflict) if attempt < MAX_COMPLETION_ATTEMPTS => {
                    debug!(session_id = %session.id(), attempt, "session version moved, retrying");
                    session = self.get_session(user_id, session.id()).await?;
                    attempt += 1;
                }
                Err(StorageError::NotFound) => return Err(SessionError::NotFound),
                Err(err) => return Err(err.into()),
            }
        };

        info!(
            user_id = user_id.value(),
            session_id = %saved.id(),
            completed_set = set,
            completed = saved.is_completed(),
            "set completed"
        );
        let words = self.next_set_words(&saved).await?;
        Ok(ProgressOutcome {
            session: saved,
            next_words: Some(words),
            checkpoint_dropped: false,
        })
    }

    /// Words of the session's current set; empty once it is completed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the catalog cannot be read.
    pub async fn get_next_set_words(
        &self,
        session: &LearningSession,
    ) -> Result<Vec<Word>, SessionError> {
        Ok(self.next_set_words(session).await?)
    }

    async fn next_set_words(&self, session: &LearningSession) -> Result<Vec<Word>, StorageError> {
        if session.is_completed() {
            return Ok(Vec::new());
        }
        self.planner
            .words_for_set(self.words.as_ref(), session, session.current_set())
            .await
    }

    /// Snapshot a study pass for `mode`.
    ///
    /// `Catalog` resumes (or starts) the persisted session and returns its
    /// current set. The other modes persist nothing.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyTarget` when a demo catalog is empty, or
    /// `SessionError::Storage` on repository failures.
    pub async fn start_pass(
        &self,
        user_id: UserId,
        mode: StudyMode,
    ) -> Result<StudyPass, SessionError> {
        if let StudyMode::Catalog { target } = &mode {
            let started = self.start(user_id, target.clone(), false).await?;
            let sets = if started.words.is_empty() {
                Vec::new()
            } else {
                vec![started.words]
            };
            return Ok(StudyPass {
                mode,
                session: Some(started.session),
                sets,
            });
        }

        let words = WordSource::new(self.progress.as_ref(), self.words.as_ref())
            .collect(user_id, &mode, self.now())
            .await?;
        if let (StudyMode::Demo { target }, true) = (&mode, words.is_empty()) {
            return Err(SessionError::EmptyTarget(target.to_string()));
        }

        info!(
            user_id = user_id.value(),
            mode = mode.name(),
            words = words.len(),
            "study pass prepared"
        );
        Ok(StudyPass {
            mode,
            session: None,
            sets: split_into_sets(words, SET_SIZE),
        })
    }
}
