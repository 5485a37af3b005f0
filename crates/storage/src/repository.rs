use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{
    LearningSession, Rating, ScheduleState, SessionId, SessionStatus, StudyTarget, UserId, Word,
    WordId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ──────────────────────────────────────────────────────────────────
//

/// Persisted scheduling row for one (user, word).
///
/// `target` is denormalized from the word so due/weak queries can filter by
/// exam and level without joining the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRecord {
    pub user_id: UserId,
    pub word_id: WordId,
    pub target: StudyTarget,
    pub state: ScheduleState,
    /// Compare-and-swap token; 0 means "not stored yet".
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Narrowing for due/weak queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressFilter {
    pub target: Option<StudyTarget>,
    pub limit: Option<u32>,
}

impl ProgressFilter {
    #[must_use]
    pub fn for_target(target: StudyTarget) -> Self {
        Self {
            target: Some(target),
            limit: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, record: &ScheduleRecord) -> bool {
        self.target.as_ref().is_none_or(|t| *t == record.target)
    }

    fn take(&self) -> usize {
        self.limit.map_or(usize::MAX, |l| l as usize)
    }
}

/// The session side of a review: which set the answer belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAnswer {
    pub session_id: SessionId,
    /// Set the session was on when the answer was planned.
    pub set: u32,
    /// Position of the word inside that set, if it belongs to it.
    pub index_in_set: Option<u32>,
    pub rating: Rating,
}

/// Everything one answer writes, applied in a single transaction.
#[derive(Debug, Clone)]
pub struct ReviewWrite {
    pub record: ScheduleRecord,
    /// Version the caller read; `None` when no row existed.
    pub expected_version: Option<u64>,
    pub answer: Option<SessionAnswer>,
    pub request_id: Option<String>,
}

/// Result of a committed review.
#[derive(Debug, Clone)]
pub struct ReviewCommit {
    pub version: u64,
    pub session: Option<LearningSession>,
    /// True when this was the first rating for the word in the session.
    pub first_answer: bool,
}

/// Stored outcome of a review, replayed on retries with the same request id.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewReceipt {
    pub user_id: UserId,
    pub request_id: String,
    pub word_id: WordId,
    pub session_id: Option<SessionId>,
    pub state: ScheduleState,
    pub created_at: DateTime<Utc>,
}

//
// ─── CONTRACTS ────────────────────────────────────────────────────────────────
//

/// Durable per-(user, word) scheduling state.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the scheduling row, if the word was ever reviewed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Option<ScheduleRecord>, StorageError>;

    /// Write `record` if the stored version still equals `expected_version`.
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when another write got there first.
    async fn upsert(
        &self,
        record: &ScheduleRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError>;

    /// Words due at `now`, fewest correct answers first, then least recently updated.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn find_due(
        &self,
        user_id: UserId,
        filter: &ProgressFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<WordId>, StorageError>;

    /// Words with at least one lapse, worst balance first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn find_weak(
        &self,
        user_id: UserId,
        filter: &ProgressFilter,
    ) -> Result<Vec<WordId>, StorageError>;
}

/// Persisted learning sessions, one per (user, exam, level).
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no session has this id.
    async fn get(&self, id: SessionId) -> Result<LearningSession, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn find_for_target(
        &self,
        user_id: UserId,
        target: &StudyTarget,
    ) -> Result<Option<LearningSession>, StorageError>;

    /// Insert `session` unless one already exists for its (user, target);
    /// either way return the stored row. Concurrent starts converge on one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn insert_if_absent(
        &self,
        session: &LearningSession,
    ) -> Result<LearningSession, StorageError>;

    /// Drop whatever session exists for the (user, target) and store `session`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn replace(&self, session: &LearningSession) -> Result<LearningSession, StorageError>;

    /// Full write guarded by the session version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the stored version moved, or
    /// `StorageError::NotFound` if the session was replaced.
    async fn save(&self, session: &LearningSession) -> Result<LearningSession, StorageError>;

    /// Raise `current_index` to `index` if the session is still in progress
    /// on `set`. Returns whether the row changed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn checkpoint(
        &self,
        id: SessionId,
        set: u32,
        index: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;
}

/// Atomic write path for a single answer.
#[async_trait]
pub trait ReviewPersistence: Send + Sync {
    /// Apply the schedule row, the session answer and the receipt together.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the schedule version moved or the
    /// session is no longer in progress on the answered set; nothing is
    /// written in that case.
    async fn apply_review(
        &self,
        write: ReviewWrite,
        at: DateTime<Utc>,
    ) -> Result<ReviewCommit, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn find_receipt(
        &self,
        user_id: UserId,
        request_id: &str,
    ) -> Result<Option<ReviewReceipt>, StorageError>;

    /// Schedule version written by the session's latest answer for `word_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn answer_version(
        &self,
        session_id: SessionId,
        word_id: WordId,
    ) -> Result<Option<u64>, StorageError>;
}

/// Read side of the word catalog; ordering must be stable per (exam, level).
#[async_trait]
pub trait WordCatalog: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be reached.
    async fn count(&self, target: &StudyTarget) -> Result<u32, StorageError>;

    /// Words `offset..offset + limit` of the target's stable ordering.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be reached.
    async fn page(
        &self,
        target: &StudyTarget,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Word>, StorageError>;

    /// Hydrate ids in input order; unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be reached.
    async fn get_many(&self, ids: &[WordId]) -> Result<Vec<Word>, StorageError>;
}

//
// ─── IN-MEMORY ────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct Tables {
    schedules: HashMap<(UserId, WordId), ScheduleRecord>,
    sessions: HashMap<SessionId, LearningSession>,
    session_keys: HashMap<(UserId, StudyTarget), SessionId>,
    /// Schedule version written by the latest answer per (session, word).
    answers: HashMap<(SessionId, WordId), u64>,
    receipts: HashMap<(UserId, String), ReviewReceipt>,
    words: BTreeMap<WordId, Word>,
}

impl Tables {
    fn remove_session(&mut self, id: SessionId) {
        if let Some(old) = self.sessions.remove(&id) {
            self.session_keys
                .remove(&(old.user_id(), old.target().clone()));
        }
        self.answers.retain(|(sid, _), _| *sid != id);
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// One lock guards every table so multi-table writes stay atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Add or replace catalog entries.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_words(&self, words: impl IntoIterator<Item = Word>) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        for word in words {
            guard.words.insert(word.id, word);
        }
        Ok(())
    }
}

fn check_version(stored: Option<u64>, expected: Option<u64>) -> Result<u64, StorageError> {
    if stored == expected {
        Ok(expected.map_or(1, |v| v + 1))
    } else {
        Err(StorageError::Conflict)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Option<ScheduleRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.schedules.get(&(user_id, word_id)).cloned())
    }

    async fn upsert(
        &self,
        record: &ScheduleRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let key = (record.user_id, record.word_id);
        let version = check_version(guard.schedules.get(&key).map(|r| r.version), expected_version)?;
        let mut stored = record.clone();
        stored.version = version;
        guard.schedules.insert(key, stored);
        Ok(version)
    }

    async fn find_due(
        &self,
        user_id: UserId,
        filter: &ProgressFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<WordId>, StorageError> {
        let guard = self.lock()?;
        let mut due: Vec<&ScheduleRecord> = guard
            .schedules
            .values()
            .filter(|r| r.user_id == user_id && r.state.is_due(now) && filter.matches(r))
            .collect();
        due.sort_by_key(|r| (r.state.correct_count(), r.updated_at, r.word_id));
        Ok(due.into_iter().take(filter.take()).map(|r| r.word_id).collect())
    }

    async fn find_weak(
        &self,
        user_id: UserId,
        filter: &ProgressFilter,
    ) -> Result<Vec<WordId>, StorageError> {
        let guard = self.lock()?;
        let mut weak: Vec<&ScheduleRecord> = guard
            .schedules
            .values()
            .filter(|r| r.user_id == user_id && r.state.incorrect_count() > 0 && filter.matches(r))
            .collect();
        weak.sort_by_key(|r| {
            let balance =
                i64::from(r.state.incorrect_count()) - i64::from(r.state.correct_count());
            (std::cmp::Reverse(balance), r.updated_at, r.word_id)
        });
        Ok(weak.into_iter().take(filter.take()).map(|r| r.word_id).collect())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn get(&self, id: SessionId) -> Result<LearningSession, StorageError> {
        let guard = self.lock()?;
        guard.sessions.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn find_for_target(
        &self,
        user_id: UserId,
        target: &StudyTarget,
    ) -> Result<Option<LearningSession>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .session_keys
            .get(&(user_id, target.clone()))
            .and_then(|id| guard.sessions.get(id))
            .cloned())
    }

    async fn insert_if_absent(
        &self,
        session: &LearningSession,
    ) -> Result<LearningSession, StorageError> {
        let mut guard = self.lock()?;
        let key = (session.user_id(), session.target().clone());
        if let Some(existing) = guard.session_keys.get(&key).and_then(|id| guard.sessions.get(id))
        {
            return Ok(existing.clone());
        }
        let stored = session.clone().with_version(1);
        guard.session_keys.insert(key, stored.id());
        guard.sessions.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn replace(&self, session: &LearningSession) -> Result<LearningSession, StorageError> {
        let mut guard = self.lock()?;
        let key = (session.user_id(), session.target().clone());
        if let Some(old) = guard.session_keys.get(&key).copied() {
            guard.remove_session(old);
        }
        let stored = session.clone().with_version(1);
        guard.session_keys.insert(key, stored.id());
        guard.sessions.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn save(&self, session: &LearningSession) -> Result<LearningSession, StorageError> {
        let mut guard = self.lock()?;
        let current = guard
            .sessions
            .get(&session.id())
            .ok_or(StorageError::NotFound)?;
        if current.version() != session.version() {
            return Err(StorageError::Conflict);
        }
        let stored = session.clone().with_version(session.version() + 1);
        guard.sessions.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn checkpoint(
        &self,
        id: SessionId,
        set: u32,
        index: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        let Some(session) = guard.sessions.get_mut(&id) else {
            return Ok(false);
        };
        if session.status() != SessionStatus::InProgress || session.current_set() != set {
            return Ok(false);
        }
        let moved = matches!(
            session.checkpoint(index, Some(set)),
            Ok(learn_core::model::CheckpointOutcome::Moved)
        );
        if moved {
            session.touch(at);
        }
        Ok(moved)
    }
}

#[async_trait]
impl ReviewPersistence for InMemoryRepository {
    async fn apply_review(
        &self,
        write: ReviewWrite,
        at: DateTime<Utc>,
    ) -> Result<ReviewCommit, StorageError> {
        let mut guard = self.lock()?;
        let key = (write.record.user_id, write.record.word_id);
        let version = check_version(
            guard.schedules.get(&key).map(|r| r.version),
            write.expected_version,
        )?;

        // Validate the session before mutating anything.
        let mut session = match &write.answer {
            Some(answer) => {
                let session = guard
                    .sessions
                    .get(&answer.session_id)
                    .ok_or(StorageError::NotFound)?;
                if session.status() != SessionStatus::InProgress || session.user_id() != key.0 {
                    return Err(StorageError::Conflict);
                }
                Some(session.clone())
            }
            None => None,
        };

        let mut first_answer = false;
        if let (Some(answer), Some(session)) = (&write.answer, session.as_mut()) {
            // Last rating wins.
            first_answer = guard
                .answers
                .insert((answer.session_id, key.1), version)
                .is_none();
            if first_answer {
                session.record_first_answer();
            }
            match answer.index_in_set {
                Some(index) if session.current_set() == answer.set => {
                    session.mark_answered(index);
                }
                _ => {}
            }
            session.touch(at);
            let next = session.version() + 1;
            *session = session.clone().with_version(next);
            guard.sessions.insert(session.id(), session.clone());
        }

        let mut stored = write.record.clone();
        stored.version = version;
        stored.updated_at = at;
        guard.schedules.insert(key, stored);

        if let Some(request_id) = write.request_id {
            guard
                .receipts
                .entry((key.0, request_id.clone()))
                .or_insert_with(|| ReviewReceipt {
                    user_id: key.0,
                    request_id,
                    word_id: key.1,
                    session_id: write.answer.as_ref().map(|a| a.session_id),
                    state: write.record.state.clone(),
                    created_at: at,
                });
        }

        Ok(ReviewCommit {
            version,
            session,
            first_answer,
        })
    }

    async fn find_receipt(
        &self,
        user_id: UserId,
        request_id: &str,
    ) -> Result<Option<ReviewReceipt>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .receipts
            .get(&(user_id, request_id.to_owned()))
            .cloned())
    }

    async fn answer_version(
        &self,
        session_id: SessionId,
        word_id: WordId,
    ) -> Result<Option<u64>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.answers.get(&(session_id, word_id)).copied())
    }
}

#[async_trait]
impl WordCatalog for InMemoryRepository {
    async fn count(&self, target: &StudyTarget) -> Result<u32, StorageError> {
        let guard = self.lock()?;
        let n = guard
            .words
            .values()
            .filter(|w| w.exam == target.exam && w.level == target.level)
            .count();
        u32::try_from(n).map_err(|_| StorageError::Serialization("word count overflow".into()))
    }

    async fn page(
        &self,
        target: &StudyTarget,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Word>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .words
            .values()
            .filter(|w| w.exam == target.exam && w.level == target.level)
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_many(&self, ids: &[WordId]) -> Result<Vec<Word>, StorageError> {
        let guard = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| guard.words.get(id).cloned())
            .collect())
    }
}

//
// ─── AGGREGATE ────────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub reviews: Arc<dyn ReviewPersistence>,
    pub words: Arc<dyn WordCatalog>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_memory(InMemoryRepository::new())
    }

    /// Wrap an existing in-memory repository, e.g. one pre-loaded with words.
    #[must_use]
    pub fn from_memory(repo: InMemoryRepository) -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let reviews: Arc<dyn ReviewPersistence> = Arc::new(repo.clone());
        let words: Arc<dyn WordCatalog> = Arc::new(repo);
        Self {
            progress,
            sessions,
            reviews,
            words,
        }
    }

    /// Swap the word catalog, e.g. for a remote one.
    #[must_use]
    pub fn with_catalog(mut self, words: Arc<dyn WordCatalog>) -> Self {
        self.words = words;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use learn_core::model::{SetLayout, StudyTarget};
    use learn_core::scheduler;
    use learn_core::time::fixed_now;

    fn target() -> StudyTarget {
        StudyTarget::parse("TOEIC", 1).unwrap()
    }

    fn record(user: u64, word: u64, state: ScheduleState) -> ScheduleRecord {
        ScheduleRecord {
            user_id: UserId::new(user),
            word_id: WordId::new(word),
            target: target(),
            state,
            version: 0,
            updated_at: fixed_now(),
        }
    }

    fn session(user: u64, words: u32) -> LearningSession {
        LearningSession::start(
            SessionId::new_random(),
            UserId::new(user),
            target(),
            SetLayout::standard(words),
            1,
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn upsert_enforces_version() {
        let repo = InMemoryRepository::new();
        let rec = record(1, 1, ScheduleState::initial(fixed_now()));

        let v1 = repo.upsert(&rec, None).await.unwrap();
        assert_eq!(v1, 1);
        assert!(matches!(
            repo.upsert(&rec, None).await,
            Err(StorageError::Conflict)
        ));
        assert_eq!(repo.upsert(&rec, Some(1)).await.unwrap(), 2);
        assert!(matches!(
            repo.upsert(&rec, Some(1)).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn due_words_order_by_correct_count() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let mut strong = ScheduleState::initial(now);
        strong.record_result(Rating::new(5).unwrap());
        strong.record_result(Rating::new(5).unwrap());
        let fresh = ScheduleState::initial(now);
        let future = scheduler::update(Rating::new(5).unwrap(), &fresh, now);

        repo.upsert(&record(1, 10, strong), None).await.unwrap();
        repo.upsert(&record(1, 11, fresh), None).await.unwrap();
        repo.upsert(&record(1, 12, future), None).await.unwrap();
        repo.upsert(&record(2, 13, ScheduleState::initial(now)), None)
            .await
            .unwrap();

        let due = repo
            .find_due(UserId::new(1), &ProgressFilter::default(), now)
            .await
            .unwrap();
        assert_eq!(due, vec![WordId::new(11), WordId::new(10)]);

        let later = repo
            .find_due(
                UserId::new(1),
                &ProgressFilter::default().with_limit(5),
                now + Duration::days(2),
            )
            .await
            .unwrap();
        assert_eq!(later.len(), 3);
    }

    #[tokio::test]
    async fn insert_if_absent_returns_existing_session() {
        let repo = InMemoryRepository::new();
        let first = repo.insert_if_absent(&session(1, 45)).await.unwrap();
        let second = repo.insert_if_absent(&session(1, 45)).await.unwrap();
        assert_eq!(first.id(), second.id());

        let replaced = repo.replace(&session(1, 45)).await.unwrap();
        assert_ne!(replaced.id(), first.id());
        assert!(matches!(
            SessionRepository::get(&repo, first.id()).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn save_rejects_stale_version() {
        let repo = InMemoryRepository::new();
        let stored = repo.insert_if_absent(&session(1, 45)).await.unwrap();

        let mut a = stored.clone();
        a.complete_set(0, fixed_now()).unwrap();
        let saved = repo.save(&a).await.unwrap();
        assert_eq!(saved.version(), stored.version() + 1);

        let mut b = stored;
        b.complete_set(0, fixed_now()).unwrap();
        assert!(matches!(repo.save(&b).await, Err(StorageError::Conflict)));
    }

    #[tokio::test]
    async fn apply_review_counts_first_answer_once() {
        let repo = InMemoryRepository::new();
        let stored = repo.insert_if_absent(&session(1, 45)).await.unwrap();
        let now = fixed_now();
        let answer = SessionAnswer {
            session_id: stored.id(),
            set: 0,
            index_in_set: Some(2),
            rating: Rating::new(4).unwrap(),
        };

        let first = repo
            .apply_review(
                ReviewWrite {
                    record: record(1, 5, ScheduleState::initial(now)),
                    expected_version: None,
                    answer: Some(answer.clone()),
                    request_id: Some("r-1".into()),
                },
                now,
            )
            .await
            .unwrap();
        assert!(first.first_answer);
        let after = first.session.unwrap();
        assert_eq!(after.total_reviewed(), 1);
        assert_eq!(after.current_index(), 3);

        let second = repo
            .apply_review(
                ReviewWrite {
                    record: record(1, 5, ScheduleState::initial(now)),
                    expected_version: Some(first.version),
                    answer: Some(answer),
                    request_id: None,
                },
                now,
            )
            .await
            .unwrap();
        assert!(!second.first_answer);
        assert_eq!(second.session.unwrap().total_reviewed(), 1);

        let receipt = repo.find_receipt(UserId::new(1), "r-1").await.unwrap();
        assert_eq!(receipt.unwrap().word_id, WordId::new(5));
    }

    #[tokio::test]
    async fn apply_review_on_completed_session_writes_nothing() {
        let repo = InMemoryRepository::new();
        let mut s = repo.insert_if_absent(&session(1, 3)).await.unwrap();
        s.complete_set(0, fixed_now()).unwrap();
        repo.save(&s).await.unwrap();

        let result = repo
            .apply_review(
                ReviewWrite {
                    record: record(1, 5, ScheduleState::initial(fixed_now())),
                    expected_version: None,
                    answer: Some(SessionAnswer {
                        session_id: s.id(),
                        set: 0,
                        index_in_set: Some(0),
                        rating: Rating::new(5).unwrap(),
                    }),
                    request_id: None,
                },
                fixed_now(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::Conflict)));
        assert!(
            ProgressRepository::get(&repo, UserId::new(1), WordId::new(5))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn checkpoint_is_guarded_by_set() {
        let repo = InMemoryRepository::new();
        let s = repo.insert_if_absent(&session(1, 45)).await.unwrap();
        assert!(repo.checkpoint(s.id(), 0, 7, fixed_now()).await.unwrap());
        assert!(!repo.checkpoint(s.id(), 0, 4, fixed_now()).await.unwrap());
        assert!(!repo.checkpoint(s.id(), 1, 9, fixed_now()).await.unwrap());
        let stored = SessionRepository::get(&repo, s.id()).await.unwrap();
        assert_eq!(stored.current_index(), 7);
    }
}
