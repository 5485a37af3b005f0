use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Barrier;

use learn_core::model::{
    ExamCategory, Level, Rating, SessionId, SessionStatus, StudyTarget, UserId, Word, WordId,
};
use learn_core::time::fixed_now;
use services::{
    AnswerInput, Clock, CompletedSet, ErrorKind, LearningSessionController, ProgressUpdate, SessionError,
    StudyMode,
};
use storage::Storage;
use storage::repository::{
    InMemoryRepository, ProgressFilter, ProgressRepository, ReviewCommit, ReviewPersistence,
    ReviewReceipt, ReviewWrite, ScheduleRecord, StorageError, WordCatalog,
};

fn target() -> StudyTarget {
    StudyTarget::parse("TOEIC", 1).unwrap()
}

fn seeded(words: u64) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.insert_words((1..=words).map(|id| Word {
        id: WordId::new(id),
        headword: format!("word-{id}"),
        meaning: format!("meaning-{id}"),
        exam: ExamCategory::new("TOEIC").unwrap(),
        level: Level::new(1).unwrap(),
    }))
    .unwrap();
    repo
}

fn controller(repo: &InMemoryRepository) -> LearningSessionController {
    LearningSessionController::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    )
}

fn answer(session: Option<learn_core::model::SessionId>, word: WordId, rating: i64) -> AnswerInput {
    AnswerInput {
        session_id: session,
        word_id: word,
        rating: Rating::new(rating).unwrap(),
        request_id: None,
    }
}

#[tokio::test]
async fn resume_is_side_effect_free() {
    let repo = seeded(45);
    let ctl = controller(&repo);
    let user = UserId::new(1);

    let first = ctl.start(user, target(), false).await.unwrap();
    assert!(!first.resumed);
    assert_eq!(first.words.len(), 20);

    let word = first.words[3].id;
    ctl.record_answer(user, answer(Some(first.session.id()), word, 4))
        .await
        .unwrap();

    let a = ctl.start(user, target(), false).await.unwrap();
    let b = ctl.start(user, target(), false).await.unwrap();
    assert!(a.resumed && b.resumed);
    assert_eq!(a.session.id(), first.session.id());
    assert_eq!(a.session.position(), b.session.position());
    assert_eq!(a.session.current_index(), 4);
    assert_eq!(a.session.version(), b.session.version());
    assert_eq!(a.words, b.words);
}

#[tokio::test]
async fn restart_replaces_session() {
    let repo = seeded(45);
    let ctl = controller(&repo);
    let user = UserId::new(1);

    let first = ctl.start(user, target(), false).await.unwrap();
    let restarted = ctl.start(user, target(), true).await.unwrap();
    assert_ne!(restarted.session.id(), first.session.id());
    assert_eq!(restarted.session.current_set(), 0);

    let err = ctl
        .get_session(user, first.session.id())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound));
}

#[tokio::test]
async fn single_set_session_completes_directly() {
    let repo = seeded(20);
    let ctl = controller(&repo);
    let user = UserId::new(1);

    let started = ctl.start(user, target(), false).await.unwrap();
    let id = started.session.id();
    for word in &started.words {
        ctl.record_answer(user, answer(Some(id), word.id, 5))
            .await
            .unwrap();
    }
    let before = ctl.get_session(user, id).await.unwrap();
    assert_eq!(before.total_reviewed(), 20);
    assert!(before.is_set_exhausted());

    let done = ctl
        .update_progress(
            user,
            id,
            ProgressUpdate {
                completed_set: Some(CompletedSet::Index(0)),
                ..ProgressUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(done.session.status(), SessionStatus::Completed);
    assert_eq!(done.session.completed_sets(), 1);
    assert_eq!(done.next_words, Some(Vec::new()));
}

#[tokio::test]
async fn completed_session_rejects_answers() {
    let repo = seeded(3);
    let ctl = controller(&repo);
    let user = UserId::new(1);

    let started = ctl.start(user, target(), false).await.unwrap();
    let id = started.session.id();
    ctl.update_progress(
        user,
        id,
        ProgressUpdate {
            completed_set: Some(CompletedSet::Index(0)),
            ..ProgressUpdate::default()
        },
    )
    .await
    .unwrap();

    let word = started.words[0].id;
    let err = ctl
        .record_answer(user, answer(Some(id), word, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Completed));
    assert!(repo.get(user, word).await.unwrap().is_none());

    let resumed = ctl.start(user, target(), false).await.unwrap();
    assert!(resumed.session.is_completed());
    assert!(resumed.words.is_empty());
}

#[tokio::test]
async fn repeated_answers_count_once_and_last_rating_wins() {
    let repo = seeded(45);
    let ctl = controller(&repo);
    let user = UserId::new(1);

    let started = ctl.start(user, target(), false).await.unwrap();
    let id = started.session.id();
    let word = started.words[0].id;

    let good = ctl
        .record_answer(user, answer(Some(id), word, 5))
        .await
        .unwrap();
    assert!(good.first_answer);
    let next = |rating: u8| {
        good.next_intervals
            .iter()
            .find(|p| p.rating.value() == rating)
            .map(|p| p.interval_days)
    };
    assert_eq!(good.next_intervals.len(), 5);
    assert_eq!(next(5), Some(6));
    assert_eq!(next(1), Some(1));

    let lapse = ctl
        .record_answer(user, answer(Some(id), word, 1))
        .await
        .unwrap();
    assert!(!lapse.first_answer);

    let session = lapse.session.unwrap();
    assert_eq!(session.total_reviewed(), 1);
    assert_eq!(session.current_index(), 1);
    assert_eq!(lapse.state.repetitions(), 0);
    assert_eq!(lapse.state.correct_count(), 1);
    assert_eq!(lapse.state.incorrect_count(), 1);
}

#[tokio::test]
async fn answer_outside_current_set_keeps_cursor() {
    let repo = seeded(45);
    let ctl = controller(&repo);
    let user = UserId::new(1);

    let started = ctl.start(user, target(), false).await.unwrap();
    let out = ctl
        .record_answer(user, answer(Some(started.session.id()), WordId::new(44), 4))
        .await
        .unwrap();
    let session = out.session.unwrap();
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.total_reviewed(), 1);
}

#[tokio::test]
async fn answer_from_another_level_is_rejected() {
    let repo = seeded(45);
    repo.insert_words([Word {
        id: WordId::new(500),
        headword: "word-500".into(),
        meaning: "meaning-500".into(),
        exam: ExamCategory::new("TOEIC").unwrap(),
        level: Level::new(2).unwrap(),
    }])
    .unwrap();
    let ctl = controller(&repo);
    let user = UserId::new(1);
    let started = ctl.start(user, target(), false).await.unwrap();
    let id = started.session.id();

    let err = ctl
        .record_answer(user, answer(Some(id), WordId::new(500), 5))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::WordOutsideTarget { word: 500, .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(repo.get(user, WordId::new(500)).await.unwrap().is_none());
    assert_eq!(ctl.get_session(user, id).await.unwrap().total_reviewed(), 0);

    // Outside a session the same word is a plain review.
    let out = ctl
        .record_answer(user, answer(None, WordId::new(500), 5))
        .await
        .unwrap();
    assert!(out.session.is_none());
}

#[tokio::test]
async fn retried_request_is_replayed() {
    let repo = seeded(5);
    let ctl = controller(&repo);
    let user = UserId::new(1);
    let started = ctl.start(user, target(), false).await.unwrap();
    let input = AnswerInput {
        request_id: Some("tap-1".into()),
        ..answer(Some(started.session.id()), WordId::new(1), 5)
    };

    let first = ctl.record_answer(user, input.clone()).await.unwrap();
    let retry = ctl.record_answer(user, input).await.unwrap();
    assert!(retry.replayed);
    assert_eq!(retry.state, first.state);
    assert_eq!(retry.session.unwrap().total_reviewed(), 1);

    let stored = repo.get(user, WordId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn review_pass_returns_due_words_in_sets() {
    let repo = seeded(45);
    let ctl = controller(&repo);
    let user = UserId::new(1);

    for id in [3, 7, 11] {
        ctl.record_answer(user, answer(None, WordId::new(id), 1))
            .await
            .unwrap();
    }

    // Lapses are due tomorrow, not today.
    let today = ctl
        .start_pass(user, StudyMode::Review { target: Some(target()) })
        .await
        .unwrap();
    assert_eq!(today.total_words(), 0);

    let weak = ctl
        .start_pass(user, StudyMode::Weak { target: None })
        .await
        .unwrap();
    assert_eq!(weak.sets.len(), 1);
    assert_eq!(weak.total_words(), 3);
    assert!(weak.session.is_none());

    let catalog = ctl
        .start_pass(user, StudyMode::Catalog { target: target() })
        .await
        .unwrap();
    assert!(catalog.session.is_some());
    assert_eq!(catalog.sets[0].len(), 20);
}

#[tokio::test]
async fn storage_wrapper_drives_same_controller() {
    let repo = seeded(45);
    let storage = Storage::from_memory(repo);
    let ctl = LearningSessionController::from_storage(Clock::fixed(fixed_now()), &storage);
    let started = ctl.start(UserId::new(9), target(), false).await.unwrap();
    assert_eq!(started.session.total_sets(), 3);
    let last = storage
        .words
        .page(&target(), started.session.layout().offset(2), 20)
        .await
        .unwrap();
    assert_eq!(last.len(), 5);
}

/// Holds the first `gated` schedule reads until all of them have happened,
/// so concurrent answers are guaranteed to read the same version.
struct GatedProgress {
    inner: InMemoryRepository,
    barrier: Barrier,
    reads: AtomicUsize,
    gated: usize,
}

impl GatedProgress {
    fn new(inner: InMemoryRepository, gated: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(gated),
            reads: AtomicUsize::new(0),
            gated,
        }
    }
}

#[async_trait]
impl ProgressRepository for GatedProgress {
    async fn get(
        &self,
        user_id: UserId,
        word_id: WordId,
    ) -> Result<Option<ScheduleRecord>, StorageError> {
        let row = self.inner.get(user_id, word_id).await?;
        if self.reads.fetch_add(1, Ordering::SeqCst) < self.gated {
            self.barrier.wait().await;
        }
        Ok(row)
    }

    async fn upsert(
        &self,
        record: &ScheduleRecord,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        self.inner.upsert(record, expected_version).await
    }

    async fn find_due(
        &self,
        user_id: UserId,
        filter: &ProgressFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<WordId>, StorageError> {
        self.inner.find_due(user_id, filter, now).await
    }

    async fn find_weak(
        &self,
        user_id: UserId,
        filter: &ProgressFilter,
    ) -> Result<Vec<WordId>, StorageError> {
        self.inner.find_weak(user_id, filter).await
    }
}

#[tokio::test]
async fn concurrent_duplicate_answer_applies_once() {
    let repo = seeded(45);
    let ctl = LearningSessionController::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(GatedProgress::new(repo.clone(), 2)),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    );
    let user = UserId::new(1);
    let started = ctl.start(user, target(), false).await.unwrap();
    let id = started.session.id();
    let word = started.words[0].id;

    let (a, b) = tokio::join!(
        ctl.record_answer(user, answer(Some(id), word, 5)),
        ctl.record_answer(user, answer(Some(id), word, 5)),
    );
    let (ok, err) = match (a, b) {
        (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
        other => panic!("expected one winner, got {other:?}"),
    };
    assert!(ok.first_answer);
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let stored = repo.get(user, word).await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.state.repetitions(), 1);
    assert_eq!(stored.state.interval_days(), 1);
    assert_eq!(stored.state.correct_count(), 1);

    let session = ctl.get_session(user, id).await.unwrap();
    assert_eq!(session.total_reviewed(), 1);
    assert_eq!(session.current_index(), 1);
}

/// Write path that is always unreachable.
struct DownReviews;

#[async_trait]
impl ReviewPersistence for DownReviews {
    async fn apply_review(
        &self,
        _write: ReviewWrite,
        _at: DateTime<Utc>,
    ) -> Result<ReviewCommit, StorageError> {
        Err(StorageError::Connection("down".into()))
    }

    async fn find_receipt(
        &self,
        _user_id: UserId,
        _request_id: &str,
    ) -> Result<Option<ReviewReceipt>, StorageError> {
        Ok(None)
    }

    async fn answer_version(
        &self,
        _session_id: SessionId,
        _word_id: WordId,
    ) -> Result<Option<u64>, StorageError> {
        Ok(None)
    }
}

#[tokio::test]
async fn unreachable_store_fails_answer_and_keeps_cursor() {
    let repo = seeded(45);
    let ctl = LearningSessionController::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(DownReviews),
        Arc::new(repo.clone()),
    );
    let user = UserId::new(1);
    let started = ctl.start(user, target(), false).await.unwrap();
    let id = started.session.id();
    let word = started.words[0].id;

    let err = ctl
        .record_answer(user, answer(Some(id), word, 5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);

    let session = ctl.get_session(user, id).await.unwrap();
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.total_reviewed(), 0);
    assert!(repo.get(user, word).await.unwrap().is_none());
}
