use chrono::{DateTime, Utc};
use tracing::debug;

use learn_core::{
    model::{LearningSession, Rating, ScheduleState, StudyTarget, UserId, WordId},
    scheduler::{self, IntervalPreview},
    time::Clock,
};
use storage::repository::{
    ProgressRepository, ReviewPersistence, ReviewReceipt, ReviewWrite, ScheduleRecord,
    SessionAnswer, StorageError, WordCatalog,
};

use crate::error::ReviewServiceError;

/// Longest client request id accepted for idempotent retries.
pub const MAX_REQUEST_ID_LEN: usize = 64;

/// Attempts made when another writer bumps the schedule version first.
const MAX_ATTEMPTS: u32 = 3;

//
// ─── REQUEST / RESULT ──────────────────────────────────────────────────────────
//

/// One rating to apply, optionally inside a learning session.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub user_id: UserId,
    pub word_id: WordId,
    pub rating: Rating,
    pub answer: Option<SessionAnswer>,
    pub request_id: Option<String>,
}

impl ReviewRequest {
    #[must_use]
    pub fn new(user_id: UserId, word_id: WordId, rating: Rating) -> Self {
        Self {
            user_id,
            word_id,
            rating,
            answer: None,
            request_id: None,
        }
    }

    #[must_use]
    pub fn in_session(mut self, answer: SessionAnswer) -> Self {
        self.answer = Some(answer);
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    fn validate(&self) -> Result<(), ReviewServiceError> {
        match &self.request_id {
            Some(id) if id.trim().is_empty() || id.len() > MAX_REQUEST_ID_LEN => {
                Err(ReviewServiceError::InvalidRequestId {
                    max: MAX_REQUEST_ID_LEN,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Outcome of a stored review.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedReview {
    pub state: ScheduleState,
    /// Schedule row version after the write.
    pub version: u64,
    /// Session snapshot after the answer, when the review belonged to one.
    pub session: Option<LearningSession>,
    /// First rating of this word in the session.
    pub first_answer: bool,
    /// True when the result came from a stored receipt instead of a new write.
    pub replayed: bool,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Applies ratings to scheduling state and persists the outcome.
#[derive(Debug, Clone, Default)]
pub struct ReviewService {
    clock: Clock,
}

impl ReviewService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Next state for `rating`, counters included.
    #[must_use]
    pub fn review(&self, rating: Rating, prior: &ScheduleState) -> ScheduleState {
        Self::review_at(rating, prior, self.now())
    }

    fn review_at(rating: Rating, prior: &ScheduleState, at: DateTime<Utc>) -> ScheduleState {
        let mut next = scheduler::update(rating, prior, at);
        next.record_result(rating);
        next
    }

    /// Interval each rating would give from `state` today.
    #[must_use]
    pub fn preview(&self, state: &ScheduleState) -> Vec<IntervalPreview> {
        scheduler::preview(state, self.now())
    }

    /// Apply a review and store the schedule row, the session answer and the
    /// receipt in one write.
    ///
    /// A request id that was already stored replays its result without
    /// running the scheduler again. A version conflict re-reads the row and
    /// tries again a bounded number of times, unless the competing write was
    /// the same word answered in the same session.
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError::WordNotFound` for a word missing from the
    /// catalog, `ReviewServiceError::InvalidRequestId` for a malformed request
    /// id, `ReviewServiceError::DuplicateAnswer` when a concurrent duplicate
    /// won the race, or the storage error of the last attempt.
    pub async fn review_persisted(
        &self,
        request: ReviewRequest,
        progress: &dyn ProgressRepository,
        reviews: &dyn ReviewPersistence,
        words: &dyn WordCatalog,
    ) -> Result<PersistedReview, ReviewServiceError> {
        request.validate()?;

        if let Some(done) = self.replay(&request, progress, reviews).await? {
            return Ok(done);
        }

        let mut attempt = 1;
        loop {
            let now = self.now();
            let existing = progress.get(request.user_id, request.word_id).await?;
            let (target, prior, expected_version) = match existing {
                Some(record) => (record.target, record.state, Some(record.version)),
                None => (
                    Self::target_of(request.word_id, words).await?,
                    ScheduleState::initial(now),
                    None,
                ),
            };

            let state = Self::review_at(request.rating, &prior, now);
            let write = ReviewWrite {
                record: ScheduleRecord {
                    user_id: request.user_id,
                    word_id: request.word_id,
                    target,
                    state: state.clone(),
                    version: expected_version.unwrap_or(0),
                    updated_at: now,
                },
                expected_version,
                answer: request.answer.clone(),
                request_id: request.request_id.clone(),
            };

            match reviews.apply_review(write, now).await {
                Ok(commit) => {
                    return Ok(PersistedReview {
                        state,
                        version: commit.version,
                        session: commit.session,
                        first_answer: commit.first_answer,
                        replayed: false,
                    });
                }
                Err(StorageError::Conflict) if attempt < MAX_ATTEMPTS => {
                    debug!(
                        user_id = request.user_id.value(),
                        word_id = request.word_id.value(),
                        attempt,
                        "schedule version moved, retrying review"
                    );
                    if let Some(done) = self.replay(&request, progress, reviews).await? {
                        return Ok(done);
                    }
                    if Self::answered_since(&request, expected_version, reviews).await? {
                        return Err(ReviewServiceError::DuplicateAnswer(request.word_id.value()));
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn replay(
        &self,
        request: &ReviewRequest,
        progress: &dyn ProgressRepository,
        reviews: &dyn ReviewPersistence,
    ) -> Result<Option<PersistedReview>, ReviewServiceError> {
        let Some(request_id) = request.request_id.as_deref() else {
            return Ok(None);
        };
        let Some(receipt) = reviews.find_receipt(request.user_id, request_id).await? else {
            return Ok(None);
        };
        Self::check_receipt(&receipt, request)?;

        let version = progress
            .get(request.user_id, request.word_id)
            .await?
            .map_or(0, |r| r.version);
        debug!(
            user_id = request.user_id.value(),
            word_id = request.word_id.value(),
            request_id,
            "replaying stored review"
        );
        Ok(Some(PersistedReview {
            state: receipt.state,
            version,
            session: None,
            first_answer: false,
            replayed: true,
        }))
    }

    /// Whether the same (session, word) answer landed after `read_version`
    /// was read. Retrying would apply the rating twice.
    async fn answered_since(
        request: &ReviewRequest,
        read_version: Option<u64>,
        reviews: &dyn ReviewPersistence,
    ) -> Result<bool, ReviewServiceError> {
        let Some(answer) = &request.answer else {
            return Ok(false);
        };
        let written = reviews
            .answer_version(answer.session_id, request.word_id)
            .await?;
        Ok(written.is_some_and(|v| read_version.is_none_or(|read| v > read)))
    }

    fn check_receipt(
        receipt: &ReviewReceipt,
        request: &ReviewRequest,
    ) -> Result<(), ReviewServiceError> {
        if receipt.word_id == request.word_id {
            Ok(())
        } else {
            Err(ReviewServiceError::RequestIdReused(
                receipt.request_id.clone(),
            ))
        }
    }

    async fn target_of(
        word_id: WordId,
        words: &dyn WordCatalog,
    ) -> Result<StudyTarget, ReviewServiceError> {
        let word = words
            .get_many(&[word_id])
            .await?
            .into_iter()
            .next()
            .ok_or(ReviewServiceError::WordNotFound(word_id.value()))?;
        Ok(StudyTarget::new(word.exam, word.level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{ExamCategory, Level, Word};
    use learn_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    fn repo_with_word(id: u64) -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.insert_words([Word {
            id: WordId::new(id),
            headword: "abandon".into(),
            meaning: "to leave behind".into(),
            exam: ExamCategory::new("TOEIC").unwrap(),
            level: Level::new(1).unwrap(),
        }])
        .unwrap();
        repo
    }

    #[test]
    fn review_bumps_counters() {
        let service = ReviewService::new().with_clock(fixed_clock());
        let fresh = ScheduleState::initial(fixed_now());

        let good = service.review(Rating::new(4).unwrap(), &fresh);
        assert_eq!(good.correct_count(), 1);
        assert_eq!(good.interval_days(), 1);

        let lapse = service.review(Rating::new(1).unwrap(), &good);
        assert_eq!(lapse.incorrect_count(), 1);
        assert_eq!(lapse.repetitions(), 0);
        assert!((lapse.ease_factor() - good.ease_factor()).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn first_review_creates_row() {
        let repo = repo_with_word(7);
        let service = ReviewService::new().with_clock(fixed_clock());
        let request = ReviewRequest::new(UserId::new(1), WordId::new(7), Rating::new(5).unwrap());

        let out = service
            .review_persisted(request.clone(), &repo, &repo, &repo)
            .await
            .unwrap();
        assert_eq!(out.version, 1);
        assert_eq!(out.state.repetitions(), 1);

        let again = service
            .review_persisted(request, &repo, &repo, &repo)
            .await
            .unwrap();
        assert_eq!(again.version, 2);
        assert_eq!(again.state.interval_days(), 6);
    }

    #[tokio::test]
    async fn unknown_word_is_not_found() {
        let repo = InMemoryRepository::new();
        let service = ReviewService::new().with_clock(fixed_clock());
        let err = service
            .review_persisted(
                ReviewRequest::new(UserId::new(1), WordId::new(99), Rating::new(3).unwrap()),
                &repo,
                &repo,
                &repo,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewServiceError::WordNotFound(99)));
    }

    #[tokio::test]
    async fn request_id_replays_stored_state() {
        let repo = repo_with_word(7);
        let service = ReviewService::new().with_clock(fixed_clock());
        let request = ReviewRequest::new(UserId::new(1), WordId::new(7), Rating::new(5).unwrap())
            .with_request_id(Some("req-1".into()));

        let first = service
            .review_persisted(request.clone(), &repo, &repo, &repo)
            .await
            .unwrap();
        let retry = service
            .review_persisted(request, &repo, &repo, &repo)
            .await
            .unwrap();

        assert!(retry.replayed);
        assert_eq!(retry.state, first.state);
        assert_eq!(retry.version, 1);
    }

    #[tokio::test]
    async fn request_id_cannot_cover_another_word() {
        let repo = repo_with_word(7);
        repo.insert_words([Word {
            id: WordId::new(8),
            headword: "abide".into(),
            meaning: "to accept".into(),
            exam: ExamCategory::new("TOEIC").unwrap(),
            level: Level::new(1).unwrap(),
        }])
        .unwrap();
        let service = ReviewService::new().with_clock(fixed_clock());
        let rating = Rating::new(4).unwrap();

        service
            .review_persisted(
                ReviewRequest::new(UserId::new(1), WordId::new(7), rating)
                    .with_request_id(Some("dup".into())),
                &repo,
                &repo,
                &repo,
            )
            .await
            .unwrap();
        let err = service
            .review_persisted(
                ReviewRequest::new(UserId::new(1), WordId::new(8), rating)
                    .with_request_id(Some("dup".into())),
                &repo,
                &repo,
                &repo,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewServiceError::RequestIdReused(_)));
    }

    #[tokio::test]
    async fn blank_request_id_is_rejected() {
        let repo = repo_with_word(7);
        let service = ReviewService::new();
        let err = service
            .review_persisted(
                ReviewRequest::new(UserId::new(1), WordId::new(7), Rating::new(4).unwrap())
                    .with_request_id(Some("  ".into())),
                &repo,
                &repo,
                &repo,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewServiceError::InvalidRequestId { .. }));
    }
}
