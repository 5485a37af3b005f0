use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use learn_core::model::{LearningSession, Word, WordId};
use storage::repository::{StorageError, WordCatalog};

/// Picks the words of one set of a session.
///
/// Sets are stable catalog pages. With shuffling on, the order inside a set
/// is permuted by an RNG seeded from the session seed and the set index, so
/// the same session always sees the same order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetPlanner {
    shuffle: bool,
}

impl SetPlanner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the seeded in-set shuffle.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub fn shuffles(&self) -> bool {
        self.shuffle
    }

    /// Words of `set` for `session`; empty past the last set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    pub async fn words_for_set(
        &self,
        catalog: &dyn WordCatalog,
        session: &LearningSession,
        set: u32,
    ) -> Result<Vec<Word>, StorageError> {
        let layout = session.layout();
        let len = layout.set_len(set);
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut words = catalog
            .page(session.target(), layout.offset(set), len)
            .await?;
        self.order(&mut words, session.seed(), set);
        Ok(words)
    }

    fn order(&self, words: &mut [Word], seed: u64, set: u32) {
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(seed ^ u64::from(set));
            words.shuffle(&mut rng);
        }
    }
}

/// Chunk a word list into consecutive sets of `set_size`; the last may be short.
#[must_use]
pub fn split_into_sets(words: Vec<Word>, set_size: u32) -> Vec<Vec<Word>> {
    let size = usize::try_from(set_size.max(1)).unwrap_or(usize::MAX);
    let mut sets = Vec::with_capacity(words.len().div_ceil(size));
    let mut iter = words.into_iter().peekable();
    while iter.peek().is_some() {
        sets.push(iter.by_ref().take(size).collect());
    }
    sets
}

/// Position of `word_id` inside `words`, if present.
#[must_use]
pub fn position_in_set(words: &[Word], word_id: WordId) -> Option<u32> {
    words
        .iter()
        .position(|w| w.id == word_id)
        .and_then(|i| u32::try_from(i).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{ExamCategory, Level, SessionId, SetLayout, StudyTarget, UserId};
    use learn_core::time::fixed_now;
    use std::collections::HashSet;
    use storage::repository::InMemoryRepository;

    fn word(id: u64) -> Word {
        Word {
            id: WordId::new(id),
            headword: format!("w{id}"),
            meaning: format!("m{id}"),
            exam: ExamCategory::new("TOEIC").unwrap(),
            level: Level::new(1).unwrap(),
        }
    }

    fn session(total: u32, seed: u64) -> LearningSession {
        LearningSession::start(
            SessionId::new_random(),
            UserId::new(1),
            StudyTarget::parse("TOEIC", 1).unwrap(),
            SetLayout::standard(total),
            seed,
            fixed_now(),
        )
        .unwrap()
    }

    fn catalog(total: u64) -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.insert_words((1..=total).map(word)).unwrap();
        repo
    }

    #[tokio::test]
    async fn sets_cover_catalog_without_overlap() {
        let repo = catalog(45);
        let session = session(45, 3);
        let planner = SetPlanner::new();

        let mut seen = HashSet::new();
        let mut lens = Vec::new();
        for set in 0..session.total_sets() {
            let words = planner.words_for_set(&repo, &session, set).await.unwrap();
            lens.push(words.len());
            for w in words {
                assert!(seen.insert(w.id));
            }
        }
        assert_eq!(lens, vec![20, 20, 5]);
        assert_eq!(seen.len(), 45);
        assert!(planner.words_for_set(&repo, &session, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shuffle_is_stable_per_session() {
        let repo = catalog(20);
        let planner = SetPlanner::new().with_shuffle(true);
        let a = session(20, 42);

        let first = planner.words_for_set(&repo, &a, 0).await.unwrap();
        let second = planner.words_for_set(&repo, &a, 0).await.unwrap();
        assert_eq!(first, second);

        let ids: HashSet<WordId> = first.iter().map(|w| w.id).collect();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn split_keeps_short_tail() {
        let sets = split_into_sets((1..=7).map(word).collect(), 3);
        let lens: Vec<usize> = sets.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![3, 3, 1]);
        assert!(split_into_sets(Vec::new(), 3).is_empty());
    }

    #[test]
    fn position_in_set_finds_word() {
        let words: Vec<Word> = (10..15).map(word).collect();
        assert_eq!(position_in_set(&words, WordId::new(12)), Some(2));
        assert_eq!(position_in_set(&words, WordId::new(99)), None);
    }
}
