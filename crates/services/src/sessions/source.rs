use chrono::{DateTime, Utc};
use serde::Deserialize;

use learn_core::model::{SET_SIZE, StudyTarget, UserId, Word};
use storage::repository::{ProgressFilter, ProgressRepository, StorageError, WordCatalog};

/// Upper bound on words snapshotted by a stateless pass.
pub const MAX_PASS_WORDS: u32 = 100;

/// Where the words of a study pass come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum StudyMode {
    /// The persisted multi-set session for one exam and level.
    Catalog { target: StudyTarget },
    /// Words due for review, optionally narrowed to one exam and level.
    Review { target: Option<StudyTarget> },
    /// Words with lapses, worst first.
    Weak { target: Option<StudyTarget> },
    /// The first set of a catalog, without any persistence.
    Demo { target: StudyTarget },
}

impl StudyMode {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            StudyMode::Catalog { .. } => "catalog",
            StudyMode::Review { .. } => "review",
            StudyMode::Weak { .. } => "weak",
            StudyMode::Demo { .. } => "demo",
        }
    }
}

/// Snapshots the word list of a stateless pass.
pub struct WordSource<'a> {
    progress: &'a dyn ProgressRepository,
    words: &'a dyn WordCatalog,
}

impl<'a> WordSource<'a> {
    #[must_use]
    pub fn new(progress: &'a dyn ProgressRepository, words: &'a dyn WordCatalog) -> Self {
        Self { progress, words }
    }

    /// Words for `mode`, in study order.
    ///
    /// `Catalog` yields its first page only; the controller owns the
    /// persisted walk through the rest.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if progress or the catalog cannot be read.
    pub async fn collect(
        &self,
        user_id: UserId,
        mode: &StudyMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<Word>, StorageError> {
        match mode {
            StudyMode::Review { target } => {
                let ids = self
                    .progress
                    .find_due(user_id, &Self::filter(target.as_ref()), now)
                    .await?;
                self.words.get_many(&ids).await
            }
            StudyMode::Weak { target } => {
                let ids = self
                    .progress
                    .find_weak(user_id, &Self::filter(target.as_ref()))
                    .await?;
                self.words.get_many(&ids).await
            }
            StudyMode::Catalog { target } | StudyMode::Demo { target } => {
                self.words.page(target, 0, SET_SIZE).await
            }
        }
    }

    fn filter(target: Option<&StudyTarget>) -> ProgressFilter {
        ProgressFilter {
            target: target.cloned(),
            limit: None,
        }
        .with_limit(MAX_PASS_WORDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{ExamCategory, Level, Rating, ScheduleState, WordId};
    use learn_core::scheduler;
    use learn_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, ScheduleRecord};

    fn target() -> StudyTarget {
        StudyTarget::parse("TOEIC", 1).unwrap()
    }

    fn seeded() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.insert_words((1..=30).map(|id| Word {
            id: WordId::new(id),
            headword: format!("w{id}"),
            meaning: format!("m{id}"),
            exam: ExamCategory::new("TOEIC").unwrap(),
            level: Level::new(1).unwrap(),
        }))
        .unwrap();
        repo
    }

    async fn lapse(repo: &InMemoryRepository, word: u64, lapses: u32) {
        let now = fixed_now();
        let mut state = ScheduleState::initial(now);
        for _ in 0..lapses {
            let rating = Rating::from_recall(false);
            state = scheduler::update(rating, &state, now);
            state.record_result(rating);
        }
        repo.upsert(
            &ScheduleRecord {
                user_id: UserId::new(1),
                word_id: WordId::new(word),
                target: target(),
                state,
                version: 0,
                updated_at: now,
            },
            None,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn weak_mode_orders_by_lapses() {
        let repo = seeded();
        lapse(&repo, 4, 1).await;
        lapse(&repo, 9, 3).await;

        let source = WordSource::new(&repo, &repo);
        let words = source
            .collect(UserId::new(1), &StudyMode::Weak { target: None }, fixed_now())
            .await
            .unwrap();
        let ids: Vec<u64> = words.iter().map(|w| w.id.value()).collect();
        assert_eq!(ids, vec![9, 4]);
    }

    #[tokio::test]
    async fn demo_mode_takes_first_set() {
        let repo = seeded();
        let source = WordSource::new(&repo, &repo);
        let words = source
            .collect(UserId::new(1), &StudyMode::Demo { target: target() }, fixed_now())
            .await
            .unwrap();
        assert_eq!(words.len(), SET_SIZE as usize);
        assert_eq!(words[0].id, WordId::new(1));
    }

    #[test]
    fn mode_uses_tagged_json() {
        let mode: StudyMode = serde_json::from_str(r#"{"mode":"review"}"#).unwrap();
        assert_eq!(mode, StudyMode::Review { target: None });

        let mode: StudyMode =
            serde_json::from_str(r#"{"mode":"demo","target":{"exam":"toeic","level":1}}"#)
                .unwrap();
        assert_eq!(mode, StudyMode::Demo { target: target() });
        assert_eq!(mode.name(), "demo");

        let missing = serde_json::from_str::<StudyMode>(r#"{"mode":"catalog"}"#);
        assert!(missing.is_err());
        let bad_level = serde_json::from_str::<StudyMode>(
            r#"{"mode":"weak","target":{"exam":"TOEIC","level":11}}"#,
        );
        assert!(bad_level.is_err());
        let unknown = serde_json::from_str::<StudyMode>(r#"{"mode":"cram"}"#);
        assert!(unknown.is_err());
    }
}
