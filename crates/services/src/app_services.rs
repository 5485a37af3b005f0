use std::sync::Arc;

use storage::Storage;
use storage::repository::WordCatalog;

use crate::Clock;
use crate::catalog_client::{CatalogConfig, HttpWordCatalog};
use crate::error::AppServicesError;
use crate::sessions::{LearningSessionController, SetPlanner};

/// Wiring knobs that do not belong to storage.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    /// Remote word catalog; the local `words` table is used when unset.
    pub catalog: Option<CatalogConfig>,
    /// Shuffle word order inside each set.
    pub shuffle_sets: bool,
}

/// Assembles the services the API layer needs.
#[derive(Clone)]
pub struct AppServices {
    sessions: Arc<LearningSessionController>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// catalog client cannot be built.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        options: ServiceOptions,
    ) -> Result<Self, AppServicesError> {
        let mut storage = Storage::sqlite(db_url).await?;
        if let Some(config) = options.catalog.clone() {
            let base_url = config.base_url.clone();
            let remote = HttpWordCatalog::new(config)
                .map_err(|e| AppServicesError::CatalogUrl(format!("{base_url}: {e}")))?;
            let remote: Arc<dyn WordCatalog> = Arc::new(remote);
            storage = storage.with_catalog(remote);
        }
        Ok(Self::from_storage(storage, clock, &options))
    }

    /// Build services over an already assembled storage, e.g. in-memory for tests.
    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock, options: &ServiceOptions) -> Self {
        let planner = SetPlanner::new().with_shuffle(options.shuffle_sets);
        let sessions = Arc::new(
            LearningSessionController::from_storage(clock, &storage).with_planner(planner),
        );
        Self { sessions }
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<LearningSessionController> {
        Arc::clone(&self.sessions)
    }
}
