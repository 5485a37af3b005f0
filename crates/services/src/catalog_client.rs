use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use learn_core::model::{StudyTarget, Word, WordId};
use storage::repository::{StorageError, WordCatalog};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
enum CatalogError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("catalog returned HTTP {0}")]
    HttpStatus(reqwest::StatusCode),
}

impl From<CatalogError> for StorageError {
    fn from(err: CatalogError) -> Self {
        StorageError::Connection(err.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl CatalogConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// `WORD_CATALOG_URL`, when set and non-empty.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("WORD_CATALOG_URL").ok()?;
        if base_url.trim().is_empty() {
            return None;
        }
        Some(Self::new(base_url))
    }
}

/// Word catalog served by a remote HTTP service.
///
/// Endpoints, relative to the base url:
/// - `GET words/count?exam&level` -> `{"count": n}`
/// - `GET words?exam&level&offset&limit` -> `[Word]` in stable order
/// - `POST words/batch {"ids": [..]}` -> `[Word]`
#[derive(Clone)]
pub struct HttpWordCatalog {
    client: Client,
    config: CatalogConfig,
}

impl HttpWordCatalog {
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be built.
    pub fn new(config: CatalogConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CatalogError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u32,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    ids: &'a [WordId],
}

#[async_trait]
impl WordCatalog for HttpWordCatalog {
    async fn count(&self, target: &StudyTarget) -> Result<u32, StorageError> {
        let request = self.client.get(self.url("words/count")).query(&[
            ("exam", target.exam.as_str().to_owned()),
            ("level", target.level.to_string()),
        ]);
        let body: CountResponse = self.fetch(request).await?;
        Ok(body.count)
    }

    async fn page(
        &self,
        target: &StudyTarget,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Word>, StorageError> {
        let request = self.client.get(self.url("words")).query(&[
            ("exam", target.exam.as_str().to_owned()),
            ("level", target.level.to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ]);
        Ok(self.fetch(request).await?)
    }

    async fn get_many(&self, ids: &[WordId]) -> Result<Vec<Word>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .client
            .post(self.url("words/batch"))
            .json(&BatchRequest { ids });
        let words: Vec<Word> = self.fetch(request).await?;

        // Keep input order; the service may return any order.
        let mut ordered = Vec::with_capacity(words.len());
        for id in ids {
            if let Some(word) = words.iter().find(|w| w.id == *id) {
                ordered.push(word.clone());
            }
        }
        Ok(ordered)
    }
}
