//! Client-side mirror of the last known session position.
//!
//! Used when the server cannot be reached: the client keeps studying from
//! the cached position and reconciles once the server answers again. When
//! both sides know a position, the more advanced one wins.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use learn_core::model::{LearningSession, SessionId, SessionPosition, StudyTarget};

/// Cached position of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSession {
    pub session_id: SessionId,
    pub target: StudyTarget,
    pub position: SessionPosition,
    pub updated_at: DateTime<Utc>,
}

/// Where a resume came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// The server answered; `position` already folds in the cached one.
    Server {
        session: LearningSession,
        position: SessionPosition,
        /// The cache was ahead of the server; the client should checkpoint.
        needs_sync: bool,
    },
    /// The server failed; continue from the cache.
    Cached(CachedSession),
    /// No session anywhere.
    Fresh,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSessionCache {
    entries: HashMap<String, CachedSession>,
}

fn key(target: &StudyTarget) -> String {
    target.to_string()
}

impl ClientSessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, target: &StudyTarget) -> Option<&CachedSession> {
        self.entries.get(&key(target))
    }

    /// Mirror a server snapshot.
    pub fn remember(&mut self, session: &LearningSession, now: DateTime<Utc>) {
        self.store(session.id(), session.target(), session.position(), now);
    }

    /// Record a locally observed position; never moves an entry backwards.
    pub fn record_position(
        &mut self,
        session_id: SessionId,
        target: &StudyTarget,
        position: SessionPosition,
        now: DateTime<Utc>,
    ) {
        self.store(session_id, target, position, now);
    }

    pub fn forget(&mut self, target: &StudyTarget) {
        self.entries.remove(&key(target));
    }

    fn store(
        &mut self,
        session_id: SessionId,
        target: &StudyTarget,
        position: SessionPosition,
        now: DateTime<Utc>,
    ) {
        let position = match self.get(target) {
            Some(entry) if entry.session_id == session_id => entry.position.max(position),
            _ => position,
        };
        self.entries.insert(
            key(target),
            CachedSession {
                session_id,
                target: target.clone(),
                position,
                updated_at: now,
            },
        );
    }

    /// Combine a server lookup with the cache.
    ///
    /// A server error falls back to the cached entry; without one the error
    /// is returned. A server session with a different id than the cached one
    /// replaces the entry (the session was restarted elsewhere).
    ///
    /// # Errors
    ///
    /// Returns the server error when there is nothing cached for `target`.
    pub fn resolve<E>(
        &mut self,
        target: &StudyTarget,
        server: Result<Option<LearningSession>, E>,
        now: DateTime<Utc>,
    ) -> Result<Resume, E> {
        match server {
            Ok(Some(session)) => {
                let cached = self
                    .get(target)
                    .filter(|c| c.session_id == session.id() && !session.is_completed())
                    .map(|c| c.position);
                let position = SessionPosition::reconcile(Some(session.position()), cached)
                    .unwrap_or_else(|| session.position());
                let needs_sync = position > session.position();

                if self.get(target).is_some_and(|c| c.session_id != session.id()) {
                    self.forget(target);
                }
                self.store(session.id(), target, position, now);

                Ok(Resume::Server {
                    session,
                    position,
                    needs_sync,
                })
            }
            Ok(None) => {
                self.forget(target);
                Ok(Resume::Fresh)
            }
            Err(err) => match self.get(target) {
                Some(entry) => Ok(Resume::Cached(entry.clone())),
                None => Err(err),
            },
        }
    }

    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// # Errors
    ///
    /// Returns `serde_json::Error` for malformed input.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
