#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog_client;
pub mod client_cache;
pub mod error;
pub mod review_service;
pub mod sessions;

pub use learn_core::Clock;

pub use app_services::{AppServices, ServiceOptions};
pub use catalog_client::{CatalogConfig, HttpWordCatalog};
pub use client_cache::{CachedSession, ClientSessionCache, Resume};
pub use error::{AppServicesError, ErrorKind, ReviewServiceError, SessionError};
pub use review_service::{PersistedReview, ReviewRequest, ReviewService};

pub use sessions::{
    AnswerInput, AnswerOutcome, CompletedSet, LearningSessionController, ProgressOutcome,
    ProgressUpdate, SessionProgress, SetPlanner, StartedSession, StudyMode, StudyPass,
};
