#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod logging;
pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
