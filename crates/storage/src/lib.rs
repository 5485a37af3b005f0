pub mod repository;
pub mod sqlite;

pub use repository::{Storage, StorageError};
