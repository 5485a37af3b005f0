use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use services::{CatalogConfig, ServiceOptions};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub db_url: String,
    pub catalog_url: Option<String>,
    pub shuffle_sets: bool,
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let db_url = std::env::var("LEARN_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("sqlite:dev.sqlite3".into()), normalize_sqlite_url);

        let catalog_url = std::env::var("WORD_CATALOG_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            host,
            port,
            log_level,
            db_url,
            catalog_url,
            shuffle_sets: env_flag("SHUFFLE_SETS"),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            catalog: self.catalog_url.clone().map(CatalogConfig::new),
            shuffle_sets: self.shuffle_sets,
        }
    }
}

/// Turn relative `sqlite:` paths into absolute `sqlite://` urls.
pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim();
    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file (and its directory) so the pool can open it.
///
/// # Errors
///
/// Returns `std::io::Error` if the url is not a file url or the file cannot
/// be created.
pub fn prepare_sqlite_file(db_url: &str) -> std::io::Result<()> {
    if db_url.starts_with("sqlite::memory:") {
        return Ok(());
    }

    let invalid = || std::io::Error::new(std::io::ErrorKind::InvalidInput, db_url.to_string());
    let path = db_url.strip_prefix("sqlite://").ok_or_else(invalid)?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(invalid());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}
