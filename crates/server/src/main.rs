use std::fmt;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use server::config::{self, Config};
use server::logging::init_tracing;
use server::{AppState, router};
use services::{AppServices, Clock};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidPort { raw: String },
    InvalidCatalogUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidPort { raw } => write!(f, "invalid --port value: {raw}"),
            ArgsError::InvalidCatalogUrl { raw } => {
                write!(f, "invalid --catalog-url value: {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p server -- [--db <sqlite_url>] [--port <port>] [--catalog-url <url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!("  --port 3000");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  HOST, PORT, RUST_LOG, LEARN_DB_URL, WORD_CATALOG_URL, SHUFFLE_SETS,");
    eprintln!("  ENABLE_FILE_LOGS, LOG_DIR");
}

/// Flags override whatever the environment set.
fn apply_args(
    mut config: Config,
    args: &mut impl Iterator<Item = String>,
) -> Result<Config, ArgsError> {
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => {
                let value = require_value(args, "--db")?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidDbUrl { raw: value });
                }
                config.db_url = config::normalize_sqlite_url(value);
            }
            "--port" => {
                let value = require_value(args, "--port")?;
                config.port = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidPort { raw: value.clone() })?;
            }
            "--catalog-url" => {
                let value = require_value(args, "--catalog-url")?;
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    return Err(ArgsError::InvalidCatalogUrl { raw: value });
                }
                config.catalog_url = Some(value);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }
    Ok(config)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let config = apply_args(Config::from_env(), &mut std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let _log_guard = init_tracing(&config.log_level);

    config::prepare_sqlite_file(&config.db_url)?;
    let services =
        AppServices::new_sqlite(&config.db_url, Clock::default(), config.service_options())
            .await?;

    let app = router(AppState::new(services))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        db = %config.db_url,
        remote_catalog = config.catalog_url.is_some(),
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
