//! Distore
//!
//! Serves stored files over HTTP and runs one-shot upload, download, delete
//! and list commands against the same stores.
//!
//! ```text
//! distore [serve]
//! distore upload <local-file> [dir]
//! distore download <id-or-/path> <dest>
//! distore delete <id>
//! distore list [dir]
//! distore keygen
//! ```

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{bail, Context};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use distore::crypto::EncryptionKey;
use distore::metadata::FileQuery;
use distore::transfer::LoggingObserver;
use distore::util::{format_duration, format_size};
use distore::{routes, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "distore=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("serve");

    if command == "keygen" {
        println!("{}", EncryptionKey::generate().to_hex());
        return Ok(());
    }

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("failed to load configuration")?;
    let state = AppState::from_config(&config)?;

    match (command, &args[1.min(args.len())..]) {
        ("serve", []) => serve(config, state).await,
        ("upload", [local]) => upload(&state, local, "").await,
        ("upload", [local, dir]) => upload(&state, local, dir).await,
        ("download", [file, dest]) => download(&state, file, dest).await,
        ("delete", [id]) => {
            state.manager().delete_file(id).await?;
            tracing::info!("Deleted {}", id);
            Ok(())
        }
        ("list", []) => list(&state, None).await,
        ("list", [dir]) => list(&state, Some(dir.as_str())).await,
        _ => bail!("unrecognised command line: {}", args.join(" ")),
    }
}

async fn serve(config: Config, state: AppState) -> anyhow::Result<()> {
    tracing::info!("Starting Distore v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Chunk size {}, parallelism {}/{}",
        format_size(config.transfer.chunk_size),
        config.transfer.upload_parallelism,
        config.transfer.download_parallelism
    );

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Distore listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn upload(state: &AppState, local: &str, dir: &str) -> anyhow::Result<()> {
    let started = std::time::Instant::now();
    let observer = LoggingObserver::new(local);
    let file = state
        .manager()
        .upload_file(Path::new(local), dir, &observer)
        .await?;

    println!("{}\t{}", file.id, file.virtual_path());
    tracing::info!(
        "Uploaded {} ({}) in {}",
        file.virtual_path(),
        format_size(file.size),
        format_duration(started.elapsed())
    );
    Ok(())
}

async fn download(state: &AppState, id_or_path: &str, dest: &str) -> anyhow::Result<()> {
    let started = std::time::Instant::now();
    let manager = state.manager();
    let file = manager.find_file(id_or_path).await?;

    let observer = LoggingObserver::new(file.virtual_path());
    manager
        .download_file(&file.id, Path::new(dest), &observer)
        .await?;

    tracing::info!(
        "Downloaded {} to {} in {}",
        file.virtual_path(),
        dest,
        format_duration(started.elapsed())
    );
    Ok(())
}

async fn list(state: &AppState, dir: Option<&str>) -> anyhow::Result<()> {
    let mut query = FileQuery::new();
    if let Some(dir) = dir {
        query = query.with_dir(distore::util::normalize_dir(dir));
    }

    let mut files = state.manager().list_files(&query).await?;
    files.sort_by_key(|f| f.virtual_path());
    for file in files {
        println!("{}\t{:>10}\t{}", file.id, format_size(file.size), file.virtual_path());
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
