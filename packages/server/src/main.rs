use std::net::SocketAddr;
use std::sync::Arc;

use common::storage::FilesystemImageStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::config::AppConfig;
use server::database::init_db;
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    info!(
        max_file_size = config.upload.max_file_size,
        convert_to_webp = config.upload.convert_to_webp,
        storage = %config.storage.root.display(),
        "Configuration loaded"
    );

    let store = FilesystemImageStore::new(config.storage.root.clone()).await?;

    if let Some(parent) = sqlite_parent_dir(&config.database.url) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let db = init_db(&config.database.url).await?;
    info!("Database ready");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let state = AppState::new(config, db, Arc::new(store))?;
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Directory of a file-backed SQLite URL, so it can be created up front.
fn sqlite_parent_dir(url: &str) -> Option<&std::path::Path> {
    let path = url.strip_prefix("sqlite://")?.split('?').next()?;
    std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
}
