use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kolam_gateway::{
    app,
    config::Config,
    database::{PgMetadataStore, init_db},
    generator::PatternGenerator,
    proxy,
    state::AppState,
    storage::{CloudinaryStorage, LocalDiskStore, ObjectStorage},
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    // No partial startup without the metadata store
    let pool = init_db(&config)
        .await
        .context("Failed to connect to db")?;

    let object_storage: Option<Arc<dyn ObjectStorage>> = match &config.cloudinary {
        Some(credentials) => {
            info!("Cloudinary configured (cloud name: {}); uploads will use Cloudinary", credentials.cloud_name);
            let storage: Arc<dyn ObjectStorage> =
                Arc::new(CloudinaryStorage::new(credentials.clone(), &config.cloudinary_api_base)?);
            Some(storage)
        }
        None => {
            warn!("Cloudinary not configured; generated uploads will fail until configured");
            None
        }
    };

    let generator = PatternGenerator::new(&config.ml_service_url)?;
    info!("Pattern generator at {}", generator.base_url());

    let app_state = AppState {
        metadata: Arc::new(PgMetadataStore::new(pool.clone())),
        object_storage,
        generator,
        local: LocalDiskStore::new(&config.storage_dir),
        http: proxy::client_builder(config.proxy_allowed_hosts.clone()).build()?,
        config: Arc::new(config.clone()),
    };

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    pool.close().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
