use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use storage_connector::{
    config, connector, handlers, routes, services::client_factory::ProviderRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting storage-connector with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if cfg.is_filesystem() && !Path::new(&cfg.root).exists() {
        fs::create_dir_all(&cfg.root)?;
        tracing::info!("Created storage directory at {}", cfg.root);
    }

    // --- Initialize data source ---
    let model = cfg.model();
    let connector = connector::initialize(
        cfg.to_storage_options(),
        &ProviderRegistry::new(),
        std::slice::from_ref(&model),
    )?;
    let state = handlers::AppState::new(connector, model);

    // --- Build router ---
    let app: Router = routes::routes::routes(&cfg.model_path)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        "Server listening on http://{}{}",
        listener.local_addr()?,
        cfg.model_path
    );
    axum::serve(listener, app).await?;

    Ok(())
}
