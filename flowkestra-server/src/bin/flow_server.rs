//! # Flow Server
//!
//! Serves `POST /flow/execute` and `GET /flow/callback` for the applications
//! listed in `FLOWKESTRA_APPS_FILE`.
//!
//! ```text
//! FLOWKESTRA_APPS_FILE=apps.json FLOWKESTRA_JWT_SECRET=change-me \
//!     RUST_LOG=info cargo run -p flowkestra-server --bin flow_server
//! ```

use flowkestra_axum::{FlowkestraAxumExt, FlowkestraState};
use flowkestra_flow::spawn_expiry_sweeper;
use flowkestra_server::{build_engine, AppsFile, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env()?;
    let apps = match &config.apps_file {
        Some(path) => AppsFile::load(path)?,
        None => {
            log::warn!("FLOWKESTRA_APPS_FILE is not set; no application can start a flow");
            AppsFile::default()
        }
    };
    log::info!(
        "Loaded {} application(s) and {} flow(s)",
        apps.applications.len(),
        apps.flows.len()
    );

    let engine = build_engine(&config, apps);
    let sweeper = spawn_expiry_sweeper(engine.store(), config.sweep_interval);

    let app = engine
        .axum_router()
        .with_state(FlowkestraState::from(engine));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    log::info!("Flow server listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    sweeper.abort();
    Ok(())
}
