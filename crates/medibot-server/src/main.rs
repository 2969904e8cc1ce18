use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;

use medibot_server::config::Settings;
use medibot_server::server::{build_router, build_state, log_startup, spawn_retrieval_init};
use medibot_server::utils::logger::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;

    // Must outlive the server so buffered file logs are flushed
    let _log_guard = init_logger(&settings.logging)?;

    info!("🚀 Starting medical chatbot server...");
    log_startup(&settings);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = build_state(settings).await?;
    info!("✅ Services initialized");

    spawn_retrieval_init(&state);

    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
