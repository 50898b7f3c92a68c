use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;

use rag_chat_server::config::Settings;
use rag_chat_server::logging::init_logger;
use rag_chat_server::{build_router, build_state};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    init_logger(&settings.logging)?;

    info!("Starting RAG chat server...");

    let state = build_state(&settings)?;
    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
