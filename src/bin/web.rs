//! Trackbot HTTP 服务
//!
//! 启动: cargo run --bin trackbot-web --features web
//! 对话: curl -X POST http://127.0.0.1:8080/chat -H 'content-type: application/json' \
//!         -d '{"user_id":"alice","message":"list my projects"}'

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use trackbot::agent::create_agent;
use trackbot::config::{load_config, AppConfig};
use trackbot::integrations::web::create_router;
use trackbot::observability;

/// 检查点过期清理间隔
const CLEANUP_INTERVAL_SECS: u64 = 600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    let agent = Arc::new(create_agent(&cfg).await.context("Failed to create agent")?);

    let store = agent.store();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.cleanup_expired().await;
            if removed > 0 {
                tracing::info!(removed, "Expired checkpoints removed");
            }
        }
    });

    let app = create_router(agent);

    let port = std::env::var("TRACKBOT_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.web.port);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("{} listening on http://{}", cfg.app.display_name(), addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}
