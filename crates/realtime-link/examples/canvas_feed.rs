//! Canvas Feed Example
//!
//! Follows file notifications for one canvas while a session cookie is
//! present.
//!
//! Run with:
//!
//! ```text
//! PAGE_URL=http://localhost:3000/canvas/3 COOKIE="SESSION=abc" CANVAS_ID=3 \
//!     RUST_LOG=realtime_link=debug cargo run -p realtime-link --example canvas_feed
//! ```

use std::{env, sync::Arc, time::Duration};

use realtime_link::{
    auth::{CookieJar, SessionMarkerSignal},
    websocket::{LinkConfig, RealtimeClient},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let page_url = env::var("PAGE_URL").unwrap_or_else(|_| "http://localhost:3000/".to_string());
    let cookie = env::var("COOKIE").unwrap_or_default();
    let canvas_id = env::var("CANVAS_ID").unwrap_or_else(|_| "1".to_string());
    let run_for = env::var("RUN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(60));

    let jar = Arc::new(CookieJar::from_header(&cookie));
    let config = LinkConfig::for_page(&page_url)?.auth_poll_interval(Duration::from_secs(1));
    info!(url = %config.url, "Using realtime endpoint");

    let client = RealtimeClient::builder(config, SessionMarkerSignal::new(Arc::clone(&jar))).start()?;

    let _listener = client.on_message(|payload| {
        match (payload.field("fileId"), payload.field("fileName")) {
            (Some(id), Some(name)) => info!(%id, %name, "File added to canvas"),
            _ => info!(?payload, "Notification"),
        }
    });

    let mut status = client.watch_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            info!(status = %current, "Connection status");
        }
    });

    client.subscribe(canvas_id.as_str());
    tokio::time::sleep(run_for).await;

    client.unsubscribe(canvas_id.as_str());
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.stop();
    Ok(())
}
