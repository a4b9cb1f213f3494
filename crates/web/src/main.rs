use std::{process, sync::Arc};

use backend::{BackendClient, BackendConfig};
use realtime::RealtimeHub;
use tracking::config::TrackingConfig;
use web::{sessions::Sessions, start_web_server, WebConfig, WebState};

#[tokio::main]
async fn main() {
    env_logger::init();

    // backend
    let Some(backend_config) = BackendConfig::from_env() else {
        log::error!("expected BACKEND_URL in env.");
        process::exit(1);
    };
    let backend = BackendClient::new(backend_config);
    log::info!("fetching deliveries from {}", backend.config().base_url);

    // tracking
    let hub = RealtimeHub::default();
    let sessions = Sessions::new(Arc::new(backend), hub.clone(), TrackingConfig::from_env());

    // web server
    let web_future = start_web_server(WebState { sessions, hub }, WebConfig::from_env());

    if let Err(why) = web_future.await {
        log::error!("web server failed: {}", why);
        process::exit(1);
    }
}
