pub use crate::common::RouteResult;

use std::env;

use axum::{extract::FromRef, routing::get_service, Router};
use realtime::RealtimeHub;
use sessions::Sessions;
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};

pub mod api;
pub mod common;
pub mod hateoas;
pub mod middleware;
pub mod sessions;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind_address: String,
    /// Pages embedding the map, served next to the api.
    pub static_dir: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_owned(),
            static_dir: "./resources/www/".to_owned(),
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env::var("WEB_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            static_dir: env::var("WEB_STATIC_DIR").unwrap_or(defaults.static_dir),
        }
    }
}

#[derive(Clone, FromRef)]
pub struct WebState {
    pub sessions: Sessions,
    pub hub: RealtimeHub,
}

pub fn app(state: WebState, config: &WebConfig) -> Router {
    Router::new()
        .nest_service("/api", api::routes(state))
        .fallback_service(static_content_router(&config.static_dir))
}

pub async fn start_web_server(state: WebState, config: WebConfig) -> std::io::Result<()> {
    let routes = app(state, &config);

    let listener = TcpListener::bind(&config.bind_address).await?;
    log::info!("listening on {}", config.bind_address);
    axum::serve(listener, routes.into_make_service()).await?;

    Ok(())
}

fn static_content_router(static_dir: &str) -> Router {
    Router::new().nest_service(
        "/",
        get_service(
            ServeDir::new(static_dir)
                .not_found_service(ServeFile::new(format!(
                    "{}/error404.html",
                    static_dir.trim_end_matches('/')
                ))),
        ),
    )
}
