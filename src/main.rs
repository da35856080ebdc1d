use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

mod auth;
mod config;
mod deck;
mod game;
mod http;
mod room;
mod telemetry;
mod ws;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::deck::InMemoryDeckRepository;
use crate::http::routes::{self, AppState};
use crate::room::registry::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let config = Config::from_env();

    let state = AppState {
        registry: Arc::new(Registry::new()),
        decks: Arc::new(InMemoryDeckRepository::with_demo_decks()),
        auth: Authenticator::from_secret(config.jwt_secret.as_deref()),
    };

    // The token issuer lives in the account service; mint tokens for the
    // two fixture users so the demo store is playable standalone.
    for (user_id, email) in [(1, "ash@demo.local"), (2, "gary@demo.local")] {
        let token = state.auth.issue(user_id, email)?;
        info!(user_id, %token, "demo session token");
    }

    let app = Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/ws", get(ws::connection::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if config.test_mode {
        info!("test mode, network listener suppressed");
        return Ok(());
    }

    let addr = config.server_addr();
    info!(%addr, "listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
