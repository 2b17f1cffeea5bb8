//! Router assembly.

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes::{market, portfolio, prices, symbols, ws};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/api/prices", post(prices::publish))
        .route("/api/prices/{symbol}", get(prices::latest))
        .route("/api/prices/history/{symbol}", get(prices::history))
        .route("/api/symbols", get(symbols::list).post(symbols::add))
        .route("/api/market/search", get(market::search))
        .route("/api/portfolio", get(portfolio::positions))
        .route("/api/portfolio/buy", post(portfolio::buy))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
