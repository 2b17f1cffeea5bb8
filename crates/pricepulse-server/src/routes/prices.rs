//! Publish endpoint and price read paths.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use pricepulse::market_data::{LatestPrice, PriceHistory, PriceSubmission};
use pricepulse::models::Symbol;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// `POST /api/prices`: validate and enqueue. Nothing is persisted yet when
/// this answers.
pub async fn publish(
    State(state): State<AppState>,
    payload: Result<Json<PriceSubmission>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let Json(submission) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let event = submission.into_event(state.clock.now())?;
    debug!(symbol = %event.symbol, price = %event.price, "price submission accepted");
    state.channel.publish(event).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))))
}

/// `GET /api/prices/{symbol}`
pub async fn latest(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> AppResult<Json<LatestPrice>> {
    let symbol = Symbol::parse(&symbol)?;
    state
        .prices
        .latest_price(&symbol)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No price data for {symbol}")))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub hours: Option<u32>,
}

/// `GET /api/prices/history/{symbol}?hours=24`
pub async fn history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<PriceHistory>> {
    let symbol = Symbol::parse(&symbol)?;
    let hours = params.hours.unwrap_or(state.default_history_hours);
    Ok(Json(state.prices.history_for_window(&symbol, hours).await?))
}
