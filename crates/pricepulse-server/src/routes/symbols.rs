use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use pricepulse::models::Symbol;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddSymbol {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct SymbolAdded {
    pub symbol: Symbol,
    pub added: bool,
}

/// `GET /api/symbols`
pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Symbol>>> {
    Ok(Json(state.registry.list().await?))
}

/// `POST /api/symbols`: 201 when newly tracked, 200 when already present.
pub async fn add(
    State(state): State<AppState>,
    payload: Result<Json<AddSymbol>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SymbolAdded>)> {
    let Json(body) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let symbol = Symbol::parse(&body.symbol)?;
    let added = state.registry.add(&symbol).await?;
    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(SymbolAdded { symbol, added })))
}
