use axum::extract::{Query, State};
use axum::Json;
use pricepulse::market_data::providers::binance::DEFAULT_SEARCH_LIMIT;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

/// `GET /api/market/search?query=`: symbols the provider can quote.
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Vec<String>>> {
    if params.query.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".to_string()));
    }
    let found = state
        .market
        .search_symbols(&params.query, DEFAULT_SEARCH_LIMIT)
        .await?;
    Ok(Json(found))
}
