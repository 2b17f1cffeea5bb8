//! Ledger writes and valuation for the caller identified by `x-user-id`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use pricepulse::models::{BuyOrder, Id, LedgerTransaction};
use pricepulse::portfolio::PortfolioPosition;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Set by the authenticating proxy in front of the server.
pub const USER_HEADER: &str = "x-user-id";

/// Caller identity taken from [`USER_HEADER`].
#[derive(Debug, Clone)]
pub struct UserId(pub Id);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {USER_HEADER} header")))?;
        Ok(UserId(Id::from_string_checked(raw)?))
    }
}

/// `GET /api/portfolio`
pub async fn positions(
    State(state): State<AppState>,
    UserId(user): UserId,
) -> AppResult<Json<Vec<PortfolioPosition>>> {
    Ok(Json(state.portfolio.positions(&user).await?))
}

/// `POST /api/portfolio/buy`
pub async fn buy(
    State(state): State<AppState>,
    UserId(user): UserId,
    payload: Result<Json<BuyOrder>, JsonRejection>,
) -> AppResult<(StatusCode, Json<LedgerTransaction>)> {
    let Json(order) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let tx = state.portfolio.buy(&user, order).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}
