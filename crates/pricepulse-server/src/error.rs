//! Maps pipeline errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pricepulse::market_data::SubmissionError;
use pricepulse::models::{IdError, SymbolError};
use pricepulse::portfolio::PortfolioError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// Well-formed request the domain refuses, e.g. a buy with no resolvable price.
    #[error("{0}")]
    Unprocessable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                error!(error = %format!("{e:#}"), "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = axum::Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<SymbolError> for AppError {
    fn from(e: SymbolError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<IdError> for AppError {
    fn from(e: IdError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<SubmissionError> for AppError {
    fn from(e: SubmissionError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<PortfolioError> for AppError {
    fn from(e: PortfolioError) -> Self {
        match e {
            PortfolioError::InvalidAmount
            | PortfolioError::InvalidPrice
            | PortfolioError::OrderTooLarge { .. } => AppError::BadRequest(e.to_string()),
            PortfolioError::MissingUser => AppError::Unauthorized(e.to_string()),
            PortfolioError::NoPriceData { .. } | PortfolioError::Valuation(_) => {
                AppError::Unprocessable(e.to_string())
            }
            PortfolioError::Storage(inner) => AppError::Internal(inner),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pricepulse::models::Symbol;
    use pricepulse::portfolio::ValueOverflow;

    #[test]
    fn portfolio_errors_map_to_statuses() {
        let no_price = PortfolioError::NoPriceData {
            symbol: Symbol::parse("BTC").unwrap(),
        };
        assert_eq!(AppError::from(no_price).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            AppError::from(PortfolioError::InvalidAmount).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(PortfolioError::MissingUser).status(),
            StatusCode::UNAUTHORIZED
        );
        let too_large = PortfolioError::OrderTooLarge {
            symbol: Symbol::parse("BTC").unwrap(),
        };
        assert_eq!(AppError::from(too_large).status(), StatusCode::BAD_REQUEST);
        let overflow = PortfolioError::Valuation(ValueOverflow {
            symbol: Symbol::parse("BTC").unwrap(),
        });
        assert_eq!(AppError::from(overflow).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            AppError::from(PortfolioError::Storage(anyhow::anyhow!("disk full"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let response = AppError::Internal(anyhow::anyhow!("secret path /var/db")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
