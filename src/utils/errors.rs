// src/utils/errors.rs

use std::{error::Error, fmt};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use crate::utils::types::ApiResponse;

/// Errors coming from external API calls (HTTP, JSON).
#[derive(Debug)]
pub enum ApiError {
    Http(reqwest::Error),
    Json(serde_json::Error),
    Status(reqwest::StatusCode),
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http(e) if e.is_timeout() => write!(f, "HTTP timeout: {}", e),
            ApiError::Http(e)    => write!(f, "HTTP error: {}", e),
            ApiError::Json(e)    => write!(f, "JSON error: {}", e),
            ApiError::Status(s)  => write!(f, "HTTP status {}", s),
            ApiError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiError::Http(e) => Some(e),
            ApiError::Json(e) => Some(e),
            ApiError::Status(_) | ApiError::Other(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self { ApiError::Http(err) }
}
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self { ApiError::Json(err) }
}

/// Failures of a price-series fetch, live or simulated.
#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    /// Unknown coin id, or the upstream had no usable prices for it.
    #[error("invalid coin '{0}'")]
    InvalidCoin(String),
    /// Network error, timeout, 5xx or an unreadable payload.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// HTTP 429 from the upstream.
    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<u64> },
}

impl MarketDataError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketDataError::InvalidCoin(_) => "invalid_coin",
            MarketDataError::UpstreamUnavailable(_) => "upstream_unavailable",
            MarketDataError::RateLimited { .. } => "rate_limited",
        }
    }
}

impl From<ApiError> for MarketDataError {
    fn from(err: ApiError) -> Self {
        MarketDataError::UpstreamUnavailable(err.to_string())
    }
}

/// Outcome of a single provider → indicators → decision pass that did not
/// produce a decision.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    MarketData(#[from] MarketDataError),
    #[error("No price data available")]
    NoData,
}

impl EvaluationError {
    pub fn kind(&self) -> &'static str {
        match self {
            EvaluationError::MarketData(e) => e.kind(),
            EvaluationError::NoData => "no_data",
        }
    }
}

/// Errors at the paper-trading ledger level.
#[derive(Debug, thiserror::Error)]
pub enum TradeError {
    #[error(transparent)]
    MarketData(#[from] MarketDataError),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Not enough {coin} to sell")]
    InsufficientHoldings { coin: String },
}

// ─── HTTP mapping ─────────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: String) -> HttpResponse {
    HttpResponse::build(status).json(ApiResponse::<()>::err(msg))
}

impl ResponseError for MarketDataError {
    fn status_code(&self) -> StatusCode {
        match self {
            MarketDataError::InvalidCoin(_) => StatusCode::NOT_FOUND,
            MarketDataError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MarketDataError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut resp = json_error(self.status_code(), self.to_string());
        if let MarketDataError::RateLimited { retry_after: Some(secs) } = self {
            resp.headers_mut().insert(
                actix_web::http::header::RETRY_AFTER,
                actix_web::http::header::HeaderValue::from(*secs),
            );
        }
        resp
    }
}

impl ResponseError for EvaluationError {
    fn status_code(&self) -> StatusCode {
        match self {
            EvaluationError::MarketData(e) => e.status_code(),
            EvaluationError::NoData => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            EvaluationError::MarketData(e) => e.error_response(),
            EvaluationError::NoData => json_error(self.status_code(), self.to_string()),
        }
    }
}

impl ResponseError for TradeError {
    fn status_code(&self) -> StatusCode {
        match self {
            TradeError::MarketData(e) => e.status_code(),
            TradeError::InvalidRequest(_) | TradeError::InsufficientHoldings { .. } => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            TradeError::MarketData(e) => e.error_response(),
            _ => json_error(self.status_code(), self.to_string()),
        }
    }
}
