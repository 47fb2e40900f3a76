//! Error types for the Binance futures client.

use serde::Deserialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BinanceError>;

/// Binance error code for "Margin is insufficient".
pub const CODE_INSUFFICIENT_MARGIN: i64 = -2019;
/// Binance error codes that are safe to retry (server busy, rate limit, clock skew).
const RETRYABLE_CODES: &[i64] = &[-1000, -1001, -1003, -1007, -1008, -1021];

/// Errors returned by [`crate::BinancePerpsClient`].
#[derive(Debug, Error)]
pub enum BinanceError {
    /// Transport failure: connect, timeout, body read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error payload.
    #[error("api error {code} (http {status}): {msg}")]
    Api { status: u16, code: i64, msg: String },

    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("signing error: {0}")]
    Signing(String),
}

#[derive(Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

impl BinanceError {
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(err) => BinanceError::Api {
                status,
                code: err.code,
                msg: err.msg,
            },
            Err(_) => BinanceError::Api {
                status,
                code: 0,
                msg: body.chars().take(200).collect(),
            },
        }
    }

    /// True when the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            BinanceError::Http(_) => true,
            BinanceError::Api { status, code, .. } => {
                *status >= 500 || *status == 429 || RETRYABLE_CODES.contains(code)
            }
            BinanceError::Decode(_) | BinanceError::Signing(_) => false,
        }
    }

    pub fn is_insufficient_margin(&self) -> bool {
        matches!(self, BinanceError::Api { code, .. } if *code == CODE_INSUFFICIENT_MARGIN)
    }
}
