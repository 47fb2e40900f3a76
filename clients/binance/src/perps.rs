use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BinanceError, Result};
use crate::types::{OrderResponse, OrderSide, Position, PremiumIndex};
use crate::utils;

/// Configuration for BinancePerpsClient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinancePerpsClientConfig {
    /// Binance API key
    pub api_key: String,
    /// Binance API secret
    pub api_secret: String,
    /// Base URL for API endpoints
    pub base_url: String,
}

/// Client for Binance perpetual futures (USDT-M) API.
pub struct BinancePerpsClient {
    client: Arc<reqwest::Client>,
    api_key: String,
    api_secret: String,
    base_url: String,
}

impl BinancePerpsClient {
    pub fn new(client: Arc<reqwest::Client>, config: BinancePerpsClientConfig) -> Self {
        Self {
            client,
            api_key: config.api_key,
            api_secret: config.api_secret,
            base_url: config.base_url,
        }
    }

    async fn signed(
        &self,
        path: &str,
        method: Method,
        params: Vec<(&str, String)>,
    ) -> Result<String> {
        utils::fapi_signed_request(
            &self.client,
            &self.base_url,
            path,
            method,
            &self.api_key,
            &self.api_secret,
            params,
        )
        .await
    }

    /// Reads the position risk entries for `symbol`.
    pub async fn get_position(&self, symbol: &str) -> Result<Vec<Position>> {
        let body = self
            .signed(
                "/fapi/v3/positionRisk",
                Method::GET,
                vec![("symbol", symbol.to_string())],
            )
            .await?;
        serde_json::from_str(&body).map_err(|e| BinanceError::Decode(e.to_string()))
    }

    /// Reads mark price and last funding rate for `symbol`. Public endpoint, not signed.
    pub async fn get_premium_index(&self, symbol: &str) -> Result<PremiumIndex> {
        let url = format!("{}/fapi/v1/premiumIndex", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await?;
        let body = utils::read_body(resp).await?;
        serde_json::from_str(&body).map_err(|e| BinanceError::Decode(e.to_string()))
    }

    /// Cancels every open order on `symbol`.
    pub async fn cancel_all_open_orders(&self, symbol: &str) -> Result<()> {
        self.signed(
            "/fapi/v1/allOpenOrders",
            Method::DELETE,
            vec![("symbol", symbol.to_string())],
        )
        .await?;
        Ok(())
    }

    /// Places a MARKET order. `quantity` must already be rounded to the symbol's step size.
    pub async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: &str,
        reduce_only: bool,
    ) -> Result<OrderResponse> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        debug!(symbol, side = side.as_str(), quantity, reduce_only, "placing market order");
        let body = self.signed("/fapi/v1/order", Method::POST, params).await?;
        serde_json::from_str(&body).map_err(|e| BinanceError::Decode(e.to_string()))
    }
}
