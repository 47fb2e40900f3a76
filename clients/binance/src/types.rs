use serde::{Deserialize, Serialize};

/// Position information from Binance perpetual futures API (`/fapi/v3/positionRisk`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub position_side: Option<String>,
    pub position_amt: String,
    pub entry_price: String,
    #[serde(default)]
    pub break_even_price: String,
    pub mark_price: String,
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_pnl: String,
    #[serde(default)]
    pub liquidation_price: String,
    #[serde(default)]
    pub isolated_margin: String,
    #[serde(default)]
    pub notional: String,
    #[serde(default)]
    pub margin_asset: String,
    #[serde(default)]
    pub isolated_wallet: String,
    #[serde(default)]
    pub initial_margin: String,
    #[serde(default)]
    pub maint_margin: String,
    #[serde(default)]
    pub adl: i32,
    pub update_time: i64,
}

/// Mark price and funding information (`/fapi/v1/premiumIndex`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumIndex {
    pub symbol: String,
    pub mark_price: String,
    pub index_price: String,
    /// Funding rate applied at the last settlement, per funding interval
    pub last_funding_rate: String,
    pub next_funding_time: i64,
    pub time: i64,
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Acknowledgement returned by `/fapi/v1/order`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub client_order_id: String,
    #[serde(default)]
    pub executed_qty: String,
    #[serde(default)]
    pub avg_price: String,
    pub side: OrderSide,
    #[serde(default)]
    pub update_time: i64,
}
