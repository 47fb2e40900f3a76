//! Uniswap V3 subgraph reader.
//!
//! Payloads are validated field by field: a missing or malformed response is
//! an error, never a silently zeroed position.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::config::SubgraphConfig;

const POSITION_QUERY: &str = r#"
query Position($id: ID!) {
  position(id: $id) {
    id
    liquidity
    token0 { id symbol decimals }
    token1 { id symbol decimals }
    pool { id sqrtPrice }
    tickLower { tickIdx }
    tickUpper { tickIdx }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<PositionEnvelope>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PositionEnvelope {
    position: Option<RawPosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    id: String,
    liquidity: String,
    token0: RawToken,
    token1: RawToken,
    pool: RawPool,
    tick_lower: RawTick,
    tick_upper: RawTick,
}

#[derive(Debug, Deserialize)]
struct RawToken {
    id: String,
    symbol: String,
    decimals: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPool {
    id: String,
    sqrt_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTick {
    tick_idx: String,
}

/// Token metadata as indexed by the subgraph.
#[derive(Debug, Clone, PartialEq)]
pub struct SubgraphToken {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A position as indexed by the subgraph, with numeric fields parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct SubgraphPosition {
    pub id: String,
    pub pool_id: String,
    pub liquidity: u128,
    pub token0: SubgraphToken,
    pub token1: SubgraphToken,
    pub tick_lower: i32,
    pub tick_upper: i32,
    /// Pool sqrtPriceX96 as a float
    pub sqrt_price_x96: f64,
}

/// Client for the Uniswap V3 subgraph GraphQL endpoint.
pub struct SubgraphClient {
    client: Arc<reqwest::Client>,
    config: SubgraphConfig,
}

impl SubgraphClient {
    pub fn new(client: Arc<reqwest::Client>, config: SubgraphConfig) -> Self {
        Self { client, config }
    }

    /// Reads one position by NFT id.
    pub async fn get_position(&self, id: &str) -> Result<SubgraphPosition> {
        let mut req = self.client.post(&self.config.url).json(&json!({
            "query": POSITION_QUERY,
            "variables": { "id": id },
        }));
        if let Some(key) = &self.config.api_key {
            req = req.header("apikey", key);
        }
        let resp = req
            .send()
            .await
            .context("subgraph request failed")?
            .error_for_status()
            .context("subgraph returned an error status")?;
        let body: GraphResponse = resp.json().await.context("subgraph body is not json")?;
        parse_position(body, id)
    }
}

fn parse_position(body: GraphResponse, id: &str) -> Result<SubgraphPosition> {
    if let Some(errors) = body.errors {
        let sample: String = errors.to_string().chars().take(200).collect();
        warn!(source = "uniswap", reason = "subgraph_errors", body_sample = %sample);
        bail!("subgraph errors: {}", sample);
    }
    let raw = body
        .data
        .and_then(|d| d.position)
        .ok_or_else(|| anyhow!("missing field data.position for id {}", id))?;

    Ok(SubgraphPosition {
        id: raw.id,
        pool_id: raw.pool.id,
        liquidity: raw.liquidity.parse().context("liquidity")?,
        token0: parse_token(raw.token0)?,
        token1: parse_token(raw.token1)?,
        tick_lower: raw.tick_lower.tick_idx.parse().context("tickLower")?,
        tick_upper: raw.tick_upper.tick_idx.parse().context("tickUpper")?,
        sqrt_price_x96: raw.pool.sqrt_price.parse().context("sqrtPrice")?,
    })
}

fn parse_token(raw: RawToken) -> Result<SubgraphToken> {
    Ok(SubgraphToken {
        address: raw.id,
        symbol: raw.symbol,
        decimals: raw.decimals.parse().context("token decimals")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<SubgraphPosition> {
        parse_position(serde_json::from_str(body).unwrap(), "42")
    }

    #[test]
    fn test_null_data_is_an_error() {
        assert!(parse(r#"{"data": null}"#).is_err());
        assert!(parse(r#"{"data": {"position": null}}"#).is_err());
    }

    #[test]
    fn test_graphql_errors_are_an_error() {
        assert!(parse(r#"{"errors": [{"message": "boom"}]}"#).is_err());
    }

    #[test]
    fn test_parses_position() {
        let body = r#"{"data": {"position": {
            "id": "42",
            "liquidity": "123456789",
            "token0": {"id": "0xc02a", "symbol": "WETH", "decimals": "18"},
            "token1": {"id": "0xa0b8", "symbol": "USDC", "decimals": "6"},
            "pool": {"id": "0x88e6", "sqrtPrice": "3543191142285914378072636784640", "tick": "200000"},
            "tickLower": {"tickIdx": "-199000"},
            "tickUpper": {"tickIdx": "-197000"}
        }}}"#;
        let pos = parse(body).unwrap();
        assert_eq!(pos.liquidity, 123456789);
        assert_eq!(pos.token0.symbol, "WETH");
        assert_eq!(pos.token1.decimals, 6);
        assert_eq!(pos.tick_lower, -199000);
        assert!(pos.sqrt_price_x96 > 0.0);
    }
}
