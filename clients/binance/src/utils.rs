use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::Sha256;
use url::form_urlencoded;

use crate::error::{BinanceError, Result};

type HmacSha256 = Hmac<Sha256>;

const RECV_WINDOW_MS: &str = "5000";

pub(crate) fn binance_fapi_timestamp_ms() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}

/// Encode params as query string (URL-encoded). The signature must be computed over this string.
fn build_query(params: &[(&str, String)]) -> String {
    let mut ser = form_urlencoded::Serializer::new(String::new());
    for (k, v) in params {
        ser.append_pair(k, v);
    }
    ser.finish()
}

/// HMAC-SHA256(secret, query) -> lowercase hex.
fn sign_query(api_secret: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|e| BinanceError::Signing(e.to_string()))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Append signature to params and return the full query string.
pub(crate) fn sign_params(api_secret: &str, params: &[(&str, String)]) -> Result<String> {
    let query = build_query(params);
    let sig = sign_query(api_secret, &query)?;
    Ok(format!("{}&signature={}", query, sig))
}

/// Signed request for USD-M futures (fapi).
///
/// - base_url: e.g. "https://fapi.binance.com"
/// - path: e.g. "/fapi/v3/positionRisk" or "/fapi/v1/order"
/// - params: without signature; timestamp/recvWindow are added if missing.
///
/// POST/DELETE endpoints take an application/x-www-form-urlencoded body.
/// Non-2xx responses are decoded into [`BinanceError::Api`].
pub async fn fapi_signed_request(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
    method: Method,
    api_key: &str,
    api_secret: &str,
    mut params: Vec<(&str, String)>,
) -> Result<String> {
    if !params.iter().any(|(k, _)| *k == "timestamp") {
        params.push(("timestamp", binance_fapi_timestamp_ms()));
    }
    if !params.iter().any(|(k, _)| *k == "recvWindow") {
        params.push(("recvWindow", RECV_WINDOW_MS.to_string()));
    }

    let signed_query = sign_params(api_secret, &params)?;

    let url = format!("{}{}", base_url, path);
    let req = if method == Method::GET {
        client.get(format!("{}?{}", url, signed_query))
    } else {
        client
            .request(method, url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(signed_query)
    };

    let resp = req.header("X-MBX-APIKEY", api_key).send().await?;
    read_body(resp).await
}

/// Returns the body of a successful response, or the decoded API error otherwise.
pub(crate) async fn read_body(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(BinanceError::from_response(status.as_u16(), &body))
    }
}
