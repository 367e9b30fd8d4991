//! GMO Coin client: public ticker for quotes, private order endpoint for execution.
//!
//! Private calls are authenticated with three headers:
//! - `API-KEY`
//! - `API-TIMESTAMP` (unix millis)
//! - `API-SIGN`, hex HMAC-SHA256 of `timestamp + method + path + body`

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::models::{Quote, QuoteBook, Side};

use super::types::{ApiResponse, OrderRequest, TickerData};
use super::{OrderGateway, QuoteSource};

pub const PUBLIC_URL: &str = "https://api.coin.z.com/public";
pub const PRIVATE_URL: &str = "https://api.coin.z.com/private";
const ORDER_PATH: &str = "/v1/order";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Credentials for the private API.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// HTTP client for GMO Coin.
pub struct GmoClient {
    http: Client,
    public_url: &'static str,
    private_url: &'static str,
    credentials: Option<Credentials>,
}

impl GmoClient {
    /// Quote-only client; `place_order` fails until credentials are given.
    pub fn new(credentials: Option<Credentials>) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            public_url: PUBLIC_URL,
            private_url: PRIVATE_URL,
            credentials,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Fetch every symbol's ticker.
    pub async fn get_ticker(&self) -> Result<Vec<TickerData>> {
        let url = format!("{}/v1/ticker", self.public_url);
        debug!(url = %url, "Fetching ticker");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch ticker")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ticker request failed: {} - {}", status, body);
        }

        let body: ApiResponse<Vec<TickerData>> = response
            .json()
            .await
            .context("Failed to parse ticker response")?;

        if body.status != 0 {
            anyhow::bail!("Ticker request rejected: {}", body.error_text());
        }

        Ok(body.data.unwrap_or_default())
    }

    /// Submit a market order and return the exchange order id.
    pub async fn market_order(&self, side: Side, symbol: &str, size: Decimal) -> Result<String> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| anyhow!("GMO credentials not configured"))?;

        let request = OrderRequest {
            symbol: symbol.to_string(),
            side: side.as_str().to_string(),
            execution_type: "MARKET".to_string(),
            size: size.normalize().to_string(),
        };
        let body = serde_json::to_string(&request)?;

        let timestamp = timestamp_ms()?.to_string();
        let sign = sign_request(&credentials.api_secret, &timestamp, "POST", ORDER_PATH, &body)?;

        let url = format!("{}{}", self.private_url, ORDER_PATH);
        let response = self
            .http
            .post(&url)
            .header("API-KEY", &credentials.api_key)
            .header("API-TIMESTAMP", &timestamp)
            .header("API-SIGN", sign)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to send order")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Order placement failed: {} - {}", status, text));
        }

        let body: ApiResponse<String> = response
            .json()
            .await
            .context("Failed to parse order response")?;

        if body.status != 0 {
            return Err(anyhow!("Order rejected: {}", body.error_text()));
        }

        body.data.ok_or_else(|| anyhow!("Order response carried no order id"))
    }
}

#[async_trait]
impl QuoteSource for GmoClient {
    async fn fetch_quotes(&self) -> Result<QuoteBook> {
        let rows = self.get_ticker().await?;
        Ok(to_quote_book(rows))
    }
}

#[async_trait]
impl OrderGateway for GmoClient {
    async fn place_order(&self, side: Side, symbol: &str, size: Decimal) -> Result<String> {
        self.market_order(side, symbol, size).await
    }
}

/// Convert ticker rows, dropping any row whose prices are unparseable or implausible.
pub fn to_quote_book(rows: Vec<TickerData>) -> QuoteBook {
    let mut book = QuoteBook::new(Utc::now());

    for row in rows {
        let parsed = Decimal::from_str(&row.ask).and_then(|ask| {
            Decimal::from_str(&row.bid).map(|bid| Quote::new(ask, bid))
        });

        match parsed {
            Ok(quote) if quote.is_plausible() => book.insert(row.symbol, quote),
            Ok(quote) => {
                warn!(symbol = %row.symbol, ask = %quote.ask, bid = %quote.bid, "Dropping implausible quote");
            }
            Err(e) => {
                warn!(symbol = %row.symbol, error = %e, "Dropping unparseable quote");
            }
        }
    }

    book
}

fn timestamp_ms() -> Result<u128> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis())
}

/// Hex HMAC-SHA256 over `timestamp + method + path + body`.
pub fn sign_request(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(symbol: &str, ask: &str, bid: &str) -> TickerData {
        TickerData {
            symbol: symbol.to_string(),
            ask: ask.to_string(),
            bid: bid.to_string(),
        }
    }

    #[test]
    fn test_to_quote_book_drops_bad_rows() {
        let book = to_quote_book(vec![
            row("BTC_JPY", "101", "99"),
            row("ETH_JPY", "abc", "99"),
            row("XRP_JPY", "0", "0"),
        ]);

        assert_eq!(book.len(), 1);
        assert_eq!(book.get("BTC_JPY"), Some(&Quote::new(dec!(101), dec!(99))));
        assert!(book.get("ETH_JPY").is_none());
        assert!(book.get("XRP_JPY").is_none());
    }

    #[test]
    fn test_parse_ticker_envelope() {
        let raw = r#"{
            "status": 0,
            "data": [{"ask":"750760","bid":"750600","high":"762302","last":"756662",
                      "low":"704874","symbol":"BTC","timestamp":"2018-03-30T12:34:56.789Z",
                      "volume":"194785.8484"}],
            "responsetime": "2019-03-19T02:15:06.026Z"
        }"#;

        let body: ApiResponse<Vec<TickerData>> = serde_json::from_str(raw).unwrap();
        assert_eq!(body.status, 0);
        let rows = body.data.unwrap();
        assert_eq!(rows[0].symbol, "BTC");
        assert_eq!(rows[0].ask, "750760");
    }

    #[test]
    fn test_error_envelope_text() {
        let raw = r#"{"status":1,"messages":[{"message_code":"ERR-201","message_string":"Trading margin is insufficient"}]}"#;
        let body: ApiResponse<String> = serde_json::from_str(raw).unwrap();
        assert_eq!(body.error_text(), "ERR-201: Trading margin is insufficient");
    }

    #[test]
    fn test_sign_request_is_stable_hex() {
        let a = sign_request("secret", "1700000000000", "POST", "/v1/order", "{}").unwrap();
        let b = sign_request("secret", "1700000000000", "POST", "/v1/order", "{}").unwrap();
        let c = sign_request("other", "1700000000000", "POST", "/v1/order", "{}").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_order_without_credentials_fails() {
        let client = GmoClient::new(None).unwrap();
        let err = client.market_order(Side::Buy, "BTC_JPY", dec!(0.1)).await.unwrap_err();
        assert!(err.to_string().contains("credentials"));
    }
}
