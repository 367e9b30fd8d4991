//! Wire types for the GMO Coin public and private APIs.

use serde::{Deserialize, Serialize};

/// Envelope shared by every GMO Coin response.
///
/// `status` is 0 on success; otherwise `messages` carries the reason.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub status: i32,
    pub data: Option<T>,
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub message_code: String,
    #[serde(default)]
    pub message_string: String,
}

impl<T> ApiResponse<T> {
    /// Joined error messages, for logging a non-zero status.
    pub fn error_text(&self) -> String {
        if self.messages.is_empty() {
            return format!("status {}", self.status);
        }
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.message_code, m.message_string))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One row from `GET /public/v1/ticker`. Prices arrive as strings; the
/// remaining fields (high, low, last, volume, timestamp) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerData {
    pub symbol: String,
    pub ask: String,
    pub bid: String,
}

/// Body of `POST /private/v1/order`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub symbol: String,
    pub side: String,
    pub execution_type: String,
    pub size: String,
}
