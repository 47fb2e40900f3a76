use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(60);

/// Client for sending messages via Telegram Bot API.
pub struct TelegramBot {
    client: Client,
    api_key: String,
    chat_id: String,
    debouncer: Mutex<Debouncer>,
}

#[derive(Serialize)]
struct SendMessageRequest {
    chat_id: String,
    text: String,
}

impl TelegramBot {
    /// Creates a new `TelegramBot` with the given API key and chat ID.
    pub fn new(api_key: String, chat_id: String) -> Self {
        Self::with_debounce(api_key, chat_id, DEFAULT_DEBOUNCE)
    }

    /// Same as [`TelegramBot::new`] with a custom per-key debounce window.
    pub fn with_debounce(api_key: String, chat_id: String, debounce: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key,
            chat_id,
            debouncer: Mutex::new(Debouncer::new(debounce)),
        }
    }

    /// Sends a text message to the configured chat.
    pub async fn push_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.api_key);
        let body = SendMessageRequest {
            chat_id: self.chat_id.clone(),
            text: text.to_string(),
        };
        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("telegram sendMessage request failed")?
            .error_for_status()
            .context("telegram sendMessage rejected")?;
        Ok(())
    }

    /// Sends `text` unless a message with the same `key` went out within the debounce window.
    ///
    /// Returns `Ok(false)` when the message was suppressed.
    pub async fn push_keyed(&self, key: &str, text: &str) -> Result<bool> {
        let allowed = match self.debouncer.lock() {
            Ok(mut debouncer) => debouncer.allow(key, Instant::now()),
            Err(_) => true,
        };
        if !allowed {
            return Ok(false);
        }
        self.push_message(text).await?;
        Ok(true)
    }
}

/// Per-key rate limiter: at most one message per key per window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_sent: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// Records and allows the send when the key is outside its window.
    pub fn allow(&mut self, key: &str, now: Instant) -> bool {
        if let Some(last) = self.last_sent.get(key) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_sent.insert(key.to_string(), now);
        true
    }
}
