//! Application config: a TOML file plus secrets from the environment.

use std::path::Path;

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use lph::LPHStrategyConfig;
use serde::Deserialize;

/// Position id asking the binary to find the owner's position for the configured pair.
pub const AUTO_POSITION: &str = "auto";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds between decision cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    pub binance: BinanceSection,
    pub lp: LpSection,
    #[serde(default)]
    pub telegram: Option<TelegramSection>,
    pub strategy: LPHStrategyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceSection {
    #[serde(default = "default_binance_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LpSource {
    Onchain,
    Subgraph,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LpSection {
    pub source: LpSource,
    pub rpc_url: String,
    /// NonfungiblePositionManager contract
    pub position_manager: Address,
    /// Position owner; defaults to the signer address when a private key is set
    #[serde(default)]
    pub owner: Option<Address>,
    pub base_token: Address,
    pub quote_token: Address,
    /// Symbol of the base token as indexed by the subgraph
    pub base_symbol: String,
    #[serde(default)]
    pub subgraph_url: Option<String>,
    #[serde(default)]
    pub subgraph_api_key: Option<String>,
    /// Signing key for LP withdrawals; only read from LP_PRIVATE_KEY
    #[serde(skip)]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    #[serde(default)]
    pub bot_key: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_binance_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_debounce_secs() -> u64 {
    60
}

impl AppConfig {
    /// Reads the file, overlays environment secrets and validates.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML config")
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("BINANCE_API_KEY") {
            self.binance.api_key = key;
        }
        if let Some(secret) = var("BINANCE_API_SECRET") {
            self.binance.api_secret = secret;
        }
        if let Some(key) = var("LP_PRIVATE_KEY") {
            self.lp.private_key = Some(key);
        }
        let bot_key = var("TELEGRAM_BOT_KEY");
        let chat_id = var("TELEGRAM_CHAT_ID");
        if bot_key.is_some() || chat_id.is_some() {
            let section = self.telegram.get_or_insert_with(|| TelegramSection {
                bot_key: String::new(),
                chat_id: String::new(),
                debounce_secs: default_debounce_secs(),
            });
            if let Some(key) = bot_key {
                section.bot_key = key;
            }
            if let Some(chat) = chat_id {
                section.chat_id = chat;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("interval_secs must be > 0");
        }
        if self.binance.api_key.is_empty() || self.binance.api_secret.is_empty() {
            bail!("binance credentials missing: set BINANCE_API_KEY and BINANCE_API_SECRET");
        }
        if self.lp.source == LpSource::Subgraph {
            if self.lp.subgraph_url.is_none() {
                bail!("lp.subgraph_url is required for the subgraph source");
            }
            if self.strategy.position_id == AUTO_POSITION {
                bail!("position discovery needs the onchain source");
            }
        }
        if self.lp.owner.is_none() && self.lp.private_key.is_none() {
            bail!("lp.owner is required without LP_PRIVATE_KEY");
        }
        if self.strategy.execution.enable_lp_executions && self.lp.private_key.is_none() {
            bail!("LP executions need LP_PRIVATE_KEY");
        }
        if let Some(telegram) = &self.telegram {
            if telegram.bot_key.is_empty() || telegram.chat_id.is_empty() {
                bail!("telegram needs both TELEGRAM_BOT_KEY and TELEGRAM_CHAT_ID");
            }
        }
        self.strategy
            .validate()
            .context("invalid strategy config")?;
        Ok(())
    }
}
