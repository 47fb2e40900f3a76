//! LPH bot: keeps a Uniswap V3 LP position delta-hedged with a Binance perp short.
//!
//! Usage: lph [--config lph.toml] [--mode spectator|active]
//!
//! SIGHUP reloads the config file between cycles; Ctrl-C stops after the
//! operation in flight.

mod config;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, RootProvider};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use clients_binance::{BinancePerpsClient, BinancePerpsClientConfig};
use clients_telegrambot::TelegramBot;
use clients_uniswapv3::{SubgraphClient, SubgraphConfig, UniswapV3PositionManager, UniswapV3PositionManagerConfig};
use lph::adapters::{
    BinancePerpVenue, FanoutNotifier, LogNotifier, SubgraphLpProvider, TelegramNotifier, UniswapLpProvider,
    UniswapLpVenue,
};
use lph::provider::{Clock, LpDataProvider, LpVenue, Notifier};
use lph::{Collaborators, ExecutionOutcome, LPHStrategy, Mode};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use utils::SystemClock;

use crate::config::{AppConfig, LpSource, AUTO_POSITION};

#[derive(Parser, Debug)]
#[command(name = "lph")]
#[command(about = "Delta-neutral hedger for a Uniswap V3 LP position")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "lph.toml")]
    config: PathBuf,

    /// Operating mode, overrides the config file
    #[arg(long, env = "LPH_MODE")]
    mode: Option<String>,
}

fn parse_mode(mode: &str) -> Result<Mode> {
    match mode.trim().to_ascii_lowercase().as_str() {
        "spectator" => Ok(Mode::Spectator),
        "active" => Ok(Mode::Active),
        other => bail!("unknown mode {:?}, expected spectator or active", other),
    }
}

/// Loads the config and applies the CLI overrides.
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(&args.config)?;
    if let Some(mode) = &args.mode {
        config.strategy.mode = parse_mode(mode)?;
    }
    Ok(config)
}

/// Finds the owner's funded position on the configured pair.
async fn discover_position(manager: &mut UniswapV3PositionManager, owner: Address, base: Address, quote: Address) -> Result<String> {
    manager.sync_lp(owner).await?;
    let position = manager
        .positions()
        .values()
        .filter(|pos| pos.liquidity > 0)
        .find(|pos| pos.pairs(base, quote))
        .ok_or_else(|| {
            anyhow!(
                "No matching Uniswap position found for base_token={:?} and quote_token={:?}",
                base,
                quote
            )
        })?;
    info!(token_id = %position.token_id, "discovered lp position");
    Ok(position.token_id.to_string())
}

struct Wiring {
    collaborators: Collaborators,
    position_id: String,
}

async fn wire(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Wiring> {
    let http = Arc::new(reqwest::Client::builder().build()?);
    let binance = Arc::new(BinancePerpsClient::new(
        Arc::clone(&http),
        BinancePerpsClientConfig {
            api_key: config.binance.api_key.clone(),
            api_secret: config.binance.api_secret.clone(),
            base_url: config.binance.base_url.clone(),
        },
    ));
    let venue = Arc::new(BinancePerpVenue::new(
        binance,
        config.strategy.symbol.clone(),
        config.strategy.execution.quantity_step,
    ));

    let rpc_url = config.lp.rpc_url.parse().context("invalid lp.rpc_url")?;
    let signer = config
        .lp
        .private_key
        .as_deref()
        .map(PrivateKeySigner::from_str)
        .transpose()
        .context("invalid LP_PRIVATE_KEY")?;
    let owner = match (config.lp.owner, &signer) {
        (Some(owner), _) => owner,
        (None, Some(signer)) => signer.address(),
        (None, None) => bail!("lp.owner is required without LP_PRIVATE_KEY"),
    };
    let provider: Arc<DynProvider> = Arc::new(match signer {
        Some(signer) => ProviderBuilder::new().wallet(signer).connect_http(rpc_url).erased(),
        None => RootProvider::<Ethereum>::new_http(rpc_url).erased(),
    });
    let mut manager = UniswapV3PositionManager::new(
        UniswapV3PositionManagerConfig {
            address: config.lp.position_manager,
        },
        provider,
    );

    let position_id = if config.strategy.position_id == AUTO_POSITION {
        discover_position(&mut manager, owner, config.lp.base_token, config.lp.quote_token).await?
    } else {
        U256::from_str(&config.strategy.position_id).context("position_id is not a token id")?;
        config.strategy.position_id.clone()
    };
    let manager = Arc::new(manager);

    let backoff = config.strategy.execution.backoff();
    let lp_data: Arc<dyn LpDataProvider> = match config.lp.source {
        LpSource::Onchain => Arc::new(UniswapLpProvider::new(
            Arc::clone(&manager),
            owner,
            config.lp.base_token,
            Arc::clone(&clock),
            backoff,
        )),
        LpSource::Subgraph => {
            let url = config
                .lp
                .subgraph_url
                .clone()
                .ok_or_else(|| anyhow!("lp.subgraph_url is required for the subgraph source"))?;
            let client = SubgraphClient::new(
                Arc::clone(&http),
                SubgraphConfig {
                    url,
                    api_key: config.lp.subgraph_api_key.clone(),
                },
            );
            Arc::new(SubgraphLpProvider::new(
                client,
                config.lp.base_symbol.clone(),
                Arc::clone(&clock),
                backoff,
            ))
        }
    };
    let lp_venue: Option<Arc<dyn LpVenue>> = if config.lp.private_key.is_some() {
        Some(Arc::new(UniswapLpVenue::new(Arc::clone(&manager), owner)))
    } else {
        None
    };

    let mut sinks: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if let Some(telegram) = &config.telegram {
        let bot = TelegramBot::with_debounce(
            telegram.bot_key.clone(),
            telegram.chat_id.clone(),
            Duration::from_secs(telegram.debounce_secs),
        );
        let (notifier, _worker) = TelegramNotifier::spawn(bot, config.lp.base_symbol.clone(), 64);
        sinks.push(Box::new(notifier));
    }

    Ok(Wiring {
        collaborators: Collaborators {
            lp_data,
            perp: venue.clone(),
            oracle: venue,
            lp_venue,
            notifier: Arc::new(FanoutNotifier(sinks)),
            clock,
        },
        position_id,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let wiring = wire(&config, clock).await?;
    config.strategy.position_id = wiring.position_id.clone();

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let mut strategy = LPHStrategy::new(config.strategy.clone(), wiring.collaborators, stop_rx.clone())?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = stop_tx.send(true);
        }
    });
    let mut hangup = signal(SignalKind::hangup())?;

    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = strategy.run_cycle().await;
                if let Some(monitoring) = &report.monitoring {
                    info!("{}", monitoring.to_message(&config.lp.base_symbol));
                }
                if let ExecutionOutcome::Aborted { kind, message, .. } = &report.outcome {
                    warn!(?kind, %message, "cycle ended with an aborted sequence");
                }
            }
            _ = hangup.recv() => {
                match load_config(&args) {
                    Ok(mut fresh) => {
                        // the position is fixed for the life of the process
                        fresh.strategy.position_id = wiring.position_id.clone();
                        if let Err(err) = strategy.reload(fresh.strategy.clone()) {
                            error!(error = %err, "reload rejected, keeping current config");
                        } else {
                            config = fresh;
                        }
                    }
                    Err(err) => error!(error = %format!("{:#}", err), "reload failed, keeping current config"),
                }
            }
            Ok(()) = stop_rx.changed() => {}
        }
        if *stop_rx.borrow() {
            break;
        }
    }

    info!("stopped");
    Ok(())
}
