mod config;
mod engine;
mod error;
mod exchange;
mod hedge;
mod matcher;
mod metrics;
mod odds;
mod pricing;
mod profit_protector;
mod risk;
mod state;
mod types;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use kalshi_rs::auth::Account;
use kalshi_rs::{KalshiClient, KalshiWebsocketClient};

use config::{Config, ConfigFile};
use odds::client::OddsApiClient;
use odds::OddsAdapter;
use state::Shared;

/// Binary prediction-market arbitrage engine (§1). Reads credentials and
/// runtime overlay from the environment and an optional TOML file, then
/// hands off to `engine::task::run_engine` for the life of the process.
#[derive(Parser, Debug)]
#[command(name = "odds-arb-engine", version, about)]
struct Cli {
    /// TOML overlay applied on top of `Config::default()` (§6).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory positions.json/aux_state.json are persisted under.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    dotenv().ok();

    let cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = &cli.config {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
        cfg = file.apply(cfg);
    }
    if env::var("LIVE_ORDERS").map(|v| v == "1").unwrap_or(false) {
        cfg.exec_mode = config::ExecMode::Live;
    }

    let api_key_id = env::var("API_KEY").context("missing API_KEY")?;
    let key_path = env::var("KALSHI_KEY_PATH").unwrap_or_else(|_| "./private_keys/kalshi_private.pem".to_string());
    let account = Account::from_file(&key_path, api_key_id.as_str())?;

    let client = Arc::new(KalshiClient::new(account.clone()));
    let ws_client = KalshiWebsocketClient::new(account);

    let odds_api_key = env::var("ODDS_API_KEY").context("missing ODDS_API_KEY")?;
    let odds_base_url = env::var("ODDS_API_BASE_URL").unwrap_or_else(|_| "https://api.the-odds-api.com/v4".to_string());
    let odds_client = OddsApiClient::new(odds_base_url, odds_api_key, "us".to_string(), vec!["pinnacle".to_string()]);
    let odds = Arc::new(OddsAdapter::new(odds_client, cfg.odds_fetch_min_interval));

    let shared = Shared::load(cli.data_dir)
        .await
        .context("loading persisted state")?;

    engine::task::run_engine(cfg, shared, client, ws_client, odds).await
}
