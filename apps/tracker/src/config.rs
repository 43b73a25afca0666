use anyhow::{Result, anyhow};
use clap::Parser;
use std::{env, time::Duration};

/// Highest numbered `TRACK_WALLET{n}` slot read from the environment.
const MAX_WALLET_SLOT: usize = 5;

#[derive(Parser, Debug, Clone)]
pub struct Cli {
    /// HTTP RPC URL (overrides RPC_URL)
    #[arg(long)]
    pub rpc_url: Option<String>,

    /// Streaming endpoint (overrides WS_URL)
    #[arg(long)]
    pub ws_url: Option<String>,

    /// Extra wallet to track, in addition to TRACK_WALLET*
    #[arg(long = "wallet")]
    pub wallets: Vec<String>,

    /// Log notices instead of delivering them
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

fn parse_commitment(s: &str) -> Result<Commitment> {
    match s.to_lowercase().as_str() {
        "processed" => Ok(Commitment::Processed),
        "confirmed" => Ok(Commitment::Confirmed),
        "finalized" => Ok(Commitment::Finalized),
        other => Err(anyhow!(
            "Invalid COMMITMENT={other}. Use processed|confirmed|finalized"
        )),
    }
}

/// One tracked address and how it is shown in notices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedWallet {
    pub address: String,
    pub display_name: String,
}

impl TrackedWallet {
    pub fn new(address: String, display_name: Option<String>) -> Self {
        let display_name = display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| short_address(&address));
        Self {
            address,
            display_name,
        }
    }
}

/// `abcd..wxyz` form of an address.
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 8 {
        return address.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}..{tail}")
}

/// Connection lifecycle knobs shared by every tracked address.
#[derive(Clone, Debug)]
pub struct SubscriptionSettings {
    pub commitment: Commitment,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
    /// Bounds the transport handshake; the readiness budget starts after it.
    pub connect_timeout: Duration,
    pub ready_poll_attempts: u32,
    pub ready_poll_interval: Duration,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            commitment: Commitment::Confirmed,
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(5000),
            ping_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            ready_poll_attempts: 10,
            ready_poll_interval: Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub rpc_url: String,
    pub ws_url: String,
    pub bot_key: Option<String>,
    pub recipients: Vec<String>,
    pub wallets: Vec<TrackedWallet>,
    pub price_api_url: String,
    pub dry_run: bool,
    pub subscription: SubscriptionSettings,
}

fn parse_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_num<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {key}={v}, expected a number")),
        Err(_) => Ok(default),
    }
}

/// Reads `TRACK_WALLET`, `TRACK_WALLET1`..`TRACK_WALLET5` and matching
/// `TRADER_NAME*` display names.
fn wallets_from_env() -> Vec<TrackedWallet> {
    (0..=MAX_WALLET_SLOT)
        .filter_map(|i| {
            let suffix = if i == 0 { String::new() } else { i.to_string() };
            let address = env::var(format!("TRACK_WALLET{suffix}")).ok()?;
            let address = address.trim().to_string();
            if address.is_empty() {
                return None;
            }
            let name = env::var(format!("TRADER_NAME{suffix}")).ok();
            Some(TrackedWallet::new(address, name))
        })
        .collect()
}

pub fn load(cli: &Cli) -> Result<Config> {
    let rpc_url = cli
        .rpc_url
        .clone()
        .or_else(|| env::var("RPC_URL").ok())
        .unwrap_or_else(|| "https://api.mainnet-beta.solana.com".to_string());

    let ws_url = cli
        .ws_url
        .clone()
        .or_else(|| env::var("WS_URL").ok())
        .ok_or_else(|| anyhow!("Missing WS_URL"))?;

    let bot_key = env::var("BOT_KEY").ok().filter(|k| !k.trim().is_empty());
    if bot_key.is_none() && !cli.dry_run {
        return Err(anyhow!("Missing BOT_KEY (or pass --dry-run)"));
    }

    let recipients = parse_list(&env::var("SUBS").unwrap_or_default());

    let mut wallets = wallets_from_env();
    for w in &cli.wallets {
        if !wallets.iter().any(|t| &t.address == w) {
            wallets.push(TrackedWallet::new(w.clone(), None));
        }
    }
    if wallets.is_empty() {
        return Err(anyhow!("No wallet to track: set TRACK_WALLET or pass --wallet"));
    }

    let price_api_url =
        env::var("PRICE_API_URL").unwrap_or_else(|_| "https://api.jup.ag/price/v2".to_string());

    let defaults = SubscriptionSettings::default();
    let subscription = SubscriptionSettings {
        commitment: parse_commitment(&env::var("COMMITMENT").unwrap_or_else(|_| "confirmed".to_string()))?,
        max_reconnect_attempts: parse_num("MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts)?,
        reconnect_delay: Duration::from_millis(parse_num("RECONNECT_DELAY_MS", 5000u64)?),
        ping_interval: Duration::from_secs(parse_num("PING_INTERVAL_SECS", 60u64)?),
        connect_timeout: Duration::from_secs(parse_num("CONNECT_TIMEOUT_SECS", 30u64)?),
        ready_poll_attempts: parse_num("READY_POLL_ATTEMPTS", defaults.ready_poll_attempts)?,
        ready_poll_interval: Duration::from_millis(parse_num("READY_POLL_INTERVAL_MS", 200u64)?),
    };

    if subscription.ping_interval.is_zero() {
        return Err(anyhow!("PING_INTERVAL_SECS must be > 0"));
    }
    if subscription.connect_timeout.is_zero() {
        return Err(anyhow!("CONNECT_TIMEOUT_SECS must be > 0"));
    }

    Ok(Config {
        rpc_url,
        ws_url,
        bot_key,
        recipients,
        wallets,
        price_api_url,
        dry_run: cli.dry_run,
        subscription,
    })
}
