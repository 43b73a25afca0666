use anyhow::Result;
use clap::Parser;
use futures::future::join_all;
use log::{error, info};
use std::sync::Arc;

mod config;
mod format;
mod metadata;
mod notify;
mod pipeline;
mod price;
mod rpc;
mod subscription;
mod transport;

use config::Config;
use notify::{LogNotifier, Notifier, TelegramNotifier};
use pipeline::TradePipeline;
use price::JupiterPrices;
use rpc::RpcClient;
use subscription::SubscriptionManager;
use transport::WsTransport;

fn setup_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// One subscription manager per tracked wallet; resolves when all of them
/// have stopped.
async fn track_all<N: Notifier>(cfg: &Config, notifier: Arc<N>) -> Result<()> {
    let rpc = Arc::new(RpcClient::new(cfg.rpc_url.clone(), cfg.subscription.commitment)?);
    let prices = Arc::new(JupiterPrices::new(cfg.price_api_url.clone())?);

    let mut tasks = Vec::with_capacity(cfg.wallets.len());
    for wallet in &cfg.wallets {
        info!("tracking {} ({})", wallet.address, wallet.display_name);

        let handler = Arc::new(TradePipeline::new(
            wallet,
            rpc.clone(),
            rpc.clone(),
            prices.clone(),
            notifier.clone(),
        ));
        let manager = SubscriptionManager::new(
            cfg.ws_url.clone(),
            wallet.address.clone(),
            cfg.subscription.clone(),
            WsTransport::new(cfg.subscription.connect_timeout),
            handler,
        );

        let address = wallet.address.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = manager.run().await {
                error!("[{address}] {e:?}");
            }
        }));
    }

    for joined in join_all(tasks).await {
        if let Err(e) = joined {
            error!("tracker task panicked: {e:?}");
        }
    }
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    match (&cfg.bot_key, cfg.dry_run) {
        (Some(key), false) => {
            info!("delivering notices to {} recipient(s)", cfg.recipients.len());
            let notifier = TelegramNotifier::new(key, cfg.recipients.clone())?;
            track_all(cfg, Arc::new(notifier)).await
        }
        _ => {
            info!("dry run: notices go to the log");
            track_all(cfg, Arc::new(LogNotifier)).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = config::Cli::parse();
    let cfg = config::load(&cli)?;

    info!("using rpc_url={} ws_url={}", cfg.rpc_url, cfg.ws_url);

    tokio::select! {
        res = run(&cfg) => {
            res?;
            info!("all subscriptions stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }
    Ok(())
}
