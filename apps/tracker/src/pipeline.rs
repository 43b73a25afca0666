//! Per-signature pipeline: fetch, diff, classify, enrich, format, deliver.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use schema::{TradeParser, TxFacts};
use std::sync::Arc;

use crate::config::TrackedWallet;
use crate::format::{Notice, build_notice};
use crate::notify::Notifier;
use crate::price::PriceSource;
use crate::rpc::{MetadataSource, TxFetcher};
use crate::subscription::SignatureHandler;

pub struct TradePipeline<F, M, P, N> {
    parser: TradeParser,
    display_name: String,
    fetcher: Arc<F>,
    metadata: Arc<M>,
    prices: Arc<P>,
    notifier: Arc<N>,
}

impl<F, M, P, N> TradePipeline<F, M, P, N>
where
    F: TxFetcher,
    M: MetadataSource,
    P: PriceSource,
    N: Notifier,
{
    pub fn new(
        wallet: &TrackedWallet,
        fetcher: Arc<F>,
        metadata: Arc<M>,
        prices: Arc<P>,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            parser: TradeParser::new(wallet.address.clone()),
            display_name: wallet.display_name.clone(),
            fetcher,
            metadata,
            prices,
            notifier,
        }
    }

    /// `Ok(None)` when the transaction is not a trade by the tracked owner.
    pub async fn process(&self, signature: &str) -> Result<Option<Notice>> {
        let tx = self
            .fetcher
            .fetch(signature)
            .await
            .with_context(|| format!("fetching {signature}"))?;

        let facts = TxFacts::from_json(&tx);
        let Some(trade) = self.parser.classify_facts(&facts) else {
            debug!("sig={signature} not a trade by {}", self.parser.owner());
            return Ok(None);
        };

        let (input_meta, output_meta, prices) = tokio::join!(
            self.metadata.lookup(&trade.input.mint),
            self.metadata.lookup(&trade.output.mint),
            self.prices.price_of(&trade.input.mint, &trade.output.mint),
        );
        let input_meta = input_meta.with_context(|| format!("metadata for {}", trade.input.mint))?;
        let output_meta = output_meta.with_context(|| format!("metadata for {}", trade.output.mint))?;
        let prices = prices.context("prices")?;

        info!(
            "sig={signature} {} {} -> {} on {}",
            trade.direction, input_meta.symbol, output_meta.symbol, trade.venue
        );

        Ok(Some(build_notice(
            &trade,
            signature,
            &self.display_name,
            &input_meta,
            &output_meta,
            prices,
        )))
    }
}

#[async_trait]
impl<F, M, P, N> SignatureHandler for TradePipeline<F, M, P, N>
where
    F: TxFetcher,
    M: MetadataSource,
    P: PriceSource,
    N: Notifier,
{
    async fn handle(&self, signature: String) {
        match self.process(&signature).await {
            Ok(Some(notice)) => self.notifier.deliver(&notice).await,
            Ok(None) => {}
            Err(e) => warn!("dropping sig={signature}: {e:?}"),
        }
    }
}
