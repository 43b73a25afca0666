use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use schema::{SOL_DECIMALS, is_native};
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::{Commitment, short_address};
use crate::metadata::{account_data, metadata_pda, parse_metadata_account};

/// Symbol, raw supply and decimals of a mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub supply: u128,
    pub decimals: u8,
}

impl TokenMetadata {
    pub fn native() -> Self {
        Self {
            symbol: "SOL".to_string(),
            supply: 0,
            decimals: SOL_DECIMALS,
        }
    }
}

#[async_trait]
pub trait TxFetcher: Send + Sync + 'static {
    /// Full `getTransaction` result for a signature.
    async fn fetch(&self, signature: &str) -> Result<Value>;
}

#[async_trait]
pub trait MetadataSource: Send + Sync + 'static {
    async fn lookup(&self, mint: &str) -> Result<TokenMetadata>;
}

#[derive(Clone)]
pub struct RpcClient {
    http: Client,
    url: String,
    commitment: Commitment,
}

impl RpcClient {
    pub fn new(url: String, commitment: Commitment) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            url,
            commitment,
        })
    }

    /// Single JSON-RPC round trip. No retry: callers drop the work on error.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let r = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("rpc request failed: {e:?}"))?;

        let status = r.status();
        let v: Value = r.json().await.map_err(|e| anyhow!("rpc decode error: {e:?}"))?;

        if !status.is_success() {
            return Err(anyhow!("rpc http error status={status} body={v}"));
        }
        if let Some(err) = v.get("error") {
            return Err(anyhow!("rpc returned error: {err}"));
        }

        v.get("result").cloned().ok_or_else(|| anyhow!("missing result field"))
    }

    /// Symbol from the mint's Token Metadata account, supply and decimals
    /// from `getTokenSupply`.
    async fn onchain_metadata(&self, mint: &str) -> Result<TokenMetadata> {
        let pda = metadata_pda(mint)?;
        let account_params = json!([
            pda.to_string(),
            {"encoding": "base64", "commitment": self.commitment.as_str()}
        ]);
        let (account, supply) = tokio::join!(
            self.call("getAccountInfo", account_params),
            self.supply_metadata(mint),
        );

        let data = account_data(&account?).ok_or_else(|| anyhow!("no metadata account {pda} for {mint}"))?;
        let onchain = parse_metadata_account(&data)?;
        if onchain.symbol.is_empty() {
            return Err(anyhow!("metadata account {pda} has an empty symbol"));
        }
        debug!("on-chain metadata for {mint}: {} ({})", onchain.symbol, onchain.name);

        Ok(TokenMetadata {
            symbol: onchain.symbol,
            ..supply?
        })
    }

    async fn asset_metadata(&self, mint: &str) -> Result<TokenMetadata> {
        let result = self
            .call(
                "getAsset",
                json!({"id": mint, "displayOptions": {"showFungible": true}}),
            )
            .await?;
        parse_asset(&result).ok_or_else(|| anyhow!("getAsset {mint}: no token_info"))
    }

    async fn supply_metadata(&self, mint: &str) -> Result<TokenMetadata> {
        let result = self.call("getTokenSupply", json!([mint])).await?;
        parse_token_supply(mint, &result).ok_or_else(|| anyhow!("getTokenSupply {mint}: bad shape"))
    }
}

#[async_trait]
impl TxFetcher for RpcClient {
    async fn fetch(&self, signature: &str) -> Result<Value> {
        let params = json!([
            signature,
            {
                "encoding": "jsonParsed",
                "maxSupportedTransactionVersion": 0,
                "commitment": self.commitment.as_str()
            }
        ]);
        let tx = self.call("getTransaction", params).await?;
        if tx.is_null() {
            return Err(anyhow!("transaction {signature} not found"));
        }
        Ok(tx)
    }
}

#[async_trait]
impl MetadataSource for RpcClient {
    async fn lookup(&self, mint: &str) -> Result<TokenMetadata> {
        if is_native(mint) {
            return Ok(TokenMetadata::native());
        }

        let e = match self.onchain_metadata(mint).await {
            Ok(m) => return Ok(m),
            Err(e) => e,
        };
        debug!("on-chain metadata failed for {mint}, trying getAsset: {e:?}");

        match self.asset_metadata(mint).await {
            Ok(m) => Ok(m),
            Err(e) => {
                debug!("asset lookup failed for {mint}, falling back to supply: {e:?}");
                self.supply_metadata(mint).await
            }
        }
    }
}

fn as_u128(v: &Value) -> Option<u128> {
    match v {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Reads a DAS `getAsset` result.
pub fn parse_asset(result: &Value) -> Option<TokenMetadata> {
    let info = result.get("token_info")?;
    let supply = as_u128(info.get("supply")?)?;
    let decimals = u8::try_from(info.get("decimals")?.as_u64()?).ok()?;

    let symbol = info
        .get("symbol")
        .and_then(|s| s.as_str())
        .or_else(|| result.pointer("/content/metadata/symbol").and_then(|s| s.as_str()))
        .filter(|s| !s.is_empty())?;

    Some(TokenMetadata {
        symbol: symbol.to_string(),
        supply,
        decimals,
    })
}

/// Reads a `getTokenSupply` result; the symbol is the abbreviated mint.
pub fn parse_token_supply(mint: &str, result: &Value) -> Option<TokenMetadata> {
    let value = result.get("value")?;
    let supply = as_u128(value.get("amount")?)?;
    let decimals = u8::try_from(value.get("decimals")?.as_u64()?).ok()?;
    Some(TokenMetadata {
        symbol: short_address(mint),
        supply,
        decimals,
    })
}
