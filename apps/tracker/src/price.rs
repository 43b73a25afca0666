use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// USD unit prices for the two sides of a trade. Unknown prices are `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Prices {
    pub input: f64,
    pub output: f64,
}

#[async_trait]
pub trait PriceSource: Send + Sync + 'static {
    async fn price_of(&self, input_mint: &str, output_mint: &str) -> Result<Prices>;
}

#[derive(Clone)]
pub struct JupiterPrices {
    http: Client,
    url: String,
}

impl JupiterPrices {
    pub fn new(url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building http client")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl PriceSource for JupiterPrices {
    async fn price_of(&self, input_mint: &str, output_mint: &str) -> Result<Prices> {
        let r = self
            .http
            .get(&self.url)
            .query(&[("ids", format!("{input_mint},{output_mint}"))])
            .send()
            .await
            .map_err(|e| anyhow!("price request failed: {e:?}"))?;

        let status = r.status();
        let v: Value = r.json().await.map_err(|e| anyhow!("price decode error: {e:?}"))?;
        if !status.is_success() {
            return Err(anyhow!("price http error status={status} body={v}"));
        }

        Ok(read_prices(&v, input_mint, output_mint))
    }
}

fn price_field(body: &Value, mint: &str) -> f64 {
    let Some(p) = body.get("data").and_then(|d| d.get(mint)).and_then(|e| e.get("price")) else {
        return 0.0;
    };
    match p {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Reads `data[mint].price` for both mints from a price API body.
pub fn read_prices(body: &Value, input_mint: &str, output_mint: &str) -> Prices {
    Prices {
        input: price_field(body, input_mint),
        output: price_field(body, output_mint),
    }
}
