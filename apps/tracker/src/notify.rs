use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use crate::format::Notice;

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// At-most-once delivery; failures are logged, never retried.
    async fn deliver(&self, notice: &Notice);
}

pub struct TelegramNotifier {
    http: Client,
    endpoint: String,
    recipients: Vec<String>,
}

impl TelegramNotifier {
    pub fn new(bot_key: &str, recipients: Vec<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("building http client")?;
        Ok(Self {
            http,
            endpoint: format!("https://api.telegram.org/bot{bot_key}/sendMessage"),
            recipients,
        })
    }

    async fn send_to(&self, chat_id: &str, notice: &Notice) -> Result<()> {
        let r = self
            .http
            .post(&self.endpoint)
            .json(&send_message_body(chat_id, notice))
            .send()
            .await
            .map_err(|e| anyhow!("telegram request failed: {e:?}"))?;

        let status = r.status();
        let reply: BotReply = r.json().await.map_err(|e| anyhow!("telegram decode error: {e:?}"))?;
        if !status.is_success() || !reply.ok {
            return Err(anyhow!(
                "telegram error status={status} description={}",
                reply.description.unwrap_or_default()
            ));
        }
        Ok(())
    }
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct BotReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// `sendMessage` payload with the swap button.
pub fn send_message_body(chat_id: &str, notice: &Notice) -> Value {
    json!({
        "chat_id": chat_id,
        "text": notice.text,
        "parse_mode": "MarkdownV2",
        "link_preview_options": {"is_disabled": true},
        "reply_markup": {
            "inline_keyboard": [[{"text": "Trade On Jupiter", "url": notice.action_url}]]
        }
    })
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, notice: &Notice) {
        fan_out(&self.recipients, |chat_id| self.send_to(chat_id, notice)).await;
    }
}

/// Sends to every recipient at once; each failure is logged on its own.
async fn fan_out<'a, F, Fut>(recipients: &'a [String], send: F) -> usize
where
    F: Fn(&'a str) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let results = join_all(recipients.iter().map(|chat_id| send(chat_id.as_str()))).await;
    let mut delivered = 0;
    for (chat_id, res) in recipients.iter().zip(results) {
        match res {
            Ok(()) => delivered += 1,
            Err(e) => warn!("notice to {chat_id} failed: {e:?}"),
        }
    }
    delivered
}

/// Writes notices to the log instead of sending them (`--dry-run`).
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notice: &Notice) {
        info!("notice ({}):\n{}", notice.action_url, notice.text);
    }
}
