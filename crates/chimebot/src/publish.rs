//! 時報メッセージの送信先。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serenity::all::{ChannelId, CreateMessage, Http};
use tracing::info;

use crate::config::PublisherConfig;
use crate::version::user_agent;

/// 時報の送信先。文字列を受け取り、成功か失敗かだけを返す。
pub enum Publisher {
    Log { tower: String },
    Discord(DiscordPublisher),
    Webhook(WebhookPublisher),
}

impl Publisher {
    pub fn from_config(config: &PublisherConfig, tower: &str) -> Result<Self> {
        let publisher = match config {
            PublisherConfig::Log => Self::Log {
                tower: tower.to_string(),
            },
            PublisherConfig::Discord { token, channel_id } => {
                Self::Discord(DiscordPublisher::new(token, *channel_id))
            }
            PublisherConfig::Webhook { url, timeout } => {
                Self::Webhook(WebhookPublisher::new(url, *timeout)?)
            }
        };
        Ok(publisher)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::Discord(_) => "discord",
            Self::Webhook(_) => "webhook",
        }
    }

    pub async fn publish(&self, text: &str) -> Result<()> {
        match self {
            Self::Log { tower } => {
                info!(tower = %tower, message = %text, "Chime");
                Ok(())
            }
            Self::Discord(discord) => discord.publish(text).await,
            Self::Webhook(webhook) => webhook.publish(text).await,
        }
    }
}

/// Discord チャンネルへ投稿する。Gateway には接続せず HTTP API だけを使う。
pub struct DiscordPublisher {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordPublisher {
    pub fn new(token: &str, channel_id: u64) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
            channel_id: ChannelId::new(channel_id),
        }
    }

    async fn publish(&self, text: &str) -> Result<()> {
        let message = CreateMessage::new().content(text);
        self.channel_id
            .send_message(&self.http, message)
            .await
            .context("Failed to send Discord message")?;
        Ok(())
    }
}

/// 任意の URL に `{"content": "..."}` を POST する。
pub struct WebhookPublisher {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .context("Failed to create HTTP client for webhook")?;

        Ok(Self {
            http_client,
            url: url.to_string(),
        })
    }

    async fn publish(&self, text: &str) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .context("Webhook request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Webhook returned status: {}", response.status());
        }

        Ok(())
    }
}
