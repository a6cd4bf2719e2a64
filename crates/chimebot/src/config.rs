use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub towers: Vec<TowerConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("chimebot.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// 外部から見たベース URL。outbox や投稿のリンクはここから組み立てる。
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// `/profile` のリダイレクト先（時計塔の一覧ページ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_list_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind: default_bind(),
            public_url: default_public_url(),
            profile_list_url: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9913))
}

fn default_public_url() -> String {
    "http://127.0.0.1:9913".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// 直前の発火からこの時間以内の再発火は無視する
    #[serde(default = "default_debounce", with = "humantime_serde")]
    pub debounce: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            debounce: default_debounce(),
        }
    }
}

fn default_debounce() -> Duration {
    Duration::from_secs(55 * 60)
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TowerConfig {
    pub id: String,
    /// メッセージに埋め込む場所名
    pub location: String,
    #[serde_as(as = "DisplayFromStr")]
    pub time_zone: Tz,
    /// `/profile/{id}` のリダイレクト先
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default = "default_publishers")]
    pub publishers: Vec<PublisherConfig>,
}

impl TowerConfig {
    /// 時報記録のパーティションキー。
    pub fn partition_key(&self) -> &'static str {
        self.time_zone.name()
    }
}

impl Default for TowerConfig {
    fn default() -> Self {
        Self {
            id: "hvcc".to_string(),
            location: "HVCC".to_string(),
            time_zone: chrono_tz::America::New_York,
            profile_url: None,
            publishers: default_publishers(),
        }
    }
}

fn default_publishers() -> Vec<PublisherConfig> {
    vec![PublisherConfig::Log]
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublisherConfig {
    /// ログに出力するだけ
    Log,
    Discord {
        token: String,
        channel_id: u64,
    },
    Webhook {
        url: String,
        #[serde(default = "default_webhook_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Config {
    /// 設定内容を検証し、問題をすべてまとめて報告する。
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if reqwest::Url::parse(&self.server.public_url).is_err() {
            errors.push(format!("Invalid public_url: {}", self.server.public_url));
        }

        if let Some(url) = &self.server.profile_list_url
            && reqwest::Url::parse(url).is_err()
        {
            errors.push(format!("Invalid profile_list_url: {url}"));
        }

        let mut ids = HashSet::new();
        for tower in &self.towers {
            if tower.id.trim().is_empty() {
                errors.push("Tower id can not be empty or whitespace".to_string());
            } else if !ids.insert(tower.id.as_str()) {
                errors.push(format!("Duplicate tower id: {}", tower.id));
            }

            if tower.location.trim().is_empty() {
                errors.push(format!("Tower '{}' has an empty location", tower.id));
            }

            if let Some(url) = &tower.profile_url
                && reqwest::Url::parse(url).is_err()
            {
                errors.push(format!("Tower '{}' has an invalid profile_url: {url}", tower.id));
            }

            for publisher in &tower.publishers {
                if let PublisherConfig::Webhook { url, .. } = publisher
                    && reqwest::Url::parse(url).is_err()
                {
                    errors.push(format!("Tower '{}' has an invalid webhook url: {url}", tower.id));
                }
            }
        }

        if !errors.is_empty() {
            bail!("Invalid configuration:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}

pub fn open_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
    let config: Config = toml::from_str(&content).context("Failed to parse configuration file")?;
    config.validate()?;
    Ok(config)
}

pub fn write_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = Config {
        towers: vec![TowerConfig::default()],
        ..Default::default()
    };
    let content = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
    Ok(())
}
