use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

pub const DEFAULT_TIME_LIMIT_MINUTES: u64 = 20;
pub const DEFAULT_RETRY_COOLDOWN_SECS: u64 = 30;

/// Settings of an upload run, as read from the YAML config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Create a fresh channel for the plan instead of using `chat_id`.
    #[serde(default = "default_true", deserialize_with = "flag")]
    pub create_new_channel: bool,
    /// Existing channel to upload into. Required when not creating one.
    #[serde(default)]
    pub chat_id: Option<i64>,
    /// Comma separated administrators of a newly created channel.
    #[serde(default)]
    pub channel_adms: Option<String>,
    /// Minutes a single send may run before it is killed and restarted.
    #[serde(default = "default_time_limit")]
    pub time_limit: u64,
    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_secs: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            create_new_channel: true,
            chat_id: None,
            channel_adms: None,
            time_limit: DEFAULT_TIME_LIMIT_MINUTES,
            retry_cooldown_secs: DEFAULT_RETRY_COOLDOWN_SECS,
        }
    }
}

impl SenderConfig {
    pub fn trace_loaded(&self) {
        info!(
            create_new_channel = self.create_new_channel,
            chat_id = ?self.chat_id,
            admins = self.admins().len(),
            time_limit_minutes = self.time_limit,
            "Loaded SenderConfig"
        );
        debug!(?self, "SenderConfig loaded (full debug)");
    }

    /// Administrator identifiers, trimmed, empty entries dropped.
    pub fn admins(&self) -> Vec<String> {
        self.channel_adms
            .as_deref()
            .map(parse_admins)
            .unwrap_or_default()
    }

    pub fn send_deadline(&self) -> Duration {
        Duration::from_secs(self.time_limit.saturating_mul(60))
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }
}

pub fn parse_admins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_time_limit() -> u64 {
    DEFAULT_TIME_LIMIT_MINUTES
}

fn default_retry_cooldown() -> u64 {
    DEFAULT_RETRY_COOLDOWN_SECS
}

/// Accepts `true`/`false` as well as the `0`/`1` of older config files.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(serde::de::Error::custom(format!(
            "expected 0 or 1, got {other}"
        ))),
    }
}
