/// `load_config` module: reads the static YAML settings of an upload run.
///
/// Secrets never live in this file; the bot token is read from the environment by
/// [`crate::telegram::BotApiClient::new_from_env`].
///
/// # Errors
/// Failures use `anyhow::Error` with the offending path in the message and are
/// surfaced at the CLI boundary.
use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::config::SenderConfig;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SenderConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file means "all defaults".
    if config_content.trim().is_empty() {
        let config = SenderConfig::default();
        config.trace_loaded();
        return Ok(config);
    }

    let config: SenderConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.time_limit == 0 {
        error!(config_path = ?path_ref, "time_limit must be at least one minute");
        anyhow::bail!("time_limit must be at least 1 minute");
    }

    config.trace_loaded();
    Ok(config)
}
