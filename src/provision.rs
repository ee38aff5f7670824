//! # provision: resolve the channel a plan uploads into
//!
//! A plan's channel is decided once. The first run either creates and configures a
//! new channel, recording it in `channel_metadata` next to the plan, or uses the
//! configured `chat_id`. Every later run finds the metadata file and reuses the
//! recorded channel, whatever the configuration says.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::SenderConfig;
use crate::contract::{ChannelClient, ChatPrivileges, ClientError};
use crate::runner::{BoundedRunner, RunOutcome, RunnerError};

pub const METADATA_FILE_NAME: &str = "channel_metadata";
pub const HEADER_TEMPLATE_NAME: &str = "header_project.txt";
pub const INVITE_LINK_PLACEHOLDER: &str = "{chat_invite_link}";

const DEFAULT_HEADER_TEMPLATE: &str = include_str!("../template/header_project.txt");

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("chat_id must be a negative integer, got {0:?}")]
    InvalidChatId(Option<i64>),
    #[error("cannot read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("channel metadata {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },
    #[error("remote call '{operation}' failed: {source}")]
    Client {
        operation: &'static str,
        #[source]
        source: ClientError,
    },
    #[error("remote call '{operation}' did not finish within {deadline:?}")]
    TimedOut {
        operation: &'static str,
        deadline: Duration,
    },
}

/// Identity of a channel created for a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    pub chat_id: i64,
    #[serde(rename = "chat_invite_link")]
    pub invite_link: String,
}

impl ChannelMetadata {
    pub fn path_in(project_dir: &Path) -> PathBuf {
        project_dir.join(METADATA_FILE_NAME)
    }

    /// Read the metadata of `project_dir`, `None` when no channel was recorded yet.
    pub fn load(project_dir: &Path) -> Result<Option<Self>, ProvisionError> {
        let path = Self::path_in(project_dir);
        if !path.exists() {
            return Ok(None);
        }
        let metadata_err = |reason: String| ProvisionError::Metadata {
            path: path.clone(),
            reason,
        };
        let content = fs::read_to_string(&path).map_err(|e| metadata_err(e.to_string()))?;
        let metadata = serde_json::from_str(&content).map_err(|e| metadata_err(e.to_string()))?;
        Ok(Some(metadata))
    }

    /// Write the record, replacing any previous one atomically.
    pub fn save(&self, project_dir: &Path) -> Result<(), ProvisionError> {
        let path = Self::path_in(project_dir);
        let metadata_err = |reason: String| ProvisionError::Metadata {
            path: path.clone(),
            reason,
        };
        let body = serde_json::to_string_pretty(self).map_err(|e| metadata_err(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(project_dir).map_err(|e| metadata_err(e.to_string()))?;
        tmp.write_all(body.as_bytes())
            .map_err(|e| metadata_err(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| metadata_err(e.to_string()))?;
        tmp.persist(&path)
            .map_err(|e| metadata_err(e.error.to_string()))?;
        info!(metadata = %path.display(), chat_id = self.chat_id, "Saved channel metadata");
        Ok(())
    }
}

/// Channel header: first line is the title, the rest is the description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTemplate {
    pub title: String,
    body: String,
}

impl HeaderTemplate {
    pub fn parse(content: &str) -> Self {
        let mut lines = content.split('\n');
        let title = lines.next().unwrap_or_default().trim_end_matches('\r').to_string();
        let body = lines.collect::<Vec<_>>().join("\n");
        Self { title, body }
    }

    /// Use `header_project.txt` from the project folder, else the built-in header.
    pub fn resolve(project_dir: &Path) -> Result<Self, ProvisionError> {
        let path = project_dir.join(HEADER_TEMPLATE_NAME);
        if !path.exists() {
            info!(template = %path.display(), "No header template in project, using default");
            return Ok(Self::parse(DEFAULT_HEADER_TEMPLATE));
        }
        let bytes = fs::read(&path).map_err(|source| ProvisionError::Template {
            path: path.clone(),
            source,
        })?;
        let content = match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    template = %path.display(),
                    error = %e.utf8_error(),
                    "Template is not valid UTF-8, decoding as Latin-1"
                );
                // Latin-1: every byte is its own code point.
                e.into_bytes().iter().map(|&b| b as char).collect()
            }
        };
        Ok(Self::parse(&content))
    }

    pub fn description(&self, invite_link: &str) -> String {
        self.body.replace(INVITE_LINK_PLACEHOLDER, invite_link)
    }
}

/// Decide which chat the plan in `project_dir` uploads into.
///
/// Existing metadata wins over everything. Otherwise a new channel is created when
/// `config.create_new_channel` is set, else `config.chat_id` must be a negative
/// integer.
///
/// Every remote call is bounded by `call_deadline` and is not restarted on
/// timeout: a second `create_channel` would leave a stray channel behind.
pub async fn resolve_channel<C>(
    client: &Arc<C>,
    config: &SenderConfig,
    project_dir: &Path,
    call_deadline: Duration,
) -> Result<i64, ProvisionError>
where
    C: ChannelClient + 'static,
{
    if let Some(metadata) = ChannelMetadata::load(project_dir)? {
        if config.create_new_channel {
            warn!(
                chat_id = metadata.chat_id,
                "Channel metadata found, resuming upload instead of creating a new channel"
            );
        } else {
            info!(chat_id = metadata.chat_id, "Resuming upload into recorded channel");
        }
        return validate_chat_id(Some(metadata.chat_id));
    }

    if config.create_new_channel {
        let runner = BoundedRunner::new(call_deadline, false);
        let metadata = create_channel(client, &runner, config, project_dir).await?;
        return Ok(metadata.chat_id);
    }

    let chat_id = validate_chat_id(config.chat_id)?;
    info!(chat_id, "Using configured channel");
    Ok(chat_id)
}

/// Channel identifiers are negative integers.
pub fn validate_chat_id(chat_id: Option<i64>) -> Result<i64, ProvisionError> {
    match chat_id {
        Some(id) if id < 0 => Ok(id),
        other => {
            error!(chat_id = ?other, "chat_id must be a negative integer");
            Err(ProvisionError::InvalidChatId(other))
        }
    }
}

async fn create_channel<C>(
    client: &Arc<C>,
    runner: &BoundedRunner,
    config: &SenderConfig,
    project_dir: &Path,
) -> Result<ChannelMetadata, ProvisionError>
where
    C: ChannelClient + 'static,
{
    let template = HeaderTemplate::resolve(project_dir)?;
    info!(title = %template.title, "Creating channel");

    let title = template.title.clone();
    let channel = bounded(client, runner, "create_channel", move |c| {
        let title = title.clone();
        async move {
            c.create_channel(title, "channel description".to_string())
                .await
        }
    })
    .await?;
    let chat_id = channel.chat_id;
    let invite_link = bounded(client, runner, "export_invite_link", move |c| async move {
        c.export_invite_link(chat_id).await
    })
    .await?;

    let metadata = ChannelMetadata {
        chat_id,
        invite_link,
    };
    // Recorded before configuring, so a failure below never creates a second channel.
    metadata.save(project_dir)?;

    let description = template.description(&metadata.invite_link);
    bounded(client, runner, "set_description", move |c| {
        let description = description.clone();
        async move { c.set_description(chat_id, description).await }
    })
    .await?;

    let admins = config.admins();
    if !admins.is_empty() {
        info!(chat_id, admins = admins.len(), "Adding channel administrators");
        let members = admins.clone();
        bounded(client, runner, "add_members", move |c| {
            let members = members.clone();
            async move { c.add_members(chat_id, members).await }
        })
        .await?;
        for admin in admins {
            bounded(client, runner, "promote_member", move |c| {
                let admin = admin.clone();
                async move {
                    c.promote_member(chat_id, admin, ChatPrivileges::channel_admin())
                        .await
                }
            })
            .await?;
        }
    }

    info!(chat_id, "Channel created and configured");
    Ok(metadata)
}

/// Run one remote call under `runner`, mapping every way it can fail.
async fn bounded<C, T, F, Fut>(
    client: &Arc<C>,
    runner: &BoundedRunner,
    operation: &'static str,
    call: F,
) -> Result<T, ProvisionError>
where
    C: ChannelClient + 'static,
    F: Fn(Arc<C>) -> Fut,
    Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    T: Send + 'static,
{
    match runner.run(|| call(Arc::clone(client))).await {
        Ok(RunOutcome::Completed(value)) => Ok(value),
        Ok(RunOutcome::TimedOut) => {
            error!(operation, deadline = ?runner.deadline(), "Remote call timed out");
            Err(ProvisionError::TimedOut {
                operation,
                deadline: runner.deadline(),
            })
        }
        Err(RunnerError::Operation(source)) => Err(client_err(operation)(source)),
        Err(other) => Err(client_err(operation)(other.to_string().into())),
    }
}

fn client_err(operation: &'static str) -> impl Fn(ClientError) -> ProvisionError {
    move |source| {
        error!(operation, error = %source, "Remote call failed during provisioning");
        ProvisionError::Client { operation, source }
    }
}
