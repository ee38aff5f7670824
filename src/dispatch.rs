//! # dispatch: the upload control loop
//!
//! [`upload_plan`] drives one run over a persisted plan:
//!
//! ```text
//! AwaitingChannel -> Sending -> Advancing -> Sending -> ... -> Done
//!                       ^  |
//!                       +--+ Retrying (after a failed attempt and a cooldown)
//! ```
//!
//! - `AwaitingChannel`: the session is opened and the destination channel resolved
//!   (see [`crate::provision`]). Each of these remote calls is bounded by the send
//!   deadline without restarts. Failures here are fatal.
//! - `Sending`: the next unsent row is classified by extension and sent through a
//!   [`BoundedRunner`] with restarts enabled, so a wedged upload is killed and started
//!   again. Any other failure is echoed, followed by a fixed cooldown, and the same row
//!   is tried again, indefinitely. A row whose file is gone from disk is skipped and
//!   left unsent.
//! - `Advancing`: the receipt is written under `log_sent/`, then the row is marked
//!   sent. A crash between the two re-sends the row on the next run (at-least-once).
//! - `Done`: the session is closed and the receipts of this run are returned.
//!
//! Rows are processed strictly one at a time, in stored order.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{SenderConfig, DEFAULT_RETRY_COOLDOWN_SECS, DEFAULT_TIME_LIMIT_MINUTES};
use crate::contract::{send_by_kind, ChannelClient, ClientError, MediaKind, SendFile, SentMessage};
use crate::plan::{PlanError, WorkItem, WorkPlan};
use crate::provision::{resolve_channel, ProvisionError};
use crate::runner::{BoundedRunner, RunOutcome, RunnerError};
use crate::send_log::{log_file_path, write_send_log};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error("cannot open session: {0}")]
    Connection(#[source] ClientError),
    #[error("cannot write send log {path}: {source}")]
    SendLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// States of a run, see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    AwaitingChannel,
    Sending,
    Retrying,
    Advancing,
    Done,
}

/// Timing knobs of the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Wall-clock limit of one send attempt.
    pub send_deadline: Duration,
    /// Pause after a failed attempt before trying the same row again.
    pub retry_cooldown: Duration,
    /// Cap on consecutive timed-out attempts of one send. `None` retries forever.
    pub max_timeouts: Option<u32>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_deadline: Duration::from_secs(DEFAULT_TIME_LIMIT_MINUTES * 60),
            retry_cooldown: Duration::from_secs(DEFAULT_RETRY_COOLDOWN_SECS),
            max_timeouts: None,
        }
    }
}

impl From<&SenderConfig> for DispatchConfig {
    fn from(config: &SenderConfig) -> Self {
        Self {
            send_deadline: config.send_deadline(),
            retry_cooldown: config.retry_cooldown(),
            max_timeouts: None,
        }
    }
}

/// What a run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub chat_id: i64,
    /// Receipts written during this run, in send order.
    pub log_paths: Vec<PathBuf>,
    /// Rows skipped because their file was missing.
    pub missing: Vec<PathBuf>,
    /// Failed attempts that were retried after a cooldown.
    pub retries: u32,
}

/// Full run: open the session, resolve the channel, send every pending row.
pub async fn upload_plan<C>(
    client: Arc<C>,
    config: &SenderConfig,
    plan: &mut WorkPlan,
    dispatch: &DispatchConfig,
) -> Result<DispatchReport, DispatchError>
where
    C: ChannelClient + 'static,
{
    let mut state = DispatchState::AwaitingChannel;
    debug!(?state, "Dispatcher starting");

    let session = BoundedRunner::new(dispatch.send_deadline, false);
    let connected = session
        .run(|| {
            let client = Arc::clone(&client);
            async move { client.connect().await }
        })
        .await;
    let connected: Result<(), ClientError> = match connected {
        Ok(RunOutcome::Completed(())) => Ok(()),
        Ok(RunOutcome::TimedOut) => Err("connect timed out".into()),
        Err(RunnerError::Operation(e)) => Err(e),
        Err(other) => Err(other.to_string().into()),
    };
    connected.map_err(|e| {
        error!(error = %e, "Failed to open session");
        DispatchError::Connection(e)
    })?;

    let chat_id = resolve_channel(
        &client,
        config,
        &plan.project_dir(),
        dispatch.send_deadline,
    )
    .await?;
    state = DispatchState::Sending;
    debug!(?state, chat_id, "Channel resolved");

    let report = Dispatcher::new(client.clone(), chat_id, dispatch.clone())
        .run(plan)
        .await?;

    let closed = session
        .run(|| {
            let client = Arc::clone(&client);
            async move { client.disconnect().await }
        })
        .await;
    match closed {
        Ok(RunOutcome::Completed(())) => {}
        Ok(RunOutcome::TimedOut) => warn!("Timed out closing the session"),
        Err(e) => warn!(error = %e, "Failed to close session cleanly"),
    }
    state = DispatchState::Done;
    info!(
        ?state,
        sent = report.log_paths.len(),
        missing = report.missing.len(),
        retries = report.retries,
        "Upload run finished"
    );
    Ok(report)
}

/// Sends the pending rows of a plan into one resolved chat.
pub struct Dispatcher<C> {
    client: Arc<C>,
    chat_id: i64,
    config: DispatchConfig,
}

impl<C> Dispatcher<C>
where
    C: ChannelClient + 'static,
{
    pub fn new(client: Arc<C>, chat_id: i64, config: DispatchConfig) -> Self {
        Self {
            client,
            chat_id,
            config,
        }
    }

    /// Loop until no unsent row remains after the cursor.
    pub async fn run(&self, plan: &mut WorkPlan) -> Result<DispatchReport, DispatchError> {
        let project_dir = plan.project_dir();
        let total = plan.len();
        let mut report = DispatchReport {
            chat_id: self.chat_id,
            ..Default::default()
        };
        let mut cursor = 0;

        info!(
            chat_id = self.chat_id,
            total,
            pending = plan.pending_count(),
            "Sending plan"
        );

        while let Some((index, item)) = plan.next_unsent_from(cursor) {
            cursor = index + 1;

            let Some(ack) = self.send_with_retry(index, total, &item, &mut report).await else {
                report.missing.push(item.source_path.clone());
                continue;
            };

            debug!(state = ?DispatchState::Advancing, row = index, "Recording send");
            let log_path = log_file_path(&project_dir, &item.source_path, index);
            write_send_log(ack, &item.source_path, &log_path).map_err(|source| {
                error!(log = %log_path.display(), error = %source, "Failed to write send log");
                DispatchError::SendLog {
                    path: log_path.clone(),
                    source,
                }
            })?;
            plan.mark_sent(&item.output_path)?;
            report.log_paths.push(log_path);
        }

        debug!(state = ?DispatchState::Done, "Plan exhausted");
        Ok(report)
    }

    /// Send one row until it goes through. `None` when its file is missing.
    async fn send_with_retry(
        &self,
        index: usize,
        total: usize,
        item: &WorkItem,
        report: &mut DispatchReport,
    ) -> Option<SentMessage> {
        let kind = MediaKind::from_path(&item.source_path);
        let name = item
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.output_path.display().to_string());

        loop {
            if !item.source_path.exists() {
                error!(
                    row = index,
                    file = %item.source_path.display(),
                    "File does not exist, skipping"
                );
                eprintln!("file not exist. {name}");
                return None;
            }

            println!("{}/{} Uploading: {}", index + 1, total, name);
            info!(row = index, total, file = %name, ?kind, "Uploading");

            match self.attempt(kind, item).await {
                Ok(ack) => return Some(ack),
                Err(reason) => {
                    report.retries += 1;
                    eprintln!("{reason}");
                    eprintln!("\nError. Trying again...");
                    warn!(
                        state = ?DispatchState::Retrying,
                        row = index,
                        error = %reason,
                        cooldown_secs = self.config.retry_cooldown.as_secs_f64(),
                        "Send failed, retrying after cooldown"
                    );
                    tokio::time::sleep(self.config.retry_cooldown).await;
                }
            }
        }
    }

    async fn attempt(&self, kind: MediaKind, item: &WorkItem) -> Result<SentMessage, String> {
        let mut runner = BoundedRunner::new(self.config.send_deadline, true);
        if let Some(max) = self.config.max_timeouts {
            runner = runner.max_attempts(max);
        }

        let client = Arc::clone(&self.client);
        let request = SendFile {
            chat_id: self.chat_id,
            path: item.source_path.clone(),
            caption: item.caption.clone(),
        };

        let outcome = runner
            .run(move || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { send_by_kind(client.as_ref(), kind, request).await }
            })
            .await
            .map_err(|e| e.to_string())?;

        match outcome {
            RunOutcome::Completed(ack) => Ok(ack),
            RunOutcome::TimedOut => Err("send timed out".to_string()),
        }
    }
}

/// Load the plan at `plan_path` and run it.
pub async fn upload_plan_file<C>(
    client: Arc<C>,
    config: &SenderConfig,
    plan_path: &Path,
) -> Result<DispatchReport, DispatchError>
where
    C: ChannelClient + 'static,
{
    let mut plan = WorkPlan::load(plan_path)?;
    upload_plan(client, config, &mut plan, &DispatchConfig::from(config)).await
}
