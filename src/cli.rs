///
/// This module implements the CLI of tgsender: command parsing, the async `run`
/// entrypoint, and user-visible output. All upload logic lives in the library
/// modules; this is glue only.
///
/// ## Commands
/// - `plan`: scan a folder and write a fresh upload plan.
/// - `send`: upload every pending row of a plan into the configured channel.
/// - `status`: show how far a plan has progressed.
///
/// For programmatic and integration use, call [`run`] with a constructed [`Cli`].
use crate::catalog::build_catalog;
use crate::dispatch::upload_plan_file;
use crate::load_config::load_config;
use crate::plan::{project_dir_of, WorkPlan, PLAN_FILE_NAME};
use crate::provision::ChannelMetadata;
use crate::telegram::BotApiClient;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for tgsender: bulk upload of files to a Telegram channel.
#[derive(Parser)]
#[clap(
    name = "tgsender",
    version,
    about = "Upload a folder of files to a Telegram channel, one resumable plan at a time"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a folder and write an upload plan listing every file in it
    Plan {
        /// Folder holding the files to upload
        #[clap(long)]
        folder: PathBuf,
        /// Where to write the plan
        #[clap(long, default_value = PLAN_FILE_NAME)]
        output: PathBuf,
        /// Keep the scan order instead of sorting naturally
        #[clap(long)]
        no_sort: bool,
    },
    /// Upload every pending file of a plan
    Send {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Plan to upload
        #[clap(long, default_value = PLAN_FILE_NAME)]
        plan: PathBuf,
    },
    /// Print sent and pending counts of a plan
    Status {
        #[clap(long, default_value = PLAN_FILE_NAME)]
        plan: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Plan {
            folder,
            output,
            no_sort,
        } => {
            tracing::info!(command = "plan", folder = %folder.display(), "Building upload plan");
            let catalog = build_catalog(&folder, !no_sort)?;
            for path in &catalog.errors {
                eprintln!("Cannot read: {}", path.display());
            }
            let plan = WorkPlan::create(output, &catalog.files);
            plan.save()?;
            println!(
                "Plan created: {} ({} files, {} errors)",
                plan.path().display(),
                plan.len(),
                catalog.errors.len()
            );
            Ok(())
        }
        Commands::Send { config, plan } => {
            let config = load_config(config)?;
            tracing::info!(command = "send", plan = %plan.display(), "Starting upload");
            // The Bot API client cannot create channels; fail before connecting.
            let recorded = ChannelMetadata::load(&project_dir_of(&plan))?;
            if config.create_new_channel && recorded.is_none() {
                tracing::error!(command = "send", "Channel creation requested with the Bot API");
                anyhow::bail!(
                    "create_new_channel is set but the Telegram Bot API cannot create channels. \
                     Create the channel by hand, add the bot as administrator, then set \
                     `create_new_channel: 0` and `chat_id` in the config"
                );
            }
            let client = BotApiClient::new_from_env()
                .map_err(|e| anyhow::anyhow!("Failed to construct Telegram client: {e}"))?;
            println!("Upload starting...");
            match upload_plan_file(Arc::new(client), &config, &plan).await {
                Ok(report) => {
                    tracing::info!(command = "send", ?report, "Upload complete");
                    println!(
                        "Upload complete: {} sent, {} missing.",
                        report.log_paths.len(),
                        report.missing.len()
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "send", error = %e, "Upload aborted");
                    eprintln!("[ERROR] Upload aborted: {e}");
                    Err(e.into())
                }
            }
        }
        Commands::Status { plan } => {
            let plan = WorkPlan::load(plan)?;
            println!(
                "{}: {} rows, {} sent, {} pending",
                plan.path().display(),
                plan.len(),
                plan.sent_count(),
                plan.pending_count()
            );
            if let Some((index, item)) = plan.next_unsent() {
                println!("Next: {}/{} {}", index + 1, plan.len(), item.output_path.display());
            }
            Ok(())
        }
    }
}
