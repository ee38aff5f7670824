#![doc = "tgsender: resumable bulk upload of local files to a Telegram channel."]

//! A folder is scanned into an upload plan (a CSV table), then the plan is walked
//! row by row: every file is sent with its caption, a JSON receipt is written, and
//! the row is flagged as sent. An interrupted run picks up at the first unsent row.
//!
//! # Modules
//! - [`catalog`]: recursive, naturally sorted folder scan
//! - [`plan`]: the persisted upload plan
//! - [`runner`]: deadline-bounded execution with kill and restart
//! - [`dispatch`]: the upload loop
//! - [`provision`]: creating or reusing the destination channel
//! - [`contract`]: the messaging platform as a mockable trait; [`telegram`] implements it

pub mod catalog;
pub mod cli;
pub mod config;
pub mod contract;
pub mod dispatch;
pub mod load_config;
pub mod plan;
pub mod provision;
pub mod runner;
pub mod send_log;
pub mod telegram;

pub use cli::{run, Cli, Commands};
