//! # contract: the remote messaging service as seen by the uploader
//!
//! This module defines a single trait ([`ChannelClient`]) and the plain data types
//! exchanged with it. The dispatcher, the channel provisioning step and the CLI only
//! ever talk to the platform through this trait, so a real HTTP client, a test mock
//! or any other backend can be plugged in.
//!
//! ## Interface
//! - All methods are async and return a boxed [`ClientError`].
//! - Send operations return the platform's acknowledgement as raw JSON; the send log
//!   persists it verbatim.
//! - Every call is potentially slow or hanging. Callers that cannot afford to block
//!   forever go through [`crate::runner::BoundedRunner`].
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockChannelClient` is exported behind the
//!   default `test-export-mocks` feature for integration tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

/// Error type for every remote call.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Raw acknowledgement returned by the platform after a message was sent.
pub type SentMessage = serde_json::Value;

/// The kind of message a local file is sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Photo,
    Document,
}

impl MediaKind {
    /// Classify a file purely by its extension, ignoring case.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "mp4" => MediaKind::Video,
            "mp3" | "aac" => MediaKind::Audio,
            "png" | "jpg" | "jpeg" | "gif" => MediaKind::Photo,
            _ => MediaKind::Document,
        }
    }
}

/// A file to deliver into a chat, with its caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFile {
    pub chat_id: i64,
    pub path: PathBuf,
    pub caption: String,
}

/// The channel returned after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub chat_id: i64,
    pub title: String,
}

/// Administrator rights granted when promoting a chat member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatPrivileges {
    pub can_change_info: bool,
    pub can_post_messages: bool,
    pub can_edit_messages: bool,
    pub can_delete_messages: bool,
    pub can_promote_members: bool,
}

impl ChatPrivileges {
    /// The privilege set given to every configured channel administrator.
    pub fn channel_admin() -> Self {
        Self {
            can_change_info: true,
            can_post_messages: true,
            can_edit_messages: true,
            can_delete_messages: true,
            can_promote_members: true,
        }
    }
}

/// Trait for everything the uploader needs from the messaging platform.
///
/// The implementor owns one long-lived session: [`ChannelClient::connect`] is called
/// once before any other operation of a run and [`ChannelClient::disconnect`] once at
/// the end. Chat identifiers follow the platform convention where channels are
/// negative integers.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Open (or verify) the session.
    async fn connect(&self) -> Result<(), ClientError>;

    /// Close the session.
    async fn disconnect(&self) -> Result<(), ClientError>;

    async fn send_document(&self, req: SendFile) -> Result<SentMessage, ClientError>;

    async fn send_video(&self, req: SendFile) -> Result<SentMessage, ClientError>;

    async fn send_audio(&self, req: SendFile) -> Result<SentMessage, ClientError>;

    async fn send_photo(&self, req: SendFile) -> Result<SentMessage, ClientError>;

    /// Send a sticker, given as a local file or a platform file id.
    async fn send_sticker(&self, chat_id: i64, sticker: String)
        -> Result<SentMessage, ClientError>;

    async fn send_message(&self, chat_id: i64, text: String) -> Result<SentMessage, ClientError>;

    async fn pin_message(&self, chat_id: i64, message_id: i64) -> Result<(), ClientError>;

    /// Create a new channel and return its identity.
    async fn create_channel(&self, title: String, description: String)
        -> Result<Channel, ClientError>;

    /// Export the primary invite link of a chat.
    async fn export_invite_link(&self, chat_id: i64) -> Result<String, ClientError>;

    async fn set_description(&self, chat_id: i64, description: String)
        -> Result<(), ClientError>;

    /// Add users (ids or usernames) to a chat.
    async fn add_members(&self, chat_id: i64, user_ids: Vec<String>) -> Result<(), ClientError>;

    async fn promote_member(
        &self,
        chat_id: i64,
        user_id: String,
        privileges: ChatPrivileges,
    ) -> Result<(), ClientError>;

    async fn delete_messages(&self, chat_id: i64, message_ids: Vec<i64>)
        -> Result<(), ClientError>;

    async fn get_messages(
        &self,
        chat_id: i64,
        message_ids: Vec<i64>,
    ) -> Result<Vec<SentMessage>, ClientError>;

    /// Most recent messages of a chat, newest first.
    async fn get_history(&self, chat_id: i64, limit: u32) -> Result<Vec<SentMessage>, ClientError>;
}

/// Send `req` through the operation matching `kind`.
pub async fn send_by_kind<C>(
    client: &C,
    kind: MediaKind,
    req: SendFile,
) -> Result<SentMessage, ClientError>
where
    C: ChannelClient + ?Sized,
{
    match kind {
        MediaKind::Video => client.send_video(req).await,
        MediaKind::Audio => client.send_audio(req).await,
        MediaKind::Photo => client.send_photo(req).await,
        MediaKind::Document => client.send_document(req).await,
    }
}
