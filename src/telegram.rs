#![doc = "Telegram Bot API implementation of the ChannelClient contract."]
//
//! # Telegram Bot API client
//!
//! [`BotApiClient`] maps every [`ChannelClient`] operation onto a Bot API method over
//! HTTPS. Files are streamed from disk as multipart uploads, so large videos are not
//! buffered in memory. Point `TELEGRAM_API_URL` at a self-hosted Bot API server to lift
//! the public server's upload size limit.
//!
//! Bots cannot create channels, invite users or read chat history. Those operations
//! return an error explaining so; create the channel by hand and configure its
//! `chat_id` instead.
//!
//! ## Configuration
//! - `TELEGRAM_BOT_TOKEN` (required)
//! - `TELEGRAM_API_URL` (optional, defaults to `https://api.telegram.org`)

use std::env;
use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

use crate::contract::{Channel, ChannelClient, ChatPrivileges, ClientError, SendFile, SentMessage};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

pub struct BotApiClient {
    http: reqwest::Client,
    endpoint: String,
}

impl BotApiClient {
    /// Every call runs on the runtime of its own bounded attempt, so pooled
    /// connections are never reused across calls.
    pub fn new(token: &str, api_url: Option<&str>) -> Result<Self, ClientError> {
        let api_url = api_url.unwrap_or(DEFAULT_API_URL).trim_end_matches('/');
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{api_url}/bot{token}"),
        })
    }

    pub fn new_from_env() -> Result<Self, ClientError> {
        dotenvy::dotenv().ok(); // loads environment variables from .env if present
        let token = env::var("TELEGRAM_BOT_TOKEN").map_err(|e| {
            tracing::error!(error = ?e, "TELEGRAM_BOT_TOKEN missing in environment");
            e
        })?;
        let api_url = env::var("TELEGRAM_API_URL").ok();
        tracing::info!(
            api_url = api_url.as_deref().unwrap_or(DEFAULT_API_URL),
            "Initialized BotApiClient from environment"
        );
        Self::new(&token, api_url.as_deref())
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.endpoint)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        tracing::debug!(method, "Calling Bot API");
        let response = self.http.post(self.url(method)).json(&params).send().await?;
        unwrap_result(method, response.json::<Value>().await?)
    }

    async fn upload(
        &self,
        method: &str,
        field: &'static str,
        req: SendFile,
        extra: &[(&'static str, String)],
    ) -> Result<SentMessage, ClientError> {
        tracing::info!(
            method,
            chat_id = req.chat_id,
            file = %req.path.display(),
            "Uploading file"
        );
        let mut form = Form::new()
            .text("chat_id", req.chat_id.to_string())
            .part(field, file_part(&req.path).await?);
        if !req.caption.is_empty() {
            form = form.text("caption", req.caption);
        }
        for (name, value) in extra {
            form = form.text(*name, value.clone());
        }
        let response = self.http.post(self.url(method)).multipart(form).send().await?;
        let result = unwrap_result(method, response.json::<Value>().await?)?;
        tracing::info!(method, message_id = ?result.get("message_id"), "File uploaded");
        Ok(result)
    }
}

async fn file_part(path: &Path) -> Result<Part, ClientError> {
    let file = tokio::fs::File::open(path).await?;
    let length = file.metadata().await?.len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    Ok(Part::stream_with_length(file, length).file_name(name))
}

/// Bot API replies are `{"ok": bool, "result": ..., "description": ...}`.
fn unwrap_result(method: &str, body: Value) -> Result<Value, ClientError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body.get("result").cloned().unwrap_or(Value::Null));
    }
    let description = body
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    tracing::error!(method, %description, "Bot API call failed");
    Err(format!("{method} failed: {description}").into())
}

fn unsupported(operation: &str) -> ClientError {
    format!("{operation} is not available to bots through the Bot API").into()
}

fn numeric_user_id(user_id: &str) -> Result<i64, ClientError> {
    user_id
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("bots can only promote numeric user ids, got '{user_id}'").into())
}

#[async_trait]
impl ChannelClient for BotApiClient {
    async fn connect(&self) -> Result<(), ClientError> {
        tracing::warn!("Ensuring connection...");
        let me = self.call("getMe", json!({})).await?;
        tracing::info!(bot = ?me.get("username"), "Connected to Bot API");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        tracing::debug!("Bot API is stateless, nothing to close");
        Ok(())
    }

    async fn send_document(&self, req: SendFile) -> Result<SentMessage, ClientError> {
        self.upload("sendDocument", "document", req, &[]).await
    }

    async fn send_video(&self, req: SendFile) -> Result<SentMessage, ClientError> {
        self.upload(
            "sendVideo",
            "video",
            req,
            &[("supports_streaming", "true".to_string())],
        )
        .await
    }

    async fn send_audio(&self, req: SendFile) -> Result<SentMessage, ClientError> {
        self.upload("sendAudio", "audio", req, &[]).await
    }

    async fn send_photo(&self, req: SendFile) -> Result<SentMessage, ClientError> {
        self.upload("sendPhoto", "photo", req, &[]).await
    }

    async fn send_sticker(
        &self,
        chat_id: i64,
        sticker: String,
    ) -> Result<SentMessage, ClientError> {
        let path = Path::new(&sticker);
        if path.is_file() {
            let form = Form::new()
                .text("chat_id", chat_id.to_string())
                .part("sticker", file_part(path).await?);
            let response = self
                .http
                .post(self.url("sendSticker"))
                .multipart(form)
                .send()
                .await?;
            return unwrap_result("sendSticker", response.json::<Value>().await?);
        }
        self.call("sendSticker", json!({ "chat_id": chat_id, "sticker": sticker }))
            .await
    }

    async fn send_message(&self, chat_id: i64, text: String) -> Result<SentMessage, ClientError> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "link_preview_options": { "is_disabled": true },
            }),
        )
        .await
    }

    async fn pin_message(&self, chat_id: i64, message_id: i64) -> Result<(), ClientError> {
        self.call(
            "pinChatMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn create_channel(
        &self,
        _title: String,
        _description: String,
    ) -> Result<Channel, ClientError> {
        Err(unsupported("create_channel"))
    }

    async fn export_invite_link(&self, chat_id: i64) -> Result<String, ClientError> {
        let link = self
            .call("exportChatInviteLink", json!({ "chat_id": chat_id }))
            .await?;
        link.as_str()
            .map(str::to_string)
            .ok_or_else(|| "exportChatInviteLink returned no link".into())
    }

    async fn set_description(&self, chat_id: i64, description: String) -> Result<(), ClientError> {
        self.call(
            "setChatDescription",
            json!({ "chat_id": chat_id, "description": description }),
        )
        .await?;
        Ok(())
    }

    async fn add_members(&self, _chat_id: i64, _user_ids: Vec<String>) -> Result<(), ClientError> {
        Err(unsupported("add_members"))
    }

    async fn promote_member(
        &self,
        chat_id: i64,
        user_id: String,
        privileges: ChatPrivileges,
    ) -> Result<(), ClientError> {
        let user_id = numeric_user_id(&user_id)?;
        self.call(
            "promoteChatMember",
            json!({
                "chat_id": chat_id,
                "user_id": user_id,
                "can_change_info": privileges.can_change_info,
                "can_post_messages": privileges.can_post_messages,
                "can_edit_messages": privileges.can_edit_messages,
                "can_delete_messages": privileges.can_delete_messages,
                "can_promote_members": privileges.can_promote_members,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_messages(
        &self,
        chat_id: i64,
        message_ids: Vec<i64>,
    ) -> Result<(), ClientError> {
        self.call(
            "deleteMessages",
            json!({ "chat_id": chat_id, "message_ids": message_ids }),
        )
        .await?;
        Ok(())
    }

    async fn get_messages(
        &self,
        _chat_id: i64,
        _message_ids: Vec<i64>,
    ) -> Result<Vec<SentMessage>, ClientError> {
        Err(unsupported("get_messages"))
    }

    async fn get_history(
        &self,
        _chat_id: i64,
        _limit: u32,
    ) -> Result<Vec<SentMessage>, ClientError> {
        Err(unsupported("get_history"))
    }
}
