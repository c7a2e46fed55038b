//! Narrow contracts for the chat platform the bridge serves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform error: {0}")]
    Internal(String),
}

/// Colour used for failure attachments.
pub const COLOR_DANGER: &str = "#FF0000";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub text: String,
    pub color: String,
}

impl Attachment {
    pub fn danger(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: COLOR_DANGER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub channel_id: String,
    pub root_id: String,
    pub message: String,
}

impl Post {
    pub fn reply(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        root_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            root_id: root_id.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub username: String,
}

/// Outbound messages on behalf of the bot or a user.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Bot DM to `user_id`.
    async fn direct_message(
        &self,
        user_id: &str,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<(), PlatformError>;

    async fn create_post(&self, post: Post) -> Result<Post, PlatformError>;

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Result<(), PlatformError>;
}

/// Lookups and real-time events on the chat platform.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, PlatformError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<ChatUser>, PlatformError>;

    async fn publish_event(
        &self,
        event: &str,
        payload: Value,
        user_id: &str,
    ) -> Result<(), PlatformError>;
}

/// Platform used by the standalone binary: messages and events are written
/// to the log, lookups find nothing.
#[derive(Debug, Default)]
pub struct LoggingPlatform;

#[async_trait]
impl Messenger for LoggingPlatform {
    async fn direct_message(
        &self,
        user_id: &str,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<(), PlatformError> {
        info!(user_id, text, attachments = attachments.len(), "direct message");
        Ok(())
    }

    async fn create_post(&self, mut post: Post) -> Result<Post, PlatformError> {
        post.id = uuid::Uuid::new_v4().simple().to_string();
        info!(post_id = %post.id, channel_id = %post.channel_id, message = %post.message, "post created");
        Ok(post)
    }

    async fn send_ephemeral_post(&self, user_id: &str, post: Post) -> Result<(), PlatformError> {
        info!(user_id, message = %post.message, "ephemeral post");
        Ok(())
    }
}

#[async_trait]
impl PlatformApi for LoggingPlatform {
    async fn get_post(&self, _post_id: &str) -> Result<Option<Post>, PlatformError> {
        Ok(None)
    }

    async fn get_user(&self, _user_id: &str) -> Result<Option<ChatUser>, PlatformError> {
        Ok(None)
    }

    async fn publish_event(
        &self,
        event: &str,
        payload: Value,
        user_id: &str,
    ) -> Result<(), PlatformError> {
        info!(event, user_id, %payload, "event published");
        Ok(())
    }
}
