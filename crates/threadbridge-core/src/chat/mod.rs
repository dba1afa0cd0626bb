//! Chat platform capability consumed by the engine.

mod discord;

pub use discord::DiscordChat;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Channel, ChannelId, ChatIdentity, ChatMessage, Thread};
use crate::Result;

/// Threaded chat surface
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Identity the bridge posts as; its messages are never ingested
    fn own_identity(&self) -> &ChatIdentity;

    /// Active threads
    async fn list_threads(&self) -> Result<Vec<Thread>>;

    /// Messages in `thread` strictly newer than `after`, oldest first
    async fn history(&self, thread: ChannelId, after: DateTime<Utc>) -> Result<Vec<ChatMessage>>;

    async fn post(&self, channel: ChannelId, text: &str) -> Result<()>;

    /// Look a channel up by name
    async fn resolve_channel(&self, name: &str) -> Result<Option<Channel>>;
}
