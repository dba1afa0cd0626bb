//! Discord REST client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;

use super::ChatPlatform;
use crate::models::{Channel, ChannelId, ChatIdentity, ChatMessage, Thread};
use crate::util::{compact_text, is_http_url, normalize_text_option};
use crate::{Error, Result};

/// First second of 2015, the zero point of Discord snowflakes (unix ms)
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;
const MESSAGE_PAGE_SIZE: usize = 100;
/// Longest message body Discord accepts
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Message types that carry user text (default and reply)
const TEXT_MESSAGE_TYPES: [u8; 2] = [0, 19];

#[derive(Clone)]
pub struct DiscordChat {
    api_url: String,
    token: String,
    guild_id: u64,
    client: reqwest::Client,
    identity: ChatIdentity,
}

impl std::fmt::Debug for DiscordChat {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DiscordChat")
            .field("api_url", &self.api_url)
            .field("token", &"[REDACTED]")
            .field("guild_id", &self.guild_id)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl DiscordChat {
    /// Build the client and look up the bot's own identity.
    pub async fn connect(
        api_url: impl Into<String>,
        token: impl Into<String>,
        guild_id: u64,
        timeout: Duration,
    ) -> Result<Self> {
        let api_url = normalize_text_option(Some(api_url.into()))
            .filter(|url| is_http_url(url))
            .ok_or_else(|| {
                Error::Config("chat API URL must include http:// or https://".to_string())
            })?;
        let token = normalize_text_option(Some(token.into()))
            .ok_or_else(|| Error::Config("chat bot token must not be empty".to_string()))?;

        let mut chat = Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            guild_id,
            client: reqwest::Client::builder().timeout(timeout).build()?,
            identity: ChatIdentity::new(0, ""),
        };
        let me: UserPayload = chat.fetch(chat.request(Method::GET, "/users/@me")).await?;
        chat.identity = me.into();
        tracing::info!(user = %chat.identity.name, "Connected to chat platform");
        Ok(chat)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.api_url))
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(status, compact_text(&body)));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ChatPlatform for DiscordChat {
    fn own_identity(&self) -> &ChatIdentity {
        &self.identity
    }

    async fn list_threads(&self) -> Result<Vec<Thread>> {
        let payload: ActiveThreadsPayload = self
            .fetch(self.request(
                Method::GET,
                &format!("/guilds/{}/threads/active", self.guild_id),
            ))
            .await?;
        Ok(payload
            .threads
            .into_iter()
            .map(|thread| Thread {
                id: ChannelId(thread.id),
                name: thread.name.unwrap_or_default(),
                parent_id: thread.parent_id.map(ChannelId),
            })
            .collect())
    }

    async fn history(&self, thread: ChannelId, after: DateTime<Utc>) -> Result<Vec<ChatMessage>> {
        let mut cursor = snowflake_before(after);
        let mut messages = Vec::new();
        loop {
            let page: Vec<MessagePayload> = self
                .fetch(
                    self.request(Method::GET, &format!("/channels/{thread}/messages"))
                        .query(&[("after", cursor), ("limit", MESSAGE_PAGE_SIZE as u64)]),
                )
                .await?;
            let fetched = page.len();
            cursor = page.iter().map(|message| message.id).max().unwrap_or(cursor);
            messages.extend(
                page.into_iter()
                    .filter(|message| TEXT_MESSAGE_TYPES.contains(&message.kind))
                    .map(ChatMessage::from),
            );
            if fetched < MESSAGE_PAGE_SIZE {
                break;
            }
        }

        messages.retain(|message| message.created_at > after);
        messages.sort_by_key(|message| (message.created_at, message.id));
        Ok(messages)
    }

    async fn post(&self, channel: ChannelId, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("chat messages cannot be empty".to_string()));
        }
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let _: serde_json::Value = self
                .fetch(
                    self.request(Method::POST, &format!("/channels/{channel}/messages"))
                        .json(&serde_json::json!({ "content": chunk })),
                )
                .await?;
        }
        Ok(())
    }

    async fn resolve_channel(&self, name: &str) -> Result<Option<Channel>> {
        let wanted = name.trim().trim_start_matches('#');
        let channels: Vec<ChannelPayload> = self
            .fetch(self.request(Method::GET, &format!("/guilds/{}/channels", self.guild_id)))
            .await?;
        Ok(channels
            .into_iter()
            .find(|channel| {
                channel
                    .name
                    .as_deref()
                    .is_some_and(|candidate| candidate.eq_ignore_ascii_case(wanted))
            })
            .map(|channel| Channel {
                id: ChannelId(channel.id),
                name: channel.name.unwrap_or_default(),
            }))
    }
}

/// Largest snowflake minted strictly before `at`; messages sent at or after
/// `at` sort above it. Times before the platform epoch clamp to zero.
fn snowflake_before(at: DateTime<Utc>) -> u64 {
    let millis = at.timestamp_millis().saturating_sub(DISCORD_EPOCH_MS);
    u64::try_from(millis).map_or(0, |millis| (millis << 22).saturating_sub(1))
}

/// Split text into chunks of at most `limit` chars, preferring line breaks.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && current_len > 0 {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let mut chars = line.chars().peekable();
            while chars.peek().is_some() {
                let piece: String = chars.by_ref().take(limit).collect();
                if chars.peek().is_some() {
                    chunks.push(piece);
                } else {
                    current_len = piece.chars().count();
                    current = piece;
                }
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

fn snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.parse().map_err(de::Error::custom),
    }
}

fn optional_snowflake<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "snowflake")] u64);
    Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(value)| value))
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(deserialize_with = "snowflake")]
    id: u64,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

impl From<UserPayload> for ChatIdentity {
    fn from(user: UserPayload) -> Self {
        Self {
            id: Some(user.id),
            name: user.username,
            display_name: user.global_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    url: String,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(deserialize_with = "snowflake")]
    id: u64,
    #[serde(rename = "type", default)]
    kind: u8,
    #[serde(default)]
    content: String,
    timestamp: DateTime<Utc>,
    author: UserPayload,
    #[serde(default)]
    attachments: Vec<AttachmentPayload>,
}

impl From<MessagePayload> for ChatMessage {
    fn from(message: MessagePayload) -> Self {
        Self {
            id: message.id,
            author: message.author.into(),
            content: message.content,
            created_at: message.timestamp,
            attachments: message
                .attachments
                .into_iter()
                .map(|attachment| attachment.url)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActiveThreadsPayload {
    #[serde(default)]
    threads: Vec<ChannelPayload>,
}

#[derive(Debug, Deserialize)]
struct ChannelPayload {
    #[serde(deserialize_with = "snowflake")]
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "optional_snowflake")]
    parent_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn snowflake_before_clamps_pre_epoch_times() {
        let early = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(snowflake_before(early), 0);
    }

    #[test]
    fn snowflake_before_orders_below_same_millisecond() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let millis = u64::try_from(at.timestamp_millis() - DISCORD_EPOCH_MS).unwrap();
        let first_id_at = millis << 22;
        assert_eq!(snowflake_before(at), first_id_at - 1);
    }

    #[test]
    fn split_message_keeps_short_text_whole() {
        assert_eq!(split_message("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn split_message_breaks_on_lines_then_chars() {
        let chunks = split_message("aaaa\nbbbb\ncc", 6);
        assert_eq!(chunks, vec!["aaaa\n", "bbbb\n", "cc"]);

        let chunks = split_message("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 4));
    }

    #[test]
    fn message_payload_maps_to_chat_message() {
        let json = r#"{
            "id": "1213",
            "type": 0,
            "content": "printer still smoking",
            "timestamp": "2024-03-01T10:00:00.123000+00:00",
            "author": {"id": "77", "username": "sam", "global_name": "Sam"},
            "attachments": [{"url": "https://cdn.example.com/a.png", "id": "5"}]
        }"#;
        let message: ChatMessage = serde_json::from_str::<MessagePayload>(json).unwrap().into();
        assert_eq!(message.id, 1213);
        assert_eq!(message.author.id, Some(77));
        assert_eq!(message.author.display(), "Sam");
        assert_eq!(message.attachments, vec!["https://cdn.example.com/a.png"]);
    }

    #[test]
    fn thread_payload_accepts_missing_parent() {
        let json = r#"{"threads": [{"id": "10", "name": "Ticket #42"}, {"id": "11", "name": "x", "parent_id": "3"}]}"#;
        let payload: ActiveThreadsPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.threads[0].parent_id, None);
        assert_eq!(payload.threads[1].parent_id, Some(3));
    }
}
