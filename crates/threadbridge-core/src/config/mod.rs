//! Runtime configuration read from the environment.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::util::{is_http_url, parse_timestamp};
use crate::{Error, Result};

const DEFAULT_CHAT_API_URL: &str = "https://discord.com/api/v10";
const DEFAULT_FIRST_SYNC_EPOCH: &str = "2000-01-01T00:00:00Z";
const DEFAULT_CONTROL_ADDR: &str = "127.0.0.1:7878";

#[derive(Clone)]
pub struct BridgeConfig {
    pub ticket_store_url: String,
    pub ticket_store_api_key: String,
    pub chat_api_url: String,
    pub chat_bot_token: String,
    pub chat_guild_id: u64,
    /// Name of the ticket custom field holding the sync token
    pub sync_field_name: String,
    /// Name of the user custom field holding the linked chat identity
    pub chat_identity_field_name: String,
    pub sync_interval: Duration,
    pub lifecycle_interval: Duration,
    pub http_timeout: Duration,
    /// `last_sync` given to tickets that were never synchronized
    pub first_sync_epoch: DateTime<Utc>,
    pub dusty_days: u32,
    pub recycle_days: u32,
    pub excluded_priorities: Vec<String>,
    pub admin_channel: String,
    pub default_team: String,
    /// Login used for notes whose chat author has no ticket-store account
    pub system_login: Option<String>,
    pub new_status_id: u64,
    /// Tracker name -> notification channel name
    pub tracker_channels: BTreeMap<String, String>,
    /// Tracker name -> owning team name
    pub tracker_teams: BTreeMap<String, String>,
    /// Where a running bridge accepts on-demand sync requests
    pub control_addr: SocketAddr,
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BridgeConfig")
            .field("ticket_store_url", &self.ticket_store_url)
            .field("ticket_store_api_key", &"[REDACTED]")
            .field("chat_api_url", &self.chat_api_url)
            .field("chat_bot_token", &"[REDACTED]")
            .field("chat_guild_id", &self.chat_guild_id)
            .field("sync_field_name", &self.sync_field_name)
            .field("chat_identity_field_name", &self.chat_identity_field_name)
            .field("sync_interval", &self.sync_interval)
            .field("lifecycle_interval", &self.lifecycle_interval)
            .field("http_timeout", &self.http_timeout)
            .field("first_sync_epoch", &self.first_sync_epoch)
            .field("dusty_days", &self.dusty_days)
            .field("recycle_days", &self.recycle_days)
            .field("excluded_priorities", &self.excluded_priorities)
            .field("admin_channel", &self.admin_channel)
            .field("default_team", &self.default_team)
            .field("system_login", &self.system_login)
            .field("new_status_id", &self.new_status_id)
            .field("tracker_channels", &self.tracker_channels)
            .field("tracker_teams", &self.tracker_teams)
            .field("control_addr", &self.control_addr)
            .finish()
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let ticket_store_url = required_trimmed(&lookup, "TICKET_STORE_URL")?;
        if !is_http_url(&ticket_store_url) {
            return Err(invalid("TICKET_STORE_URL must start with http:// or https://"));
        }
        let ticket_store_api_key = required_trimmed(&lookup, "TICKET_STORE_API_KEY")?;

        let chat_api_url = value_or_default(&lookup, "CHAT_API_URL", DEFAULT_CHAT_API_URL);
        if !is_http_url(&chat_api_url) {
            return Err(invalid("CHAT_API_URL must start with http:// or https://"));
        }
        let chat_bot_token = required_trimmed(&lookup, "CHAT_BOT_TOKEN")?;
        let chat_guild_id = required_trimmed(&lookup, "CHAT_GUILD_ID")?
            .parse::<u64>()
            .map_err(|_| invalid("CHAT_GUILD_ID must be a numeric id"))?;

        let sync_field_name = value_or_default(&lookup, "SYNC_FIELD_NAME", "Discord Thread");
        let chat_identity_field_name =
            value_or_default(&lookup, "CHAT_IDENTITY_FIELD_NAME", "Discord ID");

        let sync_interval_secs = parse_in_range(&lookup, "SYNC_INTERVAL_SECS", 300, 30..=86_400)?;
        let lifecycle_interval_secs =
            parse_in_range(&lookup, "LIFECYCLE_INTERVAL_SECS", 86_400, 300..=604_800)?;
        let http_timeout_secs = parse_in_range(&lookup, "HTTP_TIMEOUT_SECS", 15, 1..=300)?;

        let raw_epoch = value_or_default(&lookup, "SYNC_FIRST_EPOCH", DEFAULT_FIRST_SYNC_EPOCH);
        let first_sync_epoch = parse_timestamp(&raw_epoch)
            .filter(|epoch| epoch.timestamp() > 0)
            .ok_or_else(|| {
                invalid("SYNC_FIRST_EPOCH must be an RFC 3339 timestamp after 1970-01-01")
            })?;

        let dusty_days = u32::try_from(parse_in_range(&lookup, "DUSTY_DAYS", 7, 1..=365)?)
            .map_err(|_| invalid("DUSTY_DAYS out of range"))?;
        let recycle_days = u32::try_from(parse_in_range(
            &lookup,
            "RECYCLE_DAYS",
            u64::from(dusty_days) * 3,
            1..=1_095,
        )?)
        .map_err(|_| invalid("RECYCLE_DAYS out of range"))?;
        if recycle_days <= dusty_days {
            return Err(invalid("RECYCLE_DAYS must be greater than DUSTY_DAYS"));
        }

        let excluded_priorities = value_or_default(&lookup, "EXCLUDED_PRIORITIES", "Low")
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();

        let new_status_id = value_or_default(&lookup, "NEW_STATUS_ID", "1")
            .parse::<u64>()
            .map_err(|_| invalid("NEW_STATUS_ID must be a numeric id"))?;

        let control_addr = value_or_default(&lookup, "CONTROL_ADDR", DEFAULT_CONTROL_ADDR)
            .parse::<SocketAddr>()
            .map_err(|_| invalid("CONTROL_ADDR must be a socket address like 127.0.0.1:7878"))?;
        if !control_addr.ip().is_loopback() {
            tracing::warn!(%control_addr, "Control endpoint is reachable beyond this host");
        }

        Ok(Self {
            ticket_store_url: ticket_store_url.trim_end_matches('/').to_string(),
            ticket_store_api_key,
            chat_api_url: chat_api_url.trim_end_matches('/').to_string(),
            chat_bot_token,
            chat_guild_id,
            sync_field_name,
            chat_identity_field_name,
            sync_interval: Duration::from_secs(sync_interval_secs),
            lifecycle_interval: Duration::from_secs(lifecycle_interval_secs),
            http_timeout: Duration::from_secs(http_timeout_secs),
            first_sync_epoch,
            dusty_days,
            recycle_days,
            excluded_priorities,
            admin_channel: value_or_default(&lookup, "ADMIN_CHANNEL", "admin"),
            default_team: value_or_default(&lookup, "DEFAULT_TEAM", "users"),
            system_login: optional_trimmed(&lookup, "SYSTEM_LOGIN"),
            new_status_id,
            tracker_channels: parse_mapping(&lookup, "TRACKER_CHANNELS")?,
            tracker_teams: parse_mapping(&lookup, "TRACKER_TEAMS")?,
            control_addr,
        })
    }
}

fn invalid(message: &str) -> Error {
    Error::Config(message.to_string())
}

fn parse_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64> {
    let message = || {
        Error::Config(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = match optional_trimmed(lookup, name) {
        Some(raw) => raw.parse::<u64>().map_err(|_| message())?,
        None => default,
    };
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(message())
    }
}

/// Parse `Key=value,Other Key=other` into a map.
fn parse_mapping(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<BTreeMap<String, String>> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(BTreeMap::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .map(|(key, value)| (key.trim(), value.trim()))
                .filter(|(key, value)| !key.is_empty() && !value.is_empty())
                .ok_or_else(|| {
                    Error::Config(format!("{name} entries must look like Name=value, got '{pair}'"))
                })?;
            Ok::<_, Error>((key.to_string(), value.to_string()))
        })
        .collect()
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    optional_trimmed(lookup, name)
        .ok_or_else(|| Error::Config(format!("Missing required environment variable: {name}")))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
