//! Persisted "last synchronized" marker for a ticket/thread pair.
//!
//! The token lives in a ticket custom field as `<channel_id>|<timestamp>`.
//! Older deployments stored a bare timestamp; those decode as legacy records
//! with an unset channel.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{ChannelId, TicketId};
use crate::util::parse_timestamp;

const SEPARATOR: char = '|';

/// Last synchronization point of one ticket with one thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRecord {
    pub ticket_id: TicketId,
    pub channel_id: ChannelId,
    pub last_sync: DateTime<Utc>,
}

/// How a stored record relates to the thread being synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMatch {
    /// Record belongs to this thread
    Valid(SyncRecord),
    /// Legacy record, now bound to this thread
    Repaired(SyncRecord),
    /// Record belongs to a different thread
    Mismatch { recorded: ChannelId },
}

impl SyncRecord {
    pub const fn new(ticket_id: TicketId, channel_id: ChannelId, last_sync: DateTime<Utc>) -> Self {
        Self {
            ticket_id,
            channel_id,
            last_sync,
        }
    }

    /// Record written before channel ids were tracked
    #[must_use]
    pub const fn is_legacy(&self) -> bool {
        self.channel_id.is_unset()
    }

    #[must_use]
    pub const fn with_last_sync(self, last_sync: DateTime<Utc>) -> Self {
        Self { last_sync, ..self }
    }

    /// Check this record against `thread_id`, adopting the thread when legacy.
    #[must_use]
    pub fn match_thread(self, thread_id: ChannelId) -> RecordMatch {
        if self.is_legacy() {
            RecordMatch::Repaired(Self {
                channel_id: thread_id,
                ..self
            })
        } else if self.channel_id == thread_id {
            RecordMatch::Valid(self)
        } else {
            RecordMatch::Mismatch {
                recorded: self.channel_id,
            }
        }
    }

    /// Token form stored in the ticket custom field
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}{SEPARATOR}{}",
            self.channel_id,
            self.last_sync.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }

    /// Decode a stored token.
    ///
    /// Never fails on a bad channel segment: it logs and falls back to an
    /// unset channel so synchronization carries on. Returns `None` when the
    /// token is empty or has no usable timestamp; use [`Self::recorded_channel`]
    /// to tell the two apart.
    pub fn decode(ticket_id: TicketId, token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        let (channel, timestamp) = match token.split_once(SEPARATOR) {
            Some((channel, timestamp)) => (Some(channel.trim()), timestamp),
            None => (None, token),
        };

        let Some(last_sync) = parse_timestamp(timestamp) else {
            tracing::warn!(
                ticket_id = ticket_id.get(),
                token,
                "Ignoring sync token with unparseable timestamp"
            );
            return None;
        };

        let channel_id = match channel {
            None => ChannelId::UNSET,
            Some(raw) => raw.parse::<u64>().map(ChannelId).unwrap_or_else(|error| {
                tracing::warn!(
                    ticket_id = ticket_id.get(),
                    channel = raw,
                    %error,
                    "Unparseable channel in sync token, treating as legacy"
                );
                ChannelId::UNSET
            }),
        };

        Some(Self::new(ticket_id, channel_id, last_sync))
    }

    /// Channel named by a token, whether or not its timestamp is usable.
    pub fn recorded_channel(token: &str) -> Option<ChannelId> {
        let (channel, _) = token.trim().split_once(SEPARATOR)?;
        channel
            .trim()
            .parse::<u64>()
            .ok()
            .map(ChannelId)
            .filter(|channel| !channel.is_unset())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 30, 15).unwrap()
    }

    #[test]
    fn encode_uses_channel_and_utc_timestamp() {
        let record = SyncRecord::new(TicketId(42), ChannelId(1200), at(9));
        assert_eq!(record.encode(), "1200|2024-03-01T09:30:15Z");
    }

    #[test]
    fn decode_inverts_encode() {
        let precise = at(9) + chrono::Duration::microseconds(1234);
        for record in [
            SyncRecord::new(TicketId(42), ChannelId(1200), at(9)),
            SyncRecord::new(TicketId(7), ChannelId(u64::MAX), precise),
        ] {
            assert_eq!(SyncRecord::decode(record.ticket_id, &record.encode()), Some(record));
        }
    }

    #[test]
    fn decode_normalizes_foreign_offsets() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 3, 1, 11, 30, 15).unwrap();
        let token = format!("5|{}", local.to_rfc3339());
        let record = SyncRecord::decode(TicketId(1), &token).unwrap();
        assert_eq!(record.last_sync, at(9));
    }

    #[test]
    fn bare_timestamp_is_legacy() {
        let record = SyncRecord::decode(TicketId(3), "2024-03-01T09:30:15+00:00").unwrap();
        assert!(record.is_legacy());
        assert_eq!(record.channel_id, ChannelId::UNSET);
        assert_eq!(record.last_sync, at(9));
    }

    #[test]
    fn bad_channel_segment_degrades_to_legacy() {
        let record = SyncRecord::decode(TicketId(3), "not-a-number|2024-03-01T09:30:15Z").unwrap();
        assert!(record.is_legacy());
        assert_eq!(record.last_sync, at(9));
    }

    #[test]
    fn unusable_tokens_decode_to_none() {
        assert_eq!(SyncRecord::decode(TicketId(3), ""), None);
        assert_eq!(SyncRecord::decode(TicketId(3), "   "), None);
        assert_eq!(SyncRecord::decode(TicketId(3), "12|garbage"), None);
    }

    #[test]
    fn channel_survives_a_broken_timestamp() {
        assert_eq!(SyncRecord::recorded_channel("1200|garbage"), Some(ChannelId(1200)));
        assert_eq!(SyncRecord::recorded_channel("1200|2024-03-01T09:30:15Z"), Some(ChannelId(1200)));
        assert_eq!(SyncRecord::recorded_channel("0|garbage"), None);
        assert_eq!(SyncRecord::recorded_channel("x|garbage"), None);
        assert_eq!(SyncRecord::recorded_channel("garbage"), None);
    }

    #[test]
    fn match_thread_covers_all_cases() {
        let record = SyncRecord::new(TicketId(1), ChannelId(10), at(9));
        assert_eq!(record.match_thread(ChannelId(10)), RecordMatch::Valid(record));
        assert_eq!(
            record.match_thread(ChannelId(11)),
            RecordMatch::Mismatch {
                recorded: ChannelId(10)
            }
        );

        let legacy = SyncRecord::new(TicketId(1), ChannelId::UNSET, at(9));
        assert_eq!(
            legacy.match_thread(ChannelId(11)),
            RecordMatch::Repaired(SyncRecord::new(TicketId(1), ChannelId(11), at(9)))
        );
    }
}
