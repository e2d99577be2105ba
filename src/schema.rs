use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collector::fetcher::FetchError;
use crate::util::deserialize_epoch_seconds;

/// Seconds subtracted from every source timestamp before it is archived.
///
/// The archive is always expressed in one fixed civil-time frame (UTC-7).
/// Downstream analytics depend on it, so it is not configurable.
pub const ARCHIVE_TZ_OFFSET_SECS: i64 = 25_200;

// ------------------------------------------------------------
// Partition
// ------------------------------------------------------------
//
// One independently paged channel of the server. Owned by the
// external source; the collector only reads it.
//
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    /// Stable channel ID
    pub id: u64,

    /// Human-readable label (channel name)
    pub name: String,

    pub kind: PartitionKind,
}

/// Channel kind as reported by the source.
///
/// Only `Text` partitions are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    Text,
    Other(u8),
}

impl PartitionKind {
    /// Maps a Discord channel type code. `0` is a guild text channel.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => PartitionKind::Text,
            other => PartitionKind::Other(other),
        }
    }

    pub fn is_text(self) -> bool {
        matches!(self, PartitionKind::Text)
    }
}

// ------------------------------------------------------------
// Raw item
// ------------------------------------------------------------
//
// One message exactly as the source returned it.
// Never mutated by the collector.
//
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    /// Snowflake message ID
    pub id: u64,

    /// Back-reference to the owning partition
    pub partition_id: u64,

    pub author: Author,

    /// Message text, verbatim
    pub content: String,

    /// Creation time with sub-second precision
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub username: String,

    /// Legacy discriminator; "0" for accounts migrated to unique names
    pub discriminator: String,
}

impl Author {
    /// Display form used in the archive.
    ///
    /// Examples:
    /// - ("alice", "1234") -> "alice#1234"
    /// - ("alice", "0")    -> "alice"
    pub fn display(&self) -> String {
        match self.discriminator.as_str() {
            "" | "0" => self.username.clone(),
            d => format!("{}#{}", self.username, d),
        }
    }
}

/// Resume marker: "the last item successfully observed".
///
/// Built from an item that was actually returned. `advance`
/// refuses to move it backwards or keep it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(u64);

impl Cursor {
    pub fn after(item: &RawItem) -> Self {
        Cursor(item.id)
    }

    /// Next cursor after a page ending in `last`.
    ///
    /// Fails when `last` is not strictly newer than `prev`, which
    /// means the source ignored the cursor.
    pub fn advance(prev: Option<Cursor>, last: &RawItem) -> Result<Self, FetchError> {
        match prev {
            Some(Cursor(prev)) if last.id <= prev => Err(FetchError::CursorStalled {
                cursor: prev,
                returned: last.id,
            }),
            _ => Ok(Cursor::after(last)),
        }
    }

    pub fn item_id(self) -> u64 {
        self.0
    }
}

// ------------------------------------------------------------
// Normalized record
// ------------------------------------------------------------
//
// The archive schema. Field names are part of the on-disk
// contract read by the analytics commands.
//
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub author: String,

    #[serde(rename = "authorID")]
    pub author_id: u64,

    pub content: String,

    /// Channel label
    pub channel: String,

    #[serde(rename = "channelID")]
    pub channel_id: u64,

    #[serde(rename = "msgID")]
    pub msg_id: u64,

    /// Epoch seconds, already shifted by `ARCHIVE_TZ_OFFSET_SECS`.
    /// Older archives store it as a float with zero fraction.
    #[serde(deserialize_with = "deserialize_epoch_seconds")]
    pub time: i64,
}
