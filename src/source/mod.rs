//! Message source abstraction
//!
//! This module provides:
//! - The `MessageSource` trait the collector consumes
//! - The `SourceError` taxonomy shared by all sources
//!
//! All platform-specific request logic lives in dedicated source
//! modules. The collector interacts exclusively through the trait.

pub mod discord;

use std::time::Duration;

use thiserror::Error;

use crate::schema::{Cursor, Partition, RawItem};

/// Failures a source can report for a single request.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Connection, TLS or body transfer failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Platform throttled the request
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Platform-side failure (5xx)
    #[error("server error: HTTP {0}")]
    Server(u16),

    /// Token rejected
    #[error("unauthorized")]
    Unauthorized,

    /// Channel not readable with the current permissions
    #[error("missing permission")]
    Forbidden,

    #[error("not found")]
    NotFound,

    /// Any other unexpected status
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Response body did not match the expected shape
    #[error("decode error: {0}")]
    Decode(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed.
    ///
    /// Permission, auth and decode errors never heal on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Transport(_) | SourceError::RateLimited { .. } | SourceError::Server(_)
        )
    }

    /// Minimum wait requested by the platform, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// MessageSource is the seam between:
/// - The generic collector runtime
/// - A concrete chat platform API
///
/// Each implementation must:
/// - Enumerate the channels of a server
/// - Return pages of messages oldest-first
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - One instance is shared by all fetcher tasks
///
#[async_trait::async_trait]
pub trait MessageSource: Send + Sync {

    /// Lists every channel of the server, of any kind.
    ///
    /// Filtering to text channels is the collector's job.
    async fn list_partitions(&self, guild_id: u64) -> Result<Vec<Partition>, SourceError>;

    /// Returns up to `limit` items of `partition`, oldest-first.
    ///
    /// CONTRACT:
    /// - `after == None` starts at the very beginning of the channel
    /// - `after == Some(c)` returns only items strictly newer than `c`
    /// - An empty vector means there is nothing after the cursor
    ///
    async fn fetch_page(
        &self,
        partition: &Partition,
        after: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<RawItem>, SourceError>;
}
