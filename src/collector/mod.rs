/// Collector module
///
/// This module groups all logic responsible for:
/// - Bounding how many channels are fetched at once (gate)
/// - Paging through one channel's history (fetcher)
/// - Running one fetcher per channel and joining them (runner)
///
/// The collector layer sits between:
/// - A `MessageSource` (Discord REST, or a test double)
/// - The aggregator and archive store
///
/// Design notes:
/// - Platform-specific logic MUST NOT live here
/// - Fetchers share no mutable state; each reports only its outcome
pub mod fetcher;
pub mod gate;
pub mod runner;

use crate::schema::{Partition, RawItem};

use fetcher::FetchError;

/// Result of one channel fetcher.
///
/// A failed channel stays distinguishable from a channel that
/// was legitimately empty.
#[derive(Debug)]
pub enum PartitionOutcome {
    Collected {
        partition: Partition,
        items: Vec<RawItem>,
    },
    Failed {
        partition: Partition,
        error: FetchError,
    },
}

impl PartitionOutcome {
    pub fn partition(&self) -> &Partition {
        match self {
            PartitionOutcome::Collected { partition, .. } => partition,
            PartitionOutcome::Failed { partition, .. } => partition,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PartitionOutcome::Failed { .. })
    }
}
