use chrono::{DateTime, Utc};
use log::warn;

use crate::{
    collector::PartitionOutcome,
    schema::{ARCHIVE_TZ_OFFSET_SECS, NormalizedRecord, Partition, RawItem},
};

/// Epoch seconds as stored in the archive.
///
/// Sub-second precision is dropped, then the fixed archive offset
/// is subtracted: 1700000000 -> 1699974800.
pub fn normalize_timestamp(created_at: &DateTime<Utc>) -> i64 {
    created_at.timestamp() - ARCHIVE_TZ_OFFSET_SECS
}

/// Converts one raw item into its archive form.
///
/// Content is copied verbatim.
pub fn normalize(item: &RawItem, partition: &Partition) -> NormalizedRecord {
    NormalizedRecord {
        author: item.author.display(),
        author_id: item.author.id,
        content: item.content.clone(),
        channel: partition.name.clone(),
        channel_id: partition.id,
        msg_id: item.id,
        time: normalize_timestamp(&item.created_at),
    }
}

/// Flattens per-channel outcomes into the globally ordered archive.
///
/// - Failed channels contribute nothing
/// - Order: creation time ascending, then message ID ascending,
///   so the result does not depend on the order in which
///   fetchers finished
/// - A message ID seen twice is kept once
pub fn aggregate(outcomes: &[PartitionOutcome]) -> Vec<NormalizedRecord> {
    let mut items: Vec<(&RawItem, &Partition)> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            PartitionOutcome::Collected { partition, items } => {
                Some(items.iter().map(move |item| (item, partition)))
            }
            PartitionOutcome::Failed { .. } => None,
        })
        .flatten()
        .collect();

    items.sort_by(|(a, _), (b, _)| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    // Equal ids carry equal timestamps, so after the sort they are adjacent
    let before = items.len();
    items.dedup_by_key(|(item, _)| item.id);
    if items.len() != before {
        warn!("dropped {} duplicate message(s)", before - items.len());
    }

    items
        .into_iter()
        .map(|(item, partition)| normalize(item, partition))
        .collect()
}
