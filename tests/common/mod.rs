#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use chat_archive_collector::{
    config::CollectorConfig,
    schema::{Author, Cursor, Partition, PartitionKind, RawItem},
    source::{MessageSource, SourceError},
};

pub const BASE_SECS: i64 = 1_700_000_000;

/// In-memory server with request accounting.
#[derive(Default)]
pub struct FakeSource {
    partitions: Vec<Partition>,
    history: HashMap<u64, Vec<RawItem>>,
    forbidden: HashSet<u64>,
    scripted: Mutex<HashMap<u64, VecDeque<SourceError>>>,
    fail_listing: bool,
    delay: Duration,

    calls: Mutex<HashMap<u64, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

pub fn item(id: u64, partition_id: u64, secs: i64) -> RawItem {
    RawItem {
        id,
        partition_id,
        author: Author {
            id: 1000 + id % 7,
            username: format!("user{}", id % 7),
            discriminator: "0".to_string(),
        },
        content: format!("message {id}"),
        created_at: Utc.timestamp_opt(secs, 0).unwrap(),
    }
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text channel with `count` messages, one second apart.
    pub fn with_channel(self, id: u64, name: &str, count: usize) -> Self {
        let items = (0..count as u64)
            .map(|i| item(id * 1_000_000 + i + 1, id, BASE_SECS + i as i64))
            .collect();
        self.with_items(id, name, items)
    }

    pub fn with_items(mut self, id: u64, name: &str, items: Vec<RawItem>) -> Self {
        self.partitions.push(Partition {
            id,
            name: name.to_string(),
            kind: PartitionKind::Text,
        });
        self.history.insert(id, items);
        self
    }

    pub fn with_voice(mut self, id: u64, name: &str) -> Self {
        self.partitions.push(Partition {
            id,
            name: name.to_string(),
            kind: PartitionKind::Other(2),
        });
        self
    }

    pub fn forbid(mut self, id: u64) -> Self {
        self.forbidden.insert(id);
        self
    }

    /// The next `errors.len()` requests to channel `id` fail in order.
    pub fn script_errors(self, id: u64, errors: Vec<SourceError>) -> Self {
        self.scripted.lock().unwrap().insert(id, errors.into());
        self
    }

    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn history(&self, id: u64) -> &[RawItem] {
        &self.history[&id]
    }

    pub fn calls(&self, id: u64) -> usize {
        self.calls.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageSource for FakeSource {
    async fn list_partitions(&self, _guild_id: u64) -> Result<Vec<Partition>, SourceError> {
        if self.fail_listing {
            return Err(SourceError::Unauthorized);
        }
        Ok(self.partitions.clone())
    }

    async fn fetch_page(
        &self,
        partition: &Partition,
        after: Option<Cursor>,
        limit: usize,
    ) -> Result<Vec<RawItem>, SourceError> {
        *self.calls.lock().unwrap().entry(partition.id).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.forbidden.contains(&partition.id) {
            return Err(SourceError::Forbidden);
        }
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&partition.id)
            .and_then(VecDeque::pop_front);
        if let Some(err) = scripted {
            return Err(err);
        }

        let after_id = after.map_or(0, Cursor::item_id);
        Ok(self
            .history
            .get(&partition.id)
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.id > after_id)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Collector settings with fast retries for tests.
pub fn test_config() -> CollectorConfig {
    CollectorConfig {
        backoff_base_ms: 1,
        metrics_interval_secs: 0,
        ..CollectorConfig::default()
    }
}
