use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

use crate::{
    aggregate::aggregate,
    archive::{ArchiveError, write_archive},
    config::CollectorConfig,
    metrics::{METRICS, incr},
    schema::Partition,
    source::{MessageSource, SourceError},
};

use super::{
    PartitionOutcome,
    fetcher::{FetchError, PartitionFetcher},
    gate::ConcurrencyGate,
};

/// Run-level failures.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("a collection run is already in progress")]
    AlreadyRunning,

    #[error("listing channels failed: {0}")]
    ListPartitions(#[source] SourceError),

    /// A fetcher task was cancelled or panicked; the run was aborted
    #[error("fetcher task aborted: {0}")]
    TaskAborted(String),

    #[error("{} channel(s) failed, archive left untouched", .0.len())]
    PartitionsFailed(Vec<PartitionFailure>),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// A channel that could not be collected, with the reason.
#[derive(Debug, Clone)]
pub struct PartitionFailure {
    pub partition_id: u64,
    pub partition: String,
    pub reason: String,
}

/// Summary returned to whoever triggered the run.
#[derive(Debug, Clone)]
pub struct CollectionReport {
    /// Text channels attempted
    pub partitions: usize,

    /// Channels that returned at least one message
    pub collected: usize,

    /// Channels that were readable but had no messages
    pub empty: usize,

    pub failures: Vec<PartitionFailure>,

    /// Records written to the archive
    pub records: usize,

    pub elapsed: Duration,

    /// Most fetchers observed holding a gate slot at once
    pub peak_concurrency: usize,

    pub archive: PathBuf,
}

impl fmt::Display for CollectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} messages from {} channel(s) stored in {}, took {:.2} seconds",
            self.records,
            self.partitions,
            self.archive.display(),
            self.elapsed.as_secs_f64(),
        )?;
        write!(
            f,
            "collected={} empty={} failed={} peak_concurrency={}",
            self.collected,
            self.empty,
            self.failures.len(),
            self.peak_concurrency,
        )?;
        for failure in &self.failures {
            write!(f, "\n  #{} ({}): {}", failure.partition, failure.partition_id, failure.reason)?;
        }
        Ok(())
    }
}

/// Bulk collector for one server.
///
/// Runs one `PartitionFetcher` per text channel, at most
/// `concurrency` at a time, joins them all, then hands the
/// outcomes to the aggregator and archive store.
///
/// DESIGN:
/// - Configuration is passed in, never read from globals
/// - A failing channel does not cancel its siblings
/// - Runs are serialized by an internal lock
pub struct Collector {
    source: Arc<dyn MessageSource>,
    cfg: CollectorConfig,
    gate: ConcurrencyGate,
    run_lock: Mutex<()>,
}

impl Collector {
    pub fn new(source: Arc<dyn MessageSource>, cfg: CollectorConfig) -> Self {
        let gate = ConcurrencyGate::new(cfg.concurrency);
        Self {
            source,
            cfg,
            gate,
            run_lock: Mutex::new(()),
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Fetches every text channel of `guild_id`.
    ///
    /// Returns once every fetcher has finished or failed. Dropping
    /// the returned future aborts all fetchers still running.
    pub async fn collect(&self, guild_id: u64) -> Result<Vec<PartitionOutcome>, CollectError> {
        let partitions = self
            .source
            .list_partitions(guild_id)
            .await
            .map_err(CollectError::ListPartitions)?;

        let eligible: Vec<Partition> = partitions.into_iter().filter(|p| p.kind.is_text()).collect();
        info!(
            "collecting {} text channel(s) with concurrency {}",
            eligible.len(),
            self.gate.capacity()
        );

        let _reporter = MetricsReporter::start(self.cfg.metrics_interval_secs);

        let fetcher = Arc::new(PartitionFetcher::new(self.source.clone(), self.cfg.clone()));
        let mut set = JoinSet::new();

        for partition in eligible {
            let gate = self.gate.clone();
            let fetcher = fetcher.clone();

            set.spawn(async move {
                let Ok(_slot) = gate.acquire().await else {
                    return PartitionOutcome::Failed { partition, error: FetchError::GateClosed };
                };
                let _active = ActiveFetcher::enter();

                let started = Instant::now();
                match fetcher.fetch_all(&partition).await {
                    Ok(items) => {
                        info!(
                            "channel: {} DONE, {} messages took {:.2} seconds",
                            partition.name,
                            items.len(),
                            started.elapsed().as_secs_f64()
                        );
                        if items.is_empty() {
                            incr(&METRICS.partitions_empty);
                        }
                        incr(&METRICS.partitions_done);
                        PartitionOutcome::Collected { partition, items }
                    }
                    Err(error) => {
                        error!("channel: {} FAILED: {}", partition.name, error);
                        incr(&METRICS.partitions_failed);
                        PartitionOutcome::Failed { partition, error }
                    }
                }
            });
        }

        let mut outcomes = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // Cancellation or panic: the run cannot be trusted
                    set.abort_all();
                    return Err(CollectError::TaskAborted(e.to_string()));
                }
            }
        }

        Ok(outcomes)
    }

    /// Full run: collect, aggregate, replace the archive at `archive`.
    ///
    /// A second call while one is in progress fails with
    /// `AlreadyRunning` instead of racing on the archive file.
    pub async fn run(&self, guild_id: u64, archive: &Path) -> Result<CollectionReport, CollectError> {
        let _running = self.run_lock.try_lock().map_err(|_| CollectError::AlreadyRunning)?;
        let started = Instant::now();

        let outcomes = self.collect(guild_id).await?;

        let failures: Vec<PartitionFailure> = outcomes
            .iter()
            .filter_map(|o| match o {
                PartitionOutcome::Failed { partition, error } => Some(PartitionFailure {
                    partition_id: partition.id,
                    partition: partition.name.clone(),
                    reason: error.to_string(),
                }),
                PartitionOutcome::Collected { .. } => None,
            })
            .collect();

        if !failures.is_empty() {
            if self.cfg.fail_on_partition_error {
                return Err(CollectError::PartitionsFailed(failures));
            }
            warn!("{} channel(s) failed; archiving the rest", failures.len());
        }

        let (collected, empty) = outcomes.iter().fold((0, 0), |(c, e), o| match o {
            PartitionOutcome::Collected { items, .. } if items.is_empty() => (c, e + 1),
            PartitionOutcome::Collected { .. } => (c + 1, e),
            PartitionOutcome::Failed { .. } => (c, e),
        });

        let sort_started = Instant::now();
        let records = aggregate(&outcomes);
        info!(
            "{} messages sorted, took {:.2} seconds",
            records.len(),
            sort_started.elapsed().as_secs_f64()
        );

        let record_count = records.len();
        let path = archive.to_path_buf();
        tokio::task::spawn_blocking(move || write_archive(&path, &records))
            .await
            .map_err(|e| CollectError::TaskAborted(format!("archive writer: {}", e)))??;

        Ok(CollectionReport {
            partitions: outcomes.len(),
            collected,
            empty,
            failures,
            records: record_count,
            elapsed: started.elapsed(),
            peak_concurrency: self.gate.peak(),
            archive: archive.to_path_buf(),
        })
    }
}

/// Keeps `fetchers_active` accurate even when a fetcher is aborted.
struct ActiveFetcher;

impl ActiveFetcher {
    fn enter() -> Self {
        incr(&METRICS.fetchers_active);
        ActiveFetcher
    }
}

impl Drop for ActiveFetcher {
    fn drop(&mut self) {
        METRICS.fetchers_active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Periodic metrics log line for the duration of a collection.
struct MetricsReporter(Option<JoinHandle<()>>);

impl MetricsReporter {
    fn start(interval_secs: u64) -> Self {
        if interval_secs == 0 {
            return MetricsReporter(None);
        }
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!("[METRICS] {}", METRICS.summary());
            }
        });
        MetricsReporter(Some(handle))
    }
}

impl Drop for MetricsReporter {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}
