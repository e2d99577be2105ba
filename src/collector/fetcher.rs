use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::{sleep, timeout};

use crate::{
    config::CollectorConfig,
    metrics::{METRICS, incr},
    schema::{Cursor, Partition, RawItem},
    source::{MessageSource, SourceError},
    util::backoff_delay,
};

/// Why a channel could not be collected.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Non-retryable source failure, or retries exhausted
    #[error("{source} (after {attempts} attempt(s))")]
    Source {
        #[source]
        source: SourceError,
        attempts: u32,
    },

    /// Every attempt hit the per-page deadline
    #[error("page request timed out after {timeout:?} ({attempts} attempt(s))")]
    Timeout { timeout: Duration, attempts: u32 },

    /// The source returned a page that does not move past the cursor
    #[error("cursor stalled: page ended at {returned}, not after {cursor}")]
    CursorStalled { cursor: u64, returned: u64 },

    #[error("concurrency gate closed")]
    GateClosed,
}

/// Enumerates the full history of one channel, oldest-first.
///
/// PROTOCOL:
/// - Seed: first page from the very beginning
/// - Advance: next page strictly after the last item seen
/// - Terminate: on the first empty page
///
/// A transient failure of a page request is retried with backoff;
/// the cursor does not move until a page actually arrives, so a
/// retry can neither skip nor duplicate items. A page that does
/// not end past the cursor fails the channel instead of looping.
pub struct PartitionFetcher {
    source: Arc<dyn MessageSource>,
    cfg: CollectorConfig,
}

impl PartitionFetcher {
    pub fn new(source: Arc<dyn MessageSource>, cfg: CollectorConfig) -> Self {
        Self { source, cfg }
    }

    pub async fn fetch_all(&self, partition: &Partition) -> Result<Vec<RawItem>, FetchError> {
        let mut items: Vec<RawItem> = Vec::new();
        let mut cursor: Option<Cursor> = None;
        let progress_every = self.cfg.progress_every.max(1);

        loop {
            let page = self.fetch_page_with_retry(partition, cursor).await?;

            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(Cursor::advance(cursor, last)?);

            let before = items.len();
            items.extend(page);

            METRICS
                .items_fetched
                .fetch_add(items.len() - before, std::sync::atomic::Ordering::Relaxed);

            if items.len() / progress_every > before / progress_every {
                info!("channel: {}, {} messages so far", partition.name, items.len());
            }
        }

        Ok(items)
    }

    /// One page request under a deadline, retried while the error
    /// is transient and the retry budget lasts.
    async fn fetch_page_with_retry(
        &self,
        partition: &Partition,
        cursor: Option<Cursor>,
    ) -> Result<Vec<RawItem>, FetchError> {
        let deadline = self.cfg.page_timeout();
        let mut attempt: u32 = 0;

        loop {
            let outcome = timeout(
                deadline,
                self.source.fetch_page(partition, cursor, self.cfg.page_size),
            )
            .await;

            let floor = match outcome {
                Ok(Ok(page)) => {
                    incr(&METRICS.pages_fetched);
                    return Ok(page);
                }

                Ok(Err(err)) if !err.is_transient() || attempt >= self.cfg.max_retries => {
                    return Err(FetchError::Source { source: err, attempts: attempt + 1 });
                }

                Err(_elapsed) if attempt >= self.cfg.max_retries => {
                    incr(&METRICS.page_timeouts);
                    return Err(FetchError::Timeout { timeout: deadline, attempts: attempt + 1 });
                }

                Ok(Err(err)) => {
                    warn!("channel {}: {} (attempt {})", partition.name, err, attempt + 1);
                    err.retry_after()
                }

                Err(_elapsed) => {
                    incr(&METRICS.page_timeouts);
                    warn!(
                        "channel {}: page request exceeded {:?} (attempt {})",
                        partition.name,
                        deadline,
                        attempt + 1
                    );
                    None
                }
            };

            let delay = backoff_delay(self.cfg.backoff_base(), attempt, floor);
            debug!("channel {}: retrying in {:?}", partition.name, delay);
            incr(&METRICS.page_retries);

            sleep(delay).await;
            attempt += 1;
        }
    }
}
