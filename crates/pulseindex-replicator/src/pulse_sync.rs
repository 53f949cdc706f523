//! Pulse-metadata sync: a second cursor over the pulse stream.
//!
//! Runs inside the ingestion task right before each commit, so metadata for
//! every pulse up to the committed one lands in the same transaction.

use std::sync::Arc;

use tracing::{debug, warn};

use pulseindex_collect::OutputCache;
use pulseindex_core::{PulseInfo, PulseNumber};

use crate::source::PulseSource;

pub struct PulseSync {
    source: Arc<dyn PulseSource>,
    cache: Arc<OutputCache<PulseInfo>>,
    batch_size: u32,
    /// Highest pulse pushed into the cache.
    last_fetched: Option<PulseNumber>,
}

impl PulseSync {
    /// `last_synced` is the highest pulse already stored; the stream resumes after it.
    pub fn new(
        source: Arc<dyn PulseSource>,
        cache: Arc<OutputCache<PulseInfo>>,
        batch_size: u32,
        last_synced: Option<PulseNumber>,
    ) -> Self {
        Self {
            source,
            cache,
            batch_size: batch_size.max(1),
            last_fetched: last_synced,
        }
    }

    pub fn last_fetched(&self) -> Option<PulseNumber> {
        self.last_fetched
    }

    /// Fetch pulse metadata until `upto` is covered or the stream has nothing more.
    ///
    /// Transport errors end the sync early; the next call picks up from the
    /// same point. Returns the number of pulses cached.
    pub async fn sync_to(&mut self, upto: PulseNumber) -> usize {
        let mut fetched = 0;
        while self.last_fetched.map_or(true, |p| p < upto) {
            let pulses = match self.source.pulses(self.last_fetched, self.batch_size).await {
                Ok(pulses) => pulses,
                Err(e) => {
                    warn!(after = ?self.last_fetched, error = %e, "Pulse sync failed");
                    break;
                }
            };
            let fresh: Vec<_> = pulses
                .into_iter()
                .filter(|p| self.last_fetched.map_or(true, |last| p.number > last))
                .collect();
            let Some(highest) = fresh.iter().map(|p| p.number).max() else {
                break;
            };
            fetched += fresh.len();
            self.cache.extend(fresh);
            self.last_fetched = Some(highest);
        }
        if fetched > 0 {
            debug!(fetched, last = ?self.last_fetched, "Pulse metadata synced");
        }
        fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn pulse(number: PulseNumber) -> PulseInfo {
        PulseInfo {
            number,
            entropy: format!("{number:x}"),
            timestamp: pulseindex_core::types::pulse_timestamp(number),
        }
    }

    fn source(numbers: &[PulseNumber]) -> Arc<MemorySource> {
        let source = Arc::new(MemorySource::new());
        for n in numbers {
            source.push_pulse(pulse(*n));
        }
        source
    }

    #[tokio::test]
    async fn sync_pages_until_target_is_covered() {
        let cache = Arc::new(OutputCache::new());
        let mut sync = PulseSync::new(
            source(&[65600, 65610, 65620, 65630, 65640]),
            cache.clone(),
            2,
            None,
        );
        assert_eq!(sync.sync_to(65620).await, 4);
        assert_eq!(sync.last_fetched(), Some(65630));
        assert_eq!(cache.len(), 4);

        // already covered
        assert_eq!(sync.sync_to(65625).await, 0);
    }

    #[tokio::test]
    async fn sync_resumes_after_last_synced() {
        let cache = Arc::new(OutputCache::new());
        let mut sync = PulseSync::new(source(&[65600, 65610, 65620]), cache.clone(), 10, Some(65600));
        assert_eq!(sync.sync_to(65620).await, 2);
        let numbers: Vec<_> = cache.snapshot().iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![65610, 65620]);
    }

    #[tokio::test]
    async fn transport_error_is_retried_on_next_call() {
        let source = source(&[65600]);
        source.fail_next_pulse_pulls(1);
        let cache = Arc::new(OutputCache::new());
        let mut sync = PulseSync::new(source, cache.clone(), 10, None);
        assert_eq!(sync.sync_to(65600).await, 0);
        assert_eq!(sync.last_fetched(), None);
        assert_eq!(sync.sync_to(65600).await, 1);
        assert_eq!(cache.len(), 1);
    }
}
