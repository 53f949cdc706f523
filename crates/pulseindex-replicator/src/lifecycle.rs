//! Process lifecycle: `init` → `start` → `stop`.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pulseindex_collect::Collectors;
use pulseindex_core::{
    IndexerError, JsonCodec, PayloadCodec, PositionTracker, ReplicatorConfig, ResumePoint, Storage,
};

use crate::index_loop::IndexLoop;
use crate::pulse_sync::PulseSync;
use crate::source::{PulseSource, RecordSource};
use crate::stats::{ReplicatorStats, SharedStats};

/// An initialised, not yet running replicator.
pub struct Replicator {
    index_loop: IndexLoop,
    collectors: Collectors,
    resume: ResumePoint,
}

impl Replicator {
    /// Resolve the resume point from `storage` and wire the default engines
    /// with the JSON payload codec.
    pub async fn init(
        config: ReplicatorConfig,
        storage: Arc<dyn Storage>,
        source: Arc<dyn RecordSource>,
        pulses: Arc<dyn PulseSource>,
    ) -> Result<Self, IndexerError> {
        Self::init_with_codec(config, storage, source, pulses, Arc::new(JsonCodec)).await
    }

    pub async fn init_with_codec(
        config: ReplicatorConfig,
        storage: Arc<dyn Storage>,
        source: Arc<dyn RecordSource>,
        pulses: Arc<dyn PulseSource>,
        codec: Arc<dyn PayloadCodec>,
    ) -> Result<Self, IndexerError> {
        if config.batch_size == 0 {
            return Err(IndexerError::Config("batch_size must be positive".into()));
        }

        let resume = PositionTracker::new(storage.clone())
            .with_start_pulse(config.start_pulse)
            .resume()
            .await?;

        let collectors = Collectors::new(&config.prototypes, codec);
        let handlers = Arc::new(collectors.registry());
        let pulse_sync = PulseSync::new(
            pulses,
            collectors.pulses.clone(),
            config.pulse_batch_size,
            resume.last_synced_pulse,
        );
        let index_loop = IndexLoop::new(config, source, storage, handlers, pulse_sync, resume.cursor);

        Ok(Self {
            index_loop,
            collectors,
            resume,
        })
    }

    pub fn resume_point(&self) -> ResumePoint {
        self.resume
    }

    pub fn collectors(&self) -> &Collectors {
        &self.collectors
    }

    pub fn stats(&self) -> SharedStats {
        self.index_loop.stats()
    }

    /// Spawn the ingestion task.
    pub fn start(self) -> ReplicatorHandle {
        let cancel = CancellationToken::new();
        let stats = self.index_loop.stats();
        let mut index_loop = self.index_loop;
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { index_loop.run(cancel).await }
        });
        ReplicatorHandle {
            cancel,
            task,
            stats,
            collectors: self.collectors,
        }
    }
}

/// Handle to a running replicator.
pub struct ReplicatorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    stats: SharedStats,
    collectors: Collectors,
}

impl ReplicatorHandle {
    pub fn stats(&self) -> ReplicatorStats {
        self.stats.snapshot()
    }

    pub fn collectors(&self) -> &Collectors {
        &self.collectors
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the current batch/commit cycle to finish.
    pub async fn stop(self) -> Result<ReplicatorStats, IndexerError> {
        info!("Stopping replicator");
        self.cancel.cancel();
        self.task.await.map_err(|e| IndexerError::Aborted {
            reason: e.to_string(),
        })?;
        Ok(self.stats.snapshot())
    }
}
