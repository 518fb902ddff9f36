//! In-memory job registry - statuses and per-job event queues.
//!
//! An explicit, dependency-injected object rather than process-wide
//! globals, so orchestrator tests can isolate instances. Job statuses are
//! retained after completion for later polling; the event channel is
//! released separately once a grace period has passed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::events::DiscoveryEvent;
use super::models::{DiscoveryJob, DiscoveryStatus};

/// Queue message: an event, or `None` as the stream-termination sentinel.
pub type EventMessage = Option<DiscoveryEvent>;
pub type EventTx = mpsc::UnboundedSender<EventMessage>;
pub type EventRx = mpsc::UnboundedReceiver<EventMessage>;

struct JobChannel {
    tx: EventTx,
    /// Taken by the first stream consumer; the queue has
    /// single-producer / single-reliable-consumer semantics.
    rx: Option<EventRx>,
}

#[derive(Default)]
struct RegistryInner {
    statuses: HashMap<Uuid, DiscoveryJob>,
    channels: HashMap<Uuid, JobChannel>,
}

/// Registry of discovery jobs. Cloneable handle over shared state.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new RUNNING job with a fresh unbounded event queue.
    /// The queue is unbounded so the producing job task never blocks on a
    /// slow or absent consumer.
    pub async fn create_job(&self, query: &str) -> (DiscoveryJob, EventTx) {
        let job = DiscoveryJob::new(query);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.write().await;
        inner.statuses.insert(job.job_id, job.clone());
        inner.channels.insert(
            job.job_id,
            JobChannel {
                tx: tx.clone(),
                rx: Some(rx),
            },
        );

        (job, tx)
    }

    /// Snapshot of a job's current state.
    pub async fn get(&self, job_id: Uuid) -> Option<DiscoveryJob> {
        self.inner.read().await.statuses.get(&job_id).cloned()
    }

    /// Mutate a RUNNING job's counters and return the updated snapshot.
    /// Terminal jobs are immutable; updates against them are dropped (the
    /// unchanged snapshot is still returned).
    pub async fn update<F>(&self, job_id: Uuid, mutate: F) -> Option<DiscoveryJob>
    where
        F: FnOnce(&mut DiscoveryJob),
    {
        let mut inner = self.inner.write().await;
        let job = inner.statuses.get_mut(&job_id)?;
        if !job.is_terminal() {
            mutate(job);
        }
        Some(job.clone())
    }

    /// Move a job to a terminal status. Terminal statuses are sticky: once
    /// set, a later finish call only fills in missing completion metadata.
    pub async fn finish(
        &self,
        job_id: Uuid,
        status: DiscoveryStatus,
        error: Option<String>,
    ) -> Option<DiscoveryJob> {
        let mut inner = self.inner.write().await;
        let job = inner.statuses.get_mut(&job_id)?;

        if !job.is_terminal() {
            job.status = status;
            job.error = error;
        }
        if job.completed_at.is_none() {
            let now = chrono::Utc::now();
            job.completed_at = Some(now);
            job.duration_ms = Some((now - job.created_at).num_milliseconds().max(0) as u64);
        }

        Some(job.clone())
    }

    /// Sender handle for a job's event queue.
    pub async fn sender(&self, job_id: Uuid) -> Option<EventTx> {
        self.inner
            .read()
            .await
            .channels
            .get(&job_id)
            .map(|c| c.tx.clone())
    }

    /// Take the job's receiver. Returns `None` if the channel was released
    /// or another consumer already took it.
    pub async fn take_receiver(&self, job_id: Uuid) -> Option<EventRx> {
        self.inner
            .write()
            .await
            .channels
            .get_mut(&job_id)
            .and_then(|c| c.rx.take())
    }

    /// Drop a job's event channel. The status stays for polling.
    pub async fn release_channel(&self, job_id: Uuid) {
        self.inner.write().await.channels.remove(&job_id);
    }

    /// Clear all jobs and channels. Used in tests.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.statuses.clear();
        inner.channels.clear();
    }
}
