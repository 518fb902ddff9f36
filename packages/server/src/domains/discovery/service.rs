//! Discovery orchestrator - drives one discovery job end-to-end.
//!
//! `start_job` allocates a job and spawns the discovery procedure as a
//! detached task; callers observe progress through `get_status` polling or
//! the `event_stream` pull. The procedure searches the area, partitions
//! candidates against the store, fans new candidates through the ingestion
//! pipeline under a concurrency bound and a wall-clock deadline, persists
//! every outcome, and closes the event sequence with exactly one terminal
//! event.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_stream::stream;
use chrono::Utc;
use futures::Stream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::dedup::{partition_candidates, FRESHNESS_HOURS};
use super::events::{DiscoveryEvent, SKIP_REASON_FRESH};
use super::models::{DiscoveryJob, DiscoveryStatus, PlaceCandidate};
use super::pipeline::{IngestionPipeline, Stage};
use super::registry::{EventTx, JobRegistry};
use crate::common::geo::parse_city_state;
use crate::domains::pantry::models::{NewPantry, Pantry, PantryStatus, PantryUpdate};
use crate::domains::pantry::store::BasePantryStore;
use crate::kernel::traits::BasePlaceSearch;

/// Confidence assigned to records persisted without page content. Low on
/// purpose: downstream consumers must treat these as unconfirmed.
const BASIC_CONFIDENCE: i32 = 3;

/// Provenance tag stamped on every record this orchestrator writes.
const DISCOVERED_VIA: &str = "discovery";

/// Tunables for the discovery procedure.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Simultaneously in-flight ingestions per job. Scraping and the LLM
    /// call are the rate-limited resources; keep this small.
    pub max_concurrent: usize,
    /// Wall-clock budget for the whole job, measured from job start.
    pub job_deadline: Duration,
    /// Idle interval after which the event stream emits a heartbeat.
    pub heartbeat_interval: Duration,
    /// Delay before a finished job's event queue is released, so a slow
    /// consumer can still read the terminal event.
    pub cleanup_grace: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            job_deadline: Duration::from_secs(120),
            heartbeat_interval: Duration::from_secs(15),
            cleanup_grace: Duration::from_secs(60),
        }
    }
}

/// The discovery job orchestrator.
///
/// Holds the injected ports plus the job registry; cheap to clone (all
/// shared state is behind Arcs), which is how the background task gets its
/// handle.
#[derive(Clone)]
pub struct DiscoveryService {
    places: Arc<dyn BasePlaceSearch>,
    store: Arc<dyn BasePantryStore>,
    pipeline: IngestionPipeline,
    registry: JobRegistry,
    config: DiscoveryConfig,
}

impl DiscoveryService {
    pub fn new(
        places: Arc<dyn BasePlaceSearch>,
        store: Arc<dyn BasePantryStore>,
        pipeline: IngestionPipeline,
    ) -> Self {
        Self::with_config(places, store, pipeline, DiscoveryConfig::default())
    }

    pub fn with_config(
        places: Arc<dyn BasePlaceSearch>,
        store: Arc<dyn BasePantryStore>,
        pipeline: IngestionPipeline,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            places,
            store,
            pipeline,
            registry: JobRegistry::new(),
            config,
        }
    }

    /// The single-URL pipeline, exposed for manual re-ingestion routes.
    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    /// Start a discovery job for an area. Returns immediately with the job
    /// in `Running` state; the procedure runs as a detached task.
    ///
    /// A search-provider failure is reported asynchronously: the job moves
    /// to `Failed` and the stream carries a single error event. Callers
    /// always get a job id back.
    pub async fn start_job(
        &self,
        query: &str,
        lat: f64,
        lng: f64,
        radius_meters: u32,
        client_ip: &str,
    ) -> DiscoveryJob {
        let (job, tx) = self.registry.create_job(query).await;
        info!(
            job_id = %job.job_id,
            query = %query,
            lat,
            lng,
            radius_meters,
            client_ip = %client_ip,
            "Discovery job started"
        );

        let service = self.clone();
        let job_id = job.job_id;
        tokio::spawn(async move {
            service.run_discovery(job_id, lat, lng, radius_meters, tx).await;
        });

        job
    }

    /// Snapshot of a job's current state, or `None` for unknown/expired ids.
    pub async fn get_status(&self, job_id: Uuid) -> Option<DiscoveryJob> {
        self.registry.get(job_id).await
    }

    /// Records within the radius updated inside the freshness window. Used
    /// by callers to show "already covered" counts before starting a job.
    pub async fn count_fresh_pantries(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: u32,
    ) -> Result<i64> {
        let cutoff = Utc::now() - chrono::Duration::hours(FRESHNESS_HOURS);
        self.store
            .count_fresh_near(lat, lng, radius_meters as f64, cutoff)
            .await
    }

    /// Consumer-side pull of a job's ordered event sequence.
    ///
    /// Unknown job: one error event, then the stream ends. Already
    /// terminal: one synthetic complete summarizing the final counts (no
    /// replay of history). Running: live events from the job's queue, with
    /// a heartbeat whenever no event arrives within the idle interval; the
    /// stream ends right after the terminal event.
    ///
    /// At most one live consumer per job: the queue receiver is taken by
    /// the first attach, and a second concurrent attach gets an error
    /// event. Disconnecting stops delivery but not the job itself.
    pub fn event_stream(&self, job_id: Uuid) -> impl Stream<Item = DiscoveryEvent> + Send {
        let registry = self.registry.clone();
        let heartbeat = self.config.heartbeat_interval;

        stream! {
            let Some(job) = registry.get(job_id).await else {
                yield DiscoveryEvent::Error {
                    message: format!("Job {job_id} not found"),
                };
                return;
            };

            if job.is_terminal() {
                yield DiscoveryEvent::complete_for(&job);
                return;
            }

            let Some(mut rx) = registry.take_receiver(job_id).await else {
                yield DiscoveryEvent::Error {
                    message: "Job stream is already being consumed".to_string(),
                };
                return;
            };

            let mut saw_terminal = false;
            loop {
                match tokio::time::timeout(heartbeat, rx.recv()).await {
                    Ok(Some(Some(event))) => {
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            saw_terminal = true;
                            break;
                        }
                    }
                    // Termination sentinel, or the producer side is gone
                    Ok(Some(None)) | Ok(None) => break,
                    Err(_) => {
                        yield DiscoveryEvent::Heartbeat {};
                    }
                }
            }

            // The queue ended without a terminal event reaching us;
            // synthesize one from the final status so the sequence still
            // closes with exactly one terminal event.
            if !saw_terminal {
                match registry.get(job_id).await {
                    Some(job) => {
                        yield DiscoveryEvent::complete_for(&job);
                    }
                    None => {
                        yield DiscoveryEvent::Error {
                            message: "Job ended unexpectedly".to_string(),
                        };
                    }
                }
            }
        }
    }

    /// The background job task. Never panics outward: a failure before
    /// fan-out marks the job `Failed` with one error event; after that,
    /// per-candidate failures are contained by the fan-out loop. Always
    /// pushes the termination sentinel and schedules queue cleanup.
    async fn run_discovery(
        self,
        job_id: Uuid,
        lat: f64,
        lng: f64,
        radius_meters: u32,
        tx: EventTx,
    ) {
        if let Err(err) = self.drive_job(job_id, lat, lng, radius_meters, &tx).await {
            error!(job_id = %job_id, error = %err, "Discovery job failed");
            self.registry
                .finish(job_id, DiscoveryStatus::Failed, Some(err.to_string()))
                .await;
            let _ = tx.send(Some(DiscoveryEvent::Error {
                message: err.to_string(),
            }));
        }

        // Termination marker so an attached consumer's stream ends, then
        // release the queue after the grace delay. The status record stays
        // for polling.
        let _ = tx.send(None);

        let registry = self.registry.clone();
        let grace = self.config.cleanup_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            registry.release_channel(job_id).await;
        });
    }

    async fn drive_job(
        &self,
        job_id: Uuid,
        lat: f64,
        lng: f64,
        radius_meters: u32,
        tx: &EventTx,
    ) -> Result<()> {
        let started = Instant::now();

        // 1. Search the area. Provider failure is job-fatal.
        let candidates = match self.places.search_area(lat, lng, radius_meters).await {
            Ok(candidates) => candidates,
            Err(err) => {
                error!(job_id = %job_id, error = %err, "Places search failed");
                return Err(err.into());
            }
        };

        let Some(job) = self
            .registry
            .update(job_id, |j| j.urls_found = candidates.len() as u32)
            .await
        else {
            return Ok(());
        };
        let _ = tx.send(Some(DiscoveryEvent::JobStarted {
            job_id,
            query: job.query.clone(),
            urls_found: job.urls_found,
        }));

        if candidates.is_empty() {
            self.finish_job(job_id, DiscoveryStatus::Completed, tx).await;
            return Ok(());
        }

        // 2. Partition against the store. Still pre-fan-out: a store read
        // failure here fails the whole job.
        let outcome = partition_candidates(
            self.places.as_ref(),
            self.store.as_ref(),
            candidates,
            Utc::now(),
        )
        .await?;

        info!(
            job_id = %job_id,
            to_scrape = outcome.to_scrape.len(),
            basic = outcome.to_store_basic.len(),
            skipped = outcome.skipped.len(),
            "Candidates partitioned"
        );

        let total = (outcome.to_scrape.len() + outcome.to_store_basic.len()) as u32;

        // 3. Skipped candidates are already fresh in the store.
        self.registry
            .update(job_id, |j| j.urls_skipped = outcome.skipped.len() as u32)
            .await;
        for candidate in &outcome.skipped {
            let _ = tx.send(Some(DiscoveryEvent::PantrySkipped {
                source_url: candidate.website_url.clone().unwrap_or_default(),
                name: candidate.name.clone(),
                reason: SKIP_REASON_FRESH.to_string(),
            }));
        }

        // 4. Candidates with no obtainable website get a minimal record now.
        for candidate in &outcome.to_store_basic {
            match self.store_basic_place(candidate, None).await {
                Ok(pantry) => {
                    let Some(job) = self
                        .registry
                        .update(job_id, |j| {
                            j.urls_processed += 1;
                            j.urls_succeeded += 1;
                            j.pantry_ids.push(pantry.id);
                        })
                        .await
                    else {
                        continue;
                    };
                    let _ = tx.send(Some(DiscoveryEvent::PantryDiscovered {
                        pantry_id: pantry.id,
                        name: pantry.name.clone(),
                        address: pantry.address.clone(),
                        lat: pantry.lat,
                        lng: pantry.lng,
                        status: pantry.status,
                        confidence: pantry.confidence,
                        source_url: None,
                        google_places_only: Some(true),
                    }));
                    let _ = tx.send(Some(progress_event(&job, total)));
                }
                Err(err) => {
                    warn!(job_id = %job_id, name = %candidate.name, error = %err, "Failed to store basic pantry");
                    self.report_candidate_failure(
                        job_id,
                        candidate,
                        "",
                        Stage::Unknown,
                        &err.to_string(),
                        total,
                        tx,
                    )
                    .await;
                }
            }
        }

        // 5. Fan the remaining candidates through the pipeline, bounded by
        // the semaphore, under one wall-clock deadline from job start.
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut tasks = JoinSet::new();
        for candidate in outcome.to_scrape {
            let service = self.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                service
                    .process_scrape_candidate(job_id, candidate, total, &tx)
                    .await;
            });
        }

        let deadline = started + self.config.job_deadline;
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        let timed_out = tokio::time::timeout_at(deadline, drain).await.is_err();
        if timed_out {
            warn!(job_id = %job_id, "Job deadline exceeded, cancelling in-flight ingestions");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        // 6. Terminal status. Work persisted before a timeout stays valid.
        let status = if timed_out {
            DiscoveryStatus::TimedOut
        } else {
            DiscoveryStatus::Completed
        };
        self.finish_job(job_id, status, tx).await;
        Ok(())
    }

    /// Run one candidate through the pipeline and record the outcome. Every
    /// failure is contained here; nothing propagates to the job task.
    async fn process_scrape_candidate(
        &self,
        job_id: Uuid,
        candidate: PlaceCandidate,
        total: u32,
        tx: &EventTx,
    ) {
        // Dedup guarantees a URL on this path
        let Some(url) = candidate.website_url.clone() else {
            return;
        };

        match self.pipeline.ingest(&url).await {
            Ok(update) => match self.persist_ingested(&candidate, &url, &update).await {
                Ok(pantry) => {
                    let Some(job) = self
                        .registry
                        .update(job_id, |j| {
                            j.urls_processed += 1;
                            j.urls_succeeded += 1;
                            j.pantry_ids.push(pantry.id);
                        })
                        .await
                    else {
                        return;
                    };
                    let _ = tx.send(Some(DiscoveryEvent::PantryDiscovered {
                        pantry_id: pantry.id,
                        name: pantry.name.clone(),
                        address: pantry.address.clone(),
                        lat: pantry.lat,
                        lng: pantry.lng,
                        status: pantry.status,
                        confidence: pantry.confidence,
                        source_url: pantry.source_url.clone(),
                        google_places_only: None,
                    }));
                    let _ = tx.send(Some(progress_event(&job, total)));
                }
                Err(err) => {
                    warn!(job_id = %job_id, url = %url, error = %err, "Failed to persist ingested pantry");
                    self.report_candidate_failure(
                        job_id,
                        &candidate,
                        &url,
                        Stage::Unknown,
                        &err.to_string(),
                        total,
                        tx,
                    )
                    .await;
                }
            },
            Err(err) => {
                // Typed stage failure: keep the location as a minimal
                // record so it isn't silently lost.
                if let Err(store_err) = self.store_basic_place(&candidate, Some(url.clone())).await
                {
                    warn!(job_id = %job_id, url = %url, error = %store_err, "Failed to persist fallback record");
                }
                self.report_candidate_failure(
                    job_id,
                    &candidate,
                    &url,
                    err.stage,
                    &err.reason,
                    total,
                    tx,
                )
                .await;
            }
        }
    }

    async fn report_candidate_failure(
        &self,
        job_id: Uuid,
        candidate: &PlaceCandidate,
        url: &str,
        stage: Stage,
        reason: &str,
        total: u32,
        tx: &EventTx,
    ) {
        let Some(job) = self
            .registry
            .update(job_id, |j| {
                j.urls_processed += 1;
                j.urls_failed += 1;
            })
            .await
        else {
            return;
        };
        let _ = tx.send(Some(DiscoveryEvent::PantryFailed {
            source_url: url.to_string(),
            name: candidate.name.clone(),
            stage,
            reason: reason.to_string(),
        }));
        let _ = tx.send(Some(progress_event(&job, total)));
    }

    /// Persist a full record: search-provided identity fields merged with
    /// pipeline-extracted content fields, keyed by source URL.
    async fn persist_ingested(
        &self,
        candidate: &PlaceCandidate,
        url: &str,
        update: &PantryUpdate,
    ) -> Result<Pantry> {
        let (city, state) = parse_city_state(&candidate.address);
        self.store
            .upsert_by_source_url(NewPantry {
                name: candidate.name.clone(),
                address: candidate.address.clone(),
                lat: candidate.lat,
                lng: candidate.lng,
                city,
                state,
                status: update.status,
                hours_notes: update.hours_notes.clone(),
                hours_today: Some(update.hours_today.clone()),
                eligibility_rules: update.eligibility_rules.clone(),
                is_id_required: update.is_id_required,
                residency_req: update.residency_req.clone(),
                special_notes: update.special_notes.clone(),
                confidence: update.confidence,
                source_url: Some(url.to_string()),
                discovered_via: Some(DISCOVERED_VIA.to_string()),
                google_places_only: false,
            })
            .await
    }

    /// Persist a minimal record for a candidate without trusted page
    /// content. The places-only marker is set only when the location has
    /// no website at all; a scrape-failure fallback keeps its URL and is
    /// not places-only.
    async fn store_basic_place(
        &self,
        candidate: &PlaceCandidate,
        source_url: Option<String>,
    ) -> Result<Pantry> {
        let (city, state) = parse_city_state(&candidate.address);
        let google_places_only = source_url.is_none();
        self.store
            .upsert_basic(NewPantry {
                name: candidate.name.clone(),
                address: candidate.address.clone(),
                lat: candidate.lat,
                lng: candidate.lng,
                city,
                state,
                status: PantryStatus::Unknown,
                hours_notes: "Hours not available".to_string(),
                hours_today: None,
                eligibility_rules: Vec::new(),
                is_id_required: None,
                residency_req: None,
                special_notes: None,
                confidence: BASIC_CONFIDENCE,
                source_url,
                discovered_via: Some(DISCOVERED_VIA.to_string()),
                google_places_only,
            })
            .await
    }

    async fn finish_job(&self, job_id: Uuid, status: DiscoveryStatus, tx: &EventTx) {
        let Some(job) = self.registry.finish(job_id, status, None).await else {
            return;
        };
        info!(
            job_id = %job_id,
            status = ?job.status,
            found = job.urls_succeeded,
            failed = job.urls_failed,
            skipped = job.urls_skipped,
            duration_ms = job.duration_ms.unwrap_or(0),
            "Discovery job finished"
        );
        let _ = tx.send(Some(DiscoveryEvent::complete_for(&job)));
    }
}

fn progress_event(job: &DiscoveryJob, total: u32) -> DiscoveryEvent {
    DiscoveryEvent::Progress {
        processed: job.urls_processed,
        total,
        succeeded: job.urls_succeeded,
        failed: job.urls_failed,
    }
}
