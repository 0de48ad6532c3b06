use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use chrono::TimeDelta;
use serde::Serialize;
use tokio::time::{Duration, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use portrait_core::app::{
    Cancellation, CleanupReport, ExpiryService, GenerationPipeline, LifecycleMonitor,
};
use portrait_core::config::LifecycleConfig;
use portrait_core::domain::{
    ArtifactId, ArtifactRecord, Caller, GenerationOutcome, ImageSnapshot, ImageStatus,
    LifecycleError, ModelId, OwnerId, RemoteJobId, TrainingStatus,
};
use portrait_core::impls::{InMemoryArtifactStore, InMemoryBlobStore};
use portrait_core::observability::ArtifactCounts;
use portrait_core::ports::{ArtifactStore, Clock, ModelProvider, SystemClock, UlidGenerator};

/// Stand-in for the remote provider: training finishes on the
/// `training_ready_at`-th check, images on the `images_ready_at`-th listing.
struct SimulatedProvider {
    training_ready_at: u32,
    images_ready_at: u32,
    training_checks: AtomicU32,
    image_checks: AtomicU32,
    requested: Mutex<Vec<ArtifactId>>,
}

impl SimulatedProvider {
    fn new(training_ready_at: u32, images_ready_at: u32) -> Self {
        Self {
            training_ready_at,
            images_ready_at,
            training_checks: AtomicU32::new(0),
            image_checks: AtomicU32::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requested(&self) -> Vec<ArtifactId> {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ModelProvider for SimulatedProvider {
    async fn training_status(&self, job: &RemoteJobId) -> Result<TrainingStatus, LifecycleError> {
        let n = self.training_checks.fetch_add(1, Ordering::Relaxed) + 1;
        let raw = if n >= self.training_ready_at {
            "succeeded"
        } else {
            "processing"
        };
        info!(job = %job, check = n, raw, "simulated training status");
        Ok(TrainingStatus::from_provider(raw))
    }

    async fn request_images(
        &self,
        _model: &ModelId,
        artifacts: &[ArtifactId],
    ) -> Result<(), LifecycleError> {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(artifacts);
        Ok(())
    }

    async fn image_statuses(&self, _model: &ModelId) -> Result<Vec<ImageSnapshot>, LifecycleError> {
        let n = self.image_checks.fetch_add(1, Ordering::Relaxed) + 1;
        let done = n >= self.images_ready_at;
        Ok(self
            .requested()
            .into_iter()
            .map(|artifact_id| ImageSnapshot {
                artifact_id,
                status: if done {
                    ImageStatus::Completed
                } else {
                    ImageStatus::Generating
                },
                result_url: done
                    .then(|| format!("https://cdn.example/portraits/{artifact_id}.png")),
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    outcome: GenerationOutcome,
    expiring_soon: usize,
    cleanup: CleanupReport,
    counts: ArtifactCounts,
}

fn load_config() -> anyhow::Result<LifecycleConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            LifecycleConfig::from_json(&raw).with_context(|| format!("parsing {path}"))
        }
        None => LifecycleConfig::from_env().context("reading PORTRAIT_* environment"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config()?;
    info!(?config, "configuration loaded");

    let store = Arc::new(InMemoryArtifactStore::new());
    let blobs = Arc::new(InMemoryBlobStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let provider = Arc::new(SimulatedProvider::new(2, 2));

    let pipeline = GenerationPipeline::new(
        provider,
        store.clone(),
        clock.clone(),
        Arc::new(UlidGenerator::new(SystemClock)),
        &config,
    );
    let owner = OwnerId::from_ulid(Ulid::new());
    let admin = Caller::admin(OwnerId::from_ulid(Ulid::new()));

    // 1) 学習待ち → 画像生成
    let outcome = pipeline
        .run(
            &RemoteJobId::new("train-demo"),
            &ModelId::new("model-demo"),
            4,
            owner,
            &Cancellation::never(),
        )
        .await?;
    for image in &outcome.images {
        blobs.put(image.artifact_id, image.url.clone()).await;
    }

    let expiry = Arc::new(
        ExpiryService::new(store.clone(), clock.clone(), &config).with_blob_store(blobs.clone()),
    );

    // 2) 生成直後の画像を監視（初回 tick は即時）
    let monitor = LifecycleMonitor::new(expiry.clone(), config.monitor_interval());
    for image in &outcome.images {
        let id = image.artifact_id;
        monitor.start(id, owner, move |lifetime| {
            println!("{id}: {} ({:?})", lifetime.label, lifetime.tier());
        });
    }
    sleep(Duration::from_millis(200)).await;
    info!(active = monitor.active_count(), "monitors running");
    monitor.stop_all_and_join().await;

    // 3) 古い画像を 1 件置いて掃除
    let stale_at = clock.now() - TimeDelta::hours(2);
    let stale_id = ArtifactId::from_ulid(Ulid::new());
    let mut stale = ArtifactRecord::new(stale_id, owner, None, stale_at);
    stale.start(stale_at)?;
    stale.complete(format!("https://cdn.example/portraits/{stale_id}.png"), stale_at)?;
    store.insert(stale).await?;
    blobs.put(stale_id, "stale.png").await;

    let expiring_soon = expiry.list_expiring_soon(&admin).await?.len();
    let cleanup = expiry.cleanup_expired(&admin).await?;
    let counts = store.counts_by_status().await?;

    let summary = Summary {
        outcome,
        expiring_soon,
        cleanup,
        counts,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
