//! GenerationPipeline - 学習待ち → 画像生成 → record 更新
//!
//! # フロー（run）
//! 1. training job が trained になるまで poll
//! 2. count 件の pending record を作り、その id で画像生成を依頼（→ in_progress）
//! 3. 画像を poll
//! 4. 結果に応じて record を completed / failed に更新
//!    （loop 終了時点でまだ生成中のものは in_progress のまま残す）
//!
//! 失敗・タイムアウト・キャンセル時は、未確定の record をすべて failed にする。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::app::poll_loop::{Cancellation, poll_images, poll_training};
use crate::config::LifecycleConfig;
use crate::domain::{
    ArtifactId, ArtifactRecord, GenerationOutcome, LifecycleError, ModelId, OwnerId, PollPolicy,
    RemoteJobId,
};
use crate::ports::{ArtifactStore, Clock, IdGenerator, ModelProvider};

pub struct GenerationPipeline {
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    training_policy: PollPolicy,
    image_policy: PollPolicy,
    min_completed: usize,
}

impl GenerationPipeline {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            provider,
            store,
            clock,
            ids,
            training_policy: config.training_poll.policy(),
            image_policy: config.image_poll.policy(),
            min_completed: config.min_completed_images,
        }
    }

    pub async fn run(
        &self,
        job: &RemoteJobId,
        model: &ModelId,
        count: usize,
        owner_id: OwnerId,
        cancel: &Cancellation,
    ) -> Result<GenerationOutcome, LifecycleError> {
        let checks =
            poll_training(self.provider.as_ref(), job, self.training_policy, cancel).await?;
        info!(job = %job, checks, "training finished");

        if count == 0 {
            return Ok(GenerationOutcome {
                images: Vec::new(),
                failed: Vec::new(),
                partial: false,
                attempts: 0,
            });
        }

        let ids = self.create_records(model, count, owner_id).await?;

        if let Err(e) = self.provider.request_images(model, &ids).await {
            self.fail_unsettled(&ids, owner_id, &e).await;
            return Err(e);
        }
        for &id in &ids {
            self.transition(id, owner_id, |record, now| record.start(now))
                .await?;
        }
        info!(model = %model, count, "image generation requested");

        let threshold = self.min_completed.min(count);
        let outcome = match poll_images(
            self.provider.as_ref(),
            model,
            &ids,
            self.image_policy,
            threshold,
            cancel,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail_unsettled(&ids, owner_id, &e).await;
                return Err(e);
            }
        };

        for image in &outcome.images {
            let url = image.url.clone();
            self.transition(image.artifact_id, owner_id, move |record, now| {
                record.complete(url, now)
            })
            .await?;
        }
        for &id in &outcome.failed {
            self.transition(id, owner_id, |record, now| {
                record.fail("generation failed at provider", now)
            })
            .await?;
        }

        info!(
            model = %model,
            completed = outcome.images.len(),
            failed = outcome.failed.len(),
            partial = outcome.partial,
            "generation finished"
        );
        Ok(outcome)
    }

    async fn create_records(
        &self,
        model: &ModelId,
        count: usize,
        owner_id: OwnerId,
    ) -> Result<Vec<ArtifactId>, LifecycleError> {
        let now = self.clock.now();
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.ids.generate_artifact_id();
            self.store
                .insert(ArtifactRecord::new(id, owner_id, Some(model.clone()), now))
                .await?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn transition<F>(
        &self,
        artifact_id: ArtifactId,
        owner_id: OwnerId,
        apply: F,
    ) -> Result<(), LifecycleError>
    where
        F: FnOnce(&mut ArtifactRecord, DateTime<Utc>) -> Result<(), LifecycleError> + Send,
    {
        let mut record = self
            .store
            .find(artifact_id, owner_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("artifact {artifact_id}")))?;
        apply(&mut record, self.clock.now())?;
        self.store.update(record).await
    }

    /// Mark every non-terminal record failed. Best effort: store errors are
    /// logged and the original error is what the caller sees.
    async fn fail_unsettled(&self, ids: &[ArtifactId], owner_id: OwnerId, cause: &LifecycleError) {
        let reason = cause.to_string();
        for &id in ids {
            let result = match self.store.find(id, owner_id).await {
                Ok(Some(mut record)) if !record.status.is_terminal() => {
                    match record.fail(reason.clone(), self.clock.now()) {
                        Ok(()) => self.store.update(record).await,
                        Err(e) => Err(e),
                    }
                }
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(artifact_id = %id, error = %e, "could not mark artifact failed");
            }
        }
    }
}
