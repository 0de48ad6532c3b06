//! Bounded poll loops for long-running remote jobs.
//!
//! # 状態遷移
//! Pending -> Polling -> {Succeeded | Failed | TimedOut}
//!
//! - attempt は厳密に逐次（N+1 回目は N 回目の結果が出てから）
//! - transient なエラーは attempt を 1 つ消費して続行
//! - cancel は各 attempt の前と各 wait の最中にチェック

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{
    ArtifactId, GeneratedImage, GenerationOutcome, ImageSnapshot, ImageStatus, LifecycleError,
    ModelId, PollPolicy, PollState, RemoteJobId, TrainingStatus,
};
use crate::ports::ModelProvider;

/// Sending side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // receivers may already be gone
        let _ = self.tx.send(true);
    }
}

/// Receiving side, threaded through every suspension point of a poll loop.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn channel() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Self { rx })
    }

    /// A cancellation that never fires.
    pub fn never() -> Self {
        Self::channel().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle was dropped
    /// without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Book-keeping shared by both loops.
struct PollRun<'a> {
    label: &'static str,
    target: &'a str,
    policy: PollPolicy,
    state: PollState,
    attempts: u32,
    last_error: Option<String>,
}

impl<'a> PollRun<'a> {
    fn new(label: &'static str, target: &'a str, policy: PollPolicy) -> Self {
        Self {
            label,
            target,
            policy,
            state: PollState::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    /// Start the next attempt, or report why there is none.
    fn begin_attempt(&mut self, cancel: &Cancellation) -> Result<(), LifecycleError> {
        if cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        debug_assert!(!self.state.is_terminal());
        self.state = PollState::Polling;
        self.attempts += 1;
        debug!(
            poll = self.label,
            target = self.target,
            state = ?self.state,
            attempt = self.attempts,
            max_attempts = self.policy.max_attempts,
            "polling"
        );
        Ok(())
    }

    fn has_attempts_left(&self) -> bool {
        self.attempts < self.policy.max_attempts
    }

    /// Absorb a failed check; transient errors are retried, others end the run.
    fn absorb(&mut self, error: LifecycleError) -> Result<(), LifecycleError> {
        if !error.is_transient() {
            return Err(self.fail(error));
        }
        warn!(
            poll = self.label,
            target = self.target,
            attempt = self.attempts,
            error = %error,
            "status check failed, will retry"
        );
        self.last_error = Some(error.to_string());
        Ok(())
    }

    async fn wait(&self, cancel: &Cancellation) -> Result<(), LifecycleError> {
        if cancel.sleep(self.policy.interval).await {
            Ok(())
        } else {
            Err(self.cancelled())
        }
    }

    fn succeed(&mut self) {
        self.state = PollState::Succeeded;
        info!(
            poll = self.label,
            target = self.target,
            attempts = self.attempts,
            "remote job succeeded"
        );
    }

    fn fail(&mut self, error: LifecycleError) -> LifecycleError {
        self.state = PollState::Failed;
        warn!(poll = self.label, target = self.target, error = %error, "remote job failed");
        error
    }

    fn time_out(&mut self) -> LifecycleError {
        self.state = PollState::TimedOut;
        warn!(
            poll = self.label,
            target = self.target,
            attempts = self.attempts,
            "remote job timed out"
        );
        LifecycleError::Timeout {
            attempts: self.attempts,
            last_error: self.last_error.clone(),
        }
    }

    fn cancelled(&self) -> LifecycleError {
        info!(poll = self.label, target = self.target, attempts = self.attempts, "poll cancelled");
        LifecycleError::Cancelled {
            attempts: self.attempts,
        }
    }
}

/// Wait for a training job to reach `trained`.
///
/// Returns the number of status checks it took. `failed` ends the loop
/// immediately with `TerminalFailure`; running out of attempts yields
/// `Timeout`.
pub async fn poll_training(
    provider: &dyn ModelProvider,
    job: &RemoteJobId,
    policy: PollPolicy,
    cancel: &Cancellation,
) -> Result<u32, LifecycleError> {
    let mut run = PollRun::new("training", job.as_str(), policy);

    while run.has_attempts_left() {
        run.begin_attempt(cancel)?;
        match provider.training_status(job).await {
            Ok(TrainingStatus::Trained) => {
                run.succeed();
                return Ok(run.attempts);
            }
            Ok(TrainingStatus::Failed) => {
                return Err(run.fail(LifecycleError::TerminalFailure(format!(
                    "training job {job} failed"
                ))));
            }
            Ok(TrainingStatus::Training) => {}
            Err(e) => run.absorb(e)?,
        }
        if run.has_attempts_left() {
            run.wait(cancel).await?;
        }
    }

    Err(run.time_out())
}

/// Per-poll tally of this batch's images in the provider's listing.
#[derive(Debug, Default)]
struct ImageTally {
    completed: Vec<GeneratedImage>,
    failed: Vec<ArtifactId>,
    generating: usize,
}

impl ImageTally {
    /// Only images in `batch` are counted. Batch ids missing from the listing
    /// have not been picked up yet and count as generating.
    fn from_snapshots(snapshots: &[ImageSnapshot], batch: &HashSet<ArtifactId>) -> Self {
        let mut tally = Self::default();
        let mut seen = HashSet::with_capacity(batch.len());
        for snap in snapshots {
            if !batch.contains(&snap.artifact_id) || !seen.insert(snap.artifact_id) {
                continue;
            }
            if let Some(url) = snap.completed_url() {
                tally.completed.push(GeneratedImage {
                    artifact_id: snap.artifact_id,
                    url: url.to_string(),
                });
            } else if snap.status == ImageStatus::Failed {
                tally.failed.push(snap.artifact_id);
            } else {
                tally.generating += 1;
            }
        }
        tally.generating += batch.len() - seen.len();
        tally
    }

    /// Every image of the batch was reported, and all of them failed.
    fn all_failed(&self) -> bool {
        !self.failed.is_empty() && self.completed.is_empty() && self.generating == 0
    }
}

/// Wait for the images of one generation batch.
///
/// The provider lists every image made with `model`; only the ids in `batch`
/// are looked at.
///
/// - as soon as `min_completed` images are done, return every completed image
/// - if every image of the batch has failed, fail without waiting further
/// - when attempts run out, return whatever completed (`partial = true`), or
///   `Timeout` if nothing did
pub async fn poll_images(
    provider: &dyn ModelProvider,
    model: &ModelId,
    batch: &[ArtifactId],
    policy: PollPolicy,
    min_completed: usize,
    cancel: &Cancellation,
) -> Result<GenerationOutcome, LifecycleError> {
    let batch: HashSet<ArtifactId> = batch.iter().copied().collect();
    let mut run = PollRun::new("images", model.as_str(), policy);
    let mut latest = ImageTally::default();

    while run.has_attempts_left() {
        run.begin_attempt(cancel)?;
        match provider.image_statuses(model).await {
            Ok(snapshots) => {
                latest = ImageTally::from_snapshots(&snapshots, &batch);
                debug!(
                    model = %model,
                    completed = latest.completed.len(),
                    generating = latest.generating,
                    failed = latest.failed.len(),
                    "image status"
                );
                if latest.completed.len() >= min_completed.max(1) {
                    run.succeed();
                    return Ok(GenerationOutcome {
                        images: latest.completed,
                        failed: latest.failed,
                        partial: false,
                        attempts: run.attempts,
                    });
                }
                if latest.all_failed() {
                    return Err(run.fail(LifecycleError::TerminalFailure(format!(
                        "all {} images for model {model} failed",
                        latest.failed.len()
                    ))));
                }
            }
            Err(e) => run.absorb(e)?,
        }
        if run.has_attempts_left() {
            run.wait(cancel).await?;
        }
    }

    if latest.completed.is_empty() {
        return Err(run.time_out());
    }

    run.state = PollState::TimedOut;
    info!(
        model = %model,
        completed = latest.completed.len(),
        attempts = run.attempts,
        "image polling exhausted, returning partial results"
    );
    Ok(GenerationOutcome {
        images: latest.completed,
        failed: latest.failed,
        partial: true,
        attempts: run.attempts,
    })
}
