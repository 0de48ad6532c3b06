//! LifecycleMonitor - artifact ごとの期限監視タイマー
//!
//! # 設計
//! - registry（ArtifactId -> timer）はモニターのインスタンスが所有する
//!   （セッション / 画面ごとに 1 つ作る。プロセス全体のシングルトンではない）
//! - 1 artifact につきタイマーは高々 1 本。start は置き換え（加算ではない）
//! - tick ごとに ExpiryInfoSource から lifetime を取り直して callback に渡す
//! - expired を受け取ったら自分で止まる
//! - tick 内のエラーはログに出して握りつぶし、次の tick で再試行
//! - 停止済みの履歴は直近 N 件だけ保持（古いものは NotMonitored に戻る）

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::{ArtifactId, LifetimeDescriptor, MonitorState, OwnerId};
use crate::ports::ExpiryInfoSource;

/// Invoked with a fresh descriptor on every successful tick.
pub type ExpiryCallback = Arc<dyn Fn(LifetimeDescriptor) + Send + Sync>;

struct MonitorEntry {
    generation: u64,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorEntry {
    fn stop(self) -> JoinHandle<()> {
        // the task may already have exited
        let _ = self.shutdown_tx.send(true);
        self.join
    }
}

/// Default number of stopped artifacts remembered for [`LifecycleMonitor::state`].
pub const DEFAULT_STOPPED_HISTORY: usize = 1024;

/// Most recently stopped artifacts, oldest evicted first.
struct StoppedHistory {
    members: HashSet<ArtifactId>,
    order: VecDeque<ArtifactId>,
    capacity: usize,
}

impl StoppedHistory {
    fn new(capacity: usize) -> Self {
        Self {
            members: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn insert(&mut self, artifact_id: ArtifactId) {
        if !self.members.insert(artifact_id) {
            return;
        }
        self.order.push_back(artifact_id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, artifact_id: &ArtifactId) {
        if self.members.remove(artifact_id) {
            self.order.retain(|id| id != artifact_id);
        }
    }

    fn contains(&self, artifact_id: &ArtifactId) -> bool {
        self.members.contains(artifact_id)
    }
}

struct Registry {
    active: HashMap<ArtifactId, MonitorEntry>,
    stopped: StoppedHistory,
    next_generation: u64,
}

impl Registry {
    fn new(stopped_capacity: usize) -> Self {
        Self {
            active: HashMap::new(),
            stopped: StoppedHistory::new(stopped_capacity),
            next_generation: 0,
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct LifecycleMonitor {
    source: Arc<dyn ExpiryInfoSource>,
    interval: Duration,
    registry: Arc<Mutex<Registry>>,
}

impl LifecycleMonitor {
    pub fn new(source: Arc<dyn ExpiryInfoSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            registry: Arc::new(Mutex::new(Registry::new(DEFAULT_STOPPED_HISTORY))),
        }
    }

    /// Remember at most `capacity` stopped artifacts; older ones report
    /// [`MonitorState::NotMonitored`] again.
    pub fn with_stopped_history(self, capacity: usize) -> Self {
        lock(&self.registry).stopped = StoppedHistory::new(capacity);
        self
    }

    /// Begin monitoring `artifact_id`, replacing any monitor already running
    /// for it. The first tick fires immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, artifact_id: ArtifactId, owner_id: OwnerId, callback: F)
    where
        F: Fn(LifetimeDescriptor) + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut registry = lock(&self.registry);

        if let Some(previous) = registry.active.remove(&artifact_id) {
            debug!(%artifact_id, "replacing running monitor");
            drop(previous.stop());
        }
        registry.stopped.remove(&artifact_id);
        registry.next_generation += 1;
        let generation = registry.next_generation;

        let task = MonitorTask {
            artifact_id,
            owner_id,
            generation,
            source: Arc::clone(&self.source),
            callback: Arc::new(callback),
            interval: self.interval,
            registry: Arc::downgrade(&self.registry),
        };
        let join = tokio::spawn(task.run(shutdown_rx));

        registry.active.insert(
            artifact_id,
            MonitorEntry {
                generation,
                shutdown_tx,
                join,
            },
        );
        info!(%artifact_id, %owner_id, interval_secs = self.interval.as_secs(), "monitoring started");
    }

    /// Stop monitoring `artifact_id`. No-op if it is not being monitored.
    pub fn stop(&self, artifact_id: ArtifactId) {
        let mut registry = lock(&self.registry);
        if let Some(entry) = registry.active.remove(&artifact_id) {
            drop(entry.stop());
            registry.stopped.insert(artifact_id);
            info!(%artifact_id, "monitoring stopped");
        }
    }

    /// Stop every running monitor, e.g. when the owning view goes away.
    pub fn stop_all(&self) {
        for join in self.drain() {
            drop(join);
        }
    }

    /// [`Self::stop_all`] and wait for the timer tasks to exit.
    pub async fn stop_all_and_join(&self) {
        for join in self.drain() {
            let _ = join.await;
        }
    }

    pub fn state(&self, artifact_id: ArtifactId) -> MonitorState {
        let registry = lock(&self.registry);
        if registry.active.contains_key(&artifact_id) {
            MonitorState::Monitoring
        } else if registry.stopped.contains(&artifact_id) {
            MonitorState::Stopped
        } else {
            MonitorState::NotMonitored
        }
    }

    pub fn active_count(&self) -> usize {
        lock(&self.registry).active.len()
    }

    fn drain(&self) -> Vec<JoinHandle<()>> {
        let mut registry = lock(&self.registry);
        let entries: Vec<(ArtifactId, MonitorEntry)> = registry.active.drain().collect();
        if !entries.is_empty() {
            info!(count = entries.len(), "stopping all monitors");
        }
        entries
            .into_iter()
            .map(|(artifact_id, entry)| {
                registry.stopped.insert(artifact_id);
                entry.stop()
            })
            .collect()
    }
}

impl Drop for LifecycleMonitor {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// One ticking timer. Holds only a weak reference back to the registry so a
/// dropped monitor does not stay alive through its own tasks.
struct MonitorTask {
    artifact_id: ArtifactId,
    owner_id: OwnerId,
    generation: u64,
    source: Arc<dyn ExpiryInfoSource>,
    callback: ExpiryCallback,
    interval: Duration,
    registry: Weak<Mutex<Registry>>,
}

impl MonitorTask {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // stop requested, or the monitor itself is gone
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            let result = self
                .source
                .expiry_info(self.artifact_id, self.owner_id)
                .await;

            // stop() may have landed while we were waiting on the source
            if *shutdown_rx.borrow() {
                break;
            }

            match result {
                Ok(descriptor) => {
                    let expired = descriptor.expired;
                    debug!(
                        artifact_id = %self.artifact_id,
                        minutes_remaining = descriptor.minutes_remaining,
                        expired,
                        "monitor tick"
                    );
                    (self.callback)(descriptor);
                    if expired {
                        self.retire();
                        break;
                    }
                }
                Err(e) => {
                    warn!(artifact_id = %self.artifact_id, error = %e, "monitor tick failed");
                }
            }
        }
    }

    /// Remove our own registry entry, unless it has been replaced meanwhile.
    fn retire(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = lock(&registry);
        let ours = registry
            .active
            .get(&self.artifact_id)
            .is_some_and(|entry| entry.generation == self.generation);
        if ours {
            registry.active.remove(&self.artifact_id);
            registry.stopped.insert(self.artifact_id);
            info!(artifact_id = %self.artifact_id, "artifact expired, monitoring stopped");
        }
    }
}
