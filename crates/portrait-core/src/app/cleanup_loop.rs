//! CleanupLoop - 期限切れ artifact の定期掃除
//!
//! # フロー
//! 1. 起動直後に 1 回、その後 interval ごとに cleanup_expired を呼ぶ
//! 2. sweep の失敗はログに出して次の周期で再試行
//! 3. shutdown 要求が来たら周期の合間で抜ける（実行中の sweep は完了まで待つ）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::app::ExpiryService;
use crate::domain::Caller;

pub struct CleanupLoop {
    expiry: Arc<ExpiryService>,
    caller: Caller,
    interval: Duration,
}

/// Handle to a spawned [`CleanupLoop`].
/// - dropping the handle also stops the loop
pub struct CleanupLoopHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl CleanupLoop {
    /// `caller` is the identity sweeps run as; it needs the admin role.
    pub fn new(expiry: Arc<ExpiryService>, caller: Caller, interval: Duration) -> Self {
        Self {
            expiry,
            caller,
            interval,
        }
    }

    pub fn spawn(self) -> CleanupLoopHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        CleanupLoopHandle { shutdown_tx, join }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                // a dropped handle counts as a shutdown request
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.expiry.cleanup_expired(&self.caller).await {
                Ok(report) if report.errors.is_empty() => {
                    if report.cleaned_count > 0 {
                        info!(cleaned = report.cleaned_count, "cleanup sweep finished");
                    }
                }
                Ok(report) => {
                    warn!(
                        cleaned = report.cleaned_count,
                        errors = ?report.errors,
                        "cleanup sweep finished with errors"
                    );
                }
                Err(e) => warn!(error = %e, "cleanup sweep failed"),
            }
        }
        info!("cleanup loop stopped");
    }
}

impl CleanupLoopHandle {
    pub fn request_shutdown(&self) {
        // the loop may already have exited
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::domain::{ArtifactId, ArtifactRecord, OwnerId};
    use crate::impls::InMemoryArtifactStore;
    use crate::ports::{ArtifactStore, Clock, FixedClock};
    use chrono::{TimeDelta, TimeZone, Utc};
    use ulid::Ulid;

    const EVERY: Duration = Duration::from_secs(300);

    struct Fixture {
        store: InMemoryArtifactStore,
        clock: FixedClock,
        expiry: Arc<ExpiryService>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryArtifactStore::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
        let expiry = Arc::new(ExpiryService::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            &LifecycleConfig::default(),
        ));
        Fixture {
            store,
            clock,
            expiry,
        }
    }

    fn admin() -> Caller {
        Caller::admin(OwnerId::from_ulid(Ulid::new()))
    }

    impl Fixture {
        async fn completed_at(&self, created: chrono::DateTime<Utc>) -> ArtifactId {
            let id = ArtifactId::from_ulid(Ulid::new());
            let mut record =
                ArtifactRecord::new(id, OwnerId::from_ulid(Ulid::new()), None, created);
            record.start(created).unwrap();
            record.complete("https://cdn/x.png", created).unwrap();
            self.store.insert(record).await.unwrap();
            id
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_start_and_every_interval() {
        let f = fixture();
        let old = f.completed_at(f.clock.now() - TimeDelta::hours(2)).await;
        let fresh = f.completed_at(f.clock.now() - TimeDelta::minutes(58)).await;

        let handle = CleanupLoop::new(f.expiry.clone(), admin(), EVERY).spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(f.store.get_unscoped(old).await.is_none());
        assert!(f.store.get_unscoped(fresh).await.is_some());

        f.clock.advance(TimeDelta::minutes(5));
        tokio::time::sleep(EVERY).await;

        assert!(f.store.is_empty().await);
        handle.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn non_admin_caller_never_deletes() {
        let f = fixture();
        let old = f.completed_at(f.clock.now() - TimeDelta::hours(2)).await;

        let caller = Caller::user(OwnerId::from_ulid(Ulid::new()));
        let handle = CleanupLoop::new(f.expiry.clone(), caller, EVERY).spawn();
        tokio::time::sleep(EVERY * 2).await;

        assert!(f.store.get_unscoped(old).await.is_some());
        handle.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_further_sweeps() {
        let f = fixture();
        let handle = CleanupLoop::new(f.expiry.clone(), admin(), EVERY).spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.shutdown_and_join().await;

        let old = f.completed_at(f.clock.now() - TimeDelta::hours(2)).await;
        tokio::time::sleep(EVERY * 2).await;

        assert!(f.store.get_unscoped(old).await.is_some());
    }
}
