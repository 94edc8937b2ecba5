//! Reconciliation between the local store and the remote store.
//!
//! Two directions:
//! - push-on-write mirrors a record the user just saved and stores the
//!   returned remote ref locally. Remote failures are logged and dropped; the
//!   local write already happened and stays authoritative.
//! - merge (PullOnce / ObserveAndSync) inserts every remote record whose ref
//!   is not known locally. It is a set union keyed by remote ref, so running
//!   it any number of times over the same data is a no-op after the first.

use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::outcome::{MergeReport, SyncOutcome};
use crate::error::{RemoteError, StoreError, SyncError};
use crate::models::{Bike, Maintenance};
use crate::store::{LocalStore, RecordStream, RemoteStore};

/// Wait before resubscribing after the remote bike stream ends.
pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// First emission of a live sequence.
async fn first<T, E>(mut stream: RecordStream<T, E>, closed: E) -> Result<Vec<T>, E> {
    stream.next().await.unwrap_or(Err(closed))
}

#[derive(Clone)]
pub struct SyncEngine {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    resubscribe_delay: Duration,
}

impl SyncEngine {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            local,
            remote,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
        }
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Remote work needs both a connection and a signed-in user.
    async fn can_sync(&self) -> bool {
        self.remote.is_connected().await && self.remote.current_user_id().is_some()
    }

    // ========== Push-on-write ==========

    /// Mirrors a freshly written bike to the remote store and records the
    /// returned ref locally.
    ///
    /// Returns the ref on success and `None` when offline or when the push
    /// failed. Only local store failures are returned as errors.
    pub async fn push_bike(&self, bike: &Bike) -> Result<Option<String>, StoreError> {
        if !self.can_sync().await {
            tracing::debug!("Offline, bike {} stays unsynced", bike.id);
            return Ok(None);
        }

        match self.remote.push_bike(bike).await {
            Ok(remote_ref) => {
                let mut synced = bike.clone();
                synced.remote_ref = Some(remote_ref.clone());
                self.local.update_bike(&synced).await?;
                tracing::debug!("Pushed bike {} as {}", bike.id, remote_ref);
                Ok(Some(remote_ref))
            }
            Err(e) => {
                tracing::warn!("Failed to push bike {}: {}", bike.id, e);
                Ok(None)
            }
        }
    }

    /// Mirrors a freshly written maintenance under its bike's remote record.
    ///
    /// A parent bike that was never synced is pushed first; if that fails the
    /// maintenance is left unsynced as well.
    pub async fn push_maintenance(
        &self,
        maintenance: &Maintenance,
    ) -> Result<Option<String>, StoreError> {
        if !self.can_sync().await {
            tracing::debug!("Offline, maintenance {} stays unsynced", maintenance.id);
            return Ok(None);
        }

        let Some(parent) = self.local.get_bike(maintenance.bike_id).await? else {
            tracing::warn!(
                "Maintenance {} references missing bike {}",
                maintenance.id,
                maintenance.bike_id
            );
            return Ok(None);
        };

        let bike_ref = match parent.remote_ref.clone() {
            Some(bike_ref) => bike_ref,
            None => match self.push_bike(&parent).await? {
                Some(bike_ref) => bike_ref,
                None => {
                    tracing::debug!(
                        "Bike {} is unsynced, skipping maintenance {}",
                        parent.id,
                        maintenance.id
                    );
                    return Ok(None);
                }
            },
        };

        match self.remote.push_maintenance(maintenance, &bike_ref).await {
            Ok(remote_ref) => {
                let mut synced = maintenance.clone();
                synced.remote_ref = Some(remote_ref.clone());
                self.local.update_maintenance(&synced).await?;
                tracing::debug!(
                    "Pushed maintenance {} as {}/{}",
                    maintenance.id,
                    bike_ref,
                    remote_ref
                );
                Ok(Some(remote_ref))
            }
            Err(e) => {
                tracing::warn!("Failed to push maintenance {}: {}", maintenance.id, e);
                Ok(None)
            }
        }
    }

    /// Best-effort removal of a deleted bike's remote record.
    pub async fn delete_remote_bike(&self, bike: &Bike) {
        let Some(remote_ref) = &bike.remote_ref else {
            return;
        };
        if !self.can_sync().await {
            return;
        }
        if let Err(e) = self.remote.delete_bike(remote_ref).await {
            tracing::warn!("Failed to delete remote bike {}: {}", remote_ref, e);
        }
    }

    /// Best-effort removal of a deleted maintenance's remote record.
    pub async fn delete_remote_maintenance(&self, maintenance: &Maintenance, bike_ref: &str) {
        let Some(remote_ref) = &maintenance.remote_ref else {
            return;
        };
        if !self.can_sync().await {
            return;
        }
        if let Err(e) = self.remote.delete_maintenance(bike_ref, remote_ref).await {
            tracing::warn!(
                "Failed to delete remote maintenance {}/{}: {}",
                bike_ref,
                remote_ref,
                e
            );
        }
    }

    /// Pushes every local record that has no remote ref yet. Returns how many
    /// records obtained one.
    pub async fn push_unsynced(&self) -> Result<usize, SyncError> {
        if !self.can_sync().await {
            return Ok(0);
        }

        let mut pushed = 0;

        let bikes = first(self.local.list_bikes(), StoreError::Closed).await?;
        for bike in bikes.iter().filter(|b| b.remote_ref.is_none()) {
            if self.push_bike(bike).await?.is_some() {
                pushed += 1;
            }
        }

        // Re-read so parents pushed above carry their refs
        let bikes = first(self.local.list_bikes(), StoreError::Closed).await?;
        for bike in bikes.iter().filter(|b| b.remote_ref.is_some()) {
            let maintenances =
                first(self.local.list_maintenances(bike.id), StoreError::Closed).await?;
            for maintenance in maintenances.iter().filter(|m| m.remote_ref.is_none()) {
                if self.push_maintenance(maintenance).await?.is_some() {
                    pushed += 1;
                }
            }
        }

        if pushed > 0 {
            tracing::info!("Pushed {} unsynced record(s)", pushed);
        }
        Ok(pushed)
    }

    // ========== Merge ==========

    /// One-shot reconciliation of the whole account.
    ///
    /// A failure to read the remote bike collection aborts the pull, as does
    /// any local write failure. A remote failure while reconciling one bike's
    /// maintenances is logged and recorded in the report, and the pull moves
    /// on to the next bike.
    pub async fn pull_once(&self) -> Result<SyncOutcome, SyncError> {
        if !self.can_sync().await {
            tracing::info!("Offline, skipping pull");
            return Ok(SyncOutcome::NotConnected);
        }

        let local_bikes = first(self.local.list_bikes(), StoreError::Closed).await?;
        let remote_bikes = first(self.remote.observe_bikes(), RemoteError::Closed).await?;

        let report = self.merge_bikes(local_bikes, remote_bikes).await?;
        tracing::info!("Pull complete: {}", report);
        Ok(SyncOutcome::Success(report))
    }

    /// Continuous reconciliation: merges every snapshot of the remote bike
    /// collection as it arrives.
    ///
    /// Emits `NotConnected` and completes if offline at subscription. Errors
    /// are reported as `Error` outcomes and never end the stream. When the
    /// remote subscription ends, the engine reconnects and resubscribes after
    /// the configured delay; while the remote stays unreachable each attempt
    /// is reported as an `Error`. Dropping the returned stream cancels the
    /// subscription.
    pub fn observe_and_sync(&self) -> BoxStream<'static, SyncOutcome> {
        let engine = self.clone();

        Box::pin(async_stream::stream! {
            let mut subscribed = false;
            loop {
                if !subscribed {
                    if !engine.can_sync().await {
                        yield SyncOutcome::NotConnected;
                        break;
                    }
                    subscribed = true;
                } else if !engine.remote.reconnect().await || !engine.can_sync().await {
                    // Lost after subscribing: keep retrying, never complete
                    tracing::debug!(
                        "Still offline, retrying in {:?}",
                        engine.resubscribe_delay
                    );
                    yield SyncOutcome::from_error(&SyncError::Remote(RemoteError::NotConnected));
                    tokio::time::sleep(engine.resubscribe_delay).await;
                    continue;
                }

                yield SyncOutcome::Syncing;
                let mut announced = true;
                let mut snapshots = engine.remote.observe_bikes();

                while let Some(snapshot) = snapshots.next().await {
                    if !announced {
                        yield SyncOutcome::Syncing;
                    }
                    announced = false;

                    let result = match snapshot {
                        Ok(remote_bikes) => engine.merge_snapshot(remote_bikes).await,
                        Err(e) => Err(SyncError::Remote(e)),
                    };

                    match result {
                        Ok(report) => {
                            tracing::debug!("Merged remote snapshot: {}", report);
                            yield SyncOutcome::Success(report);
                        }
                        Err(e) => {
                            tracing::warn!("Sync pass failed: {}", e);
                            yield SyncOutcome::from_error(&e);
                        }
                    }
                }

                tracing::debug!(
                    "Remote bike subscription ended, resubscribing in {:?}",
                    engine.resubscribe_delay
                );
                tokio::time::sleep(engine.resubscribe_delay).await;
            }
        })
    }

    async fn merge_snapshot(&self, remote_bikes: Vec<Bike>) -> Result<MergeReport, SyncError> {
        let local_bikes = first(self.local.list_bikes(), StoreError::Closed).await?;
        self.merge_bikes(local_bikes, remote_bikes).await
    }

    async fn merge_bikes(
        &self,
        local_bikes: Vec<Bike>,
        remote_bikes: Vec<Bike>,
    ) -> Result<MergeReport, SyncError> {
        let mut known: HashMap<String, i64> = local_bikes
            .into_iter()
            .filter_map(|bike| bike.remote_ref.map(|remote_ref| (remote_ref, bike.id)))
            .collect();

        let mut report = MergeReport::default();

        for remote_bike in remote_bikes {
            let Some(bike_ref) = remote_bike.remote_ref.clone() else {
                continue;
            };

            let bike_id = match known.get(&bike_ref) {
                Some(id) => *id,
                None => {
                    let id = self.local.insert_bike(&remote_bike).await?;
                    known.insert(bike_ref.clone(), id);
                    report.bikes_inserted += 1;
                    id
                }
            };

            match self.merge_maintenances(&bike_ref, bike_id).await {
                Ok(inserted) => report.maintenances_inserted += inserted,
                Err(SyncError::Local(e)) => return Err(SyncError::Local(e)),
                Err(e) => {
                    tracing::warn!("Failed to reconcile maintenances of bike {}: {}", bike_ref, e);
                    report.failed_bikes.push(bike_ref);
                }
            }
        }

        Ok(report)
    }

    async fn merge_maintenances(&self, bike_ref: &str, bike_id: i64) -> Result<usize, SyncError> {
        let local = first(self.local.list_maintenances(bike_id), StoreError::Closed).await?;
        let mut known: HashSet<String> = local.into_iter().filter_map(|m| m.remote_ref).collect();

        let remote = first(self.remote.observe_maintenances(bike_ref), RemoteError::Closed).await?;

        let mut inserted = 0;
        for mut maintenance in remote {
            let Some(remote_ref) = maintenance.remote_ref.clone() else {
                continue;
            };
            if known.contains(&remote_ref) {
                continue;
            }
            maintenance.bike_id = bike_id;
            self.local.insert_maintenance(&maintenance).await?;
            known.insert(remote_ref);
            inserted += 1;
        }

        Ok(inserted)
    }
}
