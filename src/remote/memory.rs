//! In-process remote store.
//!
//! Holds the collections in `watch` channels so observers receive a full
//! snapshot on subscription and after every write. Used to embed the engine
//! without a server and as the remote side in tests, where its switches
//! simulate outages and failing collections.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use uuid::Uuid;

use super::wire::{
    bikes_from_collection, maintenances_from_collection, BikeCollection, BikeDoc,
    MaintenanceCollection, MaintenanceDoc,
};
use crate::error::RemoteError;
use crate::models::{Bike, Maintenance};
use crate::store::{RecordStream, RemoteStore};

#[derive(Debug, Default)]
struct Failures {
    pushes: bool,
    bike_fetch: bool,
    maintenance_fetch: HashSet<String>,
}

pub struct MemoryRemoteStore {
    user_id: Mutex<Option<String>>,
    connected: AtomicBool,
    writes: AtomicUsize,
    bikes: Mutex<watch::Sender<BikeCollection>>,
    maintenances: Mutex<HashMap<String, watch::Sender<MaintenanceCollection>>>,
    failures: Mutex<Failures>,
}

impl MemoryRemoteStore {
    /// A connected store for `user_id`.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Mutex::new(Some(user_id.into())),
            connected: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
            bikes: Mutex::new(watch::channel(BTreeMap::new()).0),
            maintenances: Mutex::new(HashMap::new()),
            failures: Mutex::new(Failures::default()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Signs the current user out while staying connected.
    pub fn sign_out(&self) {
        *self.user_id.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Makes every push and delete fail with a network error.
    pub fn fail_pushes(&self, fail: bool) {
        self.lock_failures().pushes = fail;
    }

    /// Makes subscriptions to the bike collection fail.
    pub fn fail_bike_fetch(&self, fail: bool) {
        self.lock_failures().bike_fetch = fail;
    }

    /// Makes subscriptions to one bike's maintenance collection fail.
    pub fn fail_maintenance_fetch(&self, bike_ref: &str) {
        self.lock_failures()
            .maintenance_fetch
            .insert(bike_ref.to_string());
    }

    /// Number of successful pushes and deletes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Writes a bike at `remote_ref` as another device would.
    pub fn seed_bike(&self, remote_ref: &str, bike: &Bike) {
        self.put_bike(remote_ref.to_string(), BikeDoc::from(bike));
    }

    /// Writes a maintenance under `bike_ref` as another device would.
    pub fn seed_maintenance(&self, bike_ref: &str, remote_ref: &str, maintenance: &Maintenance) {
        self.put_maintenance(
            bike_ref,
            remote_ref.to_string(),
            MaintenanceDoc::from(maintenance),
        );
    }

    pub fn bikes(&self) -> Vec<Bike> {
        let snapshot = self.lock_bikes().borrow().clone();
        bikes_from_collection(snapshot)
    }

    pub fn maintenances(&self, bike_ref: &str) -> Vec<Maintenance> {
        let map = self.lock_maintenances();
        match map.get(bike_ref) {
            Some(sender) => maintenances_from_collection(sender.borrow().clone()),
            None => Vec::new(),
        }
    }

    /// Ends every open subscription, as a dropped connection would. Data is
    /// kept; new subscriptions work as before.
    pub fn drop_subscribers(&self) {
        {
            let mut bikes = self.lock_bikes();
            let snapshot = bikes.borrow().clone();
            *bikes = watch::channel(snapshot).0;
        }
        let mut map = self.lock_maintenances();
        for sender in map.values_mut() {
            let snapshot = sender.borrow().clone();
            *sender = watch::channel(snapshot).0;
        }
    }

    fn lock_bikes(&self) -> std::sync::MutexGuard<'_, watch::Sender<BikeCollection>> {
        self.bikes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_maintenances(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<String, watch::Sender<MaintenanceCollection>>> {
        self.maintenances.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, Failures> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn put_bike(&self, remote_ref: String, doc: BikeDoc) {
        self.lock_bikes().send_modify(|bikes| {
            bikes.insert(remote_ref, doc);
        });
    }

    fn put_maintenance(&self, bike_ref: &str, remote_ref: String, doc: MaintenanceDoc) {
        self.lock_maintenances()
            .entry(bike_ref.to_string())
            .or_insert_with(|| watch::channel(BTreeMap::new()).0)
            .send_modify(|maintenances| {
                maintenances.insert(remote_ref, doc);
            });
    }

    fn check_writable(&self) -> Result<(), RemoteError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RemoteError::NotConnected);
        }
        if self.lock_failures().pushes {
            return Err(RemoteError::Network("simulated push failure".to_string()));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn new_ref() -> String {
    Uuid::new_v4().simple().to_string()
}

fn snapshots<D, T>(
    mut receiver: watch::Receiver<BTreeMap<String, D>>,
    convert: fn(BTreeMap<String, D>) -> Vec<T>,
) -> RecordStream<T, RemoteError>
where
    D: Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    Box::pin(async_stream::stream! {
        loop {
            let snapshot = receiver.borrow_and_update().clone();
            yield Ok(convert(snapshot));
            if receiver.changed().await.is_err() {
                break;
            }
        }
    })
}

fn failing<T: Send + 'static>(message: String) -> RecordStream<T, RemoteError> {
    Box::pin(futures::stream::once(async move {
        Err(RemoteError::Network(message))
    }))
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn current_user_id(&self) -> Option<String> {
        self.user_id.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn push_bike(&self, bike: &Bike) -> Result<String, RemoteError> {
        self.check_writable()?;

        let remote_ref = bike.remote_ref.clone().unwrap_or_else(new_ref);
        self.put_bike(remote_ref.clone(), BikeDoc::from(bike));
        self.record_write();
        Ok(remote_ref)
    }

    async fn push_maintenance(
        &self,
        maintenance: &Maintenance,
        bike_ref: &str,
    ) -> Result<String, RemoteError> {
        self.check_writable()?;

        if !self.lock_bikes().borrow().contains_key(bike_ref) {
            return Err(RemoteError::NotFound(format!("bike {}", bike_ref)));
        }

        let remote_ref = maintenance.remote_ref.clone().unwrap_or_else(new_ref);
        self.put_maintenance(bike_ref, remote_ref.clone(), MaintenanceDoc::from(maintenance));
        self.record_write();
        Ok(remote_ref)
    }

    async fn delete_bike(&self, remote_ref: &str) -> Result<(), RemoteError> {
        self.check_writable()?;

        self.lock_bikes().send_modify(|bikes| {
            bikes.remove(remote_ref);
        });
        if let Some(sender) = self.lock_maintenances().get(remote_ref) {
            sender.send_modify(|maintenances| maintenances.clear());
        }
        self.record_write();
        Ok(())
    }

    async fn delete_maintenance(
        &self,
        bike_ref: &str,
        remote_ref: &str,
    ) -> Result<(), RemoteError> {
        self.check_writable()?;

        if let Some(sender) = self.lock_maintenances().get(bike_ref) {
            sender.send_modify(|maintenances| {
                maintenances.remove(remote_ref);
            });
        }
        self.record_write();
        Ok(())
    }

    fn observe_bikes(&self) -> RecordStream<Bike, RemoteError> {
        if self.lock_failures().bike_fetch {
            return failing("simulated bike fetch failure".to_string());
        }
        snapshots(self.lock_bikes().subscribe(), bikes_from_collection)
    }

    fn observe_maintenances(&self, bike_ref: &str) -> RecordStream<Maintenance, RemoteError> {
        if self.lock_failures().maintenance_fetch.contains(bike_ref) {
            return failing(format!("simulated maintenance fetch failure for {}", bike_ref));
        }
        let receiver = self
            .lock_maintenances()
            .entry(bike_ref.to_string())
            .or_insert_with(|| watch::channel(BTreeMap::new()).0)
            .subscribe();
        snapshots(receiver, maintenances_from_collection)
    }
}
