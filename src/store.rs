use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::SyncError;
use crate::models::{RecordId, Resource};
use crate::transport::{ApiRequest, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot<R> {
    pub records: Vec<R>,
    pub status: LoadStatus,
    pub error: Option<SyncError>,
    pub revision: u64,
}

impl<R> StoreSnapshot<R> {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            status: LoadStatus::Idle,
            error: None,
            revision: 0,
        }
    }
}

#[derive(Debug)]
struct StoreInner<R> {
    records: Vec<R>,
    last_error: Option<SyncError>,
    revision: u64,
    next_seq: u64,
    newest_started: u64,
    newest_settled: u64,
    in_flight: usize,
}

impl<R: Resource> StoreInner<R> {
    fn status(&self) -> LoadStatus {
        if self.in_flight > 0 {
            LoadStatus::Loading
        } else if self.last_error.is_some() {
            LoadStatus::Error
        } else {
            LoadStatus::Idle
        }
    }

    fn start_fetch(&mut self) -> u64 {
        self.next_seq += 1;
        self.newest_started = self.next_seq;
        self.in_flight += 1;
        self.next_seq
    }

    fn outcome(&self) -> Result<Vec<R>, SyncError> {
        match &self.last_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.records.clone()),
        }
    }
}

struct Shared<R> {
    inner: Mutex<StoreInner<R>>,
    settled: Condvar,
}

/// In-memory list for one collection, shared between the UI and worker threads.
/// Cloning hands out another handle to the same store.
pub struct CollectionStore<R> {
    shared: Arc<Shared<R>>,
}

impl<R> Clone for CollectionStore<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: Resource> Default for CollectionStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> CollectionStore<R> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(StoreInner {
                    records: Vec::new(),
                    last_error: None,
                    revision: 0,
                    next_seq: 0,
                    newest_started: 0,
                    newest_settled: 0,
                    in_flight: 0,
                }),
                settled: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner<R>> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches the whole collection. While another fetch is running, waits for it and
    /// returns its outcome instead of issuing a second request.
    pub fn load(&self, transport: &dyn Transport) -> Result<Vec<R>, SyncError> {
        let seq = {
            let inner = self.lock();
            if inner.in_flight > 0 {
                let target = inner.newest_started;
                log::debug!("joining in-flight {} fetch #{target}", R::COLLECTION.path());
                let inner = self.wait_settled(inner, target);
                return inner.outcome();
            }
            let mut inner = inner;
            inner.start_fetch()
        };
        self.fetch(seq, transport)
    }

    /// Starts a new fetch even when one is running; the older response is discarded
    /// if it lands after this one started.
    pub fn refresh(&self, transport: &dyn Transport) -> Result<Vec<R>, SyncError> {
        let seq = self.lock().start_fetch();
        self.fetch(seq, transport)
    }

    fn fetch(&self, seq: u64, transport: &dyn Transport) -> Result<Vec<R>, SyncError> {
        let collection = R::COLLECTION;
        let guard = FetchGuard {
            store: self,
            seq,
            armed: true,
        };
        let result = transport
            .send(&ApiRequest::List(collection))
            .and_then(decode_list::<R>);
        guard.disarm();

        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);

        if seq < inner.newest_started {
            log::debug!(
                "discarding stale {} fetch #{seq} (newest #{})",
                collection.path(),
                inner.newest_started
            );
            inner.newest_settled = inner.newest_settled.max(seq);
            self.shared.settled.notify_all();
            let target = inner.newest_started;
            let inner = self.wait_settled(inner, target);
            return inner.outcome();
        }

        match result {
            Ok(records) => {
                log::info!("loaded {} {} records", records.len(), collection.path());
                inner.records = records;
                inner.last_error = None;
                inner.revision += 1;
            }
            Err(err) => {
                log::warn!("failed loading {}: {err}", collection.path());
                inner.last_error = Some(err);
            }
        }
        inner.newest_settled = inner.newest_settled.max(seq);
        self.shared.settled.notify_all();
        inner.outcome()
    }

    fn wait_settled<'a>(
        &self,
        mut inner: MutexGuard<'a, StoreInner<R>>,
        target: u64,
    ) -> MutexGuard<'a, StoreInner<R>> {
        while inner.newest_settled < target {
            inner = self
                .shared
                .settled
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        inner
    }

    pub fn upsert(&self, record: R) {
        let mut inner = self.lock();
        let id = record.id();
        match inner.records.iter().position(|r| r.id() == id) {
            Some(idx) => inner.records[idx] = record,
            None => inner.records.push(record),
        }
        inner.revision += 1;
    }

    pub fn remove(&self, id: RecordId) {
        let mut inner = self.lock();
        let before = inner.records.len();
        inner.records.retain(|r| r.id() != id);
        if inner.records.len() != before {
            inner.revision += 1;
        }
    }

    /// Hydrates the store from a persisted copy without touching its status.
    pub fn seed(&self, records: Vec<R>) {
        let mut inner = self.lock();
        inner.records = records;
        inner.revision += 1;
    }

    pub fn get(&self, id: RecordId) -> Option<R> {
        self.lock().records.iter().find(|r| r.id() == id).cloned()
    }

    pub fn records(&self) -> Vec<R> {
        self.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn status(&self) -> LoadStatus {
        self.lock().status()
    }

    pub fn last_error(&self) -> Option<SyncError> {
        self.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot<R> {
        let inner = self.lock();
        StoreSnapshot {
            records: inner.records.clone(),
            status: inner.status(),
            error: inner.last_error.clone(),
            revision: inner.revision,
        }
    }
}

/// Settles a fetch whose transport call unwound, so joined loads are not left waiting.
struct FetchGuard<'a, R: Resource> {
    store: &'a CollectionStore<R>,
    seq: u64,
    armed: bool,
}

impl<R: Resource> FetchGuard<'_, R> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<R: Resource> Drop for FetchGuard<'_, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.store.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if self.seq >= inner.newest_started {
            inner.last_error = Some(SyncError::network(format!(
                "{} fetch aborted",
                R::COLLECTION.path()
            )));
        }
        inner.newest_settled = inner.newest_settled.max(self.seq);
        self.store.shared.settled.notify_all();
    }
}

pub fn decode_list<R: Resource>(value: Value) -> Result<Vec<R>, SyncError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => serde_json::from_value(value).map_err(|err| {
            SyncError::server(
                200,
                format!("malformed {} list: {err}", R::COLLECTION.path()),
            )
        }),
        _ => Err(SyncError::server(
            200,
            format!("expected a {} list", R::COLLECTION.path()),
        )),
    }
}
