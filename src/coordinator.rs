use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::error::{FieldProblem, SyncError, ValidationError};
use crate::models::{Payload, RecordId, Resource};
use crate::store::CollectionStore;
use crate::transport::{ApiRequest, Transport};
use crate::upload::StagedImage;

const ACK_KEYS: [&str; 3] = ["id", "message", "success"];

type InFlight = Arc<Mutex<HashSet<RecordId>>>;

/// Runs create/update/delete for one collection. The store is only written after the
/// server confirms, and each record id admits one mutation at a time.
pub struct MutationCoordinator<R: Resource> {
    store: CollectionStore<R>,
    transport: Arc<dyn Transport>,
    in_flight: InFlight,
    max_upload_bytes: u64,
}

impl<R: Resource> Clone for MutationCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            transport: Arc::clone(&self.transport),
            in_flight: Arc::clone(&self.in_flight),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

impl<R: Resource> MutationCoordinator<R> {
    pub fn new(
        store: CollectionStore<R>,
        transport: Arc<dyn Transport>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            store,
            transport,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            max_upload_bytes,
        }
    }

    pub fn store(&self) -> &CollectionStore<R> {
        &self.store
    }

    pub fn load(&self) -> Result<Vec<R>, SyncError> {
        self.store.load(self.transport.as_ref())
    }

    pub fn refresh(&self) -> Result<Vec<R>, SyncError> {
        self.store.refresh(self.transport.as_ref())
    }

    pub fn is_busy(&self, id: RecordId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    /// Creates a record. Returns `None` when the server acknowledged the create without
    /// identifying the row and the refreshed list did not reveal it either.
    pub fn create(&self, payload: R::Payload) -> Result<Option<R>, SyncError> {
        let collection = R::COLLECTION;
        let payload = self.resolve_image(payload)?;
        let body = encode_payload(&payload)?;
        let response = self
            .transport
            .send(&ApiRequest::Create { collection, body })
            .inspect_err(|err| log::warn!("create {} failed: {err}", collection.label()))?;

        let Some(record) = compose_record::<R>(&response, &payload, None) else {
            return self.find_created(&payload);
        };
        log::info!("created {} #{}", collection.label(), record.id());
        self.store.upsert(record.clone());
        Ok(Some(record))
    }

    /// Reloads the list after an id-less acknowledgement and picks the newest unseen
    /// row carrying the payload.
    fn find_created(&self, payload: &R::Payload) -> Result<Option<R>, SyncError> {
        let collection = R::COLLECTION;
        let known = self
            .store
            .records()
            .iter()
            .map(|r| r.id())
            .collect::<HashSet<_>>();
        let records = self.store.refresh(self.transport.as_ref())?;
        let created = records
            .into_iter()
            .filter(|r| !known.contains(&r.id()))
            .filter(|r| *r == R::from_payload(r.id(), payload, Some(r)))
            .max_by_key(|r| r.id());
        match &created {
            Some(record) => log::info!("created {} #{}", collection.label(), record.id()),
            None => log::info!("created {} (id not reported)", collection.label()),
        }
        Ok(created)
    }

    pub fn update(&self, id: RecordId, payload: R::Payload) -> Result<R, SyncError> {
        let collection = R::COLLECTION;
        let _claim = InFlightClaim::acquire(&self.in_flight, id)?;
        let payload = self.resolve_image(payload)?;
        let body = encode_payload(&payload)?;
        let response = self
            .transport
            .send(&ApiRequest::Update {
                collection,
                id,
                body,
            })
            .inspect_err(|err| log::warn!("update {} #{id} failed: {err}", collection.label()))?;

        let previous = self.store.get(id);
        let record = match compose_record::<R>(&response, &payload, previous.as_ref()) {
            Some(record) if record.id() == id => record,
            _ => R::from_payload(id, &payload, previous.as_ref()),
        };
        log::info!("updated {} #{id}", collection.label());
        self.store.upsert(record.clone());
        Ok(record)
    }

    pub fn delete(&self, id: RecordId) -> Result<(), SyncError> {
        let collection = R::COLLECTION;
        let _claim = InFlightClaim::acquire(&self.in_flight, id)?;
        self.transport
            .send(&ApiRequest::Delete { collection, id })
            .inspect_err(|err| log::warn!("delete {} #{id} failed: {err}", collection.label()))?;
        log::info!("deleted {} #{id}", collection.label());
        self.store.remove(id);
        Ok(())
    }

    fn resolve_image(&self, mut payload: R::Payload) -> Result<R::Payload, SyncError> {
        let Some(source) = payload.pending_image().map(|p| p.to_path_buf()) else {
            return Ok(payload);
        };
        let staged = StagedImage::acquire(&source, self.max_upload_bytes)?;
        let reference = self
            .transport
            .upload(&staged)
            .inspect_err(|err| log::warn!("image upload failed: {err}"))?;
        drop(staged);
        log::info!("uploaded {} -> {reference}", source.display());
        payload.attach_image(reference);
        Ok(payload)
    }
}

struct InFlightClaim {
    in_flight: InFlight,
    id: RecordId,
}

impl InFlightClaim {
    fn acquire(in_flight: &InFlight, id: RecordId) -> Result<Self, SyncError> {
        let mut guard = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.insert(id) {
            return Err(SyncError::Busy { id });
        }
        Ok(Self {
            in_flight: Arc::clone(in_flight),
            id,
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

fn encode_payload<P: Payload>(payload: &P) -> Result<Value, SyncError> {
    serde_json::to_value(payload).map_err(|err| {
        SyncError::Validation(ValidationError::single(
            "payload",
            FieldProblem::InvalidFormat(err.to_string()),
        ))
    })
}

/// Builds the confirmed record from a mutation response. An ack (`message` and `id`
/// only) is composed from the payload; a record-shaped response wins field by field,
/// and keys it leaves out come from the cached copy, else from the payload.
fn compose_record<R: Resource>(
    response: &Value,
    payload: &R::Payload,
    previous: Option<&R>,
) -> Option<R> {
    let fields = response.as_object()?;
    let id = response_id(response)?;
    if fields.keys().all(|key| ACK_KEYS.contains(&key.as_str())) {
        return Some(R::from_payload(id, payload, previous));
    }

    let mut merged = match serde_json::to_value(R::from_payload(id, payload, None)) {
        Ok(Value::Object(map)) => map,
        _ => return None,
    };
    if let Some(Ok(Value::Object(cached))) = previous.map(serde_json::to_value) {
        merged.extend(cached);
    }
    merged.extend(fields.clone());
    serde_json::from_value(Value::Object(merged)).ok()
}

fn response_id(value: &Value) -> Option<RecordId> {
    let id = value.get("id")?;
    id.as_u64()
        .or_else(|| id.as_str().and_then(|s| s.trim().parse().ok()))
}
