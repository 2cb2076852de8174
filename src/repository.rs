//! Cached collection repository.
//!
//! One `Repository<K>` per record kind. Reads prefer the remote store and
//! fall back to the local mirror; writes go to the remote store first and
//! are mirrored only after the remote accepted them.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::SalonError;
use crate::ids::generate_id;
use crate::mirror::LocalMirror;
use crate::record::{missing_fields, Record, RecordKind};
use crate::store::{Query, RemoteStore};

/// Where a loaded collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadSource {
    Remote,
    Mirror,
    Empty,
}

/// One coherent snapshot of a collection, unique by id.
#[derive(Debug, Clone)]
pub struct Collection {
    pub records: Vec<Record>,
    pub source: LoadSource,
}

impl Collection {
    fn new(records: Vec<Record>, source: LoadSource) -> Self {
        let mut seen = std::collections::HashSet::new();
        let records = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        Self { records, source }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct Repository<K: RecordKind> {
    remote: Arc<dyn RemoteStore>,
    mirror: Arc<dyn LocalMirror>,
    snapshot: Mutex<Vec<Record>>,
    _kind: PhantomData<K>,
}

impl<K: RecordKind> Repository<K> {
    pub fn new(remote: Arc<dyn RemoteStore>, mirror: Arc<dyn LocalMirror>) -> Self {
        Self {
            remote,
            mirror,
            snapshot: Mutex::new(Vec::new()),
            _kind: PhantomData,
        }
    }

    pub fn kind(&self) -> &'static str {
        K::COLLECTION
    }

    /// Refresh the snapshot: remote first, then mirror, then empty.
    ///
    /// Never fails and never writes the mirror. Failures are logged only.
    pub async fn load(&self) -> Collection {
        let query = Query::new().order_by(K::natural_order());
        let collection = match self.remote.list(K::COLLECTION, &query).await {
            Ok(docs) => {
                let records = docs
                    .into_iter()
                    .filter_map(|(id, doc)| match Record::from_document(&id, doc) {
                        Ok(record) => Some(record),
                        Err(e) => {
                            log::warn!("Skipping malformed {} document {}: {}", K::COLLECTION, id, e);
                            None
                        }
                    })
                    .collect();
                Collection::new(records, LoadSource::Remote)
            }
            Err(e) => {
                log::warn!("Loading {} from remote failed, using mirror: {}", K::COLLECTION, e);
                match self.mirror.read(K::MIRROR_KEY) {
                    Ok(records) if !records.is_empty() => {
                        Collection::new(records, LoadSource::Mirror)
                    }
                    Ok(_) => Collection::new(Vec::new(), LoadSource::Empty),
                    Err(e) => {
                        log::warn!("Reading {} mirror failed: {}", K::MIRROR_KEY, e);
                        Collection::new(Vec::new(), LoadSource::Empty)
                    }
                }
            }
        };

        *self.snapshot.lock() = collection.records.clone();
        collection
    }

    /// Persist a record, assigning an id when it has none. Returns the id.
    pub async fn save(&self, mut record: Record) -> Result<String, SalonError> {
        let missing = missing_fields::<K>(&record);
        if !missing.is_empty() {
            return Err(SalonError::ValidationFailed(format!(
                "{} missing {}",
                K::COLLECTION,
                missing.join(", ")
            )));
        }

        if record.id.trim().is_empty() {
            record.id = generate_id(K::ID_PREFIX);
        }

        self.remote
            .set(K::COLLECTION, &record.id, record.to_document())
            .await?;

        let id = record.id.clone();
        self.apply_local(record);
        log::info!("Saved {} {}", K::COLLECTION, id);
        Ok(id)
    }

    /// Merge `partial` into the stored record. The full record is not resent.
    pub async fn update(&self, id: &str, partial: Map<String, Value>) -> Result<(), SalonError> {
        let mut fields = partial;
        fields.remove("id");
        fields.remove("createdAt");
        fields.insert(
            "updatedAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        self.remote.merge(K::COLLECTION, id, fields.clone()).await?;

        let refreshed = match self.remote.get(K::COLLECTION, id).await {
            Ok(Some(doc)) => match Record::from_document(id, doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Refreshed {} {} unreadable: {}", K::COLLECTION, id, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("Refreshing {} {} after update failed: {}", K::COLLECTION, id, e);
                None
            }
        };

        let record = refreshed.or_else(|| {
            let mut local = self.get(id)?;
            local.merge(&fields);
            Some(local)
        });

        match record {
            Some(record) => self.apply_local(record),
            None => log::debug!("{} {} updated remotely but not cached locally", K::COLLECTION, id),
        }
        Ok(())
    }

    /// Delete remotely, then drop from the snapshot and mirror.
    pub async fn remove(&self, id: &str) -> Result<(), SalonError> {
        self.remote.delete(K::COLLECTION, id).await?;

        self.snapshot.lock().retain(|r| r.id != id);
        match self.mirror.read(K::MIRROR_KEY) {
            Ok(mut mirrored) => {
                mirrored.retain(|r| r.id != id);
                if let Err(e) = self.mirror.write(K::MIRROR_KEY, &mirrored) {
                    log::warn!("Mirror write for {} failed: {}", K::MIRROR_KEY, e);
                }
            }
            Err(e) => log::warn!("Mirror read for {} failed: {}", K::MIRROR_KEY, e),
        }
        log::info!("Removed {} {}", K::COLLECTION, id);
        Ok(())
    }

    /// Filter the current snapshot. Does not reload.
    pub fn find(&self, predicate: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.snapshot
            .lock()
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.snapshot.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Read one record from the remote store, falling back to the snapshot
    /// when the remote is unreachable. Does not write the mirror.
    pub async fn fetch(&self, id: &str) -> Result<Record, SalonError> {
        match self.remote.get(K::COLLECTION, id).await {
            Ok(Some(doc)) => {
                let record = Record::from_document(id, doc).map_err(|e| {
                    SalonError::ValidationFailed(format!("{} {} unreadable: {}", K::COLLECTION, id, e))
                })?;
                let mut snapshot = self.snapshot.lock();
                match snapshot.iter_mut().find(|r| r.id == id) {
                    Some(existing) => *existing = record.clone(),
                    None => snapshot.insert(0, record.clone()),
                }
                Ok(record)
            }
            Ok(None) => Err(SalonError::not_found(K::COLLECTION, id)),
            Err(e) => {
                log::warn!("Fetching {} {} failed, using snapshot: {}", K::COLLECTION, id, e);
                self.get(id)
                    .ok_or_else(|| SalonError::not_found(K::COLLECTION, id))
            }
        }
    }

    pub fn records(&self) -> Vec<Record> {
        self.snapshot.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.lock().is_empty()
    }

    /// Upsert a remotely-accepted record into the snapshot and the mirror.
    /// New records go to the front of the snapshot (newest first) and to the
    /// back of the mirror; existing ids are overwritten in place.
    fn apply_local(&self, record: Record) {
        {
            let mut snapshot = self.snapshot.lock();
            match snapshot.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => snapshot.insert(0, record.clone()),
            }
        }

        let mut mirrored = match self.mirror.read(K::MIRROR_KEY) {
            Ok(mirrored) => mirrored,
            Err(e) => {
                log::warn!("Mirror read for {} failed, rebuilding: {}", K::MIRROR_KEY, e);
                Vec::new()
            }
        };
        match mirrored.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => mirrored.push(record),
        }
        if let Err(e) = self.mirror.write(K::MIRROR_KEY, &mirrored) {
            log::warn!("Mirror write for {} failed: {}", K::MIRROR_KEY, e);
        }
    }
}
