// 🗄️ Collection Gateway
// The only way the service touches storage: insert-one, find-many, and a
// couple of diagnostics. Backends plug in behind `DocumentStore`.

use crate::serialization::{encode_object_id, encode_timestamp, STORAGE_ID_KEY};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Storage unavailable: no database configured")]
    Unavailable,

    #[error("{0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Backend(format!("Corrupt document: {}", e))
    }
}

/// A document store backend.
///
/// `insert_one` assigns `_id` when the document has none and returns the
/// identifier as a string. `find` yields documents in insertion order.
pub trait DocumentStore: Send + Sync {
    fn insert_one(&self, collection: &str, doc: Document) -> Result<String, StoreError>;

    fn find(
        &self,
        collection: &str,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    fn list_collection_names(&self) -> Result<Vec<String>, StoreError>;

    fn ping(&self) -> Result<(), StoreError>;
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Bits 62..64 of a v4 UUID hold the fixed variant
const UUID_LOW_RANDOM_MASK: u64 = (1 << 62) - 1;

/// New 24-hex identifier: 4 bytes of unix seconds, 8 random bytes
pub fn new_object_id() -> String {
    let secs = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
    format!("{:08x}{:016x}", secs, random_u64())
}

/// 64 random bits out of a v4 UUID, skipping its version and variant bits:
/// the low 62 bits plus the top 2.
fn random_u64() -> u64 {
    let bits = uuid::Uuid::new_v4().as_u128();
    (bits as u64 & UUID_LOW_RANDOM_MASK) | (((bits >> 126) as u64) << 62)
}

/// Take the document's `_id` or assign a fresh one. Returns the string form.
pub(crate) fn ensure_object_id(doc: &mut Document) -> String {
    match doc.get(STORAGE_ID_KEY) {
        Some(Value::Object(map)) => {
            if let Some(Value::String(s)) = map.get("$oid") {
                return s.clone();
            }
        }
        Some(Value::String(s)) => return s.clone(),
        _ => {}
    }

    let id = new_object_id();
    doc.insert(STORAGE_ID_KEY.to_string(), encode_object_id(&id));
    id
}

/// Top-level equality match
pub(crate) fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Handle passed to every request handler. Cheap to clone.
///
/// An unconfigured gateway (no backend) fails every storage call with
/// `StoreError::Unavailable` instead of crashing the service.
#[derive(Clone, Default)]
pub struct CollectionGateway {
    backend: Option<Arc<dyn DocumentStore>>,
    database_name: Option<String>,
}

impl CollectionGateway {
    pub fn new(backend: Arc<dyn DocumentStore>, database_name: impl Into<String>) -> Self {
        CollectionGateway {
            backend: Some(backend),
            database_name: Some(database_name.into()),
        }
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    fn backend(&self) -> Result<&Arc<dyn DocumentStore>, StoreError> {
        self.backend.as_ref().ok_or(StoreError::Unavailable)
    }

    /// Insert one document and return its new identifier.
    ///
    /// `updated_at` is always stamped with the current time; `created_at`
    /// only when the document does not already carry one.
    pub fn insert(&self, collection: &str, mut doc: Document) -> Result<String, StoreError> {
        let backend = self.backend()?;

        let now = encode_timestamp(Utc::now());
        if !doc.contains_key("created_at") {
            doc.insert("created_at".to_string(), now.clone());
        }
        doc.insert("updated_at".to_string(), now);

        let id = backend.insert_one(collection, doc)?;
        tracing::info!(collection, id = %id, "Inserted document");
        Ok(id)
    }

    /// Documents in insertion order; `limit = None` means unbounded
    pub fn find(
        &self,
        collection: &str,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        self.backend()?.find(collection, filter, limit)
    }

    pub fn list_collection_names(&self) -> Result<Vec<String>, StoreError> {
        self.backend()?.list_collection_names()
    }

    pub fn is_reachable(&self) -> bool {
        match &self.backend {
            Some(backend) => backend.ping().is_ok(),
            None => false,
        }
    }
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// Process-local store. Collections are created on first insert.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<Document>>>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Backend("Memory store lock poisoned".to_string()))
    }
}

impl DocumentStore for MemoryStore {
    fn insert_one(&self, collection: &str, mut doc: Document) -> Result<String, StoreError> {
        let id = ensure_object_id(&mut doc);
        let mut collections = self.lock()?;
        let docs = collections.entry(collection.to_string()).or_default();

        let duplicate = docs
            .iter()
            .any(|existing| existing.get(STORAGE_ID_KEY) == doc.get(STORAGE_ID_KEY));
        if duplicate {
            return Err(StoreError::Backend(format!(
                "Duplicate key error: {} already exists in {}",
                id, collection
            )));
        }

        docs.push(doc);
        Ok(id)
    }

    fn find(
        &self,
        collection: &str,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.lock()?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(docs
            .iter()
            .filter(|doc| matches_filter(doc, filter))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn list_collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

// ============================================================================
// TESTS
// ============================================================================
