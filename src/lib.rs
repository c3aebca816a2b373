// Sound Healing API - Core Library
// Schema validation, storage serialization and the collection gateway,
// shared by the API server and tests

pub mod config;
pub mod db;
pub mod schema;         // Shape Layer - record definitions
pub mod serialization;  // Record <-> storage document
pub mod store;          // Collection Gateway + in-memory backend
pub mod tracks;
pub mod validation;     // Untyped JSON -> Record

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::Config;
pub use db::{connect, SqliteLocation, SqliteStore};
pub use schema::{
    Constraint, FieldDefinition, FieldType, RecordKind, RecordSchema, SchemaRegistry,
};
pub use serialization::{from_storage, to_storage};
pub use store::{CollectionGateway, Document, DocumentStore, MemoryStore, StoreError};
pub use tracks::{list_tracks, TrackDescriptor, TrackType};
pub use validation::{validate, FieldValue, Record, ValidationError, ValidationErrors};

#[cfg(feature = "server")]
pub use api::{router, AppState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
