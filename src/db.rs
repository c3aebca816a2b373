use crate::config::Config;
use crate::store::{
    ensure_object_id, matches_filter, CollectionGateway, Document, DocumentStore, StoreError,
};
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where an SQLite-backed store lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    Memory,
    File(String),
}

impl SqliteLocation {
    /// Parse a DATABASE_URL.
    ///
    /// Accepts `sqlite::memory:`, `:memory:`, `sqlite://<path>`,
    /// `sqlite:<path>` and bare paths. Other schemes are rejected.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = url.trim();

        if url.is_empty() {
            bail!("DATABASE_URL is empty");
        }

        if url == ":memory:" || url == "sqlite::memory:" || url == "sqlite://:memory:" {
            return Ok(SqliteLocation::Memory);
        }

        if let Some(path) = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
        {
            if path.is_empty() {
                bail!("DATABASE_URL has no path: {}", url);
            }
            return Ok(SqliteLocation::File(path.to_string()));
        }

        if url.contains("://") {
            bail!("Unsupported database URL scheme: {}", url);
        }

        Ok(SqliteLocation::File(url.to_string()))
    }
}

/// Document store on a single SQLite connection.
///
/// Every document is one JSON row; `seq` preserves insertion order.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(location: &SqliteLocation) -> Result<Self> {
        let conn = match location {
            SqliteLocation::Memory => Connection::open_in_memory()?,
            SqliteLocation::File(path) => Connection::open(Path::new(path))
                .with_context(|| format!("Failed to open database at {}", path))?,
        };

        setup_database(&conn, location)?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&SqliteLocation::Memory)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("Database connection lock poisoned".to_string()))
    }
}

pub fn setup_database(conn: &Connection, location: &SqliteLocation) -> Result<()> {
    // WAL for crash recovery; in-memory databases ignore it
    if matches!(location, SqliteLocation::File(_)) {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            body TEXT NOT NULL,
            inserted_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (collection, doc_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq)",
        [],
    )?;

    Ok(())
}

impl DocumentStore for SqliteStore {
    fn insert_one(&self, collection: &str, mut doc: Document) -> Result<String, StoreError> {
        let id = ensure_object_id(&mut doc);
        let body = serde_json::to_string(&doc)?;
        let conn = self.lock()?;

        let result = conn.execute(
            "INSERT INTO documents (collection, doc_id, body) VALUES (?1, ?2, ?3)",
            params![collection, id, body],
        );

        match result {
            Ok(_) => Ok(id),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Backend(format!(
                    "Duplicate key error: {} already exists in {}",
                    id, collection
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find(
        &self,
        collection: &str,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT body FROM documents
             WHERE collection = ?1
             ORDER BY seq ASC
             LIMIT ?2",
        )?;

        // With no filter the limit can go to SQLite; -1 means unbounded
        let sql_limit = match limit {
            Some(n) if filter.is_empty() => i64::try_from(n).unwrap_or(-1),
            _ => -1,
        };

        let mut rows = stmt.query(params![collection, sql_limit])?;
        let mut docs = Vec::new();

        while let Some(row) = rows.next()? {
            if limit.is_some_and(|n| docs.len() >= n) {
                break;
            }
            let body: String = row.get(0)?;
            let doc: Document = serde_json::from_str(&body)?;
            if matches_filter(&doc, filter) {
                docs.push(doc);
            }
        }

        Ok(docs)
    }

    fn list_collection_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(names)
    }

    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

/// Open the configured store, or fall back to an unconfigured gateway.
/// Missing or broken database settings are logged, never fatal.
pub fn connect(config: &Config) -> CollectionGateway {
    let Some((url, name)) = config.database() else {
        tracing::warn!("DATABASE_URL or DATABASE_NAME not set, storage endpoints will fail");
        return CollectionGateway::unconfigured();
    };

    match SqliteLocation::from_url(url).and_then(|location| SqliteStore::open(&location)) {
        Ok(store) => {
            tracing::info!(database = name, "Database opened");
            CollectionGateway::new(Arc::new(store), name)
        }
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "Database unavailable, running without storage");
            CollectionGateway::unconfigured()
        }
    }
}
