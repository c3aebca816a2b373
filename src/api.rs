// Sound Healing API - HTTP layer
// Routes, handlers and error mapping. Storage comes in through AppState.

use crate::config::Config;
use crate::schema::{RecordKind, RecordSchema, SchemaRegistry};
use crate::serialization::{from_storage, to_storage};
use crate::store::{CollectionGateway, Document, StoreError};
use crate::tracks::{list_tracks, TrackDescriptor};
use crate::validation::{validate, ValidationErrors};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub const DEFAULT_SESSION_LIMIT: u32 = 20;
pub const DEFAULT_JOURNAL_LIMIT: u32 = 50;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: CollectionGateway,
    pub registry: Arc<SchemaRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(gateway: CollectionGateway, config: Config) -> Self {
        AppState {
            gateway,
            registry: Arc::new(SchemaRegistry::new()),
            config: Arc::new(config),
        }
    }

    fn schema(&self, kind: RecordKind) -> Result<&RecordSchema, ApiError> {
        self.registry
            .schema(kind)
            .ok_or_else(|| ApiError::Internal(format!("No schema registered for {}", kind.name())))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// Payload parsed but failed the schema
    Validation(ValidationErrors),
    /// Payload was not JSON at all
    MalformedBody(String),
    /// Query string did not parse (e.g. `limit=-1`)
    InvalidQuery(String),
    Store(StoreError),
    Internal(String),
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        ApiError::Validation(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

#[derive(Serialize)]
struct FieldErrorDetail {
    field: String,
    kind: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse<T> {
    detail: T,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                let detail: Vec<FieldErrorDetail> = errors
                    .errors()
                    .iter()
                    .map(|e| FieldErrorDetail {
                        field: e.field().to_string(),
                        kind: e.kind(),
                        message: e.to_string(),
                    })
                    .collect();

                (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse { detail })).into_response()
            }
            ApiError::MalformedBody(message) => {
                let detail = vec![FieldErrorDetail {
                    field: "body".to_string(),
                    kind: "malformed_json",
                    message,
                }];

                (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse { detail })).into_response()
            }
            ApiError::InvalidQuery(message) => {
                let detail = vec![FieldErrorDetail {
                    field: "query".to_string(),
                    kind: "invalid_query",
                    message,
                }];

                (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse { detail })).into_response()
            }
            ApiError::Store(e) => {
                tracing::error!(error = %e, "Storage call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        detail: e.to_string(),
                    }),
                )
                    .into_response()
            }
            ApiError::Internal(message) => {
                tracing::error!(%message, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { detail: message }),
                )
                    .into_response()
            }
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct DiagnosticResponse {
    backend: String,
    database: String,
    database_url: String,
    database_name: String,
    connection_status: String,
    collections: Vec<String>,
}

#[derive(Serialize)]
struct SchemaListResponse {
    schemas: Vec<RecordSchema>,
}

#[derive(Serialize)]
struct TracksResponse {
    tracks: &'static [TrackDescriptor],
}

#[derive(Serialize)]
struct InsertResponse {
    ok: bool,
    id: String,
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<Document>,
}

#[derive(Serialize)]
struct EntriesResponse {
    entries: Vec<Document>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    /// 0 means no limit
    limit: Option<u32>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET / - Liveness message
async fn read_root() -> impl IntoResponse {
    Json(MessageResponse {
        message: "Sound Healing API is running",
    })
}

/// GET /test - Backend and database diagnostics
async fn test_database(State(state): State<AppState>) -> impl IntoResponse {
    let gateway = &state.gateway;
    let mut response = DiagnosticResponse {
        backend: "✅ Running".to_string(),
        database: "❌ Not Available".to_string(),
        database_url: String::new(),
        database_name: String::new(),
        connection_status: "Not Connected".to_string(),
        collections: Vec::new(),
    };

    if !gateway.is_configured() {
        response.database = "⚠️  Available but not initialized".to_string();
    } else if !gateway.is_reachable() {
        response.database = "❌ Error: database did not answer ping".to_string();
    } else {
        response.connection_status = "Connected".to_string();
        match gateway.list_collection_names() {
            Ok(names) => {
                response.collections = names.into_iter().take(10).collect();
                response.database = "✅ Connected & Working".to_string();
            }
            Err(e) => {
                response.database = format!("⚠️  Connected but Error: {}", truncate(&e.to_string(), 50));
            }
        }
    }

    response.database_url = set_marker(state.config.database_url.is_some());
    response.database_name = set_marker(state.config.database_name.is_some());

    Json(response)
}

fn set_marker(is_set: bool) -> String {
    let marker = if is_set { "✅ Set" } else { "❌ Not Set" };
    marker.to_string()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// GET /schema - Published record schemas
async fn get_schema(State(state): State<AppState>) -> impl IntoResponse {
    Json(SchemaListResponse {
        schemas: state.registry.list_all().to_vec(),
    })
}

/// GET /api/tracks - Static track catalog
async fn get_tracks() -> impl IntoResponse {
    Json(TracksResponse {
        tracks: list_tracks(),
    })
}

/// POST /api/sessions - Log a healing session
async fn log_session(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<InsertResponse>, ApiError> {
    insert_record(&state, RecordKind::HealingSession, body).map(Json)
}

/// GET /api/sessions - Recent sessions, newest first
async fn get_recent_sessions(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<SessionsResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;
    let sessions = list_records(&state, RecordKind::HealingSession, params, DEFAULT_SESSION_LIMIT)?;
    Ok(Json(SessionsResponse { sessions }))
}

/// POST /api/journal - Record a journal entry
async fn create_journal(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<InsertResponse>, ApiError> {
    insert_record(&state, RecordKind::JournalEntry, body).map(Json)
}

/// GET /api/journal - Journal entries, newest first
async fn list_journal(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<EntriesResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;
    let entries = list_records(&state, RecordKind::JournalEntry, params, DEFAULT_JOURNAL_LIMIT)?;
    Ok(Json(EntriesResponse { entries }))
}

/// Validate, then store. Nothing reaches the gateway unless validation passed.
fn insert_record(
    state: &AppState,
    kind: RecordKind,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<InsertResponse, ApiError> {
    let Json(payload) = body.map_err(|e| ApiError::MalformedBody(e.body_text()))?;
    let schema = state.schema(kind)?;

    let record = validate(schema, &payload)?;
    let id = state.gateway.insert(record.collection(), to_storage(&record))?;

    Ok(InsertResponse { ok: true, id })
}

fn list_records(
    state: &AppState,
    kind: RecordKind,
    params: ListParams,
    default_limit: u32,
) -> Result<Vec<Document>, ApiError> {
    let limit = match params.limit.unwrap_or(default_limit) {
        0 => None,
        n => Some(n as usize),
    };

    let mut docs = state
        .gateway
        .find(kind.collection(), &Document::new(), limit)?;
    docs.reverse();

    Ok(docs.into_iter().map(from_storage).collect())
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/tracks", get(get_tracks))
        .route("/sessions", get(get_recent_sessions).post(log_session))
        .route("/journal", get(list_journal).post(create_journal));

    Router::new()
        .route("/", get(read_root))
        .route("/test", get(test_database))
        .route("/schema", get(get_schema))
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Tests
// ============================================================================
