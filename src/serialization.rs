// 🔁 Serialization Adapter
// Record -> storage document on write, storage document -> JSON-safe map on read
//
// Storage uses Extended JSON markers so identifiers and timestamps stay
// distinguishable from plain strings:
//   _id        -> {"$oid": "<24 hex>"}
//   timestamps -> {"$date": <unix millis>}

use crate::validation::{FieldValue, Record};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Map, Value};

/// Key the store assigns identifiers under
pub const STORAGE_ID_KEY: &str = "_id";

/// Key the identifier is published under
pub const PUBLIC_ID_KEY: &str = "id";

/// Fields rendered as ISO 8601 text on read
pub const TIMESTAMP_FIELDS: [&str; 2] = ["created_at", "updated_at"];

const OID_MARKER: &str = "$oid";
const DATE_MARKER: &str = "$date";

// ============================================================================
// WRITE PATH
// ============================================================================

/// Storage-ready document for a validated record.
/// Absent optional fields are dropped, never written as null.
pub fn to_storage(record: &Record) -> Map<String, Value> {
    let mut doc = Map::new();

    for (name, value) in record.fields() {
        if let Some(value) = value {
            doc.insert(name.to_string(), encode_value(value));
        }
    }

    doc
}

fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::String(s) => Value::String(s.clone()),
        FieldValue::Integer(n) => json!(n),
        FieldValue::Float(f) => json!(f),
        FieldValue::Boolean(b) => Value::Bool(*b),
        FieldValue::StringList(items) => json!(items),
        FieldValue::Timestamp(dt) => encode_timestamp(*dt),
    }
}

pub fn encode_timestamp(dt: DateTime<Utc>) -> Value {
    json!({ DATE_MARKER: dt.timestamp_millis() })
}

pub fn encode_object_id(id: &str) -> Value {
    json!({ OID_MARKER: id })
}

// ============================================================================
// READ PATH
// ============================================================================

/// JSON-safe projection of a stored document.
///
/// `_id` moves to `id` as a string. Storage timestamps in `created_at` /
/// `updated_at` become RFC 3339 text; values already in text form and
/// missing timestamps are left as they are. Everything else passes through.
pub fn from_storage(mut doc: Map<String, Value>) -> Map<String, Value> {
    let id = doc
        .remove(STORAGE_ID_KEY)
        .map(|raw| object_id_to_string(&raw))
        .unwrap_or_default();
    doc.insert(PUBLIC_ID_KEY.to_string(), Value::String(id));

    for key in TIMESTAMP_FIELDS {
        if let Some(value) = doc.get_mut(key) {
            if let Some(dt) = decode_timestamp(value) {
                *value = Value::String(format_timestamp(dt));
            }
        }
    }

    doc
}

fn object_id_to_string(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get(OID_MARKER) {
            Some(Value::String(s)) => s.clone(),
            _ => raw.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decode a storage timestamp (`{"$date": millis}`). Anything else is `None`.
pub fn decode_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let millis = value.as_object()?.get(DATE_MARKER)?.as_i64()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Canonical text form: UTC with a `Z` suffix, milliseconds only when non-zero
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RecordSchema;
    use crate::validation::validate;

    fn session_record() -> Record {
        validate(
            &RecordSchema::healing_session(),
            &json!({
                "track_name": "Gentle Rain",
                "mode": "nature",
                "duration_seconds": 300,
                "mood_after": "rested"
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_to_storage_drops_absent_fields() {
        let doc = to_storage(&session_record());

        let keys: Vec<&str> = doc.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 4);
        for key in ["track_name", "mode", "duration_seconds", "mood_after"] {
            assert!(doc.contains_key(key), "missing {}", key);
        }
        assert!(!doc.contains_key("track_id"));
        assert!(!doc.contains_key("notes"));
        assert!(doc.values().all(|v| !v.is_null()));
        assert_eq!(doc["duration_seconds"], json!(300));
    }

    #[test]
    fn test_to_storage_never_emits_identifier() {
        let record = validate(
            &RecordSchema::journal_entry(),
            &json!({ "text": "hello", "_id": "forged", "id": "forged" }),
        )
        .unwrap();

        let doc = to_storage(&record);
        assert!(!doc.contains_key(STORAGE_ID_KEY));
        assert!(!doc.contains_key(PUBLIC_ID_KEY));
    }

    #[test]
    fn test_to_storage_encodes_timestamps() {
        let record = validate(
            &RecordSchema::journal_entry(),
            &json!({ "text": "x", "created_at": "2024-03-20T15:30:00Z" }),
        )
        .unwrap();

        let doc = to_storage(&record);
        let dt = decode_timestamp(&doc["created_at"]).unwrap();
        assert_eq!(format_timestamp(dt), "2024-03-20T15:30:00Z");
    }

    #[test]
    fn test_from_storage_maps_identifier() {
        let mut doc = Map::new();
        doc.insert("_id".to_string(), encode_object_id("65f1c0ffee0000000000beef"));
        doc.insert("text".to_string(), json!("felt calm"));

        let out = from_storage(doc);
        assert_eq!(out["id"], json!("65f1c0ffee0000000000beef"));
        assert!(!out.contains_key("_id"));
        assert_eq!(out["text"], json!("felt calm"));
    }

    #[test]
    fn test_from_storage_plain_and_missing_identifier() {
        let mut doc = Map::new();
        doc.insert("_id".to_string(), json!(42));
        assert_eq!(from_storage(doc)["id"], json!("42"));

        let out = from_storage(Map::new());
        assert_eq!(out["id"], json!(""));
    }

    #[test]
    fn test_from_storage_timestamps() {
        let mut doc = Map::new();
        doc.insert("_id".to_string(), encode_object_id("abc"));
        doc.insert(
            "created_at".to_string(),
            encode_timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
        );
        doc.insert("updated_at".to_string(), json!({ "$date": 1_704_164_645_250_i64 }));
        // Not on the allow-list: passes through untouched
        doc.insert("valid_from".to_string(), json!({ "$date": 0 }));

        let out = from_storage(doc);
        assert_eq!(out["created_at"], json!("2024-01-02T03:04:05Z"));
        assert_eq!(out["updated_at"], json!("2024-01-02T03:04:05.250Z"));
        assert_eq!(out["valid_from"], json!({ "$date": 0 }));
    }

    #[test]
    fn test_from_storage_without_timestamps() {
        let mut doc = Map::new();
        doc.insert("_id".to_string(), encode_object_id("abc"));
        doc.insert("text".to_string(), json!("x"));

        let out = from_storage(doc);
        assert!(!out.contains_key("created_at"));
        assert!(!out.contains_key("updated_at"));
    }

    #[test]
    fn test_from_storage_is_idempotent() {
        let mut doc = Map::new();
        doc.insert("_id".to_string(), encode_object_id("abc"));
        doc.insert("created_at".to_string(), json!({ "$date": 0 }));
        doc.insert("tags".to_string(), json!(["a", "b"]));

        let once = from_storage(doc);
        let mut again = once.clone();
        again.insert("_id".to_string(), json!("abc"));
        let twice = from_storage(again);

        assert_eq!(once, twice);
        assert_eq!(twice["created_at"], json!("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn test_round_trip_restores_present_fields() {
        let record = session_record();
        let mut stored = to_storage(&record);
        stored.insert("_id".to_string(), encode_object_id("65f1c0ffee0000000000beef"));

        let out = from_storage(stored);

        assert_eq!(out["track_name"], json!("Gentle Rain"));
        assert_eq!(out["mode"], json!("nature"));
        assert_eq!(out["duration_seconds"], json!(300));
        assert_eq!(out["mood_after"], json!("rested"));
        assert!(!out["id"].as_str().unwrap().is_empty());
        assert_eq!(out.len(), 5);
    }
}
