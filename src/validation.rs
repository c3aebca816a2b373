// ✅ Validation Engine
// Untyped JSON in, typed Record (or every field error) out

use crate::schema::{FieldDefinition, FieldType, RecordSchema};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: field required")]
    MissingField { field: String },

    #[error("{field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: String,
    },

    #[error("{field}: {rule}")]
    ConstraintViolation { field: String, rule: String },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::TypeMismatch { field, .. }
            | ValidationError::ConstraintViolation { field, .. } => field,
        }
    }

    /// Stable machine-readable tag
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingField { .. } => "missing_field",
            ValidationError::TypeMismatch { .. } => "type_mismatch",
            ValidationError::ConstraintViolation { .. } => "constraint_violation",
        }
    }
}

/// Every field error found in one `validate` call, in schema field order.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} validation error(s): {}", .0.len(), join_errors(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field() == field)
    }
}

// ============================================================================
// RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    StringList(Vec<String>),
    Timestamp(DateTime<Utc>),
}

/// A validated document. Every schema field is present, optional ones as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: String,
    collection: String,
    fields: Vec<(String, Option<FieldValue>)>,
}

impl Record {
    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Value of a field, `None` when absent or not in the schema
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// All fields in schema order, including absent ones
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&FieldValue>)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_ref()))
    }
}

// ============================================================================
// VALIDATE
// ============================================================================

/// Validate an untyped JSON payload against a schema.
///
/// Errors are aggregated: every failing field is reported, one error per
/// field, in schema order. Keys the schema does not declare are ignored.
pub fn validate(schema: &RecordSchema, input: &Value) -> Result<Record, ValidationErrors> {
    let object = match input {
        Value::Object(map) => map,
        other => {
            return Err(ValidationErrors(vec![ValidationError::TypeMismatch {
                field: "body".to_string(),
                expected: "object",
                actual: describe(other).to_string(),
            }]));
        }
    };

    let mut errors = Vec::new();
    let mut fields = Vec::with_capacity(schema.fields.len());

    for def in &schema.fields {
        match validate_field(def, object) {
            Ok(value) => fields.push((def.name.clone(), value)),
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(Record {
            schema: schema.name.clone(),
            collection: schema.collection.clone(),
            fields,
        })
    } else {
        Err(ValidationErrors(errors))
    }
}

fn validate_field(
    def: &FieldDefinition,
    object: &Map<String, Value>,
) -> Result<Option<FieldValue>, ValidationError> {
    let raw = match object.get(&def.name) {
        None | Some(Value::Null) => {
            if def.required {
                return Err(ValidationError::MissingField {
                    field: def.name.clone(),
                });
            }
            return Ok(None);
        }
        Some(v) => v,
    };

    let value = coerce(def.type_, raw).ok_or_else(|| ValidationError::TypeMismatch {
        field: def.name.clone(),
        expected: def.type_.name(),
        actual: describe(raw).to_string(),
    })?;

    let numeric = match &value {
        FieldValue::Integer(n) => Some(*n as f64),
        FieldValue::Float(f) => Some(*f),
        _ => None,
    };

    if let Some(n) = numeric {
        if let Some(violated) = def.constraints.iter().find(|c| !c.allows(n)) {
            return Err(ValidationError::ConstraintViolation {
                field: def.name.clone(),
                rule: violated.describe(),
            });
        }
    }

    Ok(Some(value))
}

// ============================================================================
// COERCION
// ============================================================================

fn coerce(type_: FieldType, raw: &Value) -> Option<FieldValue> {
    match type_ {
        FieldType::String => raw.as_str().map(|s| FieldValue::String(s.to_string())),
        FieldType::Integer => coerce_integer(raw).map(FieldValue::Integer),
        FieldType::Float => coerce_float(raw).map(FieldValue::Float),
        FieldType::Boolean => coerce_boolean(raw).map(FieldValue::Boolean),
        FieldType::StringList => {
            let items = raw.as_array()?;
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(FieldValue::StringList)
        }
        FieldType::Timestamp => coerce_timestamp(raw).map(FieldValue::Timestamp),
    }
}

fn coerce_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            // 30.0 is accepted, 30.5 is not
            let f = n.as_f64()?;
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Some(f as i64)
            } else {
                None
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn coerce_float(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn coerce_boolean(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

const MILLIS_THRESHOLD: f64 = 2e10;

/// Parse a timestamp in any of the accepted wire forms, normalized to UTC
pub fn coerce_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => {
            let value = n.as_f64()?;
            if !value.is_finite() {
                return None;
            }
            // Above 2e10 the number is read as milliseconds (JS `Date.now()`)
            let millis = if value.abs() > MILLIS_THRESHOLD {
                value.round()
            } else {
                (value * 1000.0).round()
            };
            if millis < i64::MIN as f64 || millis > i64::MAX as f64 {
                return None;
            }
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Constraint, FieldDefinition};
    use serde_json::json;

    fn session_schema() -> RecordSchema {
        RecordSchema::healing_session()
    }

    #[test]
    fn test_valid_session() {
        let input = json!({
            "track_id": "tone-432",
            "track_name": "432 Hz Pure Tone",
            "mode": "tone",
            "duration_seconds": 600,
            "mood_before": "anxious"
        });

        let record = validate(&session_schema(), &input).unwrap();

        assert_eq!(record.collection(), "healingsession");
        assert_eq!(record.get("duration_seconds"), Some(&FieldValue::Integer(600)));
        assert_eq!(
            record.get("mood_before"),
            Some(&FieldValue::String("anxious".to_string()))
        );
        // Absent optionals are present-as-absent, not defaulted
        assert!(record.has_field("mood_after"));
        assert_eq!(record.get("mood_after"), None);
        assert_eq!(record.fields().count(), 7);
    }

    #[test]
    fn test_missing_required_fields_are_aggregated() {
        let result = validate(&session_schema(), &json!({ "notes": "nothing else" }));
        let errors = result.unwrap_err();

        assert_eq!(errors.len(), 3);
        assert_eq!(
            errors.errors()[0],
            ValidationError::MissingField {
                field: "track_name".to_string()
            }
        );
        assert_eq!(errors.errors()[1].field(), "mode");
        assert_eq!(errors.errors()[2].field(), "duration_seconds");
    }

    #[test]
    fn test_null_required_is_missing() {
        let input = json!({ "track_name": null, "mode": "tone", "duration_seconds": 5 });
        let errors = validate(&session_schema(), &input).unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors()[0].kind(), "missing_field");
    }

    #[test]
    fn test_null_optional_is_absent() {
        let input = json!({ "text": "ok", "tags": null, "created_at": null });
        let record = validate(&RecordSchema::journal_entry(), &input).unwrap();

        assert_eq!(record.get("tags"), None);
        assert_eq!(record.get("created_at"), None);
    }

    #[test]
    fn test_duration_zero_violates_bound() {
        let input = json!({ "track_name": "Rain", "mode": "nature", "duration_seconds": 0 });
        let errors = validate(&session_schema(), &input).unwrap_err();

        assert_eq!(
            errors.errors(),
            &[ValidationError::ConstraintViolation {
                field: "duration_seconds".to_string(),
                rule: "must be greater than or equal to 1".to_string(),
            }]
        );
    }

    #[test]
    fn test_negative_duration_violates_bound() {
        let input = json!({ "track_name": "Rain", "mode": "nature", "duration_seconds": -30 });
        let errors = validate(&session_schema(), &input).unwrap_err();

        assert!(errors.has_field("duration_seconds"));
        assert_eq!(errors.errors()[0].kind(), "constraint_violation");
    }

    #[test]
    fn test_integer_coercion() {
        let schema = session_schema();

        let from_string = json!({ "track_name": "a", "mode": "tone", "duration_seconds": " 45 " });
        let record = validate(&schema, &from_string).unwrap();
        assert_eq!(record.get("duration_seconds"), Some(&FieldValue::Integer(45)));

        let from_whole_float = json!({ "track_name": "a", "mode": "tone", "duration_seconds": 45.0 });
        let record = validate(&schema, &from_whole_float).unwrap();
        assert_eq!(record.get("duration_seconds"), Some(&FieldValue::Integer(45)));
    }

    #[test]
    fn test_type_mismatch() {
        let input = json!({ "track_name": "a", "mode": "tone", "duration_seconds": "ten" });
        let errors = validate(&session_schema(), &input).unwrap_err();

        assert_eq!(
            errors.errors()[0],
            ValidationError::TypeMismatch {
                field: "duration_seconds".to_string(),
                expected: "integer",
                actual: "string".to_string(),
            }
        );

        let fractional = json!({ "track_name": "a", "mode": "tone", "duration_seconds": 1.5 });
        assert!(validate(&session_schema(), &fractional).is_err());

        let boolean = json!({ "track_name": "a", "mode": "tone", "duration_seconds": true });
        assert!(validate(&session_schema(), &boolean).is_err());
    }

    #[test]
    fn test_string_fields_reject_numbers() {
        let input = json!({ "track_name": 432, "mode": "tone", "duration_seconds": 10 });
        let errors = validate(&session_schema(), &input).unwrap_err();

        assert_eq!(errors.errors()[0].field(), "track_name");
        assert_eq!(errors.errors()[0].kind(), "type_mismatch");
    }

    #[test]
    fn test_mixed_errors_one_per_field_in_schema_order() {
        let input = json!({ "track_id": 7, "mode": "tone", "duration_seconds": 0 });
        let errors = validate(&session_schema(), &input).unwrap_err();

        let summary: Vec<(&str, &str)> = errors
            .errors()
            .iter()
            .map(|e| (e.field(), e.kind()))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("track_id", "type_mismatch"),
                ("track_name", "missing_field"),
                ("duration_seconds", "constraint_violation"),
            ]
        );
    }

    #[test]
    fn test_body_must_be_object() {
        let errors = validate(&session_schema(), &json!(["not", "an", "object"])).unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.errors()[0].field(), "body");
        assert_eq!(errors.to_string(), "1 validation error(s): body: expected object, got array");
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let input = json!({ "text": "hi", "_id": "client-id", "id": "also-client", "mood": 3 });
        let record = validate(&RecordSchema::journal_entry(), &input).unwrap();

        assert!(!record.has_field("_id"));
        assert!(!record.has_field("id"));
        assert!(!record.has_field("mood"));
    }

    #[test]
    fn test_tags_must_be_strings() {
        let schema = RecordSchema::journal_entry();

        let ok = validate(&schema, &json!({ "text": "x", "tags": ["calm", "sleep"] })).unwrap();
        assert_eq!(
            ok.get("tags"),
            Some(&FieldValue::StringList(vec!["calm".to_string(), "sleep".to_string()]))
        );

        let bad = validate(&schema, &json!({ "text": "x", "tags": ["calm", 1] })).unwrap_err();
        assert!(bad.has_field("tags"));

        let not_list = validate(&schema, &json!({ "text": "x", "tags": "calm" })).unwrap_err();
        assert!(not_list.has_field("tags"));
    }

    #[test]
    fn test_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 20, 15, 30, 0).unwrap();

        assert_eq!(coerce_timestamp(&json!("2024-03-20T15:30:00Z")), Some(expected));
        assert_eq!(coerce_timestamp(&json!("2024-03-20T17:30:00+02:00")), Some(expected));
        assert_eq!(coerce_timestamp(&json!("2024-03-20T15:30:00")), Some(expected));
        assert_eq!(coerce_timestamp(&json!(expected.timestamp())), Some(expected));
        assert_eq!(
            coerce_timestamp(&json!("2024-03-20")),
            Some(Utc.with_ymd_and_hms(2024, 3, 20, 0, 0, 0).unwrap())
        );
        assert_eq!(coerce_timestamp(&json!("yesterday")), None);
        assert_eq!(coerce_timestamp(&json!(true)), None);
    }

    #[test]
    fn test_numeric_timestamp_seconds_or_millis() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 20, 21, 0, 0).unwrap();

        assert_eq!(coerce_timestamp(&json!(1_710_968_400_i64)), Some(expected));
        assert_eq!(coerce_timestamp(&json!(1_710_968_400_000_i64)), Some(expected));
        assert_eq!(
            coerce_timestamp(&json!(1_710_968_400_250_i64)),
            Some(expected + chrono::Duration::milliseconds(250))
        );
        assert_eq!(
            coerce_timestamp(&json!(1_710_968_400.5)),
            Some(expected + chrono::Duration::milliseconds(500))
        );
        // 2e10 itself is still seconds (year 2603)
        assert_eq!(
            coerce_timestamp(&json!(20_000_000_000_i64)).map(|dt| dt.timestamp()),
            Some(20_000_000_000)
        );
    }

    #[test]
    fn test_journal_millis_created_at_round_trips() {
        let input = json!({ "text": "x", "created_at": 1_710_968_400_000_i64 });
        let record = validate(&RecordSchema::journal_entry(), &input).unwrap();

        let doc = crate::serialization::to_storage(&record);
        let dt = crate::serialization::decode_timestamp(&doc["created_at"]).unwrap();
        assert_eq!(crate::serialization::format_timestamp(dt), "2024-03-20T21:00:00Z");
    }

    #[test]
    fn test_journal_bad_timestamp() {
        let input = json!({ "text": "x", "created_at": "not a date" });
        let errors = validate(&RecordSchema::journal_entry(), &input).unwrap_err();

        assert_eq!(
            errors.errors()[0],
            ValidationError::TypeMismatch {
                field: "created_at".to_string(),
                expected: "timestamp",
                actual: "string".to_string(),
            }
        );
    }

    #[test]
    fn test_engine_is_generic_over_schema() {
        // A kind the engine has never seen: only the descriptor is new
        let schema = RecordSchema::new("Breathwork", "breathwork")
            .with_field(
                FieldDefinition::required("rounds", FieldType::Integer)
                    .with_constraint(Constraint::Min(1.0))
                    .with_constraint(Constraint::Max(12.0)),
            )
            .with_field(FieldDefinition::optional("hold_ratio", FieldType::Float))
            .with_field(FieldDefinition::optional("guided", FieldType::Boolean));

        let record = validate(
            &schema,
            &json!({ "rounds": 4, "hold_ratio": "1.5", "guided": "yes" }),
        )
        .unwrap();
        assert_eq!(record.collection(), "breathwork");
        assert_eq!(record.get("hold_ratio"), Some(&FieldValue::Float(1.5)));
        assert_eq!(record.get("guided"), Some(&FieldValue::Boolean(true)));

        let errors = validate(&schema, &json!({ "rounds": 13, "guided": 2 })).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors.errors()[0],
            ValidationError::ConstraintViolation {
                field: "rounds".to_string(),
                rule: "must be less than or equal to 12".to_string(),
            }
        );
        assert_eq!(errors.errors()[1].field(), "guided");
    }
}
