// 📐 Shape Layer - Schema Registry
// Declarative record definitions: what each document kind looks like

use serde::Serialize;

// ============================================================================
// FIELD TYPES & CONSTRAINTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    /// Ordered sequence of strings
    StringList,
    /// Point in time, always normalized to UTC
    Timestamp,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::StringList => "string_list",
            FieldType::Timestamp => "timestamp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Inclusive lower bound for numeric fields
    Min(f64),
    /// Inclusive upper bound for numeric fields
    Max(f64),
}

impl Constraint {
    /// Human-readable rule, used in constraint violation messages
    pub fn describe(&self) -> String {
        match self {
            Constraint::Min(min) => format!("must be greater than or equal to {}", min),
            Constraint::Max(max) => format!("must be less than or equal to {}", max),
        }
    }

    pub fn allows(&self, value: f64) -> bool {
        match self {
            Constraint::Min(min) => value >= *min,
            Constraint::Max(max) => value <= *max,
        }
    }
}

// ============================================================================
// FIELD DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FieldDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub type_: FieldType,

    /// Required fields reject both absence and null
    pub required: bool,

    pub constraints: Vec<Constraint>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl FieldDefinition {
    pub fn required(name: impl Into<String>, type_: FieldType) -> Self {
        Self::new(name, type_, true)
    }

    pub fn optional(name: impl Into<String>, type_: FieldType) -> Self {
        Self::new(name, type_, false)
    }

    fn new(name: impl Into<String>, type_: FieldType, required: bool) -> Self {
        FieldDefinition {
            name: name.into(),
            type_,
            required,
            constraints: Vec::new(),
            description: String::new(),
        }
    }

    /// Builder: add description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: add constraint
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

// ============================================================================
// RECORD KINDS
// ============================================================================

/// The document kinds this service stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    HealingSession,
    JournalEntry,
}

impl RecordKind {
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::HealingSession => "HealingSession",
            RecordKind::JournalEntry => "JournalEntry",
        }
    }

    /// Static kind -> collection table
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::HealingSession => "healingsession",
            RecordKind::JournalEntry => "journalentry",
        }
    }
}

// ============================================================================
// RECORD SCHEMA
// ============================================================================

/// Schema descriptor for one record kind: ordered fields plus target collection
#[derive(Debug, Clone, Serialize)]
pub struct RecordSchema {
    pub name: String,
    pub collection: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub fields: Vec<FieldDefinition>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        RecordSchema {
            name: name.into(),
            collection: collection.into(),
            description: String::new(),
            fields: Vec::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn healing_session() -> Self {
        let kind = RecordKind::HealingSession;

        RecordSchema::new(kind.name(), kind.collection())
            .with_description("Logged meditation/sound healing session")
            .with_field(
                FieldDefinition::optional("track_id", FieldType::String)
                    .with_description("ID or code of track used"),
            )
            .with_field(
                FieldDefinition::required("track_name", FieldType::String)
                    .with_description("Name of the sound/track"),
            )
            .with_field(
                FieldDefinition::required("mode", FieldType::String)
                    .with_description("tone|audio|nature"),
            )
            .with_field(
                FieldDefinition::required("duration_seconds", FieldType::Integer)
                    .with_description("Planned or actual duration")
                    .with_constraint(Constraint::Min(1.0)),
            )
            .with_field(
                FieldDefinition::optional("mood_before", FieldType::String)
                    .with_description("How you felt before"),
            )
            .with_field(
                FieldDefinition::optional("mood_after", FieldType::String)
                    .with_description("How you felt after"),
            )
            .with_field(
                FieldDefinition::optional("notes", FieldType::String)
                    .with_description("Optional notes"),
            )
    }

    pub fn journal_entry() -> Self {
        let kind = RecordKind::JournalEntry;

        RecordSchema::new(kind.name(), kind.collection())
            .with_description("Short reflective journal entry")
            .with_field(
                FieldDefinition::required("text", FieldType::String)
                    .with_description("Journal text"),
            )
            .with_field(
                FieldDefinition::optional("tags", FieldType::StringList)
                    .with_description("Optional tags"),
            )
            .with_field(
                FieldDefinition::optional("created_at", FieldType::Timestamp)
                    .with_description("Client timestamp if any"),
            )
    }
}

// ============================================================================
// SCHEMA REGISTRY
// ============================================================================

/// SchemaRegistry - Catalog of every record kind the service accepts.
///
/// Fixed at startup and read-only afterwards. Registration order is
/// preserved so the published schema list is stable.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<RecordSchema>,
}

impl SchemaRegistry {
    /// Create a registry with the core record kinds
    pub fn new() -> Self {
        let mut registry = SchemaRegistry {
            schemas: Vec::new(),
        };

        registry.register(RecordSchema::healing_session());
        registry.register(RecordSchema::journal_entry());
        registry
    }

    /// Register a schema, replacing any previous one with the same name
    pub fn register(&mut self, schema: RecordSchema) {
        match self.schemas.iter_mut().find(|s| s.name == schema.name) {
            Some(existing) => *existing = schema,
            None => self.schemas.push(schema),
        }
    }

    pub fn get(&self, name: &str) -> Option<&RecordSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// Schema for one of the core kinds. These are registered in `new()`,
    /// so a miss means the registry was built without them.
    pub fn schema(&self, kind: RecordKind) -> Option<&RecordSchema> {
        self.get(kind.name())
    }

    pub fn list_all(&self) -> &[RecordSchema] {
        &self.schemas
    }

    pub fn count(&self) -> usize {
        self.schemas.len()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
