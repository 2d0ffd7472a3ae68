//! Core data types for Akasha

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Identifier for a scope (tenancy boundary) in the multi-tenant system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reserved, non-user-writable system property names.
///
/// Shared by extraction validation (entities/relationships must not declare
/// these as ordinary properties) and update scrubbing (invariant 8).
pub const RESERVED_PROPERTIES: &[&str] = &[
    "scopeId",
    "contextIds",
    "embedding",
    "_recordedAt",
    "_validFrom",
    "_validTo",
    "_similarity",
];

/// Fields invariant 8 forbids user update calls from changing.
pub const IMMUTABLE_ON_UPDATE: &[&str] =
    &["embedding", "_recordedAt", "scopeId", "_validFrom", "_validTo"];

/// `true` if `name` is shaped like an identifier: starts with a letter or
/// underscore, followed by alphanumerics/underscores.
pub fn is_identifier_shaped(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `true` if `label` looks like an entity label: starts uppercase, then
/// alphanumeric/underscore.
pub fn is_label_shaped(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `true` if `kind` looks like a relationship type: `^[A-Z][A-Z0-9_]*$`.
pub fn is_relationship_type_shaped(kind: &str) -> bool {
    let mut chars = kind.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Validates a user-controlled property key: identifier-shaped and not reserved.
pub fn validate_property_key(key: &str) -> Result<(), String> {
    if !is_identifier_shaped(key) {
        return Err(format!("property key '{}' is not identifier-shaped", key));
    }
    if RESERVED_PROPERTIES.contains(&key) {
        return Err(format!("property key '{}' is reserved", key));
    }
    Ok(())
}

/// Drops every key in `IMMUTABLE_ON_UPDATE` from a property map, per invariant 8.
pub fn strip_immutable_fields(
    mut props: serde_json::Map<String, Value>,
) -> serde_json::Map<String, Value> {
    for key in IMMUTABLE_ON_UPDATE {
        props.remove(*key);
    }
    props
}

/// An entity (typed node) in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque id, unique within the database. Minted by the `DatabaseProvider`.
    pub id: String,
    /// Type tag, identifier-shaped (e.g. "Person", "Organization").
    pub label: String,
    /// User properties, keyed by identifier-shaped property name.
    pub properties: serde_json::Map<String, Value>,
    /// Tenancy boundary this entity belongs to, if any.
    pub scope_id: Option<ScopeId>,
    /// Logical contexts (ingestion batches) this entity has been touched by.
    pub context_ids: HashSet<String>,
    /// Embedding vector, dimension fixed by the configured `EmbeddingProvider`.
    pub embedding: Option<Vec<f32>>,
    /// When this record was created. Set once, never updated.
    pub recorded_at: DateTime<Utc>,
    /// When the fact became true. Defaults to `recorded_at`.
    pub valid_from: DateTime<Utc>,
    /// When the fact ceased to be true, if known.
    pub valid_to: Option<DateTime<Utc>>,
    /// Cosine similarity to a query vector. Only set on retrieval responses.
    pub similarity: Option<f32>,
}

impl Entity {
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut properties = serde_json::Map::new();
        properties.insert("name".to_string(), Value::String(name.into()));
        Self {
            id: String::new(),
            label: label.into(),
            properties,
            scope_id: None,
            context_ids: HashSet::new(),
            embedding: None,
            recorded_at: now,
            valid_from: now,
            valid_to: None,
            similarity: None,
        }
    }

    /// The `properties.name` value, lower-cased and trimmed — the dedup key
    /// within a scope (invariant 3).
    pub fn normalized_name(&self) -> Option<String> {
        self.properties
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase())
    }

    /// The deterministic "entity text" fed to the embedding provider.
    ///
    /// `"{label}: {name}"` followed by up to 8 additional scalar property
    /// lines in source order, skipping `name` and any reserved key.
    pub fn embedding_text(&self) -> String {
        let name = self
            .properties
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("");
        let mut text = format!("{}: {}", self.label, name);
        let mut extra = 0;
        for (key, value) in self.properties.iter() {
            if extra >= 8 {
                break;
            }
            if key == "name" || RESERVED_PROPERTIES.contains(&key.as_str()) {
                continue;
            }
            if let Some(rendered) = scalar_to_string(value) {
                text.push_str(&format!("; {}: {}", key, rendered));
                extra += 1;
            }
        }
        text
    }

    /// Remove `embedding` (scrubbing, C11), preserving `similarity`.
    pub fn without_embedding(mut self) -> Self {
        self.embedding = None;
        self
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A directed, typed relationship between two entities in the same scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    /// UPPER_SNAKE_CASE relationship type.
    pub rel_type: String,
    pub from: String,
    pub to: String,
    pub properties: serde_json::Map<String, Value>,
    pub scope_id: Option<ScopeId>,
    pub context_ids: HashSet<String>,
    pub recorded_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl Relationship {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            rel_type: rel_type.into(),
            from: from.into(),
            to: to.into(),
            properties: serde_json::Map::new(),
            scope_id: None,
            context_ids: HashSet::new(),
            recorded_at: now,
            valid_from: now,
            valid_to: None,
        }
    }
}

/// A document node holding the verbatim source text and its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Verbatim text supplied at ingestion time; the dedup key within a scope.
    pub text: String,
    pub scope_id: Option<ScopeId>,
    pub context_ids: HashSet<String>,
    /// Opaque caller-supplied metadata.
    pub metadata: serde_json::Map<String, Value>,
    pub embedding: Option<Vec<f32>>,
    pub recorded_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub similarity: Option<f32>,
}

impl Document {
    pub const LABEL: &'static str = "Document";

    pub fn new(text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            text: text.into(),
            scope_id: None,
            context_ids: HashSet::new(),
            metadata: serde_json::Map::new(),
            embedding: None,
            recorded_at: now,
            valid_from: now,
            valid_to: None,
            similarity: None,
        }
    }

    pub fn without_embedding(mut self) -> Self {
        self.embedding = None;
        self
    }
}

/// A tenancy boundary attached to every created record and used to filter reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,
    pub scope_type: String,
    pub name: String,
    pub metadata: Option<serde_json::Map<String, Value>>,
}

/// A logical label shared by documents/entities ingested together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub scope_id: Option<ScopeId>,
    pub name: Option<String>,
    pub source: Option<String>,
}

/// A filter describing what `findEntitiesByVector`/`findDocumentsByVector`/
/// `retrieveSubgraph` should restrict their results to.
#[derive(Debug, Clone, Default)]
pub struct TemporalFilter {
    pub valid_at: Option<DateTime<Utc>>,
}

impl TemporalFilter {
    /// Records with no temporal metadata are always valid (spec.md §4.8 edge case).
    pub fn matches(&self, valid_from: DateTime<Utc>, valid_to: Option<DateTime<Utc>>) -> bool {
        match self.valid_at {
            None => true,
            Some(at) => valid_from <= at && valid_to.map_or(true, |end| end > at),
        }
    }
}

/// Context-filtering semantics shared by every read path: a record whose
/// `context_ids` is empty is matched for backward compatibility; a record
/// with a non-empty set must intersect the filter.
pub fn contexts_match(record_context_ids: &HashSet<String>, filter: &[String]) -> bool {
    if filter.is_empty() {
        return true;
    }
    if record_context_ids.is_empty() {
        return true;
    }
    filter.iter().any(|c| record_context_ids.contains(c))
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 for
/// degenerate (zero-length or zero-norm) inputs rather than panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Bulk entity-creation input: an entity plus its precomputed embedding.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub entity: Entity,
    pub embedding: Vec<f32>,
}

/// Result of a subgraph expansion (C4 `retrieveSubgraph`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Default)]
pub struct SubgraphQuery {
    pub entity_labels: Vec<String>,
    pub relationship_types: Vec<String>,
    pub max_depth: u32,
    pub limit: usize,
    pub start_entity_ids: Vec<String>,
    pub scope_id: Option<ScopeId>,
}

/// Outcome of a delete operation (C4 `deleteEntity`/`deleteRelationship`/`deleteDocument`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Apply a scrubbed property update over `current`, dropping reserved/
/// immutable keys first (invariant 8).
pub fn apply_update(
    current: &mut serde_json::Map<String, Value>,
    updates: serde_json::Map<String, Value>,
) {
    let updates = strip_immutable_fields(updates);
    for (k, v) in updates {
        current.insert(k, v);
    }
}

#[derive(Debug, Clone, Default)]
pub struct NameIndex(pub HashMap<String, String>);

impl NameIndex {
    pub fn insert(&mut self, name: &str, id: impl Into<String>) {
        self.0.insert(name.trim().to_lowercase(), id.into());
    }

    pub fn get(&self, name: &str) -> Option<&String> {
        self.0.get(&name.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_shape_checks() {
        assert!(is_identifier_shaped("name"));
        assert!(is_identifier_shaped("_name"));
        assert!(!is_identifier_shaped("1name"));
        assert!(!is_identifier_shaped("na-me"));
    }

    #[test]
    fn label_shape_checks() {
        assert!(is_label_shaped("Person"));
        assert!(is_label_shaped("Organization_2"));
        assert!(!is_label_shaped("person"));
        assert!(!is_label_shaped(""));
    }

    #[test]
    fn relationship_type_shape_checks() {
        assert!(is_relationship_type_shaped("WORKS_FOR"));
        assert!(!is_relationship_type_shaped("works_for"));
        assert!(!is_relationship_type_shaped("Works_For"));
    }

    #[test]
    fn reserved_keys_rejected() {
        assert!(validate_property_key("embedding").is_err());
        assert!(validate_property_key("scopeId").is_err());
        assert!(validate_property_key("title").is_ok());
    }

    #[test]
    fn context_filter_matches_absent_as_legacy() {
        let filter = vec!["c1".to_string()];
        assert!(contexts_match(&HashSet::new(), &filter));
        let mut present = HashSet::new();
        present.insert("c1".to_string());
        assert!(contexts_match(&present, &filter));
        let mut disjoint = HashSet::new();
        disjoint.insert("c2".to_string());
        assert!(!contexts_match(&disjoint, &filter));
    }

    #[test]
    fn cosine_similarity_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn embedding_text_is_deterministic() {
        let mut e = Entity::new("Person", "Alice");
        e.properties
            .insert("role".to_string(), Value::String("engineer".to_string()));
        let text1 = e.embedding_text();
        let text2 = e.embedding_text();
        assert_eq!(text1, text2);
        assert!(text1.starts_with("Person: Alice"));
        assert!(text1.contains("role: engineer"));
    }

    #[test]
    fn temporal_filter_with_no_valid_at_matches_everything() {
        let filter = TemporalFilter { valid_at: None };
        let from = Utc::now();
        assert!(filter.matches(from, None));
        assert!(filter.matches(from, Some(from)));
    }

    #[test]
    fn temporal_filter_excludes_records_not_yet_valid_at_tau() {
        let tau = Utc::now();
        let after_tau = tau + chrono::Duration::seconds(1);
        let filter = TemporalFilter { valid_at: Some(tau) };
        assert!(!filter.matches(after_tau, None));
    }

    #[test]
    fn temporal_filter_includes_record_whose_valid_from_equals_tau() {
        let tau = Utc::now();
        let filter = TemporalFilter { valid_at: Some(tau) };
        assert!(filter.matches(tau, None));
    }

    #[test]
    fn temporal_filter_excludes_record_whose_valid_to_equals_tau() {
        let tau = Utc::now();
        let before_tau = tau - chrono::Duration::seconds(1);
        let filter = TemporalFilter { valid_at: Some(tau) };
        assert!(!filter.matches(before_tau, Some(tau)));
    }

    #[test]
    fn temporal_filter_includes_record_with_no_valid_to_once_started() {
        let tau = Utc::now();
        let before_tau = tau - chrono::Duration::seconds(1);
        let filter = TemporalFilter { valid_at: Some(tau) };
        assert!(filter.matches(before_tau, None));
    }
}
