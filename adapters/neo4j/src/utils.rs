//! Conversions between Akasha domain types and Neo4j wire types, plus the
//! identifier sanitization every dynamically-interpolated Cypher template
//! in `queries.rs` depends on.

use akasha_core::errors::DatabaseFailure;
use akasha_core::types::{is_label_shaped, is_relationship_type_shaped, Document, Entity, Relationship, ScopeId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;

/// Neo4j rejects labels/relationship types containing anything but the
/// identifier already-validated by `is_label_shaped`/`is_relationship_type_shaped`,
/// but we re-check here since this is the last line of defense before the
/// value is interpolated directly into a query string.
pub fn sanitize_label(label: &str) -> Result<&str, DatabaseFailure> {
    if is_label_shaped(label) {
        Ok(label)
    } else {
        Err(DatabaseFailure::ConstraintViolation(format!(
            "'{}' is not a valid entity label",
            label
        )))
    }
}

pub fn sanitize_rel_type(rel_type: &str) -> Result<&str, DatabaseFailure> {
    if is_relationship_type_shaped(rel_type) {
        Ok(rel_type)
    } else {
        Err(DatabaseFailure::ConstraintViolation(format!(
            "'{}' is not a valid relationship type",
            rel_type
        )))
    }
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn parse_datetime(value: &Value) -> Result<DateTime<Utc>, DatabaseFailure> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DatabaseFailure::Other(format!("invalid datetime '{}': {}", s, e))),
        other => Err(DatabaseFailure::Other(format!(
            "expected string datetime, got {:?}",
            other
        ))),
    }
}

pub fn parse_optional_datetime(value: Option<&Value>) -> Result<Option<DateTime<Utc>>, DatabaseFailure> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_datetime(v).map(Some),
    }
}

/// Extracts the reserved system properties from a raw node property map and
/// reconstructs an `Entity`, with `label` taken from the node's labels
/// (every `AkashaEntity` carries exactly one domain label alongside it).
pub fn node_to_entity(
    id: String,
    label: String,
    mut props: serde_json::Map<String, Value>,
) -> Result<Entity, DatabaseFailure> {
    let scope_id = props
        .remove("scopeId")
        .and_then(|v| v.as_str().map(ScopeId::new));
    let context_ids: HashSet<String> = props
        .remove("contextIds")
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    let embedding = props.remove("embedding").and_then(|v| v.as_array().cloned()).map(|arr| {
        arr.into_iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    });
    let recorded_at = props
        .remove("_recordedAt")
        .map(|v| parse_datetime(&v))
        .transpose()?
        .unwrap_or_else(Utc::now);
    let valid_from = props
        .remove("_validFrom")
        .map(|v| parse_datetime(&v))
        .transpose()?
        .unwrap_or(recorded_at);
    let valid_to = parse_optional_datetime(props.remove("_validTo").as_ref())?;
    props.remove("normalizedName");
    props.remove("scopeKey");

    Ok(Entity {
        id,
        label,
        properties: props,
        scope_id,
        context_ids,
        embedding,
        recorded_at,
        valid_from,
        valid_to,
        similarity: None,
    })
}

pub fn node_to_document(
    id: String,
    text: String,
    mut props: serde_json::Map<String, Value>,
) -> Result<Document, DatabaseFailure> {
    let scope_id = props
        .remove("scopeId")
        .and_then(|v| v.as_str().map(ScopeId::new));
    let context_ids: HashSet<String> = props
        .remove("contextIds")
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    let embedding = props.remove("embedding").and_then(|v| v.as_array().cloned()).map(|arr| {
        arr.into_iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    });
    let metadata = props
        .remove("metadata")
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    let recorded_at = props
        .remove("_recordedAt")
        .map(|v| parse_datetime(&v))
        .transpose()?
        .unwrap_or_else(Utc::now);
    let valid_from = props
        .remove("_validFrom")
        .map(|v| parse_datetime(&v))
        .transpose()?
        .unwrap_or(recorded_at);
    let valid_to = parse_optional_datetime(props.remove("_validTo").as_ref())?;
    props.remove("scopeKey");

    Ok(Document {
        id,
        text,
        scope_id,
        context_ids,
        metadata,
        embedding,
        recorded_at,
        valid_from,
        valid_to,
        similarity: None,
    })
}

pub fn relationship_row_to_relationship(
    id: String,
    rel_type: String,
    from_id: String,
    to_id: String,
    mut props: serde_json::Map<String, Value>,
) -> Result<Relationship, DatabaseFailure> {
    let scope_id = props
        .remove("scopeId")
        .and_then(|v| v.as_str().map(ScopeId::new));
    let context_ids: HashSet<String> = props
        .remove("contextIds")
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    let recorded_at = props
        .remove("_recordedAt")
        .map(|v| parse_datetime(&v))
        .transpose()?
        .unwrap_or_else(Utc::now);
    let valid_from = props
        .remove("_validFrom")
        .map(|v| parse_datetime(&v))
        .transpose()?
        .unwrap_or(recorded_at);
    let valid_to = parse_optional_datetime(props.remove("_validTo").as_ref())?;
    props.remove("scopeKey");

    Ok(Relationship {
        id,
        rel_type,
        from: from_id,
        to: to_id,
        properties: props,
        scope_id,
        context_ids,
        recorded_at,
        valid_from,
        valid_to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_label_rejects_lowercase() {
        assert!(sanitize_label("Person").is_ok());
        assert!(sanitize_label("person").is_err());
        assert!(sanitize_label("Person; DROP").is_err());
    }

    #[test]
    fn sanitize_rel_type_rejects_non_shouting_case() {
        assert!(sanitize_rel_type("WORKS_FOR").is_ok());
        assert!(sanitize_rel_type("works_for").is_err());
    }
}
