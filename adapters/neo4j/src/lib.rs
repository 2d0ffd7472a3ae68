//! Neo4j adapter for the Akasha `DatabaseProvider` trait.

use akasha_core::errors::DatabaseFailure;
use akasha_core::traits::{DatabaseProvider, VectorSearchFilter};
use akasha_core::types::{
    apply_update, contexts_match, DeleteOutcome, Document, Entity, Page, Relationship, ScopeId,
    Subgraph, SubgraphQuery,
};
use async_trait::async_trait;
use neo4rs::{Graph, Query};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

mod config;
mod queries;
mod utils;

pub use config::Neo4jConfig;

use utils::{
    format_datetime, node_to_document, node_to_entity, relationship_row_to_relationship,
    sanitize_label, sanitize_rel_type,
};

fn scope_param(scope_id: Option<&ScopeId>) -> Value {
    match scope_id {
        Some(s) => Value::String(s.as_str().to_string()),
        None => Value::Null,
    }
}

/// Reads the `scope_id` column of an `*_SCOPE_OF` row into the record's
/// actual scope. The row's mere presence already proves the record exists.
fn row_scope_id(row: &neo4rs::Row) -> Option<ScopeId> {
    let scope_id: Option<String> = row.get("scope_id").ok();
    scope_id.map(ScopeId::new)
}

fn props_to_value(props: &Map<String, Value>) -> Value {
    Value::Object(props.clone())
}

fn context_ids_value(ids: &std::collections::HashSet<String>) -> Value {
    Value::Array(ids.iter().cloned().map(Value::String).collect())
}

/// Neo4j-backed implementation of `DatabaseProvider`. Labels and relationship
/// types cannot be bound as query parameters in Cypher, so every templated
/// query in `queries.rs` is interpolated with `format!`/`replace` only after
/// the dynamic identifier has passed `sanitize_label`/`sanitize_rel_type`.
pub struct Neo4jDatabase {
    graph: Graph,
    config: Neo4jConfig,
    connected: AtomicBool,
}

impl Neo4jDatabase {
    pub async fn new(config: Neo4jConfig) -> Result<Self, DatabaseFailure> {
        info!("connecting to Neo4j at {}", config.uri);
        let graph = Graph::new(
            &config.uri,
            config.user.as_deref().unwrap_or("neo4j"),
            config.password.as_deref().unwrap_or("neo4j"),
        )
        .map_err(|e| DatabaseFailure::ConnectionFailed(format!("neo4j connection failed: {}", e)))?;

        let db = Self {
            graph,
            config,
            connected: AtomicBool::new(false),
        };
        db.connect().await?;
        Ok(db)
    }

    async fn run(&self, query: Query) -> Result<Vec<neo4rs::Row>, DatabaseFailure> {
        let mut result = self
            .graph
            .execute(query)
            .await
            .map_err(|e| DatabaseFailure::QueryFailed(e.to_string()))?;
        let mut rows = Vec::new();
        while let Some(row) = result
            .next()
            .await
            .map_err(|e| DatabaseFailure::QueryFailed(e.to_string()))?
        {
            rows.push(row);
        }
        Ok(rows)
    }

    fn row_to_entity(&self, row: &neo4rs::Row) -> Result<Entity, DatabaseFailure> {
        let node: neo4rs::Node = row
            .get("n")
            .map_err(|e| DatabaseFailure::QueryFailed(format!("missing node in row: {}", e)))?;
        let id = node
            .properties()
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DatabaseFailure::Other("entity node missing id".to_string()))?
            .to_string();
        let label = node
            .labels()
            .iter()
            .find(|l| l.as_str() != "AkashaEntity")
            .cloned()
            .ok_or_else(|| DatabaseFailure::Other("entity node missing domain label".to_string()))?;
        node_to_entity(id, label, node.properties().clone())
    }

    fn row_to_document(&self, row: &neo4rs::Row) -> Result<Document, DatabaseFailure> {
        let node: neo4rs::Node = row
            .get("n")
            .map_err(|e| DatabaseFailure::QueryFailed(format!("missing node in row: {}", e)))?;
        let props = node.properties().clone();
        let id = props
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DatabaseFailure::Other("document node missing id".to_string()))?
            .to_string();
        let text = props
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DatabaseFailure::Other("document node missing text".to_string()))?
            .to_string();
        node_to_document(id, text, props)
    }

    fn row_to_relationship(&self, row: &neo4rs::Row) -> Result<Relationship, DatabaseFailure> {
        let rel: neo4rs::Relationship = row
            .get("r")
            .map_err(|e| DatabaseFailure::QueryFailed(format!("missing relationship in row: {}", e)))?;
        let from_id: String = row
            .get("from_id")
            .map_err(|e| DatabaseFailure::QueryFailed(format!("missing from_id in row: {}", e)))?;
        let to_id: String = row
            .get("to_id")
            .map_err(|e| DatabaseFailure::QueryFailed(format!("missing to_id in row: {}", e)))?;
        let props = rel.properties().clone();
        let id = props
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DatabaseFailure::Other("relationship missing id".to_string()))?
            .to_string();
        relationship_row_to_relationship(id, rel.rel_type().clone(), from_id, to_id, props)
    }
}

#[async_trait]
impl DatabaseProvider for Neo4jDatabase {
    async fn connect(&self) -> Result<(), DatabaseFailure> {
        self.run(Query::new("RETURN 1".to_string())).await?;
        self.connected.store(true, Ordering::SeqCst);
        debug!("neo4j database connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DatabaseFailure> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.run(Query::new("RETURN 1".to_string())).await.is_ok()
    }

    async fn ensure_vector_index(
        &self,
        dimensions: usize,
        name: Option<&str>,
    ) -> Result<(), DatabaseFailure> {
        let entity_index = name.unwrap_or(&self.config.entity_vector_index);
        let document_index = name.unwrap_or(&self.config.document_vector_index);
        sanitize_label(entity_index).map_err(|_| {
            DatabaseFailure::ConstraintViolation(format!("invalid index name '{}'", entity_index))
        })?;

        let entity_query = queries::ENSURE_ENTITY_VECTOR_INDEX
            .replace("{index_name}", entity_index)
            .replace("{dimensions}", &dimensions.to_string());
        let document_query = queries::ENSURE_DOCUMENT_VECTOR_INDEX
            .replace("{index_name}", document_index)
            .replace("{dimensions}", &dimensions.to_string());

        self.run(Query::new(entity_query)).await?;
        self.run(Query::new(document_query)).await?;
        info!(dimensions, "neo4j vector indexes ensured");
        Ok(())
    }

    async fn find_entities_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
        similarity_threshold: f32,
        filter: &VectorSearchFilter,
    ) -> Result<Vec<Entity>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("index_name".to_string(), Value::String(self.config.entity_vector_index.clone()));
        params.insert("limit".to_string(), Value::from(limit as i64));
        params.insert(
            "query_vector".to_string(),
            Value::Array(query_vector.iter().map(|f| Value::from(*f as f64)).collect()),
        );
        params.insert("scope_id".to_string(), scope_param(filter.scope_id.as_ref()));
        params.insert("threshold".to_string(), Value::from(similarity_threshold as f64));

        let rows = self
            .run(Query::new(queries::FIND_ENTITIES_BY_VECTOR.to_string()).params(params))
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut entity = self.row_to_entity(row)?;
            if !contexts_match(&entity.context_ids, &filter.contexts) {
                continue;
            }
            if !filter.temporal.matches(entity.valid_from, entity.valid_to) {
                continue;
            }
            let score: f64 = row.get("score").unwrap_or(0.0);
            entity.similarity = Some(score as f32);
            out.push(entity);
        }
        Ok(out)
    }

    async fn find_documents_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
        similarity_threshold: f32,
        filter: &VectorSearchFilter,
    ) -> Result<Vec<Document>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("index_name".to_string(), Value::String(self.config.document_vector_index.clone()));
        params.insert("limit".to_string(), Value::from(limit as i64));
        params.insert(
            "query_vector".to_string(),
            Value::Array(query_vector.iter().map(|f| Value::from(*f as f64)).collect()),
        );
        params.insert("scope_id".to_string(), scope_param(filter.scope_id.as_ref()));
        params.insert("threshold".to_string(), Value::from(similarity_threshold as f64));

        let rows = self
            .run(Query::new(queries::FIND_DOCUMENTS_BY_VECTOR.to_string()).params(params))
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut document = self.row_to_document(row)?;
            if !contexts_match(&document.context_ids, &filter.contexts) {
                continue;
            }
            if !filter.temporal.matches(document.valid_from, document.valid_to) {
                continue;
            }
            let score: f64 = row.get("score").unwrap_or(0.0);
            document.similarity = Some(score as f32);
            out.push(document);
        }
        Ok(out)
    }

    async fn retrieve_subgraph(&self, query: &SubgraphQuery) -> Result<Subgraph, DatabaseFailure> {
        let max_depth = query.max_depth.max(1).min(10);
        let cypher = queries::RETRIEVE_SUBGRAPH.replace("{max_depth}", &max_depth.to_string());

        let mut params = HashMap::new();
        params.insert(
            "start_ids".to_string(),
            Value::Array(query.start_entity_ids.iter().cloned().map(Value::String).collect()),
        );
        params.insert("scope_id".to_string(), scope_param(query.scope_id.as_ref()));
        params.insert("limit".to_string(), Value::from(query.limit as i64));

        let rows = self.run(Query::new(cypher).params(params)).await?;

        let mut entities = Vec::new();
        let mut relationships = Vec::new();
        let mut seen_entities = std::collections::HashSet::new();
        let mut seen_rels = std::collections::HashSet::new();
        let start: std::collections::HashSet<&String> = query.start_entity_ids.iter().collect();

        for row in &rows {
            let other: neo4rs::Node = row
                .get("other")
                .map_err(|e| DatabaseFailure::QueryFailed(format!("missing other node: {}", e)))?;
            let other_id = other
                .properties()
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DatabaseFailure::Other("subgraph node missing id".to_string()))?
                .to_string();
            if !query.entity_labels.is_empty() {
                let matches = other
                    .labels()
                    .iter()
                    .any(|l| query.entity_labels.contains(l));
                if !matches {
                    continue;
                }
            }

            let rel: neo4rs::Relationship = row
                .get("rel")
                .map_err(|e| DatabaseFailure::QueryFailed(format!("missing rel: {}", e)))?;
            if !query.relationship_types.is_empty()
                && !query.relationship_types.contains(rel.rel_type())
            {
                continue;
            }
            let from_id: String = row
                .get("from_id")
                .map_err(|e| DatabaseFailure::QueryFailed(format!("missing from_id: {}", e)))?;
            let to_id: String = row
                .get("to_id")
                .map_err(|e| DatabaseFailure::QueryFailed(format!("missing to_id: {}", e)))?;
            let rel_props = rel.properties().clone();
            let rel_id = rel_props
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DatabaseFailure::Other("subgraph relationship missing id".to_string()))?
                .to_string();
            if seen_rels.insert(rel_id.clone()) {
                relationships.push(relationship_row_to_relationship(
                    rel_id,
                    rel.rel_type().clone(),
                    from_id,
                    to_id,
                    rel_props,
                )?);
            }

            if !start.contains(&other_id) && seen_entities.insert(other_id.clone()) {
                let label = other
                    .labels()
                    .iter()
                    .find(|l| l.as_str() != "AkashaEntity")
                    .cloned()
                    .ok_or_else(|| DatabaseFailure::Other("subgraph node missing domain label".to_string()))?;
                entities.push(node_to_entity(other_id, label, other.properties().clone())?);
            }

            if entities.len() >= query.limit || relationships.len() >= query.limit {
                break;
            }
        }

        entities.truncate(query.limit);
        relationships.truncate(query.limit);
        Ok(Subgraph { entities, relationships })
    }

    async fn create_entities(
        &self,
        batch: Vec<Entity>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Vec<Entity>, DatabaseFailure> {
        if batch.len() != embeddings.len() {
            return Err(DatabaseFailure::ConstraintViolation(
                "entity batch and embedding batch must be the same length".to_string(),
            ));
        }
        let mut out = Vec::with_capacity(batch.len());
        for (mut entity, embedding) in batch.into_iter().zip(embeddings) {
            let label = sanitize_label(&entity.label)?;
            let normalized = entity.normalized_name().ok_or_else(|| {
                DatabaseFailure::ConstraintViolation("entity is missing a non-empty name property".to_string())
            })?;
            if entity.id.is_empty() {
                entity.id = Uuid::new_v4().to_string();
            }
            let recorded_at = entity.recorded_at;

            let cypher = queries::MERGE_ENTITY.replace("{label}", label);
            let mut params = HashMap::new();
            params.insert("scope_id".to_string(), scope_param(entity.scope_id.as_ref()));
            params.insert("normalized_name".to_string(), Value::String(normalized));
            params.insert("id".to_string(), Value::String(entity.id.clone()));
            params.insert("props".to_string(), props_to_value(&entity.properties));
            params.insert("context_ids".to_string(), context_ids_value(&entity.context_ids));
            params.insert(
                "embedding".to_string(),
                Value::Array(embedding.iter().map(|f| Value::from(*f as f64)).collect()),
            );
            params.insert("recorded_at".to_string(), Value::String(format_datetime(recorded_at)));
            params.insert("valid_from".to_string(), Value::String(format_datetime(entity.valid_from)));
            params.insert(
                "valid_to".to_string(),
                entity.valid_to.map(|v| Value::String(format_datetime(v))).unwrap_or(Value::Null),
            );

            let rows = self.run(Query::new(cypher).params(params)).await?;
            let row = rows
                .first()
                .ok_or_else(|| DatabaseFailure::QueryFailed("entity merge returned no row".to_string()))?;
            out.push(self.row_to_entity(row)?);
        }
        Ok(out)
    }

    async fn find_entity_by_name(
        &self,
        name: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Entity>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("scope_id".to_string(), scope_param(scope_id));
        params.insert("normalized_name".to_string(), Value::String(name.trim().to_lowercase()));
        let rows = self.run(Query::new(queries::FIND_ENTITY_BY_NAME.to_string()).params(params)).await?;
        rows.first().map(|r| self.row_to_entity(r)).transpose()
    }

    async fn find_entity_by_id(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Entity>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        let rows = self.run(Query::new(queries::FIND_ENTITY_BY_ID.to_string()).params(params)).await?;
        rows.first().map(|r| self.row_to_entity(r)).transpose()
    }

    async fn entity_scope_of(&self, id: &str) -> Result<Option<Option<ScopeId>>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        let rows = self.run(Query::new(queries::ENTITY_SCOPE_OF.to_string()).params(params)).await?;
        Ok(rows.first().map(row_scope_id))
    }

    async fn update_entity(
        &self,
        id: &str,
        props: Map<String, Value>,
        scope_id: Option<&ScopeId>,
    ) -> Result<Entity, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        params.insert("props".to_string(), props_to_value(&props));
        let rows = self.run(Query::new(queries::UPDATE_ENTITY.to_string()).params(params)).await?;
        let row = rows
            .first()
            .ok_or_else(|| DatabaseFailure::QueryFailed(format!("entity {} not found", id)))?;
        self.row_to_entity(row)
    }

    async fn update_entity_context_ids(&self, id: &str, context_id: &str) -> Result<(), DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("context_id".to_string(), Value::String(context_id.to_string()));
        self.run(Query::new(queries::UPDATE_ENTITY_CONTEXT_IDS.to_string()).params(params)).await?;
        Ok(())
    }

    async fn delete_entity(&self, id: &str, scope_id: Option<&ScopeId>) -> Result<DeleteOutcome, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        let rows = self.run(Query::new(queries::DELETE_ENTITY.to_string()).params(params)).await?;
        let deleted: i64 = rows.first().and_then(|r| r.get("deleted").ok()).unwrap_or(0);
        Ok(if deleted > 0 {
            DeleteOutcome {
                deleted: true,
                message: format!("entity {} and its relationships were deleted", id),
            }
        } else {
            DeleteOutcome {
                deleted: false,
                message: format!("entity {} not found", id),
            }
        })
    }

    async fn list_entities(
        &self,
        label: Option<&str>,
        page: Page,
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Entity>, DatabaseFailure> {
        if let Some(l) = label {
            sanitize_label(l)?;
        }
        let mut params = HashMap::new();
        params.insert("scope_id".to_string(), scope_param(scope_id));
        params.insert("label".to_string(), label.map(|l| Value::String(l.to_string())).unwrap_or(Value::Null));
        params.insert("offset".to_string(), Value::from(page.offset as i64));
        params.insert("limit".to_string(), Value::from(page.limit as i64));
        let rows = self.run(Query::new(queries::LIST_ENTITIES.to_string()).params(params)).await?;
        rows.iter().map(|r| self.row_to_entity(r)).collect()
    }

    async fn create_relationships(&self, batch: Vec<Relationship>) -> Result<Vec<Relationship>, DatabaseFailure> {
        let mut out = Vec::with_capacity(batch.len());
        for mut rel in batch {
            if rel.from == rel.to {
                return Err(DatabaseFailure::ConstraintViolation(format!(
                    "relationship {} cannot reference the same entity on both ends",
                    rel.rel_type
                )));
            }
            let rel_type = sanitize_rel_type(&rel.rel_type)?;
            if rel.id.is_empty() {
                rel.id = Uuid::new_v4().to_string();
            }
            let recorded_at = rel.recorded_at;

            let cypher = queries::MERGE_RELATIONSHIP.replace("{rel_type}", rel_type);
            let mut params = HashMap::new();
            params.insert("from_id".to_string(), Value::String(rel.from.clone()));
            params.insert("to_id".to_string(), Value::String(rel.to.clone()));
            params.insert("scope_id".to_string(), scope_param(rel.scope_id.as_ref()));
            params.insert("id".to_string(), Value::String(rel.id.clone()));
            params.insert("props".to_string(), props_to_value(&rel.properties));
            params.insert("context_ids".to_string(), context_ids_value(&rel.context_ids));
            params.insert("recorded_at".to_string(), Value::String(format_datetime(recorded_at)));
            params.insert("valid_from".to_string(), Value::String(format_datetime(rel.valid_from)));
            params.insert(
                "valid_to".to_string(),
                rel.valid_to.map(|v| Value::String(format_datetime(v))).unwrap_or(Value::Null),
            );

            let rows = self.run(Query::new(cypher).params(params)).await?;
            let row = rows
                .first()
                .ok_or_else(|| DatabaseFailure::QueryFailed("relationship merge returned no row".to_string()))?;
            out.push(self.row_to_relationship(row)?);
        }
        Ok(out)
    }

    async fn find_relationship_by_id(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Relationship>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        let rows = self.run(Query::new(queries::FIND_RELATIONSHIP_BY_ID.to_string()).params(params)).await?;
        rows.first().map(|r| self.row_to_relationship(r)).transpose()
    }

    async fn relationship_scope_of(
        &self,
        id: &str,
    ) -> Result<Option<Option<ScopeId>>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        let rows = self.run(Query::new(queries::RELATIONSHIP_SCOPE_OF.to_string()).params(params)).await?;
        Ok(rows.first().map(row_scope_id))
    }

    async fn update_relationship(
        &self,
        id: &str,
        props: Map<String, Value>,
        scope_id: Option<&ScopeId>,
    ) -> Result<Relationship, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        params.insert("props".to_string(), props_to_value(&props));
        let rows = self.run(Query::new(queries::UPDATE_RELATIONSHIP.to_string()).params(params)).await?;
        let row = rows
            .first()
            .ok_or_else(|| DatabaseFailure::QueryFailed(format!("relationship {} not found", id)))?;
        self.row_to_relationship(row)
    }

    async fn delete_relationship(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<DeleteOutcome, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        let rows = self.run(Query::new(queries::DELETE_RELATIONSHIP.to_string()).params(params)).await?;
        let deleted: i64 = rows.first().and_then(|r| r.get("deleted").ok()).unwrap_or(0);
        Ok(if deleted > 0 {
            DeleteOutcome {
                deleted: true,
                message: format!("relationship {} was deleted", id),
            }
        } else {
            DeleteOutcome {
                deleted: false,
                message: format!("relationship {} not found", id),
            }
        })
    }

    async fn list_relationships(
        &self,
        rel_type: Option<&str>,
        from_id: Option<&str>,
        to_id: Option<&str>,
        page: Page,
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Relationship>, DatabaseFailure> {
        if let Some(t) = rel_type {
            sanitize_rel_type(t)?;
        }
        let mut params = HashMap::new();
        params.insert("scope_id".to_string(), scope_param(scope_id));
        params.insert("rel_type".to_string(), rel_type.map(|t| Value::String(t.to_string())).unwrap_or(Value::Null));
        params.insert("from_id".to_string(), from_id.map(|f| Value::String(f.to_string())).unwrap_or(Value::Null));
        params.insert("to_id".to_string(), to_id.map(|t| Value::String(t.to_string())).unwrap_or(Value::Null));
        params.insert("offset".to_string(), Value::from(page.offset as i64));
        params.insert("limit".to_string(), Value::from(page.limit as i64));
        let rows = self.run(Query::new(queries::LIST_RELATIONSHIPS.to_string()).params(params)).await?;
        rows.iter().map(|r| self.row_to_relationship(r)).collect()
    }

    async fn create_document(&self, mut document: Document, embedding: Vec<f32>) -> Result<Document, DatabaseFailure> {
        if document.id.is_empty() {
            document.id = Uuid::new_v4().to_string();
        }
        let recorded_at = document.recorded_at;
        let mut params = HashMap::new();
        params.insert("scope_id".to_string(), scope_param(document.scope_id.as_ref()));
        params.insert("text".to_string(), Value::String(document.text.clone()));
        params.insert("id".to_string(), Value::String(document.id.clone()));
        params.insert("metadata".to_string(), props_to_value(&document.metadata));
        params.insert("context_ids".to_string(), context_ids_value(&document.context_ids));
        params.insert(
            "embedding".to_string(),
            Value::Array(embedding.iter().map(|f| Value::from(*f as f64)).collect()),
        );
        params.insert("recorded_at".to_string(), Value::String(format_datetime(recorded_at)));
        params.insert("valid_from".to_string(), Value::String(format_datetime(document.valid_from)));
        params.insert(
            "valid_to".to_string(),
            document.valid_to.map(|v| Value::String(format_datetime(v))).unwrap_or(Value::Null),
        );

        let rows = self.run(Query::new(queries::MERGE_DOCUMENT.to_string()).params(params)).await?;
        let row = rows
            .first()
            .ok_or_else(|| DatabaseFailure::QueryFailed("document merge returned no row".to_string()))?;
        self.row_to_document(row)
    }

    async fn find_document_by_text(
        &self,
        text: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Document>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("scope_id".to_string(), scope_param(scope_id));
        params.insert("text".to_string(), Value::String(text.to_string()));
        let rows = self.run(Query::new(queries::FIND_DOCUMENT_BY_TEXT.to_string()).params(params)).await?;
        rows.first().map(|r| self.row_to_document(r)).transpose()
    }

    async fn find_document_by_id(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Document>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        let rows = self.run(Query::new(queries::FIND_DOCUMENT_BY_ID.to_string()).params(params)).await?;
        rows.first().map(|r| self.row_to_document(r)).transpose()
    }

    async fn document_scope_of(&self, id: &str) -> Result<Option<Option<ScopeId>>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        let rows = self.run(Query::new(queries::DOCUMENT_SCOPE_OF.to_string()).params(params)).await?;
        Ok(rows.first().map(row_scope_id))
    }

    async fn update_document(
        &self,
        id: &str,
        props: Map<String, Value>,
        scope_id: Option<&ScopeId>,
    ) -> Result<Document, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        params.insert("props".to_string(), props_to_value(&props));
        let rows = self.run(Query::new(queries::UPDATE_DOCUMENT.to_string()).params(params)).await?;
        let row = rows
            .first()
            .ok_or_else(|| DatabaseFailure::QueryFailed(format!("document {} not found", id)))?;
        self.row_to_document(row)
    }

    async fn update_document_context_ids(&self, id: &str, context_id: &str) -> Result<(), DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("context_id".to_string(), Value::String(context_id.to_string()));
        self.run(Query::new(queries::UPDATE_DOCUMENT_CONTEXT_IDS.to_string()).params(params)).await?;
        Ok(())
    }

    async fn delete_document(&self, id: &str, scope_id: Option<&ScopeId>) -> Result<DeleteOutcome, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("id".to_string(), Value::String(id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        let rows = self.run(Query::new(queries::DELETE_DOCUMENT.to_string()).params(params)).await?;
        let deleted: i64 = rows.first().and_then(|r| r.get("deleted").ok()).unwrap_or(0);
        Ok(if deleted > 0 {
            DeleteOutcome {
                deleted: true,
                message: format!("document {} and its links were deleted", id),
            }
        } else {
            DeleteOutcome {
                deleted: false,
                message: format!("document {} not found", id),
            }
        })
    }

    async fn list_documents(&self, page: Page, scope_id: Option<&ScopeId>) -> Result<Vec<Document>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("scope_id".to_string(), scope_param(scope_id));
        params.insert("offset".to_string(), Value::from(page.offset as i64));
        params.insert("limit".to_string(), Value::from(page.limit as i64));
        let rows = self.run(Query::new(queries::LIST_DOCUMENTS.to_string()).params(params)).await?;
        rows.iter().map(|r| self.row_to_document(r)).collect()
    }

    async fn link_entity_to_document(
        &self,
        doc_id: &str,
        entity_id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Relationship, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert("doc_id".to_string(), Value::String(doc_id.to_string()));
        params.insert("entity_id".to_string(), Value::String(entity_id.to_string()));
        params.insert("scope_id".to_string(), scope_param(scope_id));
        params.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        let rows = self.run(Query::new(queries::LINK_ENTITY_TO_DOCUMENT.to_string()).params(params)).await?;
        let row = rows
            .first()
            .ok_or_else(|| DatabaseFailure::QueryFailed("link returned no row".to_string()))?;
        self.row_to_relationship(row)
    }

    async fn get_entities_from_documents(
        &self,
        document_ids: &[String],
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Entity>, DatabaseFailure> {
        let mut params = HashMap::new();
        params.insert(
            "document_ids".to_string(),
            Value::Array(document_ids.iter().cloned().map(Value::String).collect()),
        );
        params.insert("scope_id".to_string(), scope_param(scope_id));
        let rows = self.run(Query::new(queries::GET_ENTITIES_FROM_DOCUMENTS.to_string()).params(params)).await?;
        rows.iter().map(|r| self.row_to_entity(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_label_rejects_unsafe_index_name() {
        assert!(sanitize_label("akasha_entity_embedding; DROP").is_err());
    }

    #[test]
    fn config_defaults_carry_distinct_index_names() {
        let cfg = Neo4jConfig::default();
        assert_ne!(cfg.entity_vector_index, cfg.document_vector_index);
    }

    #[test]
    fn apply_update_merges_into_existing_map() {
        let mut props = Map::new();
        props.insert("a".to_string(), Value::from(1));
        let mut patch = Map::new();
        patch.insert("b".to_string(), Value::from(2));
        apply_update(&mut props, patch);
        assert_eq!(props.get("a"), Some(&Value::from(1)));
        assert_eq!(props.get("b"), Some(&Value::from(2)));
    }

    #[test]
    fn scope_param_maps_none_to_null_not_a_sentinel_string() {
        assert_eq!(scope_param(None), Value::Null);
        let scope = ScopeId::new("tenant-a");
        assert_eq!(scope_param(Some(&scope)), Value::String("tenant-a".to_string()));
    }

    /// Every `WHERE`-based scope predicate must null-safely guard `scopeId`
    /// equality, never a bare `= $scope_id` that silently drops unscoped
    /// records. `MERGE` templates use `scopeKey` instead since `MERGE`
    /// can't carry a `WHERE` clause on its match pattern.
    #[test]
    fn where_based_queries_null_safely_guard_scope_id() {
        let null_safe_where = "IS NULL AND";
        for template in [
            queries::FIND_ENTITY_BY_NAME,
            queries::FIND_ENTITY_BY_ID,
            queries::UPDATE_ENTITY,
            queries::DELETE_ENTITY,
            queries::LIST_ENTITIES,
            queries::FIND_RELATIONSHIP_BY_ID,
            queries::UPDATE_RELATIONSHIP,
            queries::DELETE_RELATIONSHIP,
            queries::LIST_RELATIONSHIPS,
            queries::FIND_DOCUMENT_BY_TEXT,
            queries::FIND_DOCUMENT_BY_ID,
            queries::UPDATE_DOCUMENT,
            queries::DELETE_DOCUMENT,
            queries::LIST_DOCUMENTS,
            queries::GET_ENTITIES_FROM_DOCUMENTS,
            queries::FIND_ENTITIES_BY_VECTOR,
            queries::FIND_DOCUMENTS_BY_VECTOR,
            queries::RETRIEVE_SUBGRAPH,
        ] {
            assert!(
                template.contains(null_safe_where),
                "expected a null-safe scopeId guard in: {}",
                template
            );
            assert!(
                !template.contains("{{ scopeId: $scope_id"),
                "found an equality-only inline scopeId pattern in: {}",
                template
            );
        }
    }

    #[test]
    fn merge_queries_match_scope_via_coalesced_key() {
        for template in [
            queries::MERGE_ENTITY,
            queries::MERGE_DOCUMENT,
            queries::MERGE_RELATIONSHIP,
            queries::LINK_ENTITY_TO_DOCUMENT,
        ] {
            assert!(template.contains("scopeKey: coalesce($scope_id, '')"));
            assert!(template.contains("n.scopeId = $scope_id") || template.contains("r.scopeId = $scope_id"));
        }
    }
}
