//! In-memory `DatabaseProvider` implementation.
//!
//! Backs tests and local experimentation with the Akasha engine without a
//! running Neo4j instance. Every invariant the trait documents (tenancy
//! isolation, name-based entity dedup, self-reference rejection, cascading
//! deletes) is enforced here exactly as a real backend would, just against
//! `HashMap`s guarded by a single `RwLock` instead of a query engine.

use akasha_core::prelude::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Construction-time knobs for [`InMemoryDatabase`]. Present for symmetry
/// with the other `DatabaseProvider` adapters' config structs; the in-memory
/// store itself has nothing to configure today.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfig {
    pub label: Option<String>,
}

type EntityKey = (Option<String>, String);
type DocumentKey = (Option<String>, String);
type RelationshipKey = (Option<String>, String, String, String);

#[derive(Default)]
struct MemoryStore {
    entities: HashMap<String, Entity>,
    entities_by_name: HashMap<EntityKey, String>,
    documents: HashMap<String, Document>,
    documents_by_text: HashMap<DocumentKey, String>,
    relationships: HashMap<String, Relationship>,
    relationships_by_key: HashMap<RelationshipKey, String>,
    rels_from: HashMap<String, Vec<String>>,
    rels_to: HashMap<String, Vec<String>>,
}

impl MemoryStore {
    fn index_relationship(&mut self, rel: &Relationship) {
        self.relationships_by_key.insert(
            relationship_key(&rel.scope_id, &rel.from, &rel.to, &rel.rel_type),
            rel.id.clone(),
        );
        self.rels_from.entry(rel.from.clone()).or_default().push(rel.id.clone());
        self.rels_to.entry(rel.to.clone()).or_default().push(rel.id.clone());
    }

    fn unindex_relationship(&mut self, rel: &Relationship) {
        self.relationships_by_key
            .remove(&relationship_key(&rel.scope_id, &rel.from, &rel.to, &rel.rel_type));
        if let Some(ids) = self.rels_from.get_mut(&rel.from) {
            ids.retain(|id| id != &rel.id);
        }
        if let Some(ids) = self.rels_to.get_mut(&rel.to) {
            ids.retain(|id| id != &rel.id);
        }
    }

    /// Removes every relationship touching `entity_id`, in either direction.
    fn cascade_remove_relationships(&mut self, entity_id: &str) {
        let incident: HashSet<String> = self
            .rels_from
            .get(entity_id)
            .into_iter()
            .flatten()
            .chain(self.rels_to.get(entity_id).into_iter().flatten())
            .cloned()
            .collect();
        for id in incident {
            if let Some(rel) = self.relationships.remove(&id) {
                self.unindex_relationship(&rel);
            }
        }
    }
}

fn scope_key(scope_id: Option<&ScopeId>) -> Option<String> {
    scope_id.map(|s| s.as_str().to_string())
}

fn scope_matches(record: &Option<ScopeId>, query: Option<&ScopeId>) -> bool {
    record.as_ref().map(ScopeId::as_str) == query.map(ScopeId::as_str)
}

fn relationship_key(
    scope_id: &Option<ScopeId>,
    from: &str,
    to: &str,
    rel_type: &str,
) -> RelationshipKey {
    (
        scope_id.as_ref().map(|s| s.as_str().to_string()),
        from.to_string(),
        to.to_string(),
        rel_type.to_string(),
    )
}

fn paginate<T>(mut items: Vec<T>, page: Page) -> Vec<T> {
    if page.offset >= items.len() {
        return Vec::new();
    }
    let end = (page.offset + page.limit).min(items.len());
    items.drain(page.offset..end).collect()
}

/// Thread-safe, process-local `DatabaseProvider`. Cheaply cloneable: clone
/// the `Arc` the engine already wraps it in, not this type directly.
pub struct InMemoryDatabase {
    store: RwLock<MemoryStore>,
    connected: AtomicBool,
    #[allow(dead_code)]
    config: InMemoryConfig,
}

impl InMemoryDatabase {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            store: RwLock::new(MemoryStore::default()),
            connected: AtomicBool::new(false),
            config,
        }
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl DatabaseProvider for InMemoryDatabase {
    async fn connect(&self) -> Result<(), DatabaseFailure> {
        self.connected.store(true, Ordering::SeqCst);
        debug!("in-memory database connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DatabaseFailure> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn ensure_vector_index(
        &self,
        _dimensions: usize,
        _name: Option<&str>,
    ) -> Result<(), DatabaseFailure> {
        // A brute-force scan needs no index structure at all.
        Ok(())
    }

    async fn find_entities_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
        similarity_threshold: f32,
        filter: &VectorSearchFilter,
    ) -> Result<Vec<Entity>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        let mut scored: Vec<Entity> = store
            .entities
            .values()
            .filter(|e| scope_matches(&e.scope_id, filter.scope_id.as_ref()))
            .filter(|e| contexts_match(&e.context_ids, &filter.contexts))
            .filter(|e| filter.temporal.matches(e.valid_from, e.valid_to))
            .filter_map(|e| {
                let embedding = e.embedding.as_ref()?;
                let similarity = cosine_similarity(query_vector, embedding);
                if similarity >= similarity_threshold {
                    let mut e = e.clone();
                    e.similarity = Some(similarity);
                    Some(e)
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        scored.truncate(limit);
        Ok(scored)
    }

    async fn find_documents_by_vector(
        &self,
        query_vector: &[f32],
        limit: usize,
        similarity_threshold: f32,
        filter: &VectorSearchFilter,
    ) -> Result<Vec<Document>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        let mut scored: Vec<Document> = store
            .documents
            .values()
            .filter(|d| scope_matches(&d.scope_id, filter.scope_id.as_ref()))
            .filter(|d| contexts_match(&d.context_ids, &filter.contexts))
            .filter(|d| filter.temporal.matches(d.valid_from, d.valid_to))
            .filter_map(|d| {
                let embedding = d.embedding.as_ref()?;
                let similarity = cosine_similarity(query_vector, embedding);
                if similarity >= similarity_threshold {
                    let mut d = d.clone();
                    d.similarity = Some(similarity);
                    Some(d)
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        scored.truncate(limit);
        Ok(scored)
    }

    async fn retrieve_subgraph(&self, query: &SubgraphQuery) -> Result<Subgraph, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        let mut visited_entities: HashSet<String> = query.start_entity_ids.iter().cloned().collect();
        let mut visited_rels: HashSet<String> = HashSet::new();
        let mut out_entities = Vec::new();
        let mut out_relationships = Vec::new();
        let mut frontier = query.start_entity_ids.clone();

        for _ in 0..query.max_depth.max(1) {
            if frontier.is_empty()
                || out_entities.len() >= query.limit
                || out_relationships.len() >= query.limit
            {
                break;
            }
            let mut next_frontier = Vec::new();
            for node_id in &frontier {
                let touching = store
                    .rels_from
                    .get(node_id)
                    .into_iter()
                    .flatten()
                    .chain(store.rels_to.get(node_id).into_iter().flatten());
                for rel_id in touching {
                    let Some(rel) = store.relationships.get(rel_id) else { continue };
                    if !scope_matches(&rel.scope_id, query.scope_id.as_ref()) {
                        continue;
                    }
                    if !query.relationship_types.is_empty()
                        && !query.relationship_types.contains(&rel.rel_type)
                    {
                        continue;
                    }
                    let other_id = if &rel.from == node_id { &rel.to } else { &rel.from };
                    let Some(other) = store.entities.get(other_id) else { continue };
                    if !scope_matches(&other.scope_id, query.scope_id.as_ref()) {
                        continue;
                    }
                    if !query.entity_labels.is_empty() && !query.entity_labels.contains(&other.label) {
                        continue;
                    }

                    if visited_rels.insert(rel.id.clone()) {
                        out_relationships.push(rel.clone());
                    }
                    if visited_entities.insert(other_id.clone()) {
                        out_entities.push(other.clone());
                        next_frontier.push(other_id.clone());
                    }
                    if out_entities.len() >= query.limit || out_relationships.len() >= query.limit {
                        break;
                    }
                }
            }
            frontier = next_frontier;
        }

        out_entities.truncate(query.limit);
        out_relationships.truncate(query.limit);
        Ok(Subgraph {
            entities: out_entities,
            relationships: out_relationships,
        })
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
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let mut out = Vec::with_capacity(batch.len());
        for (mut entity, embedding) in batch.into_iter().zip(embeddings) {
            let Some(normalized) = entity.normalized_name() else {
                return Err(DatabaseFailure::ConstraintViolation(
                    "entity is missing a non-empty name property".to_string(),
                ));
            };
            let key = (scope_key(entity.scope_id.as_ref()), normalized);
            if let Some(existing_id) = store.entities_by_name.get(&key).cloned() {
                let existing = store.entities.get_mut(&existing_id).expect("indexed entity must exist");
                for (k, v) in entity.properties {
                    existing.properties.insert(k, v);
                }
                existing.context_ids.extend(entity.context_ids);
                existing.embedding = Some(embedding);
                out.push(existing.clone());
                continue;
            }
            entity.id = Uuid::new_v4().to_string();
            entity.embedding = Some(embedding);
            store.entities_by_name.insert(key, entity.id.clone());
            store.entities.insert(entity.id.clone(), entity.clone());
            out.push(entity);
        }
        Ok(out)
    }

    async fn find_entity_by_name(
        &self,
        name: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Entity>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        let key = (scope_key(scope_id), name.trim().to_lowercase());
        Ok(store
            .entities_by_name
            .get(&key)
            .and_then(|id| store.entities.get(id))
            .cloned())
    }

    async fn find_entity_by_id(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Entity>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        Ok(store
            .entities
            .get(id)
            .filter(|e| scope_matches(&e.scope_id, scope_id))
            .cloned())
    }

    async fn entity_scope_of(&self, id: &str) -> Result<Option<Option<ScopeId>>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        Ok(store.entities.get(id).map(|e| e.scope_id.clone()))
    }

    async fn update_entity(
        &self,
        id: &str,
        props: serde_json::Map<String, serde_json::Value>,
        scope_id: Option<&ScopeId>,
    ) -> Result<Entity, DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let entity = store
            .entities
            .get_mut(id)
            .filter(|e| scope_matches(&e.scope_id, scope_id))
            .ok_or_else(|| DatabaseFailure::QueryFailed(format!("entity {} not found", id)))?;
        apply_update(&mut entity.properties, props);
        Ok(entity.clone())
    }

    async fn update_entity_context_ids(
        &self,
        id: &str,
        context_id: &str,
    ) -> Result<(), DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let entity = store
            .entities
            .get_mut(id)
            .ok_or_else(|| DatabaseFailure::QueryFailed(format!("entity {} not found", id)))?;
        entity.context_ids.insert(context_id.to_string());
        Ok(())
    }

    async fn delete_entity(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<DeleteOutcome, DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let found = store
            .entities
            .get(id)
            .filter(|e| scope_matches(&e.scope_id, scope_id))
            .cloned();
        let Some(entity) = found else {
            return Ok(DeleteOutcome {
                deleted: false,
                message: format!("entity {} not found", id),
            });
        };
        store.cascade_remove_relationships(id);
        store.entities.remove(id);
        if let Some(normalized) = entity.normalized_name() {
            store
                .entities_by_name
                .remove(&(scope_key(entity.scope_id.as_ref()), normalized));
        }
        Ok(DeleteOutcome {
            deleted: true,
            message: format!("entity {} and its relationships were deleted", id),
        })
    }

    async fn list_entities(
        &self,
        label: Option<&str>,
        page: Page,
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Entity>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        let mut matching: Vec<Entity> = store
            .entities
            .values()
            .filter(|e| scope_matches(&e.scope_id, scope_id))
            .filter(|e| label.map_or(true, |l| e.label == l))
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.recorded_at);
        Ok(paginate(matching, page))
    }

    async fn create_relationships(
        &self,
        batch: Vec<Relationship>,
    ) -> Result<Vec<Relationship>, DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let mut out = Vec::with_capacity(batch.len());
        for mut rel in batch {
            if rel.from == rel.to {
                return Err(DatabaseFailure::ConstraintViolation(format!(
                    "relationship {} cannot reference the same entity on both ends",
                    rel.rel_type
                )));
            }
            let key = relationship_key(&rel.scope_id, &rel.from, &rel.to, &rel.rel_type);
            if let Some(existing_id) = store.relationships_by_key.get(&key).cloned() {
                let existing = store
                    .relationships
                    .get_mut(&existing_id)
                    .expect("indexed relationship must exist");
                for (k, v) in rel.properties {
                    existing.properties.insert(k, v);
                }
                existing.context_ids.extend(rel.context_ids);
                out.push(existing.clone());
                continue;
            }
            rel.id = Uuid::new_v4().to_string();
            store.relationships.insert(rel.id.clone(), rel.clone());
            store.index_relationship(&rel);
            out.push(rel);
        }
        Ok(out)
    }

    async fn find_relationship_by_id(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Relationship>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        Ok(store
            .relationships
            .get(id)
            .filter(|r| scope_matches(&r.scope_id, scope_id))
            .cloned())
    }

    async fn relationship_scope_of(
        &self,
        id: &str,
    ) -> Result<Option<Option<ScopeId>>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        Ok(store.relationships.get(id).map(|r| r.scope_id.clone()))
    }

    async fn update_relationship(
        &self,
        id: &str,
        props: serde_json::Map<String, serde_json::Value>,
        scope_id: Option<&ScopeId>,
    ) -> Result<Relationship, DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let rel = store
            .relationships
            .get_mut(id)
            .filter(|r| scope_matches(&r.scope_id, scope_id))
            .ok_or_else(|| DatabaseFailure::QueryFailed(format!("relationship {} not found", id)))?;
        apply_update(&mut rel.properties, props);
        Ok(rel.clone())
    }

    async fn delete_relationship(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<DeleteOutcome, DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let found = store
            .relationships
            .get(id)
            .filter(|r| scope_matches(&r.scope_id, scope_id))
            .cloned();
        let Some(rel) = found else {
            return Ok(DeleteOutcome {
                deleted: false,
                message: format!("relationship {} not found", id),
            });
        };
        store.relationships.remove(id);
        store.unindex_relationship(&rel);
        Ok(DeleteOutcome {
            deleted: true,
            message: format!("relationship {} was deleted", id),
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
        let store = self.store.read().map_err(lock_poisoned)?;
        let mut matching: Vec<Relationship> = store
            .relationships
            .values()
            .filter(|r| scope_matches(&r.scope_id, scope_id))
            .filter(|r| rel_type.map_or(true, |t| r.rel_type == t))
            .filter(|r| from_id.map_or(true, |f| r.from == f))
            .filter(|r| to_id.map_or(true, |t| r.to == t))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.recorded_at);
        Ok(paginate(matching, page))
    }

    async fn create_document(
        &self,
        mut document: Document,
        embedding: Vec<f32>,
    ) -> Result<Document, DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let key = (scope_key(document.scope_id.as_ref()), document.text.clone());
        if let Some(existing_id) = store.documents_by_text.get(&key).cloned() {
            let existing = store.documents.get_mut(&existing_id).expect("indexed document must exist");
            existing.context_ids.extend(document.context_ids);
            existing.embedding = Some(embedding);
            return Ok(existing.clone());
        }
        document.id = Uuid::new_v4().to_string();
        document.embedding = Some(embedding);
        store.documents_by_text.insert(key, document.id.clone());
        store.documents.insert(document.id.clone(), document.clone());
        Ok(document)
    }

    async fn find_document_by_text(
        &self,
        text: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Document>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        let key = (scope_key(scope_id), text.to_string());
        Ok(store
            .documents_by_text
            .get(&key)
            .and_then(|id| store.documents.get(id))
            .cloned())
    }

    async fn find_document_by_id(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Option<Document>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        Ok(store
            .documents
            .get(id)
            .filter(|d| scope_matches(&d.scope_id, scope_id))
            .cloned())
    }

    async fn document_scope_of(&self, id: &str) -> Result<Option<Option<ScopeId>>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        Ok(store.documents.get(id).map(|d| d.scope_id.clone()))
    }

    async fn update_document(
        &self,
        id: &str,
        props: serde_json::Map<String, serde_json::Value>,
        scope_id: Option<&ScopeId>,
    ) -> Result<Document, DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let document = store
            .documents
            .get_mut(id)
            .filter(|d| scope_matches(&d.scope_id, scope_id))
            .ok_or_else(|| DatabaseFailure::QueryFailed(format!("document {} not found", id)))?;
        apply_update(&mut document.metadata, props);
        Ok(document.clone())
    }

    async fn update_document_context_ids(
        &self,
        id: &str,
        context_id: &str,
    ) -> Result<(), DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let document = store
            .documents
            .get_mut(id)
            .ok_or_else(|| DatabaseFailure::QueryFailed(format!("document {} not found", id)))?;
        document.context_ids.insert(context_id.to_string());
        Ok(())
    }

    async fn delete_document(
        &self,
        id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<DeleteOutcome, DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let found = store
            .documents
            .get(id)
            .filter(|d| scope_matches(&d.scope_id, scope_id))
            .cloned();
        let Some(document) = found else {
            return Ok(DeleteOutcome {
                deleted: false,
                message: format!("document {} not found", id),
            });
        };
        store.cascade_remove_relationships(id);
        store.documents.remove(id);
        store
            .documents_by_text
            .remove(&(scope_key(document.scope_id.as_ref()), document.text.clone()));
        Ok(DeleteOutcome {
            deleted: true,
            message: format!("document {} and its links were deleted", id),
        })
    }

    async fn list_documents(
        &self,
        page: Page,
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Document>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        let mut matching: Vec<Document> = store
            .documents
            .values()
            .filter(|d| scope_matches(&d.scope_id, scope_id))
            .cloned()
            .collect();
        matching.sort_by_key(|d| d.recorded_at);
        Ok(paginate(matching, page))
    }

    async fn link_entity_to_document(
        &self,
        doc_id: &str,
        entity_id: &str,
        scope_id: Option<&ScopeId>,
    ) -> Result<Relationship, DatabaseFailure> {
        let mut store = self.store.write().map_err(lock_poisoned)?;
        let scope = scope_id.cloned();
        let key = relationship_key(&scope, doc_id, entity_id, "CONTAINS_ENTITY");
        if let Some(existing_id) = store.relationships_by_key.get(&key).cloned() {
            return Ok(store.relationships.get(&existing_id).expect("indexed relationship must exist").clone());
        }
        let mut rel = Relationship::new(doc_id, entity_id, "CONTAINS_ENTITY");
        rel.id = Uuid::new_v4().to_string();
        rel.scope_id = scope;
        store.relationships.insert(rel.id.clone(), rel.clone());
        store.index_relationship(&rel);
        Ok(rel)
    }

    async fn get_entities_from_documents(
        &self,
        document_ids: &[String],
        scope_id: Option<&ScopeId>,
    ) -> Result<Vec<Entity>, DatabaseFailure> {
        let store = self.store.read().map_err(lock_poisoned)?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for doc_id in document_ids {
            let Some(rel_ids) = store.rels_from.get(doc_id) else { continue };
            for rel_id in rel_ids {
                let Some(rel) = store.relationships.get(rel_id) else { continue };
                if rel.rel_type != "CONTAINS_ENTITY" || !scope_matches(&rel.scope_id, scope_id) {
                    continue;
                }
                if !seen.insert(rel.to.clone()) {
                    continue;
                }
                if let Some(entity) = store.entities.get(&rel.to) {
                    out.push(entity.clone());
                }
            }
        }
        Ok(out)
    }
}

fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> DatabaseFailure {
    DatabaseFailure::Other("in-memory store lock was poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(id: &str) -> ScopeId {
        ScopeId::new(id)
    }

    fn entity(label: &str, name: &str, scope_id: Option<ScopeId>) -> Entity {
        let mut e = Entity::new(label, name);
        e.scope_id = scope_id;
        e
    }

    #[tokio::test]
    async fn create_entities_dedupes_by_scope_and_name() {
        let db = InMemoryDatabase::default();
        let e1 = entity("Person", "Alice", Some(scope("tenant-a")));
        let e2 = entity("Person", "alice", Some(scope("tenant-a")));

        let first = db
            .create_entities(vec![e1], vec![vec![1.0, 0.0]])
            .await
            .unwrap();
        let second = db
            .create_entities(vec![e2], vec![vec![0.0, 1.0]])
            .await
            .unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(
            db.find_entity_by_name("Alice", Some(&scope("tenant-a")))
                .await
                .unwrap()
                .unwrap()
                .id,
            first[0].id
        );
    }

    #[tokio::test]
    async fn entities_are_isolated_across_scopes() {
        let db = InMemoryDatabase::default();
        let a = entity("Person", "Alice", Some(scope("tenant-a")));
        let b = entity("Person", "Alice", Some(scope("tenant-b")));

        db.create_entities(vec![a], vec![vec![1.0, 0.0]]).await.unwrap();
        db.create_entities(vec![b], vec![vec![0.0, 1.0]]).await.unwrap();

        let in_a = db
            .list_entities(None, Page::new(None, None), Some(&scope("tenant-a")))
            .await
            .unwrap();
        let in_b = db
            .list_entities(None, Page::new(None, None), Some(&scope("tenant-b")))
            .await
            .unwrap();
        assert_eq!(in_a.len(), 1);
        assert_eq!(in_b.len(), 1);
        assert_ne!(in_a[0].id, in_b[0].id);
    }

    #[tokio::test]
    async fn self_referencing_relationship_is_rejected() {
        let db = InMemoryDatabase::default();
        let alice = db
            .create_entities(vec![entity("Person", "Alice", None)], vec![vec![1.0]])
            .await
            .unwrap()
            .remove(0);

        let rel = Relationship::new(alice.id.clone(), alice.id, "KNOWS");
        let err = db.create_relationships(vec![rel]).await.unwrap_err();
        assert!(matches!(err, DatabaseFailure::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn delete_entity_cascades_to_relationships() {
        let db = InMemoryDatabase::default();
        let mut people = db
            .create_entities(
                vec![entity("Person", "Alice", None), entity("Person", "Bob", None)],
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await
            .unwrap();
        let bob = people.pop().unwrap();
        let alice = people.pop().unwrap();

        let rel = Relationship::new(alice.id.clone(), bob.id.clone(), "KNOWS");
        db.create_relationships(vec![rel]).await.unwrap();

        let outcome = db.delete_entity(&alice.id, None).await.unwrap();
        assert!(outcome.deleted);

        let remaining = db
            .list_relationships(None, None, None, Page::new(None, None), None)
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn subgraph_expansion_respects_max_depth() {
        let db = InMemoryDatabase::default();
        let mut chain = db
            .create_entities(
                vec![
                    entity("Person", "A", None),
                    entity("Person", "B", None),
                    entity("Person", "C", None),
                ],
                vec![vec![1.0], vec![1.0], vec![1.0]],
            )
            .await
            .unwrap();
        let c = chain.pop().unwrap();
        let b = chain.pop().unwrap();
        let a = chain.pop().unwrap();

        db.create_relationships(vec![
            Relationship::new(a.id.clone(), b.id.clone(), "KNOWS"),
            Relationship::new(b.id.clone(), c.id.clone(), "KNOWS"),
        ])
        .await
        .unwrap();

        let one_hop = db
            .retrieve_subgraph(&SubgraphQuery {
                entity_labels: vec![],
                relationship_types: vec![],
                max_depth: 1,
                limit: 10,
                start_entity_ids: vec![a.id.clone()],
                scope_id: None,
            })
            .await
            .unwrap();
        assert_eq!(one_hop.entities.len(), 1);
        assert_eq!(one_hop.entities[0].id, b.id);

        let two_hop = db
            .retrieve_subgraph(&SubgraphQuery {
                entity_labels: vec![],
                relationship_types: vec![],
                max_depth: 2,
                limit: 10,
                start_entity_ids: vec![a.id],
                scope_id: None,
            })
            .await
            .unwrap();
        assert_eq!(two_hop.entities.len(), 2);
        assert!(two_hop.entities.iter().any(|e| e.id == c.id));
    }

    #[tokio::test]
    async fn vector_search_filters_by_similarity_threshold() {
        let db = InMemoryDatabase::default();
        db.create_entities(
            vec![entity("Person", "Alice", None), entity("Person", "Bob", None)],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .await
        .unwrap();

        let results = db
            .find_entities_by_vector(&[1.0, 0.0], 10, 0.9, &VectorSearchFilter::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].properties.get("name").unwrap(), "Alice");
    }

    #[tokio::test]
    async fn get_entities_from_documents_follows_contains_entity_links() {
        let db = InMemoryDatabase::default();
        let doc = db
            .create_document(Document::new("Alice works at Acme."), vec![0.5, 0.5])
            .await
            .unwrap();
        let alice = db
            .create_entities(vec![entity("Person", "Alice", None)], vec![vec![1.0]])
            .await
            .unwrap()
            .remove(0);
        db.link_entity_to_document(&doc.id, &alice.id, None).await.unwrap();

        let linked = db.get_entities_from_documents(&[doc.id], None).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, alice.id);
    }
}
