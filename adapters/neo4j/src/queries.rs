//! Cypher query templates.
//!
//! Neo4j does not allow labels or relationship types to be bound as query
//! parameters, so every template containing `{label}`/`{rel_type}` is filled
//! in with `format!` at the call site *after* the caller has validated the
//! identifier with `is_label_shaped`/`is_relationship_type_shaped` — the
//! same guard the in-memory adapter's callers already pass through.
//!
//! `scopeId` comparisons never use bare `= $scope_id`: Cypher's `null = null`
//! is `null`, not `true`, so a plain equality predicate would drop every
//! unscoped record (`$scope_id` is `null`) whether or not it should match.
//! `WHERE`-based templates guard with `($scope_id IS NULL AND x.scopeId IS
//! NULL) OR x.scopeId = $scope_id`, the same null-safe shape already used
//! here for `$label`/`$rel_type`/`$from_id`/`$to_id`. `MERGE` templates
//! can't carry a `WHERE` guard on their match pattern, so they match on
//! `scopeKey: coalesce($scope_id, '')` instead — a property that collapses
//! both "unscoped" sides to the same value — and set the real, nullable
//! `scopeId` explicitly in `ON CREATE SET`.

pub const ENSURE_ENTITY_VECTOR_INDEX: &str = r#"
CREATE VECTOR INDEX {index_name} IF NOT EXISTS
FOR (n:AkashaEntity) ON (n.embedding)
OPTIONS {{ indexConfig: {{ `vector.dimensions`: {dimensions}, `vector.similarity_function`: 'cosine' }} }}
"#;

pub const ENSURE_DOCUMENT_VECTOR_INDEX: &str = r#"
CREATE VECTOR INDEX {index_name} IF NOT EXISTS
FOR (n:AkashaDocument) ON (n.embedding)
OPTIONS {{ indexConfig: {{ `vector.dimensions`: {dimensions}, `vector.similarity_function`: 'cosine' }} }}
"#;

pub const MERGE_ENTITY: &str = r#"
MERGE (n:AkashaEntity:{label} {{ scopeKey: coalesce($scope_id, ''), normalizedName: $normalized_name }})
ON CREATE SET
  n.id = $id,
  n.scopeId = $scope_id,
  n += $props,
  n.contextIds = $context_ids,
  n.embedding = $embedding,
  n._recordedAt = $recorded_at,
  n._validFrom = $valid_from,
  n._validTo = $valid_to
ON MATCH SET
  n += $props,
  n.contextIds = apoc.coll.toSet(coalesce(n.contextIds, []) + $context_ids),
  n.embedding = $embedding
RETURN n
"#;

pub const FIND_ENTITY_BY_NAME: &str = r#"
MATCH (n:AkashaEntity)
WHERE (($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id)
  AND n.normalizedName = $normalized_name
RETURN n
"#;

pub const FIND_ENTITY_BY_ID: &str = r#"
MATCH (n:AkashaEntity {{ id: $id }})
WHERE ($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id
RETURN n
"#;

pub const UPDATE_ENTITY: &str = r#"
MATCH (n:AkashaEntity {{ id: $id }})
WHERE ($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id
SET n += $props
RETURN n
"#;

pub const UPDATE_ENTITY_CONTEXT_IDS: &str = r#"
MATCH (n:AkashaEntity {{ id: $id }})
SET n.contextIds = apoc.coll.toSet(coalesce(n.contextIds, []) + [$context_id])
"#;

pub const DELETE_ENTITY: &str = r#"
MATCH (n:AkashaEntity {{ id: $id }})
WHERE ($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id
DETACH DELETE n
RETURN count(n) as deleted
"#;

pub const LIST_ENTITIES: &str = r#"
MATCH (n:AkashaEntity)
WHERE (($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id)
  AND ($label IS NULL OR $label IN labels(n))
RETURN n
ORDER BY n._recordedAt
SKIP $offset LIMIT $limit
"#;

pub const MERGE_RELATIONSHIP: &str = r#"
MATCH (a {{ id: $from_id }}), (b {{ id: $to_id }})
MERGE (a)-[r:{rel_type} {{ scopeKey: coalesce($scope_id, '') }}]->(b)
ON CREATE SET
  r.id = $id,
  r.scopeId = $scope_id,
  r += $props,
  r.contextIds = $context_ids,
  r._recordedAt = $recorded_at,
  r._validFrom = $valid_from,
  r._validTo = $valid_to
ON MATCH SET
  r += $props,
  r.contextIds = apoc.coll.toSet(coalesce(r.contextIds, []) + $context_ids)
RETURN r, a.id as from_id, b.id as to_id
"#;

pub const FIND_RELATIONSHIP_BY_ID: &str = r#"
MATCH (a)-[r {{ id: $id }}]->(b)
WHERE ($scope_id IS NULL AND r.scopeId IS NULL) OR r.scopeId = $scope_id
RETURN r, a.id as from_id, b.id as to_id
"#;

pub const UPDATE_RELATIONSHIP: &str = r#"
MATCH (a)-[r {{ id: $id }}]->(b)
WHERE ($scope_id IS NULL AND r.scopeId IS NULL) OR r.scopeId = $scope_id
SET r += $props
RETURN r, a.id as from_id, b.id as to_id
"#;

pub const DELETE_RELATIONSHIP: &str = r#"
MATCH ()-[r {{ id: $id }}]->()
WHERE ($scope_id IS NULL AND r.scopeId IS NULL) OR r.scopeId = $scope_id
DELETE r
RETURN count(r) as deleted
"#;

pub const LIST_RELATIONSHIPS: &str = r#"
MATCH (a)-[r]->(b)
WHERE (($scope_id IS NULL AND r.scopeId IS NULL) OR r.scopeId = $scope_id)
  AND ($rel_type IS NULL OR type(r) = $rel_type)
  AND ($from_id IS NULL OR a.id = $from_id)
  AND ($to_id IS NULL OR b.id = $to_id)
RETURN r, a.id as from_id, b.id as to_id
ORDER BY r._recordedAt
SKIP $offset LIMIT $limit
"#;

pub const MERGE_DOCUMENT: &str = r#"
MERGE (n:AkashaDocument {{ scopeKey: coalesce($scope_id, ''), text: $text }})
ON CREATE SET
  n.id = $id,
  n.scopeId = $scope_id,
  n.metadata = $metadata,
  n.contextIds = $context_ids,
  n.embedding = $embedding,
  n._recordedAt = $recorded_at,
  n._validFrom = $valid_from,
  n._validTo = $valid_to
ON MATCH SET
  n.contextIds = apoc.coll.toSet(coalesce(n.contextIds, []) + $context_ids),
  n.embedding = $embedding
RETURN n
"#;

pub const FIND_DOCUMENT_BY_TEXT: &str = r#"
MATCH (n:AkashaDocument)
WHERE (($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id)
  AND n.text = $text
RETURN n
"#;

pub const FIND_DOCUMENT_BY_ID: &str = r#"
MATCH (n:AkashaDocument {{ id: $id }})
WHERE ($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id
RETURN n
"#;

pub const UPDATE_DOCUMENT: &str = r#"
MATCH (n:AkashaDocument {{ id: $id }})
WHERE ($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id
SET n.metadata = apoc.map.merge(coalesce(n.metadata, {{}}), $props)
RETURN n
"#;

pub const UPDATE_DOCUMENT_CONTEXT_IDS: &str = r#"
MATCH (n:AkashaDocument {{ id: $id }})
SET n.contextIds = apoc.coll.toSet(coalesce(n.contextIds, []) + [$context_id])
"#;

pub const DELETE_DOCUMENT: &str = r#"
MATCH (n:AkashaDocument {{ id: $id }})
WHERE ($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id
DETACH DELETE n
RETURN count(n) as deleted
"#;

pub const LIST_DOCUMENTS: &str = r#"
MATCH (n:AkashaDocument)
WHERE ($scope_id IS NULL AND n.scopeId IS NULL) OR n.scopeId = $scope_id
RETURN n
ORDER BY n._recordedAt
SKIP $offset LIMIT $limit
"#;

pub const LINK_ENTITY_TO_DOCUMENT: &str = r#"
MATCH (doc:AkashaDocument {{ id: $doc_id }}), (entity:AkashaEntity {{ id: $entity_id }})
MERGE (doc)-[r:CONTAINS_ENTITY {{ scopeKey: coalesce($scope_id, '') }}]->(entity)
ON CREATE SET r.id = $id, r.scopeId = $scope_id
RETURN r, doc.id as from_id, entity.id as to_id
"#;

pub const GET_ENTITIES_FROM_DOCUMENTS: &str = r#"
MATCH (doc:AkashaDocument)-[rel:CONTAINS_ENTITY]->(n:AkashaEntity)
WHERE doc.id IN $document_ids
  AND (($scope_id IS NULL AND rel.scopeId IS NULL) OR rel.scopeId = $scope_id)
RETURN DISTINCT n
"#;

/// Finds a node/relationship by `id` regardless of scope, returning only
/// its `scopeId`. Backs the `NotFound` vs `ScopeViolation` distinction —
/// never used to authorize access to the record itself.
pub const ENTITY_SCOPE_OF: &str = r#"
MATCH (n:AkashaEntity {{ id: $id }})
RETURN n.scopeId as scope_id
"#;

pub const RELATIONSHIP_SCOPE_OF: &str = r#"
MATCH ()-[r {{ id: $id }}]->()
RETURN r.scopeId as scope_id
"#;

pub const DOCUMENT_SCOPE_OF: &str = r#"
MATCH (n:AkashaDocument {{ id: $id }})
RETURN n.scopeId as scope_id
"#;

pub const FIND_ENTITIES_BY_VECTOR: &str = r#"
CALL db.index.vector.queryNodes($index_name, $limit, $query_vector)
YIELD node, score
WHERE (($scope_id IS NULL AND node.scopeId IS NULL) OR node.scopeId = $scope_id) AND score >= $threshold
RETURN node as n, score
ORDER BY score DESC
"#;

pub const FIND_DOCUMENTS_BY_VECTOR: &str = r#"
CALL db.index.vector.queryNodes($index_name, $limit, $query_vector)
YIELD node, score
WHERE (($scope_id IS NULL AND node.scopeId IS NULL) OR node.scopeId = $scope_id) AND score >= $threshold
RETURN node as n, score
ORDER BY score DESC
"#;

/// `{max_depth}` is interpolated (Cypher variable-length paths cannot take a
/// parameter for hop count) after the caller clamps it to a small integer.
pub const RETRIEVE_SUBGRAPH: &str = r#"
MATCH (start:AkashaEntity)
WHERE start.id IN $start_ids
MATCH path = (start)-[r*1..{max_depth}]-(other:AkashaEntity)
WHERE (($scope_id IS NULL AND other.scopeId IS NULL) OR other.scopeId = $scope_id)
  AND all(rel IN r WHERE ($scope_id IS NULL AND rel.scopeId IS NULL) OR rel.scopeId = $scope_id)
WITH other, relationships(path) as rels
UNWIND rels as rel
RETURN DISTINCT other, rel, startNode(rel).id as from_id, endNode(rel).id as to_id
LIMIT $limit
"#;
