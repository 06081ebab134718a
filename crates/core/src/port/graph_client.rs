// Graph Client Port
// The only seam that speaks to the remote asset graph

use crate::domain::TargetEntity;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Request to create or update a graph entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpsert {
    pub key: String,
    pub entity_type: String,
    pub class: String,
    pub properties: Map<String, Value>,
}

/// Request to create or update a graph relationship
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipUpsert {
    pub key: String,
    pub relationship_type: String,
    pub class: String,
    pub from_id: String,
    pub to_id: String,
    pub properties: Map<String, Value>,
}

/// Id assigned by the store to an upserted entity or relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertedId(pub String);

impl UpsertedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Graph client errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl GraphError {
    /// Whether repeating the same call may succeed
    ///
    /// Rejections (4xx other than 429) and undecodable responses will not
    /// change on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            GraphError::Transport(_) | GraphError::GraphQl(_) => true,
            GraphError::Http { status, .. } => *status == 429 || *status >= 500,
            GraphError::Rejected(_) | GraphError::Decode(_) => false,
        }
    }
}

/// Graph client trait
///
/// Implementations:
/// - JupiterOneClient: GraphQL over HTTPS
/// - InMemoryGraphClient: in-process store for tests
///
/// # Merge contract
/// `upsert_entity` and `upsert_relationship` create the element when nothing
/// exists at `key`, and otherwise merge `properties` field by field into the
/// stored element. Properties not named in the request keep their stored
/// values. Closing a Finding depends on this.
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Run a query and return the matching entities (possibly none)
    async fn query_by_language(&self, query: &str) -> Result<Vec<TargetEntity>, GraphError>;

    /// Create or merge an entity at `request.key`
    async fn upsert_entity(&self, request: &EntityUpsert) -> Result<UpsertedId, GraphError>;

    /// Create or merge a relationship at `request.key`
    async fn upsert_relationship(
        &self,
        request: &RelationshipUpsert,
    ) -> Result<UpsertedId, GraphError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::id_provider::{IdProvider, SequentialIdProvider};
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    /// Which port operation a fault applies to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum GraphOperation {
        Query,
        UpsertEntity,
        UpsertRelationship,
    }

    /// Injected failure
    #[derive(Debug, Clone)]
    pub struct Fault {
        pub operation: GraphOperation,
        /// Only fire for requests whose key (or query text) contains this
        pub key_contains: Option<String>,
        /// Remaining firings; `None` fires forever
        pub remaining: Option<u32>,
        pub error: GraphError,
    }

    impl Fault {
        pub fn times(operation: GraphOperation, count: u32) -> Self {
            Self {
                operation,
                key_contains: None,
                remaining: Some(count),
                error: GraphError::Transport("injected fault".to_string()),
            }
        }

        pub fn always(operation: GraphOperation) -> Self {
            Self {
                remaining: None,
                ..Self::times(operation, 0)
            }
        }

        pub fn for_key(mut self, key_contains: impl Into<String>) -> Self {
            self.key_contains = Some(key_contains.into());
            self
        }

        pub fn with_error(mut self, error: GraphError) -> Self {
            self.error = error;
            self
        }
    }

    /// Entity as held by the in-memory store
    #[derive(Debug, Clone, PartialEq)]
    pub struct StoredEntity {
        pub id: String,
        pub key: String,
        pub entity_type: String,
        pub class: String,
        pub properties: Map<String, Value>,
    }

    impl StoredEntity {
        pub fn to_target(&self) -> TargetEntity {
            let text = |name: &str| {
                self.properties
                    .get(name)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            TargetEntity {
                id: self.id.clone(),
                key: Some(self.key.clone()),
                entity_type: self.entity_type.clone(),
                class: self.class.clone(),
                display_name: text("displayName"),
                name: text("name"),
                properties: self.properties.clone(),
            }
        }
    }

    /// Relationship as held by the in-memory store
    #[derive(Debug, Clone, PartialEq)]
    pub struct StoredRelationship {
        pub id: String,
        pub key: String,
        pub relationship_type: String,
        pub class: String,
        pub from_id: String,
        pub to_id: String,
        pub properties: Map<String, Value>,
    }

    #[derive(Default)]
    struct State {
        entities: BTreeMap<String, StoredEntity>,
        relationships: BTreeMap<String, StoredRelationship>,
        faults: Vec<Fault>,
        calls: HashMap<GraphOperation, usize>,
        canned: HashMap<String, Vec<TargetEntity>>,
    }

    impl State {
        fn record_call(&mut self, operation: GraphOperation, key: &str) -> Result<(), GraphError> {
            *self.calls.entry(operation).or_insert(0) += 1;

            let fault = self.faults.iter_mut().find(|f| {
                f.operation == operation
                    && f.remaining != Some(0)
                    && f.key_contains.as_deref().map_or(true, |k| key.contains(k))
            });
            match fault {
                Some(fault) => {
                    if let Some(remaining) = fault.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    Err(fault.error.clone())
                }
                None => Ok(()),
            }
        }
    }

    /// In-memory graph store honoring the merge contract
    ///
    /// Queries are answered from canned results first. Otherwise a query of
    /// the form `FIND <type> ...` returns every stored entity of that type.
    pub struct InMemoryGraphClient {
        state: Arc<Mutex<State>>,
        id_provider: Arc<dyn IdProvider>,
    }

    impl Default for InMemoryGraphClient {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryGraphClient {
        pub fn new() -> Self {
            Self::with_id_provider(Arc::new(SequentialIdProvider::new("node")))
        }

        pub fn with_id_provider(id_provider: Arc<dyn IdProvider>) -> Self {
            Self {
                state: Arc::new(Mutex::new(State::default())),
                id_provider,
            }
        }

        /// Store an existing entity (e.g. a CodeRepo) and return it as the
        /// store would report it
        pub fn seed_entity(&self, entity: TargetEntity) -> TargetEntity {
            let key = entity.key.clone().unwrap_or_else(|| entity.id.clone());
            let mut properties = entity.properties.clone();
            if let Some(display_name) = &entity.display_name {
                properties.insert("displayName".into(), Value::from(display_name.as_str()));
            }
            if let Some(name) = &entity.name {
                properties.insert("name".into(), Value::from(name.as_str()));
            }
            let stored = StoredEntity {
                id: entity.id.clone(),
                key: key.clone(),
                entity_type: entity.entity_type.clone(),
                class: entity.class.clone(),
                properties,
            };
            let target = stored.to_target();
            self.state.lock().unwrap().entities.insert(key, stored);
            target
        }

        pub fn inject(&self, fault: Fault) {
            self.state.lock().unwrap().faults.push(fault);
        }

        pub fn with_query_result(&self, query: impl Into<String>, result: Vec<TargetEntity>) {
            self.state
                .lock()
                .unwrap()
                .canned
                .insert(query.into(), result);
        }

        pub fn calls(&self, operation: GraphOperation) -> usize {
            self.state
                .lock()
                .unwrap()
                .calls
                .get(&operation)
                .copied()
                .unwrap_or(0)
        }

        pub fn entity(&self, key: &str) -> Option<StoredEntity> {
            self.state.lock().unwrap().entities.get(key).cloned()
        }

        pub fn entity_by_id(&self, id: &str) -> Option<StoredEntity> {
            self.state
                .lock()
                .unwrap()
                .entities
                .values()
                .find(|e| e.id == id)
                .cloned()
        }

        pub fn entities_of_type(&self, entity_type: &str) -> Vec<StoredEntity> {
            self.state
                .lock()
                .unwrap()
                .entities
                .values()
                .filter(|e| e.entity_type == entity_type)
                .cloned()
                .collect()
        }

        pub fn relationship(&self, key: &str) -> Option<StoredRelationship> {
            self.state.lock().unwrap().relationships.get(key).cloned()
        }

        pub fn relationships(&self) -> Vec<StoredRelationship> {
            self.state
                .lock()
                .unwrap()
                .relationships
                .values()
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl GraphClient for InMemoryGraphClient {
        async fn query_by_language(&self, query: &str) -> Result<Vec<TargetEntity>, GraphError> {
            let mut state = self.state.lock().unwrap();
            state.record_call(GraphOperation::Query, query)?;

            if let Some(result) = state.canned.get(query) {
                return Ok(result.clone());
            }

            let mut words = query.split_whitespace();
            match (words.next(), words.next()) {
                (Some(verb), Some(entity_type)) if verb.eq_ignore_ascii_case("find") => Ok(state
                    .entities
                    .values()
                    .filter(|e| e.entity_type == entity_type)
                    .map(StoredEntity::to_target)
                    .collect()),
                _ => Err(GraphError::Rejected(format!("unsupported query: {}", query))),
            }
        }

        async fn upsert_entity(&self, request: &EntityUpsert) -> Result<UpsertedId, GraphError> {
            let mut state = self.state.lock().unwrap();
            state.record_call(GraphOperation::UpsertEntity, &request.key)?;

            let stored = state
                .entities
                .entry(request.key.clone())
                .or_insert_with(|| StoredEntity {
                    id: self.id_provider.generate_id(),
                    key: request.key.clone(),
                    entity_type: request.entity_type.clone(),
                    class: request.class.clone(),
                    properties: Map::new(),
                });
            for (name, value) in &request.properties {
                stored.properties.insert(name.clone(), value.clone());
            }
            Ok(UpsertedId(stored.id.clone()))
        }

        async fn upsert_relationship(
            &self,
            request: &RelationshipUpsert,
        ) -> Result<UpsertedId, GraphError> {
            let mut state = self.state.lock().unwrap();
            state.record_call(GraphOperation::UpsertRelationship, &request.key)?;

            let stored = state
                .relationships
                .entry(request.key.clone())
                .or_insert_with(|| StoredRelationship {
                    id: self.id_provider.generate_id(),
                    key: request.key.clone(),
                    relationship_type: request.relationship_type.clone(),
                    class: request.class.clone(),
                    from_id: request.from_id.clone(),
                    to_id: request.to_id.clone(),
                    properties: Map::new(),
                });
            for (name, value) in &request.properties {
                stored.properties.insert(name.clone(), value.clone());
            }
            Ok(UpsertedId(stored.id.clone()))
        }
    }
}
