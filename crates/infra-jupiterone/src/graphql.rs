//! GraphQL documents and response envelopes for the JupiterOne API

use deferred_maintenance_core::domain::TargetEntity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const QUERY_V1: &str = r#"
query J1QL($query: String!, $variables: JSON, $cursor: String, $deferredResponse: DeferredResponseOption) {
  queryV1(query: $query, variables: $variables, cursor: $cursor, deferredResponse: $deferredResponse) {
    type
    data
    cursor
  }
}"#;

pub const CREATE_ENTITY: &str = r#"
mutation CreateEntity($entityKey: String!, $entityType: String!, $entityClass: [String!]!, $properties: JSON) {
  createEntity(entityKey: $entityKey, entityType: $entityType, entityClass: $entityClass, properties: $properties) {
    entity { _id }
    vertex { id entity { _id } }
  }
}"#;

pub const CREATE_RELATIONSHIP: &str = r#"
mutation CreateRelationship($relationshipKey: String!, $relationshipType: String!, $relationshipClass: String!, $fromEntityId: String!, $toEntityId: String!, $properties: JSON) {
  createRelationship(relationshipKey: $relationshipKey, relationshipType: $relationshipType, relationshipClass: $relationshipClass, fromEntityId: $fromEntityId, toEntityId: $toEntityId, properties: $properties) {
    relationship { _id }
    edge { id relationship { _id } }
  }
}"#;

#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a, V: Serialize> {
    pub query: &'a str,
    pub variables: V,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<D> {
    pub data: Option<D>,
    #[serde(default)]
    pub errors: Vec<GraphQlErrorMessage>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlErrorMessage {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryVariables<'a> {
    pub query: &'a str,
    pub cursor: Option<&'a str>,
    pub deferred_response: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    pub query_v1: QueryPage,
}

#[derive(Debug, Deserialize)]
pub struct QueryPage {
    #[serde(rename = "type")]
    pub result_type: Option<String>,
    #[serde(default)]
    pub data: Value,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityVariables<'a> {
    pub entity_key: &'a str,
    pub entity_type: &'a str,
    pub entity_class: Vec<&'a str>,
    pub properties: &'a Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelationshipVariables<'a> {
    pub relationship_key: &'a str,
    pub relationship_type: &'a str,
    pub relationship_class: &'a str,
    pub from_entity_id: &'a str,
    pub to_entity_id: &'a str,
    pub properties: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct IdOnly {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct Vertex {
    pub entity: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
pub struct Edge {
    pub relationship: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityData {
    pub create_entity: CreateEntityPayload,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntityPayload {
    pub entity: Option<IdOnly>,
    pub vertex: Option<Vertex>,
}

impl CreateEntityPayload {
    pub fn into_id(self) -> Option<String> {
        self.entity
            .or_else(|| self.vertex.and_then(|v| v.entity))
            .map(|e| e.id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRelationshipData {
    pub create_relationship: CreateRelationshipPayload,
}

#[derive(Debug, Deserialize)]
pub struct CreateRelationshipPayload {
    pub relationship: Option<IdOnly>,
    pub edge: Option<Edge>,
}

impl CreateRelationshipPayload {
    pub fn into_id(self) -> Option<String> {
        self.relationship
            .or_else(|| self.edge.and_then(|e| e.relationship))
            .map(|r| r.id)
    }
}

/// `_type`/`_class` come back as a string or a list of strings
fn joined(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join(","))
        }
        _ => None,
    }
}

/// Decode one row of a `queryV1` list into an entity
///
/// Rows look like `{id, entity: {_id, _type, ...}, properties: {...}}`.
/// Flat rows carrying `_id` directly are accepted too. Anything else is
/// not an entity and yields `None`.
pub fn decode_entity(row: &Value) -> Option<TargetEntity> {
    let row = row.as_object()?;
    let entity = row.get("entity").and_then(Value::as_object).unwrap_or(row);

    let id = entity
        .get("_id")
        .or_else(|| row.get("id"))
        .and_then(Value::as_str)?
        .to_string();

    let mut properties = Map::new();
    if let Some(extra) = row.get("properties").and_then(Value::as_object) {
        properties.extend(extra.clone());
    }
    for (name, value) in entity {
        if !name.starts_with('_') {
            properties.insert(name.clone(), value.clone());
        }
    }

    let text = |name: &str| entity.get(name).and_then(Value::as_str).map(str::to_string);

    Some(TargetEntity {
        id,
        key: text("_key"),
        entity_type: joined(entity.get("_type")).unwrap_or_default(),
        class: joined(entity.get("_class")).unwrap_or_default(),
        display_name: text("displayName"),
        name: text("name"),
        properties,
    })
}
