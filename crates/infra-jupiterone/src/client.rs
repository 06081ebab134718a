// JupiterOne GraphClient Implementation

use crate::config::JupiterOneConfig;
use crate::graphql::{
    decode_entity, CreateEntityData, CreateEntityVariables, CreateRelationshipData,
    CreateRelationshipVariables, GraphQlRequest, GraphQlResponse, QueryData, QueryVariables,
    CREATE_ENTITY, CREATE_RELATIONSHIP, QUERY_V1,
};
use async_trait::async_trait;
use deferred_maintenance_core::domain::TargetEntity;
use deferred_maintenance_core::port::{
    EntityUpsert, GraphClient, GraphError, RelationshipUpsert, UpsertedId,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Upper bound on cursor pages followed by one query
const MAX_QUERY_PAGES: usize = 1000;

// Helper to convert reqwest::Error to GraphError
fn map_reqwest_error(err: reqwest::Error) -> GraphError {
    if err.is_decode() {
        GraphError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        GraphError::Http {
            status: status.as_u16(),
            message: err.to_string(),
        }
    } else {
        // Connect, timeout, protocol errors
        GraphError::Transport(err.to_string())
    }
}

/// GraphQL client for the JupiterOne API
///
/// One instance holds one connection pool; every call of a batch goes
/// through it.
pub struct JupiterOneClient {
    http: Client,
    config: JupiterOneConfig,
}

impl JupiterOneClient {
    /// Create a client from validated configuration
    pub fn new(config: JupiterOneConfig) -> Result<Self, GraphError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("deferred-maintenance/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GraphError::Transport(format!("Failed to create client: {}", e)))?;

        Ok(Self { http, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn graphql<V, D>(&self, document: &str, variables: V) -> Result<D, GraphError>
    where
        V: Serialize + Send,
        D: DeserializeOwned,
    {
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_token)
            .header("JupiterOne-Account", &self.config.account)
            .json(&GraphQlRequest {
                query: document,
                variables,
            })
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope: GraphQlResponse<D> = response.json().await.map_err(map_reqwest_error)?;

        if !envelope.errors.is_empty() {
            let messages: Vec<String> = envelope.errors.into_iter().map(|e| e.message).collect();
            return Err(GraphError::GraphQl(messages.join("; ")));
        }

        envelope
            .data
            .ok_or_else(|| GraphError::Decode("response has neither data nor errors".to_string()))
    }
}

#[async_trait]
impl GraphClient for JupiterOneClient {
    async fn query_by_language(&self, query: &str) -> Result<Vec<TargetEntity>, GraphError> {
        let mut entities = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=MAX_QUERY_PAGES {
            let data: QueryData = self
                .graphql(
                    QUERY_V1,
                    QueryVariables {
                        query,
                        cursor: cursor.as_deref(),
                        deferred_response: "DISABLED",
                    },
                )
                .await?;
            let result = data.query_v1;

            let rows = match result.data {
                Value::Array(rows) => rows,
                Value::Null => Vec::new(),
                other => {
                    return Err(GraphError::Decode(format!(
                        "unexpected {} result: {}",
                        result.result_type.as_deref().unwrap_or("query"),
                        other
                    )))
                }
            };
            debug!(page, rows = rows.len(), "Fetched query page");
            entities.extend(rows.iter().filter_map(decode_entity));

            match result.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(entities),
            }
        }

        Err(GraphError::Decode(format!(
            "query did not finish within {} pages",
            MAX_QUERY_PAGES
        )))
    }

    async fn upsert_entity(&self, request: &EntityUpsert) -> Result<UpsertedId, GraphError> {
        let data: CreateEntityData = self
            .graphql(
                CREATE_ENTITY,
                CreateEntityVariables {
                    entity_key: &request.key,
                    entity_type: &request.entity_type,
                    entity_class: vec![request.class.as_str()],
                    properties: &request.properties,
                },
            )
            .await?;

        let id = data
            .create_entity
            .into_id()
            .ok_or_else(|| GraphError::Decode("createEntity returned no _id".to_string()))?;
        debug!(key = %request.key, id = %id, "Entity upserted");
        Ok(UpsertedId(id))
    }

    async fn upsert_relationship(
        &self,
        request: &RelationshipUpsert,
    ) -> Result<UpsertedId, GraphError> {
        let data: CreateRelationshipData = self
            .graphql(
                CREATE_RELATIONSHIP,
                CreateRelationshipVariables {
                    relationship_key: &request.key,
                    relationship_type: &request.relationship_type,
                    relationship_class: &request.class,
                    from_entity_id: &request.from_id,
                    to_entity_id: &request.to_id,
                    properties: &request.properties,
                },
            )
            .await?;

        let id = data
            .create_relationship
            .into_id()
            .ok_or_else(|| GraphError::Decode("createRelationship returned no _id".to_string()))?;
        debug!(key = %request.key, id = %id, "Relationship upserted");
        Ok(UpsertedId(id))
    }
}
