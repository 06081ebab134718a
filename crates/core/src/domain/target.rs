// Target Entity Domain Model
// A node owned by the remote graph store. Read-only to the core.

use serde_json::{Map, Value};

/// Graph entity id (`_id`)
pub type EntityId = String;

/// An entity returned by a graph query
///
/// Findings coming back from a query are also `TargetEntity` values;
/// `entity_type` tells them apart.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEntity {
    pub id: EntityId,
    pub key: Option<String>,
    pub entity_type: String,
    /// `_class`, joined with `,` when the store reports several classes
    pub class: String,
    pub display_name: Option<String>,
    pub name: Option<String>,

    /// Remaining properties as reported by the store
    pub properties: Map<String, Value>,
}

impl TargetEntity {
    pub fn new(
        id: impl Into<String>,
        entity_type: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            key: None,
            entity_type: entity_type.into(),
            class: class.into(),
            display_name: None,
            name: None,
            properties: Map::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Human label: display name, then name, then type
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.entity_type)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(Value::as_str)
    }
}
