// Finding Domain Model
// One deferred maintenance obligation recorded in the graph

use crate::domain::error::{DomainError, Result};
use crate::domain::target::TargetEntity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;

/// `_type` of every maintenance Finding
pub const FINDING_TYPE: &str = "deferred_maintenance";

/// `_class` of every maintenance Finding
pub const FINDING_CLASS: &str = "Finding";

/// `_class` of the target -> Finding edge
pub const HAS_CLASS: &str = "HAS";

/// `owner` property stamped on Findings and edges
pub const OWNER: &str = "jupiterone";

/// Short descriptions are shown in the graph view and must stay short
pub const MAX_SHORT_DESCRIPTION_LEN: usize = 50;

/// Finding status. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    Open,
    Closed,
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingStatus::Open => write!(f, "open"),
            FindingStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FindingStatus {
    /// Read the status recorded on a Finding entity
    ///
    /// `closed=true` wins over a stale `status` value.
    pub fn of(entity: &TargetEntity) -> Option<Self> {
        if entity.property("closed").and_then(Value::as_bool) == Some(true) {
            return Some(FindingStatus::Closed);
        }
        match entity.property_str("status") {
            Some("open") => Some(FindingStatus::Open),
            Some("closed") => Some(FindingStatus::Closed),
            _ => None,
        }
    }

    /// Transition open -> closed
    pub fn close(self) -> Result<Self> {
        match self {
            FindingStatus::Open => Ok(FindingStatus::Closed),
            FindingStatus::Closed => Err(DomainError::InvalidStateTransition {
                from: self.to_string(),
                to: FindingStatus::Closed.to_string(),
            }),
        }
    }

    pub fn is_closed(self) -> bool {
        self == FindingStatus::Closed
    }
}

/// Why a Finding was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    /// Work has been performed
    Complete,
    /// Maintenance was opened in error
    Error,
    /// Business accepts the maintenance risk
    RiskAccepted,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Complete => write!(f, "COMPLETE"),
            CloseReason::Error => write!(f, "ERROR"),
            CloseReason::RiskAccepted => write!(f, "RISK_ACCEPTED"),
        }
    }
}

impl FromStr for CloseReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COMPLETE" => Ok(CloseReason::Complete),
            "ERROR" => Ok(CloseReason::Error),
            "RISK_ACCEPTED" => Ok(CloseReason::RiskAccepted),
            other => Err(DomainError::UnknownCloseReason(other.to_string())),
        }
    }
}

impl CloseReason {
    /// Whether a link to the performed maintenance must accompany the close
    pub fn requires_link(self) -> bool {
        self != CloseReason::Error
    }
}

/// Content of a maintenance obligation
///
/// Unknown fields are rejected when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MaintenanceContent {
    pub short_description: String,
    pub description: String,
    pub web_link: String,
    /// Epoch ms
    pub due_date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl MaintenanceContent {
    /// Create validated maintenance content
    ///
    /// # Errors
    /// - `ShortDescriptionLength` if the short description is empty or over 50 chars
    /// - `InvalidWebLink` if `web_link` is not an absolute http(s) URL
    pub fn new(
        short_description: impl Into<String>,
        description: impl Into<String>,
        web_link: impl Into<String>,
        due_date: i64,
    ) -> Result<Self> {
        let content = Self {
            short_description: short_description.into(),
            description: description.into(),
            web_link: web_link.into(),
            due_date,
            created_by: None,
        };
        content.validate()?;
        Ok(content)
    }

    pub fn with_created_by(mut self, created_by: Option<String>) -> Self {
        self.created_by = created_by.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let len = self.short_description.chars().count();
        if len == 0 || len > MAX_SHORT_DESCRIPTION_LEN {
            return Err(DomainError::ShortDescriptionLength {
                len,
                max: MAX_SHORT_DESCRIPTION_LEN,
            });
        }
        validate_web_link(&self.web_link)
    }

    /// Properties written when a Finding is opened
    pub fn open_properties(&self, maintenance_id: &str) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("owner".into(), json!(OWNER));
        props.insert("displayName".into(), json!(self.short_description));
        props.insert("maintenanceId".into(), json!(maintenance_id));
        props.insert("status".into(), json!(FindingStatus::Open));
        props.insert("closed".into(), json!(false));
        props.insert("shortDescription".into(), json!(self.short_description));
        props.insert("description".into(), json!(self.description));
        props.insert("webLink".into(), json!(self.web_link));
        props.insert("dueDate".into(), json!(self.due_date));
        if let Some(created_by) = &self.created_by {
            props.insert("createdBy".into(), json!(created_by));
        }
        props
    }
}

/// Close metadata applied to an open Finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CloseInfo {
    pub close_reason: CloseReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
}

impl CloseInfo {
    pub fn new(close_reason: CloseReason, maintenance_link: Option<String>) -> Result<Self> {
        let info = Self {
            close_reason,
            maintenance_link: maintenance_link.filter(|s| !s.trim().is_empty()),
            closed_by: None,
        };
        info.validate()?;
        Ok(info)
    }

    pub fn with_closed_by(mut self, closed_by: Option<String>) -> Self {
        self.closed_by = closed_by.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<()> {
        match &self.maintenance_link {
            Some(link) => validate_web_link(link),
            None if self.close_reason.requires_link() => Err(DomainError::MissingMaintenanceLink),
            None => Ok(()),
        }
    }

    /// The only properties sent when closing; everything else is left to merge
    pub fn close_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("status".into(), json!(FindingStatus::Closed));
        props.insert("closed".into(), json!(true));
        props.insert("closeReason".into(), json!(self.close_reason));
        if let Some(link) = &self.maintenance_link {
            props.insert("maintenanceLink".into(), json!(link));
        }
        if let Some(closed_by) = &self.closed_by {
            props.insert("closedBy".into(), json!(closed_by));
        }
        props
    }
}

/// Accept only absolute http(s) URLs with a host
pub fn validate_web_link(link: &str) -> Result<()> {
    let parsed =
        url::Url::parse(link.trim()).map_err(|_| DomainError::InvalidWebLink(link.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(DomainError::InvalidWebLink(link.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> MaintenanceContent {
        MaintenanceContent::new(
            "Upgrade openssl",
            "openssl 1.1 is EOL",
            "https://issues.example.com/OPS-12",
            1_700_000_000_000,
        )
        .unwrap()
    }

    #[test]
    fn test_short_description_limit() {
        let err = MaintenanceContent::new("x".repeat(51), "d", "https://x.io", 0).unwrap_err();
        assert_eq!(err, DomainError::ShortDescriptionLength { len: 51, max: 50 });

        assert!(MaintenanceContent::new("x".repeat(50), "d", "https://x.io", 0).is_ok());
        assert!(MaintenanceContent::new("", "d", "https://x.io", 0).is_err());
    }

    #[test]
    fn test_web_link_must_be_http() {
        assert!(validate_web_link("https://example.com/a").is_ok());
        assert!(validate_web_link("http://example.com").is_ok());
        assert!(validate_web_link("ftp://example.com").is_err());
        assert!(validate_web_link("example.com").is_err());
        assert!(validate_web_link("mailto:ops@example.com").is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let raw = serde_json::json!({
            "shortDescription": "a",
            "description": "b",
            "webLink": "https://x.io",
            "dueDate": 1,
            "severity": "high"
        });
        let parsed: std::result::Result<MaintenanceContent, _> = serde_json::from_value(raw);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_open_properties() {
        let props = content()
            .with_created_by(Some("ops@example.com".into()))
            .open_properties("abc");
        assert_eq!(props["status"], "open");
        assert_eq!(props["closed"], false);
        assert_eq!(props["displayName"], "Upgrade openssl");
        assert_eq!(props["maintenanceId"], "abc");
        assert_eq!(props["createdBy"], "ops@example.com");
        assert_eq!(props["dueDate"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_close_requires_link_unless_error() {
        assert_eq!(
            CloseInfo::new(CloseReason::Complete, None).unwrap_err(),
            DomainError::MissingMaintenanceLink
        );
        assert!(CloseInfo::new(CloseReason::RiskAccepted, Some("https://x.io/pr/1".into())).is_ok());

        let info = CloseInfo::new(CloseReason::Error, None).unwrap();
        let props = info.close_properties();
        assert_eq!(props["closeReason"], "ERROR");
        assert!(!props.contains_key("maintenanceLink"));
    }

    #[test]
    fn test_close_properties_are_minimal() {
        let props = CloseInfo::new(CloseReason::Complete, Some("https://x.io/pr/1".into()))
            .unwrap()
            .with_closed_by(Some("dev@example.com".into()))
            .close_properties();
        let mut keys: Vec<&str> = props.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["closeReason", "closed", "closedBy", "maintenanceLink", "status"]
        );
    }

    #[test]
    fn test_close_reason_parsing() {
        assert_eq!("risk_accepted".parse::<CloseReason>().unwrap(), CloseReason::RiskAccepted);
        assert_eq!(CloseReason::RiskAccepted.to_string(), "RISK_ACCEPTED");
        assert!("DONE".parse::<CloseReason>().is_err());
    }

    #[test]
    fn test_status_transition_is_one_way() {
        assert_eq!(FindingStatus::Open.close().unwrap(), FindingStatus::Closed);
        assert!(matches!(
            FindingStatus::Closed.close(),
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_status_of_entity() {
        let open = TargetEntity::new("f", FINDING_TYPE, FINDING_CLASS)
            .with_property("status", json!("open"))
            .with_property("closed", json!(false));
        assert_eq!(FindingStatus::of(&open), Some(FindingStatus::Open));

        let closed = open.with_property("closed", json!(true));
        assert_eq!(FindingStatus::of(&closed), Some(FindingStatus::Closed));

        let unknown = TargetEntity::new("f", FINDING_TYPE, FINDING_CLASS);
        assert_eq!(FindingStatus::of(&unknown), None);
    }
}
