// JupiterOne connection settings

use deferred_maintenance_core::error::{AppError, Result};
use std::time::Duration;

pub const PRODUCTION_ENDPOINT: &str = "https://api.us.jupiterone.io/graphql";
pub const DEV_ENDPOINT: &str = "https://api.dev.jupiterone.io/graphql";

/// Explicit client configuration, validated before any remote call
#[derive(Clone)]
pub struct JupiterOneConfig {
    pub account: String,
    pub api_token: String,
    pub endpoint: String,
    pub request_timeout: Duration,
}

impl JupiterOneConfig {
    /// Build a config from possibly-missing credentials
    ///
    /// # Errors
    /// `AppError::Config` naming every missing variable
    pub fn new(account: Option<String>, api_token: Option<String>) -> Result<Self> {
        let account = account.filter(|s| !s.trim().is_empty());
        let api_token = api_token.filter(|s| !s.trim().is_empty());

        match (account, api_token) {
            (Some(account), Some(api_token)) => Ok(Self {
                account,
                api_token,
                endpoint: PRODUCTION_ENDPOINT.to_string(),
                request_timeout: Duration::from_secs(30),
            }),
            (account, api_token) => {
                let mut missing = Vec::new();
                if account.is_none() {
                    missing.push("J1_ACCOUNT");
                }
                if api_token.is_none() {
                    missing.push("J1_API_TOKEN");
                }
                Err(AppError::Config(format!(
                    "Missing {} ENV Var!",
                    missing.join(", ")
                )))
            }
        }
    }

    /// Target the dev API instead of production
    pub fn dev(mut self, enabled: bool) -> Self {
        if enabled {
            self.endpoint = DEV_ENDPOINT.to_string();
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for JupiterOneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JupiterOneConfig")
            .field("account", &self.account)
            .field("api_token", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_are_all_reported() {
        let err = JupiterOneConfig::new(None, Some(" ".into())).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("J1_ACCOUNT"));
        assert!(msg.contains("J1_API_TOKEN"));

        let err = JupiterOneConfig::new(Some("acct".into()), None).unwrap_err();
        assert!(!err.to_string().contains("J1_ACCOUNT"));
    }

    #[test]
    fn test_dev_switches_endpoint() {
        let config = JupiterOneConfig::new(Some("acct".into()), Some("tok".into())).unwrap();
        assert_eq!(config.endpoint, PRODUCTION_ENDPOINT);
        assert_eq!(config.clone().dev(false).endpoint, PRODUCTION_ENDPOINT);
        assert_eq!(config.dev(true).endpoint, DEV_ENDPOINT);
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = JupiterOneConfig::new(Some("acct".into()), Some("secret".into())).unwrap();
        assert!(!format!("{:?}", config).contains("secret"));
    }
}
