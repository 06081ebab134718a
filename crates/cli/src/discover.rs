// Discovery of the current user and code repo

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config written by the JupiterOne endpoint agent
pub const AGENT_CONFIG_PATH: &str = "/var/j1endpointagent/agent.conf";

#[derive(Deserialize)]
struct AgentConfig {
    email: Option<String>,
}

/// Email to stamp as `createdBy`/`closedBy`
///
/// An explicit value (flag or `J1_EMAIL`) wins; otherwise the endpoint
/// agent config is consulted.
pub fn discover_email(explicit: Option<String>, agent_config: &Path) -> Option<String> {
    explicit
        .filter(|s| !s.trim().is_empty())
        .or_else(|| email_from_agent_config(agent_config))
}

fn email_from_agent_config(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let config: AgentConfig = serde_json::from_str(&raw).ok()?;
    config.email.filter(|s| !s.trim().is_empty())
}

/// Name of the code repo being worked in, if `dir` is a git checkout
///
/// `outer_pwd` overrides the directory name when the tool runs inside a
/// container that mounts the checkout elsewhere.
pub fn discover_code_repo(dir: &Path, outer_pwd: Option<String>) -> Option<String> {
    if !dir.join(".git").exists() {
        return None;
    }
    let pwd = outer_pwd
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| dir.to_path_buf());
    pwd.file_name()?.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "deferred_maintenance_test_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_explicit_email_wins() {
        let email = discover_email(Some("me@x.io".into()), Path::new("/nonexistent"));
        assert_eq!(email.as_deref(), Some("me@x.io"));
    }

    #[test]
    fn test_email_from_agent_config() {
        let dir = scratch_dir("agent");
        let conf = dir.join("agent.conf");
        fs::write(&conf, r#"{"email": "agent@x.io", "other": 1}"#).unwrap();

        assert_eq!(discover_email(None, &conf).as_deref(), Some("agent@x.io"));
        assert_eq!(discover_email(Some("  ".into()), &conf).as_deref(), Some("agent@x.io"));

        fs::write(&conf, "not json").unwrap();
        assert_eq!(discover_email(None, &conf), None);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_code_repo_requires_git_dir() {
        let dir = scratch_dir("repo");
        assert_eq!(discover_code_repo(&dir, None), None);

        fs::create_dir(dir.join(".git")).unwrap();
        let name = dir.file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(discover_code_repo(&dir, None), Some(name));
        assert_eq!(
            discover_code_repo(&dir, Some("/src/billing-api".into())).as_deref(),
            Some("billing-api")
        );

        fs::remove_dir_all(dir).unwrap();
    }
}
