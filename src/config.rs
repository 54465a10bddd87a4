//! Configuration loading for agentlane.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::protocol::RESERVED_NAMES;

/// Get the agentlane home directory (~/.agentlane).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".agentlane"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.agentlane/settings.json
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load and validate settings from an explicit path.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Write settings as pretty JSON, creating parent directories.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.agents.is_empty() {
        return Err(Error::Config("no agents configured".to_string()));
    }
    for name in settings.agents.keys() {
        if name.trim().is_empty() {
            return Err(Error::Config("agent names must not be empty".to_string()));
        }
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(Error::Config(format!(
                "agent name '{}' is reserved",
                name
            )));
        }
    }
    if !settings.agents.contains_key(&settings.entry_agent) {
        return Err(Error::Config(format!(
            "entry_agent '{}' not found in settings.agents",
            settings.entry_agent
        )));
    }
    Ok(())
}

/// Load settings or return default if not found.
pub fn load_settings_or_default(path: Option<&Path>) -> Settings {
    let loaded = match path {
        Some(p) => load_settings_from(p),
        None => load_settings(),
    };
    loaded.unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

/// Agent configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentConfig {
    #[serde(default)]
    pub description: String,

    /// Working directory. Defaults to `<workspaces_path>/<name>`.
    pub workspace: Option<PathBuf>,
}

/// agentlane settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Agent that receives operator messages.
    pub entry_agent: String,

    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,

    #[serde(default = "default_workspaces_path")]
    pub workspaces_path: PathBuf,
}

fn default_workspaces_path() -> PathBuf {
    get_home_dir()
        .map(|h| h.join("workspaces"))
        .unwrap_or_else(|_| PathBuf::from("workspaces"))
}

impl Settings {
    /// Resolved workspace directory of an agent.
    pub fn workspace_for(&self, agent: &str) -> PathBuf {
        self.agents
            .get(agent)
            .and_then(|a| a.workspace.clone())
            .unwrap_or_else(|| self.workspaces_path.join(agent))
    }
}

impl Default for Settings {
    fn default() -> Self {
        let mut agents = BTreeMap::new();
        agents.insert(
            "assistant".to_string(),
            AgentConfig {
                description: "Default entry agent".to_string(),
                workspace: None,
            },
        );
        Self {
            entry_agent: "assistant".to_string(),
            agents,
            workspaces_path: default_workspaces_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_minimal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{
                "entry_agent": "ceo",
                "agents": {
                    "ceo": {"description": "Runs the show"},
                    "coder": {"workspace": "/srv/coder"}
                },
                "workspaces_path": "/srv/ws"
            }"#,
        );

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.entry_agent, "ceo");
        assert_eq!(settings.agents["ceo"].description, "Runs the show");
        assert_eq!(settings.workspace_for("ceo"), PathBuf::from("/srv/ws/ceo"));
        assert_eq!(settings.workspace_for("coder"), PathBuf::from("/srv/coder"));
    }

    #[test]
    fn test_entry_agent_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"entry_agent": "ghost", "agents": {"ceo": {}}}"#);
        let err = load_settings_from(&path).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_reserved_names_rejected() {
        for name in ["user", "human", "scheduler"] {
            let mut settings = Settings::default();
            settings.agents.insert(name.to_string(), AgentConfig::default());
            assert!(validate_settings(&settings).is_err(), "{} accepted", name);
        }
    }

    #[test]
    fn test_empty_agents_rejected() {
        let mut settings = Settings::default();
        settings.agents.clear();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_missing_file_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(matches!(load_settings_from(&path), Err(Error::Config(_))));
        assert_eq!(load_settings_or_default(Some(&path)), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings::default();
        save_settings(&settings, &path).unwrap();
        assert_eq!(load_settings_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "{ not json");
        assert!(matches!(load_settings_from(&path), Err(Error::Json(_))));
    }
}
