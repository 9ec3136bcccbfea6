//! Knowledge base configuration management.
//!
//! Each base lives in `.ragloop/knowledge/<base>/` with a `config.yaml`,
//! the SQLite index and a `stats.json` recording the last learn run.

use crate::types::KnowledgeBaseConfig;
use chrono::{DateTime, Utc};
use ragloop_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Load knowledge base configuration.
///
/// Loads from `.ragloop/knowledge/<base>/config.yaml` if it exists,
/// otherwise returns a default config with the provided base name.
pub fn load_config(workspace: &Path, base_name: &str) -> AppResult<KnowledgeBaseConfig> {
    let config_path = get_config_path(workspace, base_name);

    if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Knowledge(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let mut config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Knowledge(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        // Ensure name matches
        config.name = base_name.to_string();

        tracing::debug!("Loaded knowledge base config for '{}'", base_name);
        Ok(config)
    } else {
        let config = KnowledgeBaseConfig {
            name: base_name.to_string(),
            ..Default::default()
        };

        tracing::debug!(
            "Using default knowledge base config for '{}' (no config file found)",
            base_name
        );
        Ok(config)
    }
}

/// Save knowledge base configuration.
pub fn save_config(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace, &config.name);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Knowledge(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)
        .map_err(|e| AppError::Knowledge(format!("Failed to serialize config: {}", e)))?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Knowledge(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved knowledge base config for '{}'", config.name);
    Ok(())
}

/// Persisted record of the last learn run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnRecord {
    pub last_learn_at: DateTime<Utc>,
}

/// Read `stats.json`, if present.
pub fn load_learn_record(workspace: &Path, base_name: &str) -> Option<LearnRecord> {
    let content = fs::read_to_string(get_stats_path(workspace, base_name)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Write `stats.json`.
pub fn save_learn_record(workspace: &Path, base_name: &str, record: &LearnRecord) -> AppResult<()> {
    let path = get_stats_path(workspace, base_name);
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&path, json).map_err(|e| {
        AppError::Knowledge(format!("Failed to write stats to {:?}: {}", path, e))
    })
}

/// Get the base directory for a knowledge base.
pub fn get_base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace
        .join(".ragloop")
        .join("knowledge")
        .join(base_name)
}

/// Get the path to a base's config file.
pub fn get_config_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("config.yaml")
}

/// Get the SQLite index path for a base.
pub fn get_index_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("index.sqlite")
}

/// Get the stats JSON path for a base.
pub fn get_stats_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("stats.json")
}
