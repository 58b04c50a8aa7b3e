//! Knowledge base configuration management.

use crate::types::KnowledgeBaseConfig;
use medrag_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Load knowledge base configuration.
///
/// Loads from `.medrag/knowledge/<base>/config.yaml` if it exists,
/// otherwise returns the defaults for the given base name.
pub fn load_config(workspace: &Path, base_name: &str) -> AppResult<KnowledgeBaseConfig> {
    let config_path = get_config_path(workspace, base_name);

    if !config_path.exists() {
        tracing::debug!(
            "Using default knowledge base config for '{}' (no config file found)",
            base_name
        );
        return Ok(KnowledgeBaseConfig {
            name: base_name.to_string(),
            ..Default::default()
        });
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Knowledge(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;

    let mut config: KnowledgeBaseConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Knowledge(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;

    // The directory name is authoritative
    config.name = base_name.to_string();
    validate_config(&config)?;

    tracing::debug!("Loaded knowledge base config for '{}'", base_name);
    Ok(config)
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

fn validate_config(config: &KnowledgeBaseConfig) -> AppResult<()> {
    if config.chunk_size == 0 {
        return Err(AppError::Config(format!(
            "Knowledge base '{}': chunk_size must be positive",
            config.name
        )));
    }
    if config.chunk_overlap >= config.chunk_size {
        return Err(AppError::Config(format!(
            "Knowledge base '{}': chunk_overlap ({}) must be smaller than chunk_size ({})",
            config.name, config.chunk_overlap, config.chunk_size
        )));
    }
    if config.embedding.dimensions == 0 {
        return Err(AppError::Config(format!(
            "Knowledge base '{}': embedding dimensions must be positive",
            config.name
        )));
    }
    Ok(())
}

/// Get the base directory for a knowledge base.
pub fn get_base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace
        .join(".medrag")
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

/// Get the sources JSONL path for a base.
pub fn get_sources_path(workspace: &Path, base_name: &str) -> PathBuf {
    get_base_dir(workspace, base_name).join("sources.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), "who").unwrap();

        assert_eq!(config.name, "who");
        assert_eq!(config.embedding.provider, "trigram");
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.top_k, 10);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let config = KnowledgeBaseConfig {
            name: "my-base".to_string(),
            chunk_size: 300,
            history_turns: 2,
            ..Default::default()
        };

        save_config(temp.path(), &config).unwrap();

        let loaded = load_config(temp.path(), "my-base").unwrap();
        assert_eq!(loaded, config);
        assert!(get_config_path(temp.path(), "my-base").ends_with(".medrag/knowledge/my-base/config.yaml"));
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path(), "bad");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "name: bad\nchunk_size: 100\nchunk_overlap: 100\n").unwrap();

        let result = load_config(temp.path(), "bad");
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
