use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;
use vowplan_engine::OutboxConfig;
use vowplan_llm::{GenerateOptions, GenerationConfig};

const IDENTITY_FILE: &str = "identity";

/// Everything a command needs to open a session.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub user: String,
    pub generation: GenerationConfig,
    pub outbox: OutboxConfig,
    pub generate: GenerateOptions,
}

impl AppConfig {
    pub fn load(data_dir: PathBuf, user: Option<String>, repair_attempts: usize) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data dir: {}", data_dir.display()))?;
        let user = match user.filter(|u| !u.trim().is_empty()) {
            Some(user) => user,
            None => anonymous_identity(&data_dir)?,
        };
        Ok(Self {
            data_dir,
            user,
            generation: GenerationConfig::from_env(),
            outbox: OutboxConfig::default(),
            generate: GenerateOptions::with_repair(repair_attempts),
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}

/// Default data directory: `./vowplan-data` next to where the tool runs.
pub fn default_data_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("vowplan-data")
}

/// The identity this installation signs in with when no user is given.
/// Created on first use and reused afterwards.
fn anonymous_identity(data_dir: &Path) -> Result<String> {
    let path = data_dir.join(IDENTITY_FILE);
    if path.exists() {
        let id = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read identity: {}", path.display()))?;
        let id = id.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }
    let id = Uuid::new_v4().to_string();
    std::fs::write(&path, &id)
        .with_context(|| format!("Failed to write identity: {}", path.display()))?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_identity_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let first = AppConfig::load(dir.path().to_path_buf(), None, 0).unwrap();
        let second = AppConfig::load(dir.path().to_path_buf(), None, 0).unwrap();
        assert_eq!(first.user, second.user);
        assert!(Uuid::parse_str(&first.user).is_ok());
    }

    #[test]
    fn explicit_user_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().to_path_buf(), Some("ada".to_string()), 1).unwrap();
        assert_eq!(config.user, "ada");
        assert_eq!(config.generate.repair_attempts, 1);
        assert!(!dir.path().join(IDENTITY_FILE).exists());
    }
}
