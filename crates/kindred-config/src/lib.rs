//! Configuration management for kindred
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (KINDRED_* prefix, `__` between keys)
//! 2. kindred.local.toml (gitignored, local overrides)
//! 3. kindred.toml (git-tracked, project config)
//! 4. ~/.config/kindred/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use kindred_types::DiscoveryMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Highest kubeadm `--v` level worth passing through.
const MAX_VERBOSITY: u8 = 10;

/// Main kindred configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KindredConfig {
    pub cluster: ClusterSection,
    pub join: JoinSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Cluster name; node agents are tagged with it.
    pub name: String,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            name: "kind".to_string(),
        }
    }
}

/// Defaults for the join workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinSection {
    /// Run `kubeadm join` as separate phases instead of one command.
    pub use_phases: bool,
    /// Let kubeadm distribute control-plane certificates itself.
    pub automatic_copy_certs: bool,
    pub discovery: DiscoveryMode,
    /// Readiness deadline per node; 0 means don't wait.
    pub wait_seconds: u64,
    pub poll_interval_ms: u64,
    /// kubeadm `--v` level.
    pub verbosity: u8,
    /// Manifest overlay directory staged on joining control planes.
    pub kustomize_dir: Option<PathBuf>,
    /// Patch directory staged on joining control planes.
    pub patches_dir: Option<PathBuf>,
}

impl Default for JoinSection {
    fn default() -> Self {
        Self {
            use_phases: false,
            automatic_copy_certs: false,
            discovery: DiscoveryMode::Token,
            wait_seconds: 0,
            poll_interval_ms: 1000,
            verbosity: 0,
            kustomize_dir: None,
            patches_dir: None,
        }
    }
}

impl JoinSection {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl KindredConfig {
    /// Checks values the type system can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "cluster.name must not be empty".to_string(),
            ));
        }
        if self.cluster.name.contains(':') || self.cluster.name.starts_with('@') {
            return Err(ConfigError::ValidationError(format!(
                "cluster.name {:?} collides with node selector syntax",
                self.cluster.name
            )));
        }
        if self.join.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "join.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.join.verbosity > MAX_VERBOSITY {
            return Err(ConfigError::ValidationError(format!(
                "join.verbosity must be at most {MAX_VERBOSITY}, got {}",
                self.join.verbosity
            )));
        }
        Ok(())
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        for dir in [&mut self.join.kustomize_dir, &mut self.join.patches_dir]
            .into_iter()
            .flatten()
        {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    /// Writes this configuration as the project file (`kindred.toml`).
    pub fn write_project_file(
        &self,
        project_dir: impl AsRef<Path>,
    ) -> Result<PathBuf, ConfigError> {
        let path = Paths::project_config_file(project_dir);
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(&path, content).map_err(|source| ConfigError::WriteError {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KindredConfig::default();
        assert_eq!(config.cluster.name, "kind");
        assert!(!config.join.use_phases);
        assert_eq!(config.join.discovery, DiscoveryMode::Token);
        assert_eq!(config.join.wait(), Duration::ZERO);
        assert_eq!(config.join.poll_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_selector_like_name() {
        let mut config = KindredConfig::default();
        config.cluster.name = "@all".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_poll_interval() {
        let mut config = KindredConfig::default();
        config.join.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_excessive_verbosity() {
        let mut config = KindredConfig::default();
        config.join.verbosity = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_path_resolution() {
        let mut config = KindredConfig::default();
        config.join.kustomize_dir = Some(PathBuf::from("overlays"));
        config.join.patches_dir = Some(PathBuf::from("/abs/patches"));
        config.resolve_paths("/home/user/project");

        assert_eq!(
            config.join.kustomize_dir,
            Some(PathBuf::from("/home/user/project/overlays"))
        );
        assert_eq!(config.join.patches_dir, Some(PathBuf::from("/abs/patches")));
    }
}
