//! Path utilities and XDG directory discovery

use crate::ConfigError;
use directories::{BaseDirs, ProjectDirs};
use std::path::{Path, PathBuf};

/// XDG-compliant paths for kindred
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
    base_dirs: Option<BaseDirs>,
}

impl Paths {
    /// Create a new Paths instance with XDG discovery
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("io", "kindred", "kindred"),
            base_dirs: BaseDirs::new(),
        }
    }

    /// Get user config directory (~/.config/kindred/)
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| {
                ConfigError::XdgError("Failed to determine user config directory".to_string())
            })
    }

    /// Get user config file path (~/.config/kindred/config.toml)
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    /// Kubeconfig written for a cluster (~/.kube/kind-config-<cluster>).
    ///
    /// The file name matches the one kind uses so kubectl tooling finds it.
    pub fn kubeconfig_path(&self, cluster: &str) -> Result<PathBuf, ConfigError> {
        self.base_dirs
            .as_ref()
            .map(|b| Self::kubeconfig_path_in(b.home_dir(), cluster))
            .ok_or_else(|| ConfigError::XdgError("Failed to determine home directory".to_string()))
    }

    /// Kubeconfig path for a cluster relative to an explicit home directory.
    pub fn kubeconfig_path_in(home: impl AsRef<Path>, cluster: &str) -> PathBuf {
        home.as_ref()
            .join(".kube")
            .join(format!("kind-config-{cluster}"))
    }

    /// Get project config file path (kindred.toml)
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("kindred.toml")
    }

    /// Get local config file path (kindred.local.toml, gitignored)
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("kindred.local.toml")
    }

    /// Check if a project is initialized (has kindred.toml)
    pub fn is_initialized(project_dir: impl AsRef<Path>) -> bool {
        Self::project_config_file(project_dir).exists()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
