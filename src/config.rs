//! Service configuration
//!
//! Resource tiers for ephemeral executions and persistent sandboxes,
//! plus workspace and timeout settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root directory under which per-execution workspaces are created
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Default timeout for ephemeral executions (seconds)
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,
    /// Timeout for dependency installs inside persistent sandboxes (seconds)
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,
    /// Maximum captured bytes per output stream
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
    /// Resource limits for ephemeral executions
    #[serde(default = "ResourceLimits::ephemeral")]
    pub ephemeral: ResourceLimits,
    /// Resource limits for persistent sandboxes
    #[serde(default = "ResourceLimits::persistent")]
    pub persistent: ResourceLimits,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            workspace_root: default_workspace_root(),
            default_timeout_secs: default_timeout(),
            install_timeout_secs: default_install_timeout(),
            max_output_bytes: default_max_output(),
            ephemeral: ResourceLimits::ephemeral(),
            persistent: ResourceLimits::persistent(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from an optional file plus `CODEBOX_`-prefixed
    /// environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("CODEBOX").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

fn default_workspace_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".codebox").join("workspaces"))
        .unwrap_or_else(|| PathBuf::from("./workspaces"))
}

fn default_timeout() -> u64 {
    30
}

fn default_install_timeout() -> u64 {
    300
}

fn default_max_output() -> usize {
    1024 * 1024 // 1MB
}

/// Resource limits applied to an isolated execution context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit (e.g. "512m", "1g")
    pub memory_limit: String,
    /// CPU limit (number of CPUs)
    pub cpu_limit: f64,
    /// Whether the context gets a network namespace
    pub network_enabled: bool,
    /// Run as an unprivileged user inside the context
    pub unprivileged: bool,
}

impl ResourceLimits {
    /// Defaults for one-shot executions: tight caps, no network
    pub fn ephemeral() -> Self {
        ResourceLimits {
            memory_limit: "512m".to_string(),
            cpu_limit: 1.0,
            network_enabled: false,
            unprivileged: true,
        }
    }

    /// Defaults for persistent sandboxes: looser caps, isolated network
    pub fn persistent() -> Self {
        ResourceLimits {
            memory_limit: "1g".to_string(),
            cpu_limit: 2.0,
            network_enabled: true,
            unprivileged: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.ephemeral.memory_limit, "512m");
        assert_eq!(config.ephemeral.cpu_limit, 1.0);
        assert!(!config.ephemeral.network_enabled);
        assert_eq!(config.persistent.memory_limit, "1g");
        assert_eq!(config.persistent.cpu_limit, 2.0);
        assert!(config.persistent.network_enabled);
    }

    #[test]
    fn test_load_without_file() {
        let config = ServiceConfig::load(None).unwrap();
        assert_eq!(config.max_output_bytes, 1024 * 1024);
    }
}
