//! Provisioner configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use prov_iac::DEFAULT_AGENT_RESOURCE_TYPE;

use crate::error::{CoreError, CoreResult};

/// Settings shared by every session a provisioner serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Terraform binary, resolved through `PATH` when relative.
    #[serde(default = "default_binary_path")]
    pub binary_path: PathBuf,
    /// Shared provider plugin cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    /// Resource type that defines agents.
    #[serde(default = "default_agent_resource_type")]
    pub agent_resource_type: String,
    /// Capacity of the engine stdout line channel.
    #[serde(default = "default_log_buffer")]
    pub log_buffer: usize,
    /// Agent bootstrap variables exported to plan and apply.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub agent_script_env: BTreeMap<String, String>,
}

fn default_binary_path() -> PathBuf {
    PathBuf::from("terraform")
}

fn default_agent_resource_type() -> String {
    DEFAULT_AGENT_RESOURCE_TYPE.to_string()
}

fn default_log_buffer() -> usize {
    64
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            cache_path: None,
            agent_resource_type: default_agent_resource_type(),
            log_buffer: default_log_buffer(),
            agent_script_env: BTreeMap::new(),
        }
    }
}

impl ProvisionerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a YAML file; missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("read {:?}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> CoreResult<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        if config.log_buffer == 0 {
            return Err(CoreError::Config("log_buffer must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn with_binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = path.into();
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_agent_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.agent_resource_type = resource_type.into();
        self
    }

    pub fn with_log_buffer(mut self, capacity: usize) -> Self {
        self.log_buffer = capacity.max(1);
        self
    }

    pub fn with_agent_script_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.agent_script_env.insert(key.into(), value.into());
        self
    }
}
