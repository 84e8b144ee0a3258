// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Manager configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! num_workers = 4
//! device_memory = "512M"
//! backend = "interpreter"
//! max_pending_requests = 256
//! trace_by_default = false
//! ```

use crate::backend::{Backend, InterpreterBackend};
use crate::{ConfigError, SchedulerConfig};
use memory_manager::MemoryBudget;
use std::path::Path;
use std::sync::Arc;

/// Configuration for an [`crate::ExecutionManager`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Worker threads (defaults to the number of online CPU cores).
    pub num_workers: Option<usize>,
    /// Device memory budget (human-readable, e.g. `"512M"` or `"unlimited"`).
    pub device_memory: String,
    /// Backend name: `"interpreter"`.
    pub backend: String,
    /// Queue bound; requests beyond it complete with `QueueFull`.
    pub max_pending_requests: Option<usize>,
    /// Collect traces for every request.
    pub trace_by_default: bool,
}

impl ManagerConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parses the device memory string into a [`MemoryBudget`].
    pub fn parse_budget(&self) -> Result<MemoryBudget, ConfigError> {
        MemoryBudget::parse(&self.device_memory)
            .map_err(|e| ConfigError::Invalid(format!("device_memory: {e}")))
    }

    /// Resolves the number of worker threads.
    pub fn resolve_workers(&self) -> usize {
        self.num_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Creates the backend named by this config.
    pub fn create_backend(&self) -> Result<Arc<dyn Backend>, ConfigError> {
        match self.backend.to_lowercase().as_str() {
            "interpreter" | "reference" => Ok(Arc::new(InterpreterBackend::new())),
            other => Err(ConfigError::Invalid(format!(
                "unknown backend '{other}'; expected 'interpreter'"
            ))),
        }
    }

    /// Checks values that parse but make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == Some(0) {
            return Err(ConfigError::Invalid("num_workers must be at least 1".into()));
        }
        if self.max_pending_requests == Some(0) {
            return Err(ConfigError::Invalid(
                "max_pending_requests must be at least 1".into(),
            ));
        }
        self.parse_budget()?;
        Ok(())
    }

    pub(crate) fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            num_workers: self.resolve_workers(),
            max_pending_requests: self.max_pending_requests,
            trace_by_default: self.trace_by_default,
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            num_workers: None,
            device_memory: "512M".to_string(),
            backend: "interpreter".to_string(),
            max_pending_requests: None,
            trace_by_default: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = ManagerConfig::default();
        assert_eq!(c.device_memory, "512M");
        assert_eq!(c.backend, "interpreter");
        assert!(!c.trace_by_default);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_parse_budget() {
        let c = ManagerConfig {
            device_memory: "256M".into(),
            ..Default::default()
        };
        assert_eq!(c.parse_budget().unwrap().as_mb(), 256);

        let bad = ManagerConfig {
            device_memory: "lots".into(),
            ..Default::default()
        };
        assert!(matches!(bad.parse_budget(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
num_workers = 2
device_memory = "1G"
max_pending_requests = 8
trace_by_default = true
"#;
        let c = ManagerConfig::from_toml(toml).unwrap();
        assert_eq!(c.num_workers, Some(2));
        assert_eq!(c.device_memory, "1G");
        assert_eq!(c.backend, "interpreter");
        assert_eq!(c.max_pending_requests, Some(8));
        assert!(c.trace_by_default);
    }

    #[test]
    fn test_demo_config() {
        let c = ManagerConfig::from_toml(include_str!("../../../demos/manager.toml")).unwrap();
        assert_eq!(c.num_workers, Some(2));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(matches!(
            ManagerConfig::from_toml("num_workers = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = ManagerConfig {
            num_workers: Some(3),
            max_pending_requests: Some(10),
            ..Default::default()
        };
        let back = ManagerConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_create_backend() {
        assert_eq!(ManagerConfig::default().create_backend().unwrap().name(), "interpreter");
        let c = ManagerConfig {
            backend: "cuda".into(),
            ..Default::default()
        };
        assert!(c.create_backend().is_err());
    }

    #[test]
    fn test_validate_zero_values() {
        let c = ManagerConfig {
            num_workers: Some(0),
            ..Default::default()
        };
        assert!(c.validate().is_err());
        let c = ManagerConfig {
            max_pending_requests: Some(0),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_resolve_workers() {
        let c = ManagerConfig {
            num_workers: Some(8),
            ..Default::default()
        };
        assert_eq!(c.resolve_workers(), 8);
        assert!(ManagerConfig::default().resolve_workers() >= 1);
    }

    #[test]
    fn test_from_missing_file() {
        let path = std::env::temp_dir().join("graph_host_no_such_config.toml");
        assert!(matches!(
            ManagerConfig::from_file(&path),
            Err(ConfigError::Read { .. })
        ));
    }
}
