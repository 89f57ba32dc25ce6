use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendKind, DeviceConfig, SimulatorConfig};
use crate::orchestrator::ExecutionConfig;

/// Top-level settings. Every section falls back to its defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub simulator: SimulatorConfig,
    pub device: DeviceConfig,
    pub execution: ExecutionConfig,
}

impl AppConfig {
    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid configuration")
    }

    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.backend, BackendKind::Simulator);
        assert_eq!(config.execution.soft_min, -500.0);
        assert_eq!(config.execution.params.velocity, 80.0);
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::from_json_str(
            r#"{
                "backend": "device",
                "simulator": { "tick_ms": 2 },
                "execution": { "params": { "velocity": 120.0 }, "soft_max": 250.0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Device);
        assert_eq!(config.simulator.tick_ms, 2);
        assert_eq!(config.simulator.home_ms, SimulatorConfig::default().home_ms);
        assert_eq!(config.execution.params.velocity, 120.0);
        assert_eq!(config.execution.params.acceleration, 200.0);
        assert_eq!(config.execution.soft_max, 250.0);
        assert_eq!(config.execution.soft_min, -500.0);
    }

    #[test]
    fn test_malformed_document() {
        assert!(AppConfig::from_json_str("{ backend: ").is_err());
        assert!(AppConfig::from_json_str(r#"{ "backend": "stepper" }"#).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "execution": {{ "axis": 0, "jog_velocity": 4.5 }} }}"#).unwrap();

        let config = AppConfig::load(file.path()).await.unwrap();
        assert_eq!(config.execution.jog_velocity, 4.5);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
