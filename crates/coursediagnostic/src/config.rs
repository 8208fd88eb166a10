//! Service configuration, read from a JSON file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::diagnostic::DiagnosticError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub database_path: String,
    pub address: String,
    pub port: u16,
    /// Seconds between scheduled batch runs; 0 disables the schedule
    pub batch_interval_secs: u64,
    /// Course snapshot imported at startup
    pub import_path: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: "coursediagnostic.db".to_string(),
            address: "127.0.0.1".to_string(),
            port: 8080,
            batch_interval_secs: 3600,
            import_path: None,
        }
    }
}

impl ServiceConfig {
    /// Loads the configuration file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, DiagnosticError> {
        let Some(path) = path else {
            info!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        info!(path = %path.display(), "Loaded service configuration");
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn batch_interval(&self) -> Option<Duration> {
        (self.batch_interval_secs > 0).then(|| Duration::from_secs(self.batch_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{ "port": 9000, "batch_interval_secs": 0 }"#).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.batch_interval(), None);
        assert_eq!(config.database_path, "coursediagnostic.db");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ServiceConfig::load(Some(Path::new("/nonexistent/coursediagnostic.json")))
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(ServiceConfig::load(None).unwrap(), ServiceConfig::default());
    }
}
