//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{BackendConfig, LbConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a configuration file without validating it.
///
/// `.json` files are read as JSON, everything else as TOML.
pub fn parse_config(path: &Path) -> Result<LbConfig, ConfigError> {
    let content = read(path)?;
    let config = if has_json_extension(path) {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };
    Ok(config)
}

/// Load and validate configuration from a TOML or JSON file.
pub fn load_config(path: &Path) -> Result<LbConfig, ConfigError> {
    let config = parse_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load a bare JSON array of backend descriptors (`servers.json`).
///
/// Fields other than `url`/`address` and `weight` are ignored.
pub fn load_backends(path: &Path) -> Result<Vec<BackendConfig>, ConfigError> {
    let content = read(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::PolicyKind;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("lb-proxy-{}-{}", std::process::id(), name));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_backends_servers_json() {
        let path = write_temp(
            "servers.json",
            r#"[
                {"url": "http://localhost:8081", "weight": 3, "active_conns": 0, "response_time": 0},
                {"url": "http://localhost:8082", "weight": 1}
            ]"#,
        );
        let backends = load_backends(&path).unwrap();
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].address, "http://localhost:8081");
        assert_eq!(backends[0].weight, 3);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_config_toml() {
        let path = write_temp(
            "lb.toml",
            r#"
            algorithm = "dynamic2"
            [listener]
            bind_address = "127.0.0.1:3000"
            [[backends]]
            address = "127.0.0.1:8081"
            "#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.algorithm, PolicyKind::DynamicWeighted2);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_config_json() {
        let path = write_temp(
            "lb.json",
            r#"{"algorithm": "random", "backends": [{"address": "127.0.0.1:8081"}]}"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.algorithm, PolicyKind::Random);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_config_reports_validation() {
        let path = write_temp("empty.toml", "algorithm = \"leastconn\"\n");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(err.to_string(), "Validation failed: backend pool is empty");
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/lb.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
