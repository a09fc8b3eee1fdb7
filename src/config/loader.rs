//! Loading a [`Config`] from a file: format dispatch, environment expansion,
//! and name injection.

use crate::config::env::{build_env_table, expand_value};
use crate::config::Config;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Loads a config from `path`. The format is chosen by extension
    /// (`.yaml`/`.yml`, `.toml`, `.json`). `${NAME}` references in any string
    /// field are expanded against a `.env` file alongside `path` (if any)
    /// merged under the process environment, which always wins.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {}: {e}", path.display())))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("yaml")
            .to_ascii_lowercase();

        let raw: serde_json::Value = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Error::Yaml)?,
            "toml" => {
                let value: toml::Value = toml::from_str(&content).map_err(Error::Toml)?;
                serde_json::to_value(value).map_err(Error::Json)?
            }
            "json" => serde_json::from_str(&content).map_err(Error::Json)?,
            other => {
                return Err(Error::Config(format!("unsupported config format: {other}")));
            }
        };

        let dotenv_path = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(".env");
        let env_table = build_env_table(&dotenv_path);
        let expanded = expand_value(raw, &env_table);

        let mut config: Config = serde_json::from_value(expanded).map_err(Error::Json)?;
        for (name, descriptor) in config.servers.iter_mut() {
            descriptor.name = name.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates a config file without keeping the loaded result, used by the
    /// `validate` CLI subcommand.
    pub fn validate_file(path: &Path) -> Result<()> {
        Self::from_file(path).map(|_| ())
    }
}

/// Standard locations searched when no explicit config path is given.
pub fn discover_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("mcp-host.yaml"),
        PathBuf::from("mcp-host.yml"),
        PathBuf::from("mcp-host.toml"),
    ]
}
