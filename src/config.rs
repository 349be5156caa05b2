use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VitalisError};

pub const DEFAULT_DATA_DIR: &str = "data/apple_health_export/csv_output";
pub const DEFAULT_DATABASE: &str = "db/vitalis.db";

/// Contents of `vitalis.toml`. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct VitalisConfig {
    pub data_dir: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub include_tags: Option<Vec<String>>,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("vitalis.toml")
}

/// Load the config at `path`, or at the default location when `path` is
/// `None`. A missing default file is not an error; a missing explicit one is.
pub fn load_config(path: Option<&Path>) -> Result<VitalisConfig> {
    let explicit = path.is_some();
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        if explicit {
            return Err(VitalisError::NotFound(format!(
                "config file '{}' does not exist",
                path.display()
            )));
        }
        return Ok(VitalisConfig::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    toml::from_str(&contents)
        .map_err(|e| VitalisError::Parse(format!("{}: {}", path.display(), e)))
}

/// Resolved settings: CLI flag, then config file, then built-in default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub include_tags: Option<Vec<String>>,
}

impl Settings {
    pub fn resolve(
        config: VitalisConfig,
        data_dir: Option<PathBuf>,
        database: Option<PathBuf>,
    ) -> Self {
        Self {
            data_dir: data_dir
                .or(config.data_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            database: database
                .or(config.database)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            include_tags: config.include_tags,
        }
    }

    /// Tags given on the command line replace the configured list.
    pub fn tags_or(&self, cli_tags: Vec<String>) -> Option<Vec<String>> {
        if cli_tags.is_empty() {
            self.include_tags.clone()
        } else {
            Some(cli_tags)
        }
    }
}

pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
