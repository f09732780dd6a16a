//! Settings file for srcstore

use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default settings file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "srcstore.toml";

/// Default settings as TOML
pub const DEFAULT_CONFIG: &str = r#"# srcstore configuration

[store]
# Store type: RepoStore (one repository) or MultiRepoStore (many repositories)
type = "RepoStore"
# Store root: a directory, or an object storage URL (https://<bucket>.s3.amazonaws.com/<prefix>)
root = ".srclib-store"

[build_data]
# Local build data cache, laid out as <local_dir>/<commit>/...
local_dir = ".srclib-cache"
# Remote build data, laid out as <remote_url>/<repo>/<commit>/...
# remote_url = "https://build-data.s3.amazonaws.com"

[output]
# Colorize the text index report
color = true
"#;

/// srcstore settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub build_data: BuildDataSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(rename = "type", default = "default_store_type")]
    pub store_type: String,
    #[serde(default = "default_store_root")]
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDataSection {
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    #[serde(default)]
    pub remote_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_color")]
    pub color: bool,
}

// Default value functions
fn default_store_type() -> String {
    "RepoStore".to_string()
}
fn default_store_root() -> String {
    ".srclib-store".to_string()
}
fn default_local_dir() -> PathBuf {
    PathBuf::from(".srclib-cache")
}
fn default_color() -> bool {
    true
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            store_type: default_store_type(),
            root: default_store_root(),
        }
    }
}

impl Default for BuildDataSection {
    fn default() -> Self {
        Self {
            local_dir: default_local_dir(),
            remote_url: None,
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            color: default_color(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| StoreError::ConfigParse(e.to_string()))
    }

    /// Load `path` if given, else `srcstore.toml` in `dir` when present, else defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> crate::Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let settings = Settings::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(settings.store.store_type, "RepoStore");
        assert_eq!(settings.store.root, ".srclib-store");
        assert_eq!(settings.build_data.local_dir, PathBuf::from(".srclib-cache"));
        assert!(settings.build_data.remote_url.is_none());
        assert!(settings.output.color);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let settings = Settings::from_toml("[store]\ntype = \"MultiRepoStore\"\n").unwrap();
        assert_eq!(settings.store.store_type, "MultiRepoStore");
        assert_eq!(settings.store.root, ".srclib-store");
        assert!(settings.output.color);
    }

    #[test]
    fn test_bad_toml_is_config_parse_error() {
        let err = Settings::from_toml("[store\n").unwrap_err();
        assert!(matches!(err, StoreError::ConfigParse(_)));
    }

    #[test]
    fn test_discover_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::discover(None, dir.path()).unwrap();
        assert_eq!(settings.store.store_type, "RepoStore");
    }

    #[test]
    fn test_discover_reads_file_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[build_data]\nremote_url = \"https://bd.s3.amazonaws.com\"\n",
        )
        .unwrap();
        let settings = Settings::discover(None, dir.path()).unwrap();
        assert_eq!(
            settings.build_data.remote_url.as_deref(),
            Some("https://bd.s3.amazonaws.com")
        );
    }
}
