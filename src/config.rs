//! meshspec project configuration
//!
//! Loaded from `.meshspec.yaml` at the project root:
//!
//! ```yaml
//! version: 1
//! project:
//!   name: shop
//! validation:
//!   strict: false
//!   infer_references: true
//!   max_formula_depth: 64
//! ```

use crate::error::{Error, Result};
use crate::formula::DEFAULT_MAX_DEPTH;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file name
pub const CONFIG_FILE: &str = ".meshspec.yaml";

/// Root project configuration (`.meshspec.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MeshConfig {
    /// Schema version for migrations
    pub version: u32,

    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            version: 1,
            project: ProjectConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

/// Project-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: String,
}

/// Validation and graph settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidationConfig {
    /// Promote warnings to errors
    #[serde(default)]
    pub strict: bool,

    /// Resolve references by naming convention when nothing is declared
    #[serde(default = "default_true")]
    pub infer_references: bool,

    /// Formula nesting limit
    #[serde(default = "default_max_formula_depth")]
    pub max_formula_depth: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_formula_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            infer_references: true,
            max_formula_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl MeshConfig {
    /// Load `.meshspec.yaml` from a directory
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let file = dir.join(CONFIG_FILE);
        if !file.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&file).map_err(Error::Io)?;
        let config: MeshConfig = serde_norway::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", CONFIG_FILE, e)))?;

        if config.version != 1 {
            return Err(Error::Config(format!(
                "Unsupported {} version: {}",
                CONFIG_FILE, config.version
            )));
        }
        if config.validation.max_formula_depth == 0 {
            return Err(Error::Config(
                "validation.max_formula_depth must be at least 1".into(),
            ));
        }

        tracing::debug!(path = %file.display(), "loaded config");
        Ok(Some(config))
    }

    /// Search `start` and its ancestors for a config file
    pub fn find_and_load(start: &Path) -> Result<Option<(PathBuf, Self)>> {
        for dir in start.ancestors() {
            if let Some(config) = Self::load_from_dir(dir)? {
                return Ok(Some((dir.to_path_buf(), config)));
            }
        }
        Ok(None)
    }
}
