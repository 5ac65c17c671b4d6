// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::scheduler::HelperPolicy;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// File looked up in the working directory when no config is given.
pub const DEFAULT_CONFIG_FILE: &str = ".blueprint-lint.yaml";

/// Error type for loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Policy knobs. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Prefix marking private helper variables.
    pub helper_prefix: String,
    /// Helper prefixes excluded from helper-chain detection.
    pub persistent_helper_prefixes: Vec<String>,
    /// Smallest helper chain worth a warning.
    pub min_helper_chain: usize,
    /// Names treated as builtins in addition to the compiled-in vocabulary.
    pub extra_builtins: Vec<String>,
    /// Names known to be non-zero and positive.
    pub nonzero_constants: Vec<String>,
    /// Look for README.md and CHANGELOG.md next to each blueprint.
    pub check_documentation: bool,
    /// File name globs used by discovery.
    pub blueprint_patterns: Vec<String>,
    /// Directory names skipped by discovery.
    pub exclude_dirs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let helpers = HelperPolicy::default();
        Self {
            helper_prefix: helpers.prefix,
            persistent_helper_prefixes: helpers.persistent_prefixes,
            min_helper_chain: helpers.min_chain,
            extra_builtins: vec![],
            nonzero_constants: crate::builtins::NONZERO_CONSTANTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            check_documentation: true,
            blueprint_patterns: ["**/*_pro.yaml", "**/*_pro_blueprint.yaml", "**/blueprint.yaml"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_dirs: [".git", "node_modules", "venv", ".venv", "__pycache__"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Config, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Config::default());
        }
        // A document holding only comments deserializes as null.
        let config: Option<Config> = serde_yaml::from_str(yaml)?;
        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// Load `path` if given, else the default file in `dir` if present, else defaults.
    pub fn load(path: Option<&Path>, dir: &Path) -> Result<Config, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let implicit = dir.join(DEFAULT_CONFIG_FILE);
        match implicit.is_file() {
            true => Self::from_file(implicit),
            false => Ok(Config::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.helper_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                field: "helper_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        if self.min_helper_chain < 2 {
            return Err(ConfigError::Invalid {
                field: "min_helper_chain",
                reason: format!("must be at least 2, got {}", self.min_helper_chain),
            });
        }
        for pattern in &self.blueprint_patterns {
            if let Err(e) = globset::Glob::new(pattern) {
                return Err(ConfigError::Invalid {
                    field: "blueprint_patterns",
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn helper_policy(&self) -> HelperPolicy {
        HelperPolicy {
            prefix: self.helper_prefix.clone(),
            persistent_prefixes: self.persistent_helper_prefixes.clone(),
            min_chain: self.min_helper_chain,
        }
    }

    pub fn nonzero_constant_set(&self) -> BTreeSet<String> {
        self.nonzero_constants.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
        assert_eq!(Config::from_yaml_str("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_override() {
        let c = Config::from_yaml_str("helper_prefix: tmp_\ncheck_documentation: false\n").unwrap();
        assert_eq!(c.helper_prefix, "tmp_");
        assert!(!c.check_documentation);
        assert_eq!(c.min_helper_chain, 2);
        assert!(c.helper_policy().is_helper("tmp_x"));
        assert!(!c.helper_policy().is_helper("_x"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_yaml_str("min_helper_chain: 1\n"),
            Err(ConfigError::Invalid { field: "min_helper_chain", .. })
        ));
        assert!(matches!(
            Config::from_yaml_str("blueprint_patterns: ['a[']\n"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            Config::from_yaml_str("no_such_knob: 1\n"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
