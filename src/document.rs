// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::lexer::Source;
use crate::value::Value;

use std::path::{Path, PathBuf};

/// Error type for loading a blueprint document.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("Failed to load file: {0}")]
    Io(#[from] std::io::Error),
    /// The text is not valid YAML.
    #[error("YAML syntax error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The document is too large to index by line.
    #[error("{0}")]
    Source(String),
    #[error("Root must be a dictionary")]
    RootNotMapping,
}

/// A parsed blueprint along with its raw text.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: Source,
    pub root: Value,
    // Set when loaded from disk; documentation checks look next to it.
    pub path: Option<PathBuf>,
}

impl Document {
    pub fn from_contents(name: &str, contents: String) -> Result<Document, LoadError> {
        let source = Source::from_contents(name.to_string(), contents)
            .map_err(|e| LoadError::Source(e.to_string()))?;
        let yaml: serde_yaml::Value = serde_yaml::from_str(source.contents())?;
        let root = Value::from(yaml);
        if root.as_object().is_err() {
            return Err(LoadError::RootNotMapping);
        }
        Ok(Document {
            source,
            root,
            path: None,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Document, LoadError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut doc = Self::from_contents(&path.to_string_lossy(), contents)?;
        doc.path = Some(path.to_path_buf());
        Ok(doc)
    }

    pub fn name(&self) -> &str {
        self.source.file()
    }
}
