// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::config::Config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSetBuilder};
use walkdir::WalkDir;

/// Blueprint files under `root` matching the configured patterns, sorted.
/// Directories named in `exclude_dirs` are not entered.
pub fn find_blueprints(root: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    let mut builder = GlobSetBuilder::new();
    for pattern in &config.blueprint_patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid pattern '{pattern}'"))?);
    }
    let patterns = builder.build()?;

    let mut found = vec![];
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !config
                    .exclude_dirs
                    .iter()
                    .any(|d| e.file_name().to_str() == Some(d.as_str()))
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if patterns.is_match(relative) {
            tracing::trace!(path = %entry.path().display(), "found blueprint");
            found.push(entry.path().to_path_buf());
        }
    }
    found.sort();
    found.dedup();
    tracing::debug!(root = %root.display(), count = found.len(), "discovery finished");
    Ok(found)
}
