// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{ConfigError, Result};

/// Reads one JSON document.
///
/// # Errors
///
/// Returns [`ConfigError::MissingFile`] if the file does not exist, or a
/// parse error for invalid JSON.
pub fn read_node(path: &Path) -> Result<Value> {
    tracing::info!(path = %path.display(), "Loading entity definition");
    if !path.is_file() {
        return Err(ConfigError::MissingFile(path.to_path_buf()).into());
    }
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Lists the `*.json` files of a directory, sorted by path.
///
/// # Errors
///
/// Returns [`ConfigError::NotADirectory`] if `dir` is not a directory.
pub fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConfigError::NotADirectory(dir.to_path_buf()).into());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
