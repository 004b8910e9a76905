// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layout of a configuration backup directory.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Sub-directories of a configuration root, one per entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub root: PathBuf,
    pub dashboards: PathBuf,
    pub rules: PathBuf,
    pub profiles: PathBuf,
    pub assets: PathBuf,
    pub customers: PathBuf,
    pub tenants: PathBuf,
    pub relations: PathBuf,
    pub widgets: PathBuf,
    pub devices: PathBuf,
    pub bundles: PathBuf,
}

impl ConfigPaths {
    /// Derives the layout below `root`.
    ///
    /// Sub-directories are not required to exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotADirectory`] if `root` is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ConfigError::NotADirectory(root).into());
        }

        Ok(Self {
            dashboards: root.join("dashboards"),
            rules: root.join("rules"),
            profiles: root.join("profiles"),
            assets: root.join("assets"),
            customers: root.join("customers"),
            tenants: root.join("tenants"),
            relations: root.join("relations"),
            widgets: root.join("widgets"),
            devices: root.join("devices"),
            bundles: root.join("bundles"),
            root,
        })
    }
}

/// Copies `input` to `output`, replacing every placeholder on every line.
///
/// Replacements are applied in the given order, so a later pair sees the
/// result of an earlier one.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if a file cannot be read or written.
pub fn substitute_vars<K, V>(input: &Path, output: &Path, params: &[(K, V)]) -> Result<()>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let reader = BufReader::new(fs::File::open(input)?);
    let mut writer = BufWriter::new(fs::File::create(output)?);

    for line in reader.lines() {
        let line = params.iter().fold(line?, |acc, (placeholder, value)| {
            acc.replace(placeholder.as_ref(), value.as_ref())
        });
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;

    tracing::debug!(
        input = %input.display(),
        output = %output.display(),
        params = params.len(),
        "Substituted variables"
    );
    Ok(())
}
