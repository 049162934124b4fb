// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runner configuration.

use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the folder holding manual mocks.
pub const DEFAULT_MOCKS_DIR: &str = "__mocks__";

/// Default log filter.
pub const DEFAULT_LOG_FILTER: &str = "modrunner=warn";

/// Configuration for one runner instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Project root. Bare imports from the test entry resolve from here, and
    /// manual mocks for packages and builtins live under `<root>/<mocks_dir>`.
    pub root: PathBuf,

    /// Folder name holding manual mocks
    pub mocks_dir: String,

    /// Whether each suite file gets a fresh module cache
    pub isolate: bool,

    /// Regex patterns; resolved ids matching any of them are loaded as
    /// external modules, bypassing the transformer
    pub external: Vec<String>,

    /// Log filter used when `RUST_LOG` is not set
    pub log: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            mocks_dir: DEFAULT_MOCKS_DIR.to_string(),
            isolate: true,
            external: vec![r"/node_modules/".to_string()],
            log: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RunnerConfig {
    /// Create a configuration rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `MODRUNNER_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_from(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(root) = var("MODRUNNER_ROOT") {
            self.root = PathBuf::from(root);
        }

        if let Some(mocks_dir) = var("MODRUNNER_MOCKS_DIR") {
            self.mocks_dir = mocks_dir;
        }

        if let Some(isolate) = var("MODRUNNER_ISOLATE") {
            self.isolate = !matches!(isolate.as_str(), "0" | "false" | "no");
        }

        if let Some(external) = var("MODRUNNER_EXTERNAL") {
            self.external = external
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(log) = var("MODRUNNER_LOG") {
            self.log = log;
        }
    }

    /// Compile the `external` patterns.
    pub fn external_patterns(&self) -> Result<Vec<Regex>> {
        self.external
            .iter()
            .map(|pattern| Ok(Regex::new(pattern)?))
            .collect()
    }

    /// `<root>/<mocks_dir>`, where manual mocks for packages and builtins live.
    pub fn mocks_root(&self) -> PathBuf {
        self.root.join(&self.mocks_dir)
    }

    /// The importer used for imports made from outside any module: the root
    /// directory, with a trailing separator so hosts treat it as a directory.
    pub fn root_importer(&self) -> String {
        let root = self.root.to_string_lossy().replace('\\', "/");
        if root.ends_with('/') {
            root
        } else {
            format!("{}/", root)
        }
    }
}
