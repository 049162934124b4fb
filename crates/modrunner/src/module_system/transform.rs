// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Source fetching
//!
//! The runner never compiles anything itself. A [`Transformer`] hands back
//! already-transformed code for a module id, plus its source map and format.

use crate::error::{Result, RunnerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::trace;

/// Module format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// ECMAScript module (import/export)
    Esm,
    /// CommonJS module (require/module.exports)
    #[default]
    Cjs,
}

impl ModuleFormat {
    /// Detect the format from a file extension, if it decides it
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("mjs" | "mts") => Some(ModuleFormat::Esm),
            Some("cjs" | "cts") => Some(ModuleFormat::Cjs),
            _ => None,
        }
    }

    /// Detect the format from a package.json "type" field
    pub fn from_package_type(type_field: Option<&str>) -> Self {
        match type_field {
            Some("module") => ModuleFormat::Esm,
            _ => ModuleFormat::Cjs,
        }
    }
}

/// Transformed source for one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    /// Executable code
    pub code: String,
    /// Source map, if the transform produced one
    #[serde(default)]
    pub map: Option<String>,
    /// How the code expects to be linked
    #[serde(default)]
    pub format: ModuleFormat,
}

impl TransformResult {
    /// An ES module with no source map
    pub fn esm(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
            format: ModuleFormat::Esm,
        }
    }

    /// A CommonJS module with no source map
    pub fn cjs(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
            format: ModuleFormat::Cjs,
        }
    }
}

/// Produces executable code for a resolved module id.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Fetch transformed code for `id`
    async fn fetch(&self, id: &str) -> Result<TransformResult>;
}

/// Passthrough transformer reading modules straight from disk.
///
/// The format comes from the extension, then the nearest package.json
/// "type" field, defaulting to CommonJS.
#[derive(Debug, Default)]
pub struct FsTransformer;

impl FsTransformer {
    /// Create a new passthrough transformer
    pub fn new() -> Self {
        Self
    }

    /// Determine module format for a file
    pub async fn module_format(path: &Path) -> ModuleFormat {
        if let Some(format) = ModuleFormat::from_path(path) {
            return format;
        }

        let mut current = path.parent();
        while let Some(dir) = current {
            if let Ok(content) = tokio::fs::read_to_string(dir.join("package.json")).await {
                if let Ok(pkg) = serde_json::from_str::<PackageJson>(&content) {
                    return ModuleFormat::from_package_type(pkg.type_field.as_deref());
                }
            }
            current = dir.parent();
        }

        ModuleFormat::Cjs
    }
}

#[async_trait]
impl Transformer for FsTransformer {
    async fn fetch(&self, id: &str) -> Result<TransformResult> {
        let path = Path::new(id);
        let code = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| RunnerError::transform(id, err))?;
        let format = Self::module_format(path).await;

        trace!(id, ?format, bytes = code.len(), "fetched source");
        Ok(TransformResult {
            code,
            map: None,
            format,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(rename = "type")]
    type_field: Option<String>,
}
