// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module resolution
//!
//! [`ModuleResolver`] asks a [`ResolverHost`] where a specifier points,
//! canonicalizes the answer and remembers it per `(specifier, importer)`.
//! [`FsResolverHost`] is a host implementing the Node.js algorithm against
//! the local filesystem.

use super::id::{builtin_id, canonicalize_id, is_builtin};
use crate::error::{Result, RunnerError};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// A resolved module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedId {
    /// Canonical module id
    pub id: String,
    /// Whether the module bypasses the transformer
    #[serde(default)]
    pub external: bool,
}

impl ResolvedId {
    /// A non-external module
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }

    /// An external module
    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
        }
    }
}

/// Answers "which module does `specifier` mean when imported from `importer`".
#[async_trait]
pub trait ResolverHost: Send + Sync {
    /// Resolve a specifier, or `Ok(None)` if nothing matches.
    async fn resolve_id(&self, specifier: &str, importer: &str) -> Result<Option<ResolvedId>>;
}

type SharedResolution = Shared<BoxFuture<'static, Result<ResolvedId>>>;

/// Caching, coalescing front end over a [`ResolverHost`].
pub struct ModuleResolver {
    host: Arc<dyn ResolverHost>,
    external: Arc<[Regex]>,
    resolutions: DashMap<(String, String), SharedResolution>,
}

impl ModuleResolver {
    /// Create a resolver over `host`. Ids matching any `external` pattern are
    /// flagged external.
    pub fn new(host: Arc<dyn ResolverHost>, external: Vec<Regex>) -> Self {
        Self {
            host,
            external: external.into(),
            resolutions: DashMap::new(),
        }
    }

    /// Resolve `specifier` as imported from `importer`.
    ///
    /// Concurrent calls with the same pair share one host request. Failed
    /// resolutions are not remembered.
    pub async fn resolve(&self, specifier: &str, importer: &str) -> Result<ResolvedId> {
        let key = (specifier.to_string(), importer.to_string());

        let shared = match self.resolutions.entry(key.clone()) {
            Entry::Occupied(entry) => {
                trace!(specifier, importer, "resolution cache hit");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let job = resolve_uncached(
                    Arc::clone(&self.host),
                    Arc::clone(&self.external),
                    key.0.clone(),
                    key.1.clone(),
                )
                .boxed()
                .shared();
                entry.insert(job.clone());
                job
            }
        };

        let result = shared.clone().await;
        if result.is_err() {
            self.resolutions.remove_if(&key, |_, job| job.ptr_eq(&shared));
        }
        result
    }

    /// Forget every remembered resolution.
    pub fn clear(&self) {
        self.resolutions.clear();
    }

    /// Forget resolutions that landed on any of `ids`.
    pub fn forget(&self, ids: &HashSet<String>) {
        self.resolutions.retain(|_, job| match job.peek() {
            Some(Ok(resolved)) => !ids.contains(&resolved.id),
            _ => true,
        });
    }

    /// Number of remembered resolutions.
    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    /// Returns true if nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }

    /// Returns true if `id` matches a configured external pattern.
    pub fn is_external(&self, id: &str) -> bool {
        self.external.iter().any(|pattern| pattern.is_match(id))
    }
}

async fn resolve_uncached(
    host: Arc<dyn ResolverHost>,
    external: Arc<[Regex]>,
    specifier: String,
    importer: String,
) -> Result<ResolvedId> {
    let resolved = match host.resolve_id(&specifier, &importer).await? {
        Some(resolved) => {
            let id = canonicalize_id(&resolved.id);
            let external = resolved.external
                || is_builtin(&id)
                || external.iter().any(|pattern| pattern.is_match(&id));
            ResolvedId { id, external }
        }
        None => match builtin_id(&specifier) {
            Some(id) => ResolvedId::external(id),
            None => return Err(RunnerError::resolution(specifier, importer)),
        },
    };

    debug!(specifier = %specifier, importer = %importer, id = %resolved.id, external = resolved.external, "resolved");
    Ok(resolved)
}

/// Resolves against the local filesystem the way Node.js does.
///
/// Lookups stat the disk and run on the blocking pool.
#[derive(Debug, Clone)]
pub struct FsResolverHost {
    /// File extensions to try
    extensions: Vec<String>,
}

impl FsResolverHost {
    /// Create a new filesystem resolver
    pub fn new() -> Self {
        Self {
            extensions: [".js", ".mjs", ".cjs", ".ts", ".mts", ".cts", ".tsx", ".jsx", ".json", ".node"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }

    /// Resolve synchronously; `None` if nothing on disk matches.
    pub fn resolve_path(&self, specifier: &str, importer: &str) -> Option<PathBuf> {
        let base = importer_dir(importer);

        if specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier.starts_with('/')
            || (cfg!(windows) && specifier.chars().nth(1) == Some(':'))
        {
            return self.resolve_file(&base.join(specifier));
        }

        self.resolve_node_modules(specifier, &base)
    }

    /// Resolve a file path, probing extensions and directory entry points
    fn resolve_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(normalize(path));
        }

        if let Some(found) = self.probe_extensions(path) {
            return Some(found);
        }

        if path.is_dir() {
            return self.resolve_directory(path);
        }

        None
    }

    fn probe_extensions(&self, path: &Path) -> Option<PathBuf> {
        let filename = path.file_name()?.to_string_lossy().to_string();
        self.extensions.iter().find_map(|ext| {
            let candidate = path.with_file_name(format!("{}{}", filename, ext));
            candidate.is_file().then(|| normalize(&candidate))
        })
    }

    /// Resolve a directory (look for package.json main or index.*)
    fn resolve_directory(&self, dir: &Path) -> Option<PathBuf> {
        let main = std::fs::read_to_string(dir.join("package.json"))
            .ok()
            .and_then(|content| serde_json::from_str::<PackageJson>(&content).ok())
            .and_then(|pkg| pkg.main);

        if let Some(main) = main {
            let main_path = dir.join(main);
            if main_path.is_file() {
                return Some(normalize(&main_path));
            }
            if let Some(found) = self.probe_extensions(&main_path) {
                return Some(found);
            }
        }

        self.probe_extensions(&dir.join("index"))
    }

    /// Resolve a package by walking up through node_modules folders
    fn resolve_node_modules(&self, specifier: &str, base: &Path) -> Option<PathBuf> {
        let (package_name, subpath) = parse_package_specifier(specifier);

        let mut current = Some(base);
        while let Some(dir) = current {
            let package_dir = dir.join("node_modules").join(package_name);

            if package_dir.exists() {
                return match subpath {
                    Some(sub) => self.resolve_file(&package_dir.join(sub)),
                    None => self.resolve_directory(&package_dir),
                };
            }

            current = dir.parent();
        }

        None
    }
}

impl Default for FsResolverHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolverHost for FsResolverHost {
    async fn resolve_id(&self, specifier: &str, importer: &str) -> Result<Option<ResolvedId>> {
        if let Some(id) = builtin_id(specifier) {
            return Ok(Some(ResolvedId::external(id)));
        }

        let host = self.clone();
        let (specifier, importer) = (specifier.to_string(), importer.to_string());
        let found = tokio::task::spawn_blocking(move || host.resolve_path(&specifier, &importer))
            .await
            .map_err(|err| RunnerError::Io(format!("resolver task failed: {err}")))?;

        Ok(found.map(|path| {
            let id = path.to_string_lossy().replace('\\', "/");
            let external = id.contains("/node_modules/");
            ResolvedId { id, external }
        }))
    }
}

/// The directory relative specifiers resolve against. An importer ending in
/// a separator is itself a directory.
fn importer_dir(importer: &str) -> PathBuf {
    if importer.ends_with('/') || importer.ends_with('\\') {
        return PathBuf::from(importer);
    }
    Path::new(importer)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Split a package specifier into name and optional subpath
fn parse_package_specifier(specifier: &str) -> (&str, Option<&str>) {
    if let Some(scoped) = specifier.strip_prefix('@') {
        // @scope/name or @scope/name/subpath
        if let Some(slash_pos) = scoped.find('/') {
            let after_scope = &specifier[slash_pos + 2..];
            if let Some(subpath_pos) = after_scope.find('/') {
                let name_end = slash_pos + 2 + subpath_pos;
                return (&specifier[..name_end], Some(&specifier[name_end + 1..]));
            }
        }
        (specifier, None)
    } else if let Some(slash_pos) = specifier.find('/') {
        (&specifier[..slash_pos], Some(&specifier[slash_pos + 1..]))
    } else {
        (specifier, None)
    }
}

/// Minimal package.json structure for resolution
#[derive(Debug, Deserialize)]
struct PackageJson {
    main: Option<String>,
}
