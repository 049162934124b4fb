// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Mock registrations
//!
//! `mock()` and `unmock()` calls are queued raw, exactly as written, and only
//! resolved right before the next dependency request. Resolved directives
//! land in a per-suite-file map, or in the global map when no suite file is
//! active. Suite entries shadow global ones.

use super::factory::MockFactory;
use crate::error::{Result, RunnerError};
use crate::module_system::ModuleResolver;
use crate::module_system::id::{bare_builtin_name, canonicalize_id, is_builtin};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A queued mock call, before resolution
#[derive(Debug, Clone)]
pub enum DirectiveKind {
    /// `mock(specifier)` or `mock(specifier, factory)`
    Mock(Option<MockFactory>),
    /// `unmock(specifier)`
    Unmock,
}

/// Which map a directive lands in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockScope {
    /// Only while this suite file is active
    Suite(String),
    /// Every suite file, and every runner sharing the global map
    Global,
}

/// A raw `mock()`/`unmock()` call
#[derive(Debug, Clone)]
pub struct MockDirective {
    /// The specifier as written
    pub specifier: String,
    /// The module that made the call
    pub importer: String,
    /// What to do
    pub kind: DirectiveKind,
    /// Where to record it
    pub scope: MockScope,
}

/// A resolved mock registration
#[derive(Debug, Clone)]
pub enum MockEntry {
    /// Generate a structural mock from the real module
    Auto,
    /// Use what the factory returns
    Factory(MockFactory),
    /// Load this module instead
    Redirect(String),
}

/// Mock map keyed by canonical id, shareable between runners
pub type SharedMockMap = Arc<DashMap<String, MockEntry>>;

/// Per-runner mock state
pub struct MockDirectory {
    pending: Mutex<Vec<MockDirective>>,
    suites: DashMap<String, HashMap<String, MockEntry>>,
    global: SharedMockMap,
    suite_file: RwLock<Option<String>>,
    root: PathBuf,
    mocks_dir: String,
}

impl MockDirectory {
    /// Create a directory. Package and builtin mocks are looked up in
    /// `<root>/<mocks_dir>`.
    pub fn new(root: impl Into<PathBuf>, mocks_dir: impl Into<String>, global: SharedMockMap) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            suites: DashMap::new(),
            global,
            suite_file: RwLock::new(None),
            root: root.into(),
            mocks_dir: mocks_dir.into(),
        }
    }

    /// The global map
    pub fn global(&self) -> &SharedMockMap {
        &self.global
    }

    /// Switch the active suite file
    pub fn set_suite_file(&self, file: Option<String>) {
        *self.suite_file.write() = file;
    }

    /// The active suite file
    pub fn suite_file(&self) -> Option<String> {
        self.suite_file.read().clone()
    }

    fn current_scope(&self) -> MockScope {
        match self.suite_file.read().as_ref() {
            Some(file) => MockScope::Suite(file.clone()),
            None => MockScope::Global,
        }
    }

    /// Queue `mock(specifier, factory?)` made from `importer`
    pub fn queue_mock(&self, specifier: &str, importer: &str, factory: Option<MockFactory>) {
        self.queue(specifier, importer, DirectiveKind::Mock(factory));
    }

    /// Queue `unmock(specifier)` made from `importer`
    pub fn queue_unmock(&self, specifier: &str, importer: &str) {
        self.queue(specifier, importer, DirectiveKind::Unmock);
    }

    fn queue(&self, specifier: &str, importer: &str, kind: DirectiveKind) {
        let directive = MockDirective {
            specifier: specifier.to_string(),
            importer: importer.to_string(),
            kind,
            scope: self.current_scope(),
        };
        self.pending.lock().push(directive);
    }

    /// Number of directives waiting for [`resolve_mocks`](Self::resolve_mocks)
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Resolve and record every queued directive, in call order.
    ///
    /// Returns the ids touched, whose mocked cache entries are now stale. If
    /// resolution fails for a reason other than "not found", the failing
    /// directive and everything after it stay queued.
    pub async fn resolve_mocks(&self, resolver: &ModuleResolver) -> Result<Vec<String>> {
        let mut queue = std::mem::take(&mut *self.pending.lock());
        let mut touched = Vec::with_capacity(queue.len());

        let mut index = 0;
        while index < queue.len() {
            let result = resolver
                .resolve(&queue[index].specifier, &queue[index].importer)
                .await;
            let (id, external) = match result {
                Ok(resolved) => (resolved.id, resolved.external),
                // Factories may stand in for modules that do not exist
                Err(RunnerError::Resolution { .. }) => (canonicalize_id(&queue[index].specifier), true),
                Err(err) => {
                    let rest = queue.split_off(index);
                    let mut pending = self.pending.lock();
                    let newer = std::mem::replace(&mut *pending, rest);
                    pending.extend(newer);
                    return Err(err);
                }
            };

            self.apply(&queue[index], &id, external).await;
            touched.push(id);
            index += 1;
        }

        Ok(touched)
    }

    async fn apply(&self, directive: &MockDirective, id: &str, external: bool) {
        match &directive.kind {
            DirectiveKind::Unmock => {
                debug!(id, scope = ?directive.scope, "unmock");
                match &directive.scope {
                    MockScope::Suite(file) => {
                        if let Some(mut map) = self.suites.get_mut(file) {
                            map.remove(id);
                        }
                    }
                    MockScope::Global => {
                        self.global.remove(id);
                    }
                }
            }
            DirectiveKind::Mock(factory) => {
                let entry = match factory {
                    Some(factory) => MockEntry::Factory(factory.clone()),
                    None => self.classify(id, &directive.specifier, external).await,
                };
                debug!(id, scope = ?directive.scope, entry = ?entry, "mock registered");
                match &directive.scope {
                    MockScope::Suite(file) => {
                        self.suites
                            .entry(file.clone())
                            .or_default()
                            .insert(id.to_string(), entry);
                    }
                    MockScope::Global => {
                        self.global.insert(id.to_string(), entry);
                    }
                }
            }
        }
    }

    /// Redirect to a `__mocks__` file when one exists, otherwise auto-mock.
    pub async fn classify(&self, id: &str, specifier: &str, external: bool) -> MockEntry {
        match self.find_mock_file(id, specifier, external).await {
            Some(path) => MockEntry::Redirect(path),
            None => MockEntry::Auto,
        }
    }

    /// Locate the manual mock for a module.
    ///
    /// Project files use a `__mocks__` folder next to them. Packages and
    /// builtins use `<root>/__mocks__/<specifier>`.
    pub async fn find_mock_file(&self, id: &str, specifier: &str, external: bool) -> Option<String> {
        let path = Path::new(id);
        let local = !external && !is_builtin(id) && path.is_absolute() && is_file(path).await;

        let (folder, name) = if local {
            (path.parent()?.join(&self.mocks_dir), PathBuf::from(path.file_name()?))
        } else {
            let name = bare_builtin_name(&canonicalize_id(specifier)).to_string();
            if name.starts_with('.') || name.starts_with('/') {
                return None;
            }
            (self.root.join(&self.mocks_dir), PathBuf::from(name))
        };

        let exact = folder.join(&name);
        if is_file(&exact).await {
            return Some(path_to_id(&exact));
        }

        // Same stem, any extension
        let candidate_dir = exact.parent()?;
        let stem = name.file_stem()?.to_os_string();
        let mut entries = tokio::fs::read_dir(candidate_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let candidate = entry.path();
            if candidate.file_stem() == Some(stem.as_os_str()) && is_file(&candidate).await {
                return Some(path_to_id(&candidate));
            }
        }
        None
    }

    /// The registration in effect for `id`: suite entry, else global entry.
    pub fn get_dependency_mock(&self, id: &str) -> Option<MockEntry> {
        if let Some(file) = self.suite_file.read().as_ref() {
            let suite = self.suites.get(file).and_then(|map| map.get(id).cloned());
            if suite.is_some() {
                return suite;
            }
        }
        self.global.get(id).map(|entry| entry.clone())
    }

    /// Forget every suite registration and queued directive. The global map
    /// is shared and left alone.
    pub fn clear(&self) {
        self.pending.lock().clear();
        self.suites.clear();
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn path_to_id(path: &Path) -> String {
    canonicalize_id(&path.to_string_lossy())
}
