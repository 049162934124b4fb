// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module cache
//!
//! One table per runner instance, keyed by canonical id. Entries may be
//! partially filled: an entry is created the moment a load starts, with an
//! empty exports object that the module body fills in place. Anyone who got
//! hold of that object early (a cyclic importer, a coalesced waiter) sees the
//! final exports without re-reading the cache.

use super::id::{is_mock_path, mock_path};
use super::transform::ModuleFormat;
use crate::error::Result;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, Shared};
use modrunner_values::ObjectRef;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// A load in flight, shared by every requester of the module.
pub type SharedLoad = Shared<BoxFuture<'static, Result<ObjectRef>>>;

/// Load state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Known (for example as a dependency) but never requested
    Unrequested,
    /// Exports registered, body not finished
    Pending,
    /// Body finished
    Settled,
}

/// Cached module entry
#[derive(Clone)]
pub struct ModuleCacheEntry {
    /// Canonical module id
    pub id: String,
    /// The module's exports, created empty and filled in place
    pub exports: Option<ObjectRef>,
    /// Transformed code that was executed
    pub source_code: Option<String>,
    /// Source map for `source_code`
    pub source_map: Option<String>,
    /// The in-flight load, while pending
    pub load: Option<SharedLoad>,
    /// Module format, once fetched
    pub format: Option<ModuleFormat>,
    /// Whether the module bypassed the transformer
    pub external: bool,
    /// Load state
    pub state: ModuleState,
    /// Ids of modules that imported this one
    pub importers: HashSet<String>,
}

impl ModuleCacheEntry {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            exports: None,
            source_code: None,
            source_map: None,
            load: None,
            format: None,
            external: false,
            state: ModuleState::Unrequested,
            importers: HashSet::new(),
        }
    }

    /// Returns true once the module body has finished.
    pub fn is_settled(&self) -> bool {
        self.state == ModuleState::Settled
    }
}

impl fmt::Debug for ModuleCacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCacheEntry")
            .field("id", &self.id)
            .field("exports", &self.exports)
            .field("format", &self.format)
            .field("external", &self.external)
            .field("state", &self.state)
            .field("loading", &self.load.is_some())
            .field("importers", &self.importers)
            .finish()
    }
}

/// Fields to merge into an entry with [`ModuleCache::set`]
#[derive(Default)]
pub struct EntryPatch {
    /// Replace exports
    pub exports: Option<ObjectRef>,
    /// Replace source code
    pub source_code: Option<String>,
    /// Replace source map
    pub source_map: Option<String>,
    /// Replace the in-flight load
    pub load: Option<SharedLoad>,
    /// Replace format
    pub format: Option<ModuleFormat>,
    /// Replace the external flag
    pub external: Option<bool>,
    /// Replace state
    pub state: Option<ModuleState>,
}

/// Outcome of [`ModuleCache::claim`]
pub enum Claim {
    /// The module already finished loading
    Ready(ObjectRef),
    /// Another requester is loading it; await this
    Pending(SharedLoad),
    /// The caller's load was registered; await this
    Started(SharedLoad),
}

/// Thread-safe module cache
pub struct ModuleCache {
    entries: DashMap<String, ModuleCacheEntry>,
}

impl ModuleCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Snapshot of an entry
    pub fn get(&self, id: &str) -> Option<ModuleCacheEntry> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    /// The exports object registered for `id`, if any
    pub fn exports(&self, id: &str) -> Option<ObjectRef> {
        self.entries.get(id).and_then(|entry| entry.exports.clone())
    }

    /// Check if an entry exists
    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Merge `patch` into the entry for `id`, creating it if needed
    pub fn set(&self, id: &str, patch: EntryPatch) {
        let mut entry = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| ModuleCacheEntry::new(id));

        if let Some(exports) = patch.exports {
            entry.exports = Some(exports);
        }
        if let Some(source_code) = patch.source_code {
            entry.source_code = Some(source_code);
        }
        if let Some(source_map) = patch.source_map {
            entry.source_map = Some(source_map);
        }
        if let Some(load) = patch.load {
            entry.load = Some(load);
        }
        if let Some(format) = patch.format {
            entry.format = Some(format);
        }
        if let Some(external) = patch.external {
            entry.external = external;
        }
        if let Some(state) = patch.state {
            entry.state = state;
        }
    }

    /// Remove an entry
    pub fn delete(&self, id: &str) -> Option<ModuleCacheEntry> {
        self.entries.remove(id).map(|(_, entry)| entry)
    }

    /// Clear the entire cache
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get all cached ids
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Get the number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically find or start the load of `id`.
    ///
    /// If nothing is loading, a fresh exports object is registered as pending
    /// and `start` is called with it to build the load future. `start` runs
    /// under the cache's shard lock, so it must only construct the future.
    pub fn claim<F>(&self, id: &str, external: bool, start: F) -> Claim
    where
        F: FnOnce(ObjectRef) -> SharedLoad,
    {
        let mut entry = match self.entries.entry(id.to_string()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_ref();
                if let (ModuleState::Settled, Some(exports)) = (entry.state, &entry.exports) {
                    return Claim::Ready(exports.clone());
                }
                if let (ModuleState::Pending, Some(load)) = (entry.state, &entry.load) {
                    return Claim::Pending(load.clone());
                }
                entry
            }
            Entry::Vacant(vacant) => vacant.insert(ModuleCacheEntry::new(id)),
        };

        let exports = ObjectRef::module_namespace();
        let load = start(exports.clone());
        entry.exports = Some(exports);
        entry.load = Some(load.clone());
        entry.external = external;
        entry.state = ModuleState::Pending;
        Claim::Started(load)
    }

    /// Apply `f` to the entry for `id`, provided its exports are still
    /// `placeholder`. Entries invalidated mid-load are not recreated.
    pub fn update_current<F>(&self, id: &str, placeholder: &ObjectRef, f: F) -> bool
    where
        F: FnOnce(&mut ModuleCacheEntry),
    {
        match self.entries.get_mut(id) {
            Some(mut entry) if entry.exports.as_ref().is_some_and(|e| e.ptr_eq(placeholder)) => {
                f(&mut entry);
                true
            }
            _ => false,
        }
    }

    /// Mark `id` settled, provided its exports are still `placeholder`.
    pub fn settle(&self, id: &str, placeholder: &ObjectRef) -> bool {
        self.settle_as(id, placeholder, placeholder.clone())
    }

    /// Mark `id` settled with `exports` in place of `placeholder`, provided
    /// the placeholder is still current.
    pub fn settle_as(&self, id: &str, placeholder: &ObjectRef, exports: ObjectRef) -> bool {
        self.update_current(id, placeholder, |entry| {
            entry.exports = Some(exports);
            entry.state = ModuleState::Settled;
            entry.load = None;
        })
    }

    /// Remove `id` after a failed load, provided its exports are still
    /// `placeholder`. A newer load registered in the meantime is kept.
    pub fn evict(&self, id: &str, placeholder: &ObjectRef) -> bool {
        self.entries
            .remove_if(id, |_, entry| entry.exports.as_ref().is_some_and(|e| e.ptr_eq(placeholder)))
            .is_some()
    }

    /// Record that `importer` depends on `id`.
    pub fn add_importer(&self, id: &str, importer: &str) {
        self.entries
            .entry(id.to_string())
            .or_insert_with(|| ModuleCacheEntry::new(id))
            .importers
            .insert(importer.to_string());
    }

    /// Remove `ids` and their mocked counterparts. Returns the removed keys.
    pub fn invalidate<'a>(&self, ids: impl IntoIterator<Item = &'a String>) -> HashSet<String> {
        let mut removed = HashSet::new();
        for id in ids {
            for key in [id.clone(), mock_path(id)] {
                if self.entries.remove(&key).is_some() {
                    removed.insert(key);
                }
            }
        }
        removed
    }

    /// Every id in `ids` plus all of their transitive importers.
    pub fn dependents(&self, ids: &[String]) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = ids.iter().cloned().collect();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(entry) = self.entries.get(&id) {
                queue.extend(entry.importers.iter().filter(|i| !seen.contains(*i)).cloned());
            }
        }

        seen
    }

    /// Remove `ids`, their transitive importers, and all of their mocked
    /// counterparts. Returns the removed keys.
    pub fn invalidate_dep_tree(&self, ids: &[String]) -> HashSet<String> {
        let tree = self.dependents(ids);
        self.invalidate(&tree)
    }

    /// Drop every mocked entry.
    pub fn clear_mocks(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !is_mock_path(key));
        before - self.entries.len()
    }

    /// Drop everything except external modules, and mocked entries unless
    /// `reset_mocks`.
    pub fn reset(&self, reset_mocks: bool) {
        self.entries
            .retain(|key, entry| entry.external || (!reset_mocks && is_mock_path(key)));
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use modrunner_values::Value;

    fn ready(exports: ObjectRef) -> SharedLoad {
        async move { Ok(exports) }.boxed().shared()
    }

    #[test]
    fn test_set_merges_partial_entries() {
        let cache = ModuleCache::new();
        cache.set(
            "/a.js",
            EntryPatch {
                source_code: Some("code".into()),
                ..Default::default()
            },
        );
        cache.set(
            "/a.js",
            EntryPatch {
                format: Some(ModuleFormat::Esm),
                ..Default::default()
            },
        );

        let entry = cache.get("/a.js").unwrap();
        assert_eq!(entry.source_code.as_deref(), Some("code"));
        assert_eq!(entry.format, Some(ModuleFormat::Esm));
        assert_eq!(entry.state, ModuleState::Unrequested);
        assert!(entry.exports.is_none());
    }

    #[test]
    fn test_claim_registers_exports_before_loading() {
        let cache = ModuleCache::new();
        let mut placeholder = None;

        let claim = cache.claim("/a.js", false, |exports| {
            placeholder = Some(exports.clone());
            ready(exports)
        });
        assert!(matches!(claim, Claim::Started(_)));

        let placeholder = placeholder.unwrap();
        assert!(cache.exports("/a.js").unwrap().ptr_eq(&placeholder));

        // A second claim joins the first load
        let second = cache.claim("/a.js", false, |_| unreachable!());
        assert!(matches!(second, Claim::Pending(_)));

        assert!(cache.settle("/a.js", &placeholder));
        match cache.claim("/a.js", false, |_| unreachable!()) {
            Claim::Ready(exports) => assert!(exports.ptr_eq(&placeholder)),
            _ => panic!("expected settled exports"),
        }
    }

    #[test]
    fn test_settle_as_replaces_placeholder() {
        let cache = ModuleCache::new();
        let mut placeholder = None;
        cache.claim("mock:/a.js", false, |exports| {
            placeholder = Some(exports.clone());
            ready(exports)
        });
        let placeholder = placeholder.unwrap();
        let produced = ObjectRef::new();

        assert!(!cache.settle_as("mock:/a.js", &ObjectRef::new(), produced.clone()));
        assert!(cache.settle_as("mock:/a.js", &placeholder, produced.clone()));
        match cache.claim("mock:/a.js", false, |_| unreachable!()) {
            Claim::Ready(exports) => assert!(exports.ptr_eq(&produced)),
            _ => panic!("expected settled exports"),
        }
    }

    #[test]
    fn test_evict_only_matching_placeholder() {
        let cache = ModuleCache::new();
        let mut first = None;
        cache.claim("/a.js", false, |exports| {
            first = Some(exports.clone());
            ready(exports)
        });
        let first = first.unwrap();

        assert!(!cache.evict("/a.js", &ObjectRef::new()));
        assert!(cache.has("/a.js"));
        assert!(cache.evict("/a.js", &first));
        assert!(!cache.has("/a.js"));
    }

    #[test]
    fn test_dep_tree_invalidation() {
        let cache = ModuleCache::new();
        for id in ["/a.js", "/b.js", "/c.js", "/other.js", "mock:/b.js"] {
            cache.set(
                id,
                EntryPatch {
                    exports: Some(ObjectRef::new()),
                    state: Some(ModuleState::Settled),
                    ..Default::default()
                },
            );
        }
        // c imports b, b imports a
        cache.add_importer("/a.js", "/b.js");
        cache.add_importer("/b.js", "/c.js");

        let removed = cache.invalidate_dep_tree(&["/a.js".to_string()]);
        assert!(removed.contains("/a.js"));
        assert!(removed.contains("/b.js"));
        assert!(removed.contains("/c.js"));
        assert!(removed.contains("mock:/b.js"));
        assert_eq!(cache.keys(), vec!["/other.js".to_string()]);
    }

    #[test]
    fn test_dependents_terminates_on_cycles() {
        let cache = ModuleCache::new();
        cache.add_importer("/a.js", "/b.js");
        cache.add_importer("/b.js", "/a.js");
        assert_eq!(cache.dependents(&["/a.js".to_string()]).len(), 2);
    }

    #[test]
    fn test_reset_keeps_external_and_mocks() {
        let cache = ModuleCache::new();
        let exports = ObjectRef::new();
        exports.set("x", Value::from(1));
        cache.set("/a.js", EntryPatch::default());
        cache.set(
            "node:fs",
            EntryPatch {
                external: Some(true),
                ..Default::default()
            },
        );
        cache.set(
            "mock:/a.js",
            EntryPatch {
                exports: Some(exports),
                ..Default::default()
            },
        );

        cache.reset(false);
        assert!(!cache.has("/a.js"));
        assert!(cache.has("node:fs"));
        assert!(cache.has("mock:/a.js"));

        cache.reset(true);
        assert!(!cache.has("mock:/a.js"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_mocks() {
        let cache = ModuleCache::new();
        cache.set("/a.js", EntryPatch::default());
        cache.set("mock:/a.js", EntryPatch::default());
        assert_eq!(cache.clear_mocks(), 1);
        assert!(cache.has("/a.js"));
    }
}
