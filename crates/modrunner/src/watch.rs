// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Invalidate modules when their files change on disk

use crate::error::Result;
use crate::runtime::ModuleRunner;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Watches source files and drops changed modules (and everything that
/// imports them) from a runner's cache.
///
/// Must be created inside a tokio runtime. Dropping the watcher stops it.
pub struct ModuleWatcher {
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ModuleWatcher {
    /// Start a watcher bound to `runner`. Nothing is watched until
    /// [`ModuleWatcher::watch`] is called.
    pub fn new(runner: ModuleRunner) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Some(paths) = changed_paths(&event) {
                    let _ = tx.send(paths);
                }
            }
            Err(err) => warn!(error = %err, "watch error"),
        })?;

        let task = tokio::spawn(async move {
            while let Some(paths) = rx.recv().await {
                let invalidated = runner.invalidate_paths(&paths);
                if !invalidated.is_empty() {
                    debug!(?paths, count = invalidated.len(), "invalidated changed modules");
                }
            }
        });

        Ok(Self { watcher, task })
    }

    /// Watch a file, or a directory tree
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.watcher.watch(path, RecursiveMode::Recursive)?;
        debug!(path = %path.display(), "watching");
        Ok(())
    }

    /// Stop watching a path
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.watcher.unwatch(path.as_ref())?;
        Ok(())
    }
}

impl Drop for ModuleWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Paths whose modules must be invalidated for `event`, if any
fn changed_paths(event: &Event) -> Option<Vec<PathBuf>> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {}
        _ => return None,
    }
    if event.paths.is_empty() {
        return None;
    }
    Some(event.paths.clone())
}
