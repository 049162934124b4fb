// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module evaluation
//!
//! The runner does not interpret code. A [`ModuleEvaluator`] runs it, and
//! reaches back into the runner through the [`ModuleContext`] it is given:
//! exports are written to `context.exports()`, dependencies are pulled in
//! with `context.import(..)`.

use super::transform::{ModuleFormat, TransformResult};
use crate::error::{Result, RunnerError};
use crate::mocking::{MockFactory, ModuleHandle};
use crate::runtime::ModuleRunner;
use async_trait::async_trait;
use modrunner_values::{ObjectRef, Value, js_object};
use std::path::Path;
use url::Url;

/// Executes transformed module code.
#[async_trait]
pub trait ModuleEvaluator: Send + Sync {
    /// Run `source` as the body of `context.id()`.
    async fn evaluate(&self, context: ModuleContext, source: TransformResult) -> Result<()>;

    /// Load an external module, which skips the transformer.
    async fn evaluate_external(&self, context: ModuleContext) -> Result<()> {
        Err(RunnerError::evaluation(
            context.id(),
            "external modules are not supported by this evaluator",
        ))
    }
}

/// import.meta for a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportMeta {
    /// The URL of the module, `file://` for filesystem modules
    pub url: String,
    /// The directory of the module
    pub dirname: String,
    /// The filename of the module
    pub filename: String,
}

impl ImportMeta {
    /// Create import.meta for a module id
    pub fn new(id: &str) -> Self {
        let path = Path::new(id);
        let url = Url::from_file_path(path)
            .map(String::from)
            .unwrap_or_else(|_| id.to_string());
        let dirname = path
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();

        Self {
            url,
            dirname,
            filename: id.to_string(),
        }
    }

    /// As an object value
    pub fn to_object(&self) -> ObjectRef {
        js_object! {
            "url" => self.url.as_str(),
            "dirname" => self.dirname.as_str(),
            "filename" => self.filename.as_str(),
        }
    }
}

/// Everything a module body can reach while it runs.
#[derive(Clone)]
pub struct ModuleContext {
    id: String,
    meta: ImportMeta,
    format: ModuleFormat,
    exports: ObjectRef,
    runner: ModuleRunner,
    callstack: Vec<String>,
}

impl ModuleContext {
    pub(crate) fn new(
        runner: ModuleRunner,
        id: String,
        format: ModuleFormat,
        exports: ObjectRef,
        callstack: Vec<String>,
    ) -> Self {
        Self {
            meta: ImportMeta::new(&id),
            id,
            format,
            exports,
            runner,
            callstack,
        }
    }

    /// Canonical id of the running module
    pub fn id(&self) -> &str {
        &self.id
    }

    /// import.meta
    pub fn meta(&self) -> &ImportMeta {
        &self.meta
    }

    /// Module format
    pub fn format(&self) -> ModuleFormat {
        self.format
    }

    /// The exports object, already visible to importers
    pub fn exports(&self) -> &ObjectRef {
        &self.exports
    }

    /// Modules currently being loaded on this chain, ending with this one
    pub fn callstack(&self) -> &[String] {
        &self.callstack
    }

    /// The runner this module belongs to
    pub fn runner(&self) -> &ModuleRunner {
        &self.runner
    }

    /// Define an export
    pub fn set_export(&self, name: &str, value: impl Into<Value>) {
        self.exports.set(name, value);
    }

    /// Import a dependency, honoring mocks
    pub async fn import(&self, specifier: &str) -> Result<ObjectRef> {
        Ok(self.import_module(specifier).await?.exports().clone())
    }

    /// Import a dependency and keep its origin
    pub async fn import_module(&self, specifier: &str) -> Result<ModuleHandle> {
        self.runner
            .dependency_request(specifier, &self.id, &self.callstack)
            .await
    }

    /// Import a single binding. Fails for exports an auto-mocked module lacks.
    pub async fn import_binding(&self, specifier: &str, name: &str) -> Result<Value> {
        self.import_module(specifier).await?.get(name)
    }

    /// Import a dependency, ignoring mocks
    pub async fn import_actual(&self, specifier: &str) -> Result<ObjectRef> {
        self.runner
            .import_actual_from(specifier, &self.id, &self.callstack)
            .await
    }

    /// Import the mocked form of a dependency, whether or not it is registered
    pub async fn import_mock(&self, specifier: &str) -> Result<ModuleHandle> {
        self.runner
            .import_mock_from(specifier, &self.id, &self.callstack)
            .await
    }

    /// `mock(specifier, factory?)`
    pub fn mock(&self, specifier: &str, factory: Option<MockFactory>) {
        self.runner.queue_mock(specifier, &self.id, factory);
    }

    /// `unmock(specifier)`
    pub fn unmock(&self, specifier: &str) {
        self.runner.queue_unmock(specifier, &self.id);
    }
}
