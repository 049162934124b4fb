// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Imported module handles

use crate::error::{Result, RunnerError};
use modrunner_values::{ObjectRef, Value};

/// Where an imported module's exports came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// The real module
    Real,
    /// Generated by the auto-mocker
    Auto,
    /// Returned by a mock factory
    Factory,
    /// A `__mocks__` file standing in for the module
    Redirect,
}

/// Keys that read as `undefined` on an auto-mock instead of failing, since
/// promise detection and interop helpers read them.
const PASSTHROUGH_KEYS: &[&str] = &["then", "__esModule", "toJSON"];

/// The result of importing a module
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    id: String,
    exports: ObjectRef,
    origin: ModuleOrigin,
}

impl ModuleHandle {
    pub(crate) fn new(id: impl Into<String>, exports: ObjectRef, origin: ModuleOrigin) -> Self {
        Self {
            id: id.into(),
            exports,
            origin,
        }
    }

    /// Canonical id of the module that was asked for
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The exports object
    pub fn exports(&self) -> &ObjectRef {
        &self.exports
    }

    /// Where the exports came from
    pub fn origin(&self) -> ModuleOrigin {
        self.origin
    }

    /// Returns true for any mocked form
    pub fn is_mocked(&self) -> bool {
        self.origin != ModuleOrigin::Real
    }

    /// Read an export.
    ///
    /// On auto-mocked modules, reading an export the real module does not
    /// have fails with [`RunnerError::AutoMockAccess`]. Everywhere else a
    /// missing export is `undefined`.
    pub fn get(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.exports.get_own(name) {
            return Ok(value);
        }

        if self.origin == ModuleOrigin::Auto && !PASSTHROUGH_KEYS.contains(&name) {
            return Err(RunnerError::AutoMockAccess {
                id: self.id.clone(),
                export: name.to_string(),
            });
        }

        Ok(Value::Undefined)
    }
}
