// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! JavaScript array representation.

use super::value::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A shared handle to a JavaScript array.
#[derive(Clone, Default)]
pub struct ArrayRef(Arc<RwLock<Vec<Value>>>);

impl ArrayRef {
    /// Creates a new empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an array holding the given elements.
    pub fn from_vec(elements: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(elements)))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Returns true if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Reads an element; holes and out-of-range reads are `undefined`.
    pub fn get(&self, index: usize) -> Value {
        self.0.read().get(index).cloned().unwrap_or_default()
    }

    /// Appends an element.
    pub fn push(&self, value: impl Into<Value>) {
        self.0.write().push(value.into());
    }

    /// A snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    /// Returns true if both handles point at the same array.
    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A stable identity for this array, valid while any handle is alive.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayRef(len = {})", self.len())
    }
}
