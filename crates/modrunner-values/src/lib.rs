// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # modrunner-values
//!
//! The value model that module exports are made of.
//!
//! ## Overview
//!
//! Module exports in modrunner are JavaScript-shaped data: objects that are
//! shared by reference and mutated in place, arrays, functions with their own
//! static properties, and symbols. This crate provides:
//! - [`Value`], the tagged value type
//! - [`ObjectRef`], [`ArrayRef`] and [`FunctionRef`], reference-counted handles
//!   whose equality is identity
//! - [`Spy`], the call-recording state behind stub functions
//! - [`js_object!`] and [`js_array!`] for building values in code
//!
//! ## Quick Start
//!
//! ```rust
//! use modrunner_values::{js_object, FunctionRef, Value};
//!
//! let exports = js_object! {
//!     "answer" => 42,
//!     "name" => "deep-thought",
//! };
//! let alias = exports.clone();
//! alias.set("ready", true);
//!
//! // Both handles observe the write.
//! assert_eq!(exports.get("ready"), Value::Boolean(true));
//!
//! let stub = FunctionRef::stub("compute");
//! assert_eq!(stub.call(&Value::Undefined, &[]).unwrap(), Value::Undefined);
//! assert_eq!(stub.spy().map(|s| s.call_count()), Some(1));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod macros;
pub mod runtime;
pub mod spy;

use thiserror::Error;

// Re-exports for convenience
pub use runtime::array::ArrayRef;
pub use runtime::function::{Callable, FunctionRef, NativeFunction};
pub use runtime::object::{Getter, ObjectKind, ObjectRef, Property, PropertyKey, PropertySlot};
pub use runtime::symbol::Symbol;
pub use runtime::value::Value;
pub use spy::{Spy, SpyResult};

/// Errors raised while operating on values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Type error (calling a non-function, wrong receiver)
    #[error("TypeError: {0}")]
    TypeError(String),
    /// Reference error (missing binding)
    #[error("ReferenceError: {0}")]
    ReferenceError(String),
    /// Range error (out of bounds, etc.)
    #[error("RangeError: {0}")]
    RangeError(String),
    /// A value thrown by user code, carried as its message
    #[error("{0}")]
    Thrown(String),
}

impl Error {
    /// Create a new TypeError
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create an error for a value thrown by user code
    pub fn thrown(msg: impl Into<String>) -> Self {
        Self::Thrown(msg.into())
    }
}
