// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module mocking
//!
//! - [`MockDirectory`]: queued and resolved `mock()`/`unmock()` registrations
//! - [`mock_object`]: structural auto-mocking of an exports object
//! - [`MockFactory`]: user-supplied replacement exports
//! - [`ModuleHandle`]: imported exports, strict about missing auto-mock exports

pub mod automock;
mod directory;
mod factory;
mod handle;

pub use automock::mock_object;
pub use directory::{DirectiveKind, MockDirective, MockDirectory, MockEntry, MockScope, SharedMockMap};
pub use factory::{FactoryContext, MockFactory};
pub use handle::{ModuleHandle, ModuleOrigin};
