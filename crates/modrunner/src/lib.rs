// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # modrunner
//!
//! Per-test-file module execution and mocking runtime.
//!
//! A [`ModuleRunner`] loads modules for one test worker:
//!
//! - resolves specifiers through a host (Node.js filesystem rules by default)
//! - caches each module's exports once, sharing in-flight loads between
//!   concurrent importers and binding partial exports on circular imports
//! - substitutes mocks registered with `mock()`: factory results, sibling
//!   `__mocks__` files, or structural auto-mocks whose functions are stubs
//! - invalidates modules and their importers on change
//!
//! Code is run by a [`ModuleEvaluator`] supplied by the embedder; the runner
//! owns everything around it.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use modrunner::{ModuleRunner, RunnerConfig};
//!
//! #[tokio::main]
//! async fn main() -> modrunner::Result<()> {
//!     let runner = ModuleRunner::builder(RunnerConfig::with_root("/project"))
//!         .evaluator(my_evaluator())
//!         .build()?;
//!
//!     runner.set_suite_file(Some("/project/src/math.test.js"));
//!     runner.mock("./src/random.js", None);
//!
//!     let math = runner.import("./src/math.js").await?;
//!     println!("{:?}", math.get("add")?);
//!     Ok(())
//! }
//! ```
//!
//! ## Out-of-process hosts
//!
//! Resolution and transforms usually live in the parent process. A
//! [`HostChannel`] implements both seams by message passing; the parent side
//! answers from a [`HostReceiver`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod mocking;
pub mod module_system;
pub mod runtime;
pub mod watch;

// Re-exports
pub use config::RunnerConfig;
pub use error::{Result, RunnerError};
pub use host::{HostChannel, HostReceiver, HostRequest, HostResponse};
pub use logging::init_logging;
pub use mocking::{FactoryContext, MockFactory, ModuleHandle, ModuleOrigin, mock_object};
pub use module_system::{
    ImportMeta, ModuleContext, ModuleEvaluator, ModuleFormat, ResolvedId, ResolverHost,
    TransformResult, Transformer,
};
pub use modrunner_values::{FunctionRef, ObjectRef, Value, js_array, js_object};
pub use runtime::{ModuleRunner, RunnerBuilder};
pub use watch::ModuleWatcher;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
