// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module system building blocks
//!
//! ## Resolution
//! - canonical ids (`node:` builtins, virtual-module markers stripped)
//! - per-`(specifier, importer)` resolution cache with coalescing
//! - Node.js filesystem resolution as the default host
//!
//! ## Loading
//! - transformer and evaluator seams
//! - module cache with in-place exports and shared in-flight loads

mod cache;
mod evaluator;
pub mod id;
mod resolver;
mod transform;

pub use cache::{Claim, EntryPatch, ModuleCache, ModuleCacheEntry, ModuleState, SharedLoad};
pub use evaluator::{ImportMeta, ModuleContext, ModuleEvaluator};
pub use id::{BUILTIN_MODULES, BUILTIN_SUBPATHS, canonicalize_id, is_builtin, mock_path};
pub use resolver::{FsResolverHost, ModuleResolver, ResolvedId, ResolverHost};
pub use transform::{FsTransformer, ModuleFormat, TransformResult, Transformer};
