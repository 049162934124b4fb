// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! User-supplied mock factories

use crate::error::Result;
use crate::runtime::ModuleRunner;
use futures::future::{BoxFuture, FutureExt};
use modrunner_values::{ObjectRef, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type FactoryFn = dyn Fn(FactoryContext) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Produces the replacement exports for a mocked module.
///
/// The factory must resolve to an object. It runs at most once per suite file.
#[derive(Clone)]
pub struct MockFactory(Arc<FactoryFn>);

impl MockFactory {
    /// Wrap an async closure
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn(FactoryContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self(Arc::new(move |ctx| factory(ctx).boxed()))
    }

    /// A factory that always produces `exports`
    pub fn from_exports(exports: ObjectRef) -> Self {
        Self::new(move |_| {
            let exports = exports.clone();
            async move { Ok(Value::Object(exports)) }
        })
    }

    /// Run the factory
    pub fn call(&self, ctx: FactoryContext) -> BoxFuture<'static, Result<Value>> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for MockFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MockFactory(<fn>)")
    }
}

/// What a factory can see while it runs
#[derive(Clone)]
pub struct FactoryContext {
    id: String,
    runner: ModuleRunner,
    callstack: Vec<String>,
}

impl FactoryContext {
    pub(crate) fn new(id: String, runner: ModuleRunner, callstack: Vec<String>) -> Self {
        Self { id, runner, callstack }
    }

    /// Id of the module being mocked
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The real module's exports, bypassing every mock
    pub async fn import_original(&self) -> Result<ObjectRef> {
        self.runner.import_actual_from(&self.id, &self.id, &self.callstack).await
    }

    /// Import another module from inside the factory. Importing the module
    /// being mocked yields the real module.
    pub async fn import(&self, specifier: &str) -> Result<ObjectRef> {
        let handle = self
            .runner
            .dependency_request(specifier, &self.id, &self.callstack)
            .await?;
        Ok(handle.exports().clone())
    }
}
