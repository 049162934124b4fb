// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The per-suite module runner

use crate::config::RunnerConfig;
use crate::error::{Result, RunnerError};
use crate::mocking::{
    FactoryContext, MockDirectory, MockEntry, MockFactory, ModuleHandle, ModuleOrigin,
    SharedMockMap, mock_object,
};
use crate::module_system::{
    Claim, FsResolverHost, FsTransformer, ModuleCache, ModuleContext, ModuleEvaluator,
    ModuleFormat, ModuleResolver, ResolvedId, ResolverHost, Transformer, canonicalize_id,
    mock_path,
};
use futures::future::{BoxFuture, FutureExt};
use modrunner_values::{ObjectKind, ObjectRef, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

struct RunnerInner {
    /// Distinguishes runners in logs
    instance: Uuid,
    config: RunnerConfig,
    /// Importer used for imports made from outside any module
    root_importer: String,
    resolver: ModuleResolver,
    transformer: Arc<dyn Transformer>,
    evaluator: Arc<dyn ModuleEvaluator>,
    cache: ModuleCache,
    mocks: MockDirectory,
    /// Held while queued mock directives are applied
    mock_resolution: tokio::sync::Mutex<()>,
}

/// Loads, caches and mocks modules for one test worker.
///
/// Cheap to clone; clones share one cache and one mock directory. Separate
/// runners share nothing except a global mock map passed to both builders.
#[derive(Clone)]
pub struct ModuleRunner {
    inner: Arc<RunnerInner>,
}

/// Assembles a [`ModuleRunner`].
pub struct RunnerBuilder {
    config: RunnerConfig,
    resolver_host: Option<Arc<dyn ResolverHost>>,
    transformer: Option<Arc<dyn Transformer>>,
    evaluator: Option<Arc<dyn ModuleEvaluator>>,
    global_mocks: Option<SharedMockMap>,
}

impl RunnerBuilder {
    /// Start from a configuration
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            resolver_host: None,
            transformer: None,
            evaluator: None,
            global_mocks: None,
        }
    }

    /// Resolve through `host` instead of the filesystem
    pub fn resolver_host(mut self, host: Arc<dyn ResolverHost>) -> Self {
        self.resolver_host = Some(host);
        self
    }

    /// Fetch code through `transformer` instead of reading files as-is
    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Use one object as both resolver host and transformer
    pub fn host<H>(self, host: Arc<H>) -> Self
    where
        H: ResolverHost + Transformer + 'static,
    {
        self.resolver_host(host.clone()).transformer(host)
    }

    /// Run module bodies with `evaluator` (required)
    pub fn evaluator(mut self, evaluator: Arc<dyn ModuleEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Share a global mock map with other runners
    pub fn global_mocks(mut self, mocks: SharedMockMap) -> Self {
        self.global_mocks = Some(mocks);
        self
    }

    /// Build the runner
    pub fn build(self) -> Result<ModuleRunner> {
        let evaluator = self
            .evaluator
            .ok_or_else(|| RunnerError::Config("a module evaluator is required".to_string()))?;
        let external = self.config.external_patterns()?;
        let host = self
            .resolver_host
            .unwrap_or_else(|| Arc::new(FsResolverHost::new()));
        let transformer = self
            .transformer
            .unwrap_or_else(|| Arc::new(FsTransformer::new()));
        let mocks = MockDirectory::new(
            self.config.root.clone(),
            self.config.mocks_dir.clone(),
            self.global_mocks.unwrap_or_default(),
        );

        let instance = Uuid::new_v4();
        info!(%instance, root = %self.config.root.display(), isolate = self.config.isolate, "module runner created");

        Ok(ModuleRunner {
            inner: Arc::new(RunnerInner {
                instance,
                root_importer: self.config.root_importer(),
                config: self.config,
                resolver: ModuleResolver::new(host, external),
                transformer,
                evaluator,
                cache: ModuleCache::new(),
                mocks,
                mock_resolution: tokio::sync::Mutex::new(()),
            }),
        })
    }
}

impl ModuleRunner {
    /// Start building a runner
    pub fn builder(config: RunnerConfig) -> RunnerBuilder {
        RunnerBuilder::new(config)
    }

    /// Unique id of this runner
    pub fn instance_id(&self) -> Uuid {
        self.inner.instance
    }

    /// The configuration the runner was built with
    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    /// The module cache
    pub fn cache(&self) -> &ModuleCache {
        &self.inner.cache
    }

    /// The mock directory
    pub fn mocks(&self) -> &MockDirectory {
        &self.inner.mocks
    }

    /// The resolver
    pub fn resolver(&self) -> &ModuleResolver {
        &self.inner.resolver
    }

    // Entry points

    /// Import `specifier` from the project root, honoring mocks.
    pub async fn import(&self, specifier: &str) -> Result<ModuleHandle> {
        self.dependency_request(specifier, &self.inner.root_importer, &[])
            .await
    }

    /// Import the real module behind `specifier`, ignoring mocks.
    pub async fn import_actual(&self, specifier: &str) -> Result<ObjectRef> {
        self.import_actual_from(specifier, &self.inner.root_importer, &[])
            .await
    }

    /// Import the mocked form of `specifier`, whether or not it is registered.
    pub async fn import_mock(&self, specifier: &str) -> Result<ModuleHandle> {
        self.import_mock_from(specifier, &self.inner.root_importer, &[])
            .await
    }

    /// Register a mock from outside any module (setup files, the harness).
    pub fn mock(&self, specifier: &str, factory: Option<MockFactory>) {
        self.queue_mock(specifier, &self.inner.root_importer, factory);
    }

    /// Remove a mock from outside any module.
    pub fn unmock(&self, specifier: &str) {
        self.queue_unmock(specifier, &self.inner.root_importer);
    }

    /// Queue `mock(specifier, factory?)` as called from `importer`.
    pub fn queue_mock(&self, specifier: &str, importer: &str, factory: Option<MockFactory>) {
        trace!(specifier, importer, factory = factory.is_some(), "mock queued");
        self.inner.mocks.queue_mock(specifier, importer, factory);
    }

    /// Queue `unmock(specifier)` as called from `importer`.
    pub fn queue_unmock(&self, specifier: &str, importer: &str) {
        trace!(specifier, importer, "unmock queued");
        self.inner.mocks.queue_unmock(specifier, importer);
    }

    // Dependency request pipeline

    /// Resolve `specifier` from `importer` and load it, mocked or real.
    pub async fn dependency_request(
        &self,
        specifier: &str,
        importer: &str,
        callstack: &[String],
    ) -> Result<ModuleHandle> {
        self.resolve_pending_mocks().await?;
        let resolved = self.inner.resolver.resolve(specifier, importer).await?;

        if !callstack.is_empty() {
            self.inner.cache.add_importer(&resolved.id, importer);
        }

        self.request_with_mock(&resolved, callstack).await
    }

    /// Load a resolved module, substituting its registered mock if any.
    pub async fn request_with_mock(
        &self,
        resolved: &ResolvedId,
        callstack: &[String],
    ) -> Result<ModuleHandle> {
        match self.inner.mocks.get_dependency_mock(&resolved.id) {
            None => {
                let exports = self.request(resolved, callstack).await?;
                Ok(ModuleHandle::new(&resolved.id, exports, ModuleOrigin::Real))
            }
            Some(entry) => self.mocked(resolved, entry, callstack).await,
        }
    }

    pub(crate) async fn import_actual_from(
        &self,
        specifier: &str,
        importer: &str,
        callstack: &[String],
    ) -> Result<ObjectRef> {
        self.resolve_pending_mocks().await?;
        let resolved = self.inner.resolver.resolve(specifier, importer).await?;
        self.request(&resolved, callstack).await
    }

    pub(crate) async fn import_mock_from(
        &self,
        specifier: &str,
        importer: &str,
        callstack: &[String],
    ) -> Result<ModuleHandle> {
        self.resolve_pending_mocks().await?;
        let resolved = self.inner.resolver.resolve(specifier, importer).await?;
        let entry = match self.inner.mocks.get_dependency_mock(&resolved.id) {
            Some(entry) => entry,
            None => {
                self.inner
                    .mocks
                    .classify(&resolved.id, specifier, resolved.external)
                    .await
            }
        };
        self.mocked(&resolved, entry, callstack).await
    }

    /// Apply queued `mock()`/`unmock()` calls. Requests arriving meanwhile
    /// wait, so none of them reads a stale registration.
    async fn resolve_pending_mocks(&self) -> Result<()> {
        let _applying = self.inner.mock_resolution.lock().await;
        if self.inner.mocks.pending_len() == 0 {
            return Ok(());
        }

        let touched = self.inner.mocks.resolve_mocks(&self.inner.resolver).await?;
        for id in &touched {
            if self.inner.cache.delete(&mock_path(id)).is_some() {
                debug!(id = %id, "dropped stale mocked module");
            }
        }
        Ok(())
    }

    async fn mocked(
        &self,
        resolved: &ResolvedId,
        entry: MockEntry,
        callstack: &[String],
    ) -> Result<ModuleHandle> {
        match entry {
            MockEntry::Auto => {
                let exports = self.auto_mocked(resolved, callstack).await?;
                Ok(ModuleHandle::new(&resolved.id, exports, ModuleOrigin::Auto))
            }
            MockEntry::Factory(factory) => self.factory_mocked(resolved, factory, callstack).await,
            MockEntry::Redirect(path) => {
                // Resolved against itself so the replacement's own relative
                // imports are relative to the replacement.
                let target = self.inner.resolver.resolve(&path, &path).await?;
                trace!(id = %resolved.id, redirect = %target.id, "redirected mock");
                let exports = self.request(&target, callstack).await?;
                Ok(ModuleHandle::new(&resolved.id, exports, ModuleOrigin::Redirect))
            }
        }
    }

    async fn auto_mocked(&self, resolved: &ResolvedId, callstack: &[String]) -> Result<ObjectRef> {
        let key = mock_path(&resolved.id);
        let runner = self.clone();
        let real = resolved.clone();
        let mut stack = callstack.to_vec();
        stack.push(key.clone());

        self.coalesced(&key, false, callstack, move |target| {
            async move {
                let exports = runner.request(&real, &stack).await?;
                Ok(mock_object(&exports, Some(target)))
            }
            .boxed()
        })
        .await
    }

    async fn factory_mocked(
        &self,
        resolved: &ResolvedId,
        factory: MockFactory,
        callstack: &[String],
    ) -> Result<ModuleHandle> {
        let key = mock_path(&resolved.id);

        // The factory is importing the module it replaces
        if callstack.contains(&key) {
            let exports = self.request(resolved, callstack).await?;
            return Ok(ModuleHandle::new(&resolved.id, exports, ModuleOrigin::Real));
        }

        let id = resolved.id.clone();
        let runner = self.clone();
        let mut stack = callstack.to_vec();
        stack.push(key.clone());

        let exports = self
            .coalesced(&key, false, callstack, move |_| {
                async move {
                    debug!(id = %id, "running mock factory");
                    let context = FactoryContext::new(id.clone(), runner, stack);
                    let value = factory.call(context).await.map_err(|err| RunnerError::MockFactory {
                        id: id.clone(),
                        message: err.to_string(),
                    })?;

                    // Cached as returned, never merged with the real exports
                    match value {
                        Value::Object(object) => Ok(object),
                        other => Err(RunnerError::MockShape {
                            id,
                            received: other.describe().to_string(),
                        }),
                    }
                }
                .boxed()
            })
            .await?;

        Ok(ModuleHandle::new(&resolved.id, exports, ModuleOrigin::Factory))
    }

    // Loader

    /// Load a resolved module, ignoring mocks.
    ///
    /// `callstack` lists the modules whose bodies are waiting on this
    /// request, outermost first.
    pub async fn request(&self, resolved: &ResolvedId, callstack: &[String]) -> Result<ObjectRef> {
        let runner = self.clone();
        let id = resolved.id.clone();
        let external = resolved.external;
        let stack = callstack.to_vec();

        self.coalesced(&resolved.id, external, callstack, move |exports| {
            runner.execute(id, external, exports, stack).boxed()
        })
        .await
    }

    /// Return cached exports for `key`, join its in-flight load, or start
    /// `job` to fill a fresh exports object. The object `job` resolves to is
    /// what gets cached; usually the one it was handed.
    async fn coalesced<F>(
        &self,
        key: &str,
        external: bool,
        callstack: &[String],
        job: F,
    ) -> Result<ObjectRef>
    where
        F: FnOnce(ObjectRef) -> BoxFuture<'static, Result<ObjectRef>> + Send + 'static,
    {
        // Checked before joining a pending load: a module waiting on itself
        // would never finish.
        if callstack.iter().any(|caller| caller == key) {
            return match self.inner.cache.exports(key) {
                Some(exports) => {
                    trace!(id = key, "circular import, binding partial exports");
                    Ok(exports)
                }
                None => Err(RunnerError::circular(callstack, key)),
            };
        }

        let runner = self.clone();
        let owned_key = key.to_string();
        let claim = self.inner.cache.claim(key, external, move |exports| {
            let placeholder = exports.clone();
            async move {
                match job(exports).await {
                    Ok(settled) => {
                        runner.inner.cache.settle_as(&owned_key, &placeholder, settled.clone());
                        debug!(id = %owned_key, "module settled");
                        Ok(settled)
                    }
                    Err(err) => {
                        warn!(id = %owned_key, error = %err, retryable = err.is_retryable(), "module failed to load");
                        runner.inner.cache.evict(&owned_key, &placeholder);
                        Err(err)
                    }
                }
            }
            .boxed()
            .shared()
        });

        match claim {
            Claim::Ready(exports) => {
                trace!(id = key, "module cache hit");
                Ok(exports)
            }
            Claim::Pending(load) => {
                // The pending module already imports the requester, directly
                // or not: waiting would close a cycle across two requests.
                if !callstack.is_empty() && self.inner.cache.dependents(callstack).contains(key) {
                    if let Some(exports) = self.inner.cache.exports(key) {
                        trace!(id = key, "pending module imports requester, binding partial exports");
                        return Ok(exports);
                    }
                }
                trace!(id = key, "joining in-flight load");
                load.await
            }
            Claim::Started(load) => {
                debug!(instance = %self.inner.instance, id = key, external, "loading module");
                load.await
            }
        }
    }

    async fn execute(
        self,
        id: String,
        external: bool,
        exports: ObjectRef,
        mut callstack: Vec<String>,
    ) -> Result<ObjectRef> {
        callstack.push(id.clone());

        if external {
            let context =
                ModuleContext::new(self.clone(), id, ModuleFormat::Esm, exports.clone(), callstack);
            self.inner.evaluator.evaluate_external(context).await?;
            return Ok(exports);
        }

        let source = self.inner.transformer.fetch(&id).await?;
        self.inner.cache.update_current(&id, &exports, |entry| {
            entry.source_code = Some(source.code.clone());
            entry.source_map = source.map.clone();
            entry.format = Some(source.format);
        });

        if source.format == ModuleFormat::Cjs {
            exports.set_kind(ObjectKind::Plain);
        }

        trace!(id = %id, format = ?source.format, "executing module");
        let context = ModuleContext::new(self.clone(), id, source.format, exports.clone(), callstack);
        self.inner.evaluator.evaluate(context, source).await?;
        Ok(exports)
    }

    // Invalidation

    /// Switch to another suite file.
    ///
    /// Mocked modules are always dropped so factories run once per suite
    /// file. With `isolate`, every non-external module is dropped too.
    pub fn set_suite_file(&self, file: Option<&str>) {
        self.inner.mocks.set_suite_file(file.map(String::from));
        if self.inner.config.isolate {
            self.reset_modules(true);
        } else {
            self.inner.cache.clear_mocks();
        }
        debug!(instance = %self.inner.instance, suite = ?file, "suite file changed");
    }

    /// Drop `ids` and their mocked forms from the cache.
    pub fn invalidate(&self, ids: &[String]) -> HashSet<String> {
        let removed = self.inner.cache.invalidate(ids);
        debug!(count = removed.len(), "invalidated modules");
        removed
    }

    /// Drop `ids`, every module that transitively imported them, and all of
    /// their mocked forms.
    pub fn invalidate_dep_tree(&self, ids: &[String]) -> HashSet<String> {
        let removed = self.inner.cache.invalidate_dep_tree(ids);
        debug!(count = removed.len(), "invalidated module tree");
        removed
    }

    /// Invalidate the modules behind changed filesystem paths.
    pub fn invalidate_paths(&self, paths: &[PathBuf]) -> HashSet<String> {
        let ids: Vec<String> = paths
            .iter()
            .map(|path| canonicalize_id(&path.to_string_lossy()))
            .collect();
        let forgotten: HashSet<String> = ids.iter().cloned().collect();
        self.inner.resolver.forget(&forgotten);
        self.invalidate_dep_tree(&ids)
    }

    /// Drop every non-external module and all remembered resolutions.
    /// Mocked modules survive unless `reset_mocks`.
    pub fn reset_modules(&self, reset_mocks: bool) {
        self.inner.cache.reset(reset_mocks);
        self.inner.resolver.clear();
        debug!(instance = %self.inner.instance, reset_mocks, "modules reset");
    }
}
