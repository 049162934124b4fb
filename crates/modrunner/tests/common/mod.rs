// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shared fixtures: an in-memory host and a scripted evaluator

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::future::{BoxFuture, FutureExt};
use modrunner::{
    ModuleContext, ModuleEvaluator, ModuleRunner, ResolvedId, ResolverHost, Result, RunnerConfig,
    RunnerError, TransformResult, Transformer, Value,
};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const ROOT: &str = "/project";

/// Modules held in memory, keyed by absolute id
#[derive(Default)]
pub struct MemoryHost {
    files: DashMap<String, String>,
    fetches: DashMap<String, usize>,
    fail_once: DashSet<String>,
    resolutions: AtomicUsize,
}

impl MemoryHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, id: &str, code: &str) {
        self.files.insert(id.to_string(), code.to_string());
    }

    /// The next fetch of `id` fails
    pub fn fail_next_fetch(&self, id: &str) {
        self.fail_once.insert(id.to_string());
    }

    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetches.get(id).map(|count| *count).unwrap_or(0)
    }

    pub fn resolve_count(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    fn lookup(&self, candidate: &str) -> Option<String> {
        if self.files.contains_key(candidate) {
            return Some(candidate.to_string());
        }
        let with_ext = format!("{}.js", candidate);
        self.files.contains_key(&with_ext).then_some(with_ext)
    }
}

#[async_trait]
impl ResolverHost for MemoryHost {
    async fn resolve_id(&self, specifier: &str, importer: &str) -> Result<Option<ResolvedId>> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        let candidate = if specifier.starts_with('/') {
            specifier.to_string()
        } else if specifier.starts_with('.') {
            join(importer, specifier)
        } else {
            format!("{}/node_modules/{}/index.js", ROOT, specifier)
        };
        Ok(self.lookup(&candidate).map(ResolvedId::new))
    }
}

#[async_trait]
impl Transformer for MemoryHost {
    async fn fetch(&self, id: &str) -> Result<TransformResult> {
        *self.fetches.entry(id.to_string()).or_insert(0) += 1;
        if self.fail_once.remove(id).is_some() {
            return Err(RunnerError::transform(id, "transform crashed"));
        }
        match self.files.get(id) {
            Some(code) => Ok(TransformResult::esm(code.as_str())),
            None => Err(RunnerError::transform(id, "no such file")),
        }
    }
}

/// Resolve `specifier` against the directory of `importer`.
/// An importer ending in `/` is itself a directory.
fn join(importer: &str, specifier: &str) -> String {
    let mut parts: Vec<&str> = importer.split('/').filter(|p| !p.is_empty()).collect();
    if !importer.ends_with('/') {
        parts.pop();
    }
    for part in specifier.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

pub type Script = Arc<dyn Fn(ModuleContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Runs registered closures as module bodies.
///
/// Modules without a script have their code read as `name=value` lines, each
/// becoming an export. Values that parse as numbers become numbers.
#[derive(Default)]
pub struct ScriptedEvaluator {
    scripts: DashMap<String, Script>,
    runs: DashMap<String, usize>,
}

impl ScriptedEvaluator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script<F, Fut>(&self, id: &str, body: F)
    where
        F: Fn(ModuleContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.scripts
            .insert(id.to_string(), Arc::new(move |ctx| body(ctx).boxed()));
    }

    pub fn run_count(&self, id: &str) -> usize {
        self.runs.get(id).map(|count| *count).unwrap_or(0)
    }

    fn record(&self, id: &str) {
        *self.runs.entry(id.to_string()).or_insert(0) += 1;
    }
}

#[async_trait]
impl ModuleEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, context: ModuleContext, source: TransformResult) -> Result<()> {
        self.record(context.id());
        let script = self.scripts.get(context.id()).map(|s| Arc::clone(&*s));
        if let Some(script) = script {
            return script(context).await;
        }

        for line in source.code.lines() {
            if let Some((name, value)) = line.split_once('=') {
                let value = match value.trim().parse::<f64>() {
                    Ok(number) => Value::Number(number),
                    Err(_) => Value::from(value.trim()),
                };
                context.set_export(name.trim(), value);
            }
        }
        Ok(())
    }

    async fn evaluate_external(&self, context: ModuleContext) -> Result<()> {
        self.record(context.id());
        let script = self.scripts.get(context.id()).map(|s| Arc::clone(&*s));
        match script {
            Some(script) => script(context).await,
            None => {
                let id = context.id().to_string();
                context.set_export("external", id);
                Ok(())
            }
        }
    }
}

/// A runner over `host` and `evaluator`, rooted at [`ROOT`]
pub fn runner(host: &Arc<MemoryHost>, evaluator: &Arc<ScriptedEvaluator>) -> ModuleRunner {
    runner_with(RunnerConfig::with_root(ROOT), host, evaluator)
}

pub fn runner_with(
    config: RunnerConfig,
    host: &Arc<MemoryHost>,
    evaluator: &Arc<ScriptedEvaluator>,
) -> ModuleRunner {
    ModuleRunner::builder(config)
        .host(Arc::clone(host))
        .evaluator(evaluator.clone())
        .build()
        .expect("runner builds")
}
