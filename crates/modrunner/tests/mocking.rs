// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Mock registration, factories, auto-mocks and `__mocks__` redirects

mod common;

use common::{MemoryHost, ScriptedEvaluator, runner};
use modrunner::module_system::mock_path;
use modrunner::{
    FunctionRef, MockFactory, ModuleOrigin, ModuleRunner, RunnerConfig, RunnerError, Value,
    js_array, js_object,
};
use modrunner_values::Property;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn constant_factory(exports: Value, calls: &Arc<AtomicUsize>) -> MockFactory {
    let calls = Arc::clone(calls);
    MockFactory::new(move |_| {
        let calls = Arc::clone(&calls);
        let exports = exports.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(exports)
        }
    })
}

#[tokio::test]
async fn test_factory_result_is_used_verbatim() {
    let host = MemoryHost::new();
    host.add("/project/src/a.js", "x=1\ndefault=2");
    host.add("/project/src/b.js", "");
    let evaluator = ScriptedEvaluator::new();
    evaluator.script("/project/src/b.js", |ctx| async move {
        let a = ctx.import("./a.js").await?;
        ctx.set_export("x", a.get("x"));
        ctx.set_export("default", a.get("default"));
        Ok(())
    });
    let runner = runner(&host, &evaluator);

    runner.set_suite_file(Some("/project/src/b.test.js"));
    let produced = js_object! { "x" => 99 };
    runner.mock("./src/a.js", Some(MockFactory::from_exports(produced.clone())));

    let b = runner.import("./src/b.js").await.unwrap();
    assert_eq!(b.get("x").unwrap(), Value::Number(99.0));
    assert_eq!(b.get("default").unwrap(), Value::Undefined);

    let a = runner.import("./src/a.js").await.unwrap();
    assert_eq!(a.origin(), ModuleOrigin::Factory);
    assert_eq!(evaluator.run_count("/project/src/a.js"), 0);
    assert!(runner.cache().has(&mock_path("/project/src/a.js")));

    // The cached module is the factory's own object, not a copy
    assert!(a.exports().ptr_eq(&produced));
    produced.set("late", 5);
    assert_eq!(a.get("late").unwrap(), Value::Number(5.0));
    let again = runner.import("./src/a.js").await.unwrap();
    assert!(again.exports().ptr_eq(&produced));
}

#[tokio::test]
async fn test_factory_runs_once_per_suite_file() {
    let host = MemoryHost::new();
    host.add("/project/src/a.js", "x=1");
    let evaluator = ScriptedEvaluator::new();
    let runner = runner(&host, &evaluator);
    let calls = Arc::new(AtomicUsize::new(0));

    // Registered outside any suite file, so it applies to every suite
    runner.mock(
        "./src/a.js",
        Some(constant_factory(Value::from(js_object! { "x" => 7 }), &calls)),
    );

    runner.set_suite_file(Some("/project/src/one.test.js"));
    let (first, second) = tokio::join!(runner.import("./src/a.js"), runner.import("./src/a.js"));
    let third = runner.import("./src/a.js").await.unwrap();
    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(first.exports().ptr_eq(second.exports()));
    assert!(first.exports().ptr_eq(third.exports()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    runner.set_suite_file(Some("/project/src/two.test.js"));
    let fourth = runner.import("./src/a.js").await.unwrap();
    assert_eq!(fourth.get("x").unwrap(), Value::Number(7.0));
    assert!(!fourth.exports().ptr_eq(first.exports()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_factory_failure_and_bad_shape() {
    let host = MemoryHost::new();
    host.add("/project/src/a.js", "x=1");
    host.add("/project/src/c.js", "x=1");
    let evaluator = ScriptedEvaluator::new();
    let runner = runner(&host, &evaluator);
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&attempts);
    runner.mock(
        "./src/a.js",
        Some(MockFactory::new(move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err(RunnerError::evaluation(ctx.id(), "helper is not defined")) }
        })),
    );
    runner.mock(
        "./src/c.js",
        Some(MockFactory::new(|_| async { Ok(Value::Number(1.0)) })),
    );

    let err = runner.import("./src/a.js").await.unwrap_err();
    match &err {
        RunnerError::MockFactory { id, message } => {
            assert_eq!(id, "/project/src/a.js");
            assert!(message.contains("helper is not defined"));
        }
        other => panic!("expected factory error, got {other:?}"),
    }
    assert!(err.to_string().contains("hoisted"));
    assert!(!runner.cache().has(&mock_path("/project/src/a.js")));

    // The failed mock was evicted, so the factory runs again
    runner.import("./src/a.js").await.unwrap_err();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    let err = runner.import("./src/c.js").await.unwrap_err();
    match err {
        RunnerError::MockShape { id, received } => {
            assert_eq!(id, "/project/src/c.js");
            assert_eq!(received, "number");
        }
        other => panic!("expected shape error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_factory_can_extend_original() {
    let host = MemoryHost::new();
    host.add("/project/src/a.js", "x=1\ny=2");
    let evaluator = ScriptedEvaluator::new();
    let runner = runner(&host, &evaluator);

    runner.mock(
        "./src/a.js",
        Some(MockFactory::new(|ctx| async move {
            let real = ctx.import_original().await?;
            let itself = ctx.import("./a.js").await?;
            assert!(itself.ptr_eq(&real));
            Ok(Value::from(js_object! {
                "x" => real.get("x"),
                "y" => 20,
            }))
        })),
    );

    let mocked = runner.import("./src/a.js").await.unwrap();
    assert_eq!(mocked.get("x").unwrap(), Value::Number(1.0));
    assert_eq!(mocked.get("y").unwrap(), Value::Number(20.0));

    let actual = runner.import_actual("./src/a.js").await.unwrap();
    assert_eq!(actual.get("y"), Value::Number(2.0));
    assert!(!actual.ptr_eq(mocked.exports()));
    assert_eq!(evaluator.run_count("/project/src/a.js"), 1);
}

#[tokio::test]
async fn test_suite_mock_shadows_global_mock() {
    let host = MemoryHost::new();
    host.add("/project/src/a.js", "v=real");
    let evaluator = ScriptedEvaluator::new();
    let runner = runner(&host, &evaluator);
    let calls = Arc::new(AtomicUsize::new(0));

    runner.mock(
        "./src/a.js",
        Some(constant_factory(Value::from(js_object! { "v" => "global" }), &calls)),
    );
    runner.set_suite_file(Some("/project/src/one.test.js"));
    runner.mock(
        "./src/a.js",
        Some(constant_factory(Value::from(js_object! { "v" => "suite" }), &calls)),
    );

    let module = runner.import("./src/a.js").await.unwrap();
    assert_eq!(module.get("v").unwrap(), Value::from("suite"));

    // Unmocking in the suite uncovers the global registration
    runner.unmock("./src/a.js");
    let module = runner.import("./src/a.js").await.unwrap();
    assert_eq!(module.get("v").unwrap(), Value::from("global"));

    runner.set_suite_file(None);
    runner.unmock("./src/a.js");
    let module = runner.import("./src/a.js").await.unwrap();
    assert_eq!(module.origin(), ModuleOrigin::Real);
    assert_eq!(module.get("v").unwrap(), Value::from("real"));
}

fn math_module(host: &MemoryHost, evaluator: &ScriptedEvaluator) {
    host.add("/project/src/math.js", "");
    evaluator.script("/project/src/math.js", |ctx| async move {
        ctx.set_export(
            "add",
            FunctionRef::native("add", 2, |_, args| {
                let sum: f64 = args.iter().filter_map(Value::as_number).sum();
                Ok(Value::Number(sum))
            }),
        );
        ctx.set_export("PI", 3.14);
        ctx.set_export(
            "config",
            js_object! {
                "level" => 1,
                "reset" => FunctionRef::native("reset", 0, |_, _| Ok(Value::Boolean(true))),
            },
        );
        ctx.set_export("history", js_array![1, 2, 3]);
        Ok(())
    });
}

#[tokio::test]
async fn test_auto_mock_replaces_functions_with_stubs() {
    let host = MemoryHost::new();
    let evaluator = ScriptedEvaluator::new();
    math_module(&host, &evaluator);
    let runner = runner(&host, &evaluator);

    runner.mock("./src/math.js", None);
    let math = runner.import("./src/math.js").await.unwrap();
    assert_eq!(math.origin(), ModuleOrigin::Auto);

    let add = math.get("add").unwrap();
    let add = add.as_function().unwrap();
    assert!(add.is_stub());
    assert_eq!(add.arity(), 0);
    assert_eq!(add.call(&Value::Undefined, &[Value::Number(1.0), Value::Number(2.0)]).unwrap(), Value::Undefined);
    assert_eq!(add.spy().unwrap().call_count(), 1);

    assert_eq!(math.get("PI").unwrap(), Value::Number(3.14));
    let config = math.get("config").unwrap();
    let config = config.as_object().unwrap();
    assert_eq!(config.get("level"), Value::Number(1.0));
    assert!(config.get("reset").as_function().unwrap().is_stub());
    assert!(math.get("history").unwrap().as_array().unwrap().is_empty());

    let err = math.get("subtract").unwrap_err();
    assert!(matches!(err, RunnerError::AutoMockAccess { ref export, .. } if export == "subtract"));
    assert_eq!(math.get("then").unwrap(), Value::Undefined);

    // The real module is untouched
    let actual = runner.import_actual("./src/math.js").await.unwrap();
    let real_add = actual.get("add");
    let real_add = real_add.as_function().unwrap();
    assert!(!real_add.is_stub());
    assert_eq!(real_add.call(&Value::Undefined, &[Value::Number(1.0), Value::Number(2.0)]).unwrap(), Value::Number(3.0));
    assert_eq!(evaluator.run_count("/project/src/math.js"), 1);
}

#[tokio::test]
async fn test_auto_mock_keeps_hidden_exports_readable() {
    let host = MemoryHost::new();
    host.add("/project/src/hidden.js", "");
    let evaluator = ScriptedEvaluator::new();
    evaluator.script("/project/src/hidden.js", |ctx| async move {
        ctx.set_export("visible", 1);
        let internal = FunctionRef::native("internal", 0, |_, _| Ok(Value::from(2)));
        ctx.exports()
            .define("internal", Property::data(Value::Function(internal)).with_enumerable(false));
        Ok(())
    });
    let runner = runner(&host, &evaluator);

    let mocked = runner.import_mock("./src/hidden.js").await.unwrap();
    assert_eq!(mocked.origin(), ModuleOrigin::Auto);
    let internal = mocked.get("internal").unwrap();
    assert!(internal.as_function().unwrap().is_stub());
    assert!(mocked.get("missing").is_err());
}

#[tokio::test]
async fn test_auto_mock_binding_is_strict_inside_modules() {
    let host = MemoryHost::new();
    let evaluator = ScriptedEvaluator::new();
    math_module(&host, &evaluator);
    host.add("/project/src/calc.js", "");
    evaluator.script("/project/src/calc.js", |ctx| async move {
        let add = ctx.import_binding("./math.js", "add").await?;
        ctx.set_export("add", add);
        ctx.import_binding("./math.js", "subtract").await?;
        Ok(())
    });
    let runner = runner(&host, &evaluator);

    runner.mock("./src/math.js", None);
    let err = runner.import("./src/calc.js").await.unwrap_err();
    assert!(err.to_string().contains("\"subtract\""));
}

#[tokio::test]
async fn test_import_mock_without_registration() {
    let host = MemoryHost::new();
    let evaluator = ScriptedEvaluator::new();
    math_module(&host, &evaluator);
    let runner = runner(&host, &evaluator);

    let mocked = runner.import_mock("./src/math.js").await.unwrap();
    assert_eq!(mocked.origin(), ModuleOrigin::Auto);
    assert!(mocked.get("add").unwrap().as_function().unwrap().is_stub());

    let real = runner.import("./src/math.js").await.unwrap();
    assert_eq!(real.origin(), ModuleOrigin::Real);
    assert!(!real.get("add").unwrap().as_function().unwrap().is_stub());
}

#[tokio::test]
async fn test_mocks_do_not_leak_between_runners() {
    let host = MemoryHost::new();
    host.add("/project/src/a.js", "x=1");
    let evaluator = ScriptedEvaluator::new();
    let first = runner(&host, &evaluator);
    let second = runner(&host, &evaluator);

    first.mock("./src/a.js", Some(MockFactory::from_exports(js_object! { "x" => 2 })));
    let mocked = first.import("./src/a.js").await.unwrap();
    let real = second.import("./src/a.js").await.unwrap();

    assert_eq!(mocked.get("x").unwrap(), Value::Number(2.0));
    assert_eq!(real.get("x").unwrap(), Value::Number(1.0));
    assert_ne!(first.instance_id(), second.instance_id());
}

#[tokio::test]
async fn test_mocks_dir_redirects() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::create_dir_all(root.join("src/__mocks__")).unwrap();
    fs::create_dir_all(root.join("__mocks__")).unwrap();
    fs::create_dir_all(root.join("node_modules/lodash")).unwrap();
    fs::write(root.join("src/api.js"), "name=real").unwrap();
    fs::write(root.join("src/__mocks__/api.js"), "name=mock").unwrap();
    fs::write(root.join("node_modules/lodash/index.js"), "name=lodash").unwrap();
    fs::write(root.join("__mocks__/lodash.js"), "name=lodash-mock").unwrap();

    let evaluator = ScriptedEvaluator::new();
    let runner = ModuleRunner::builder(RunnerConfig::with_root(&root))
        .evaluator(evaluator.clone())
        .build()
        .unwrap();

    runner.mock("./src/api.js", None);
    runner.mock("lodash", None);

    let api = runner.import("./src/api.js").await.unwrap();
    assert_eq!(api.origin(), ModuleOrigin::Redirect);
    assert_eq!(api.get("name").unwrap(), Value::from("mock"));
    let actual = runner.import_actual("./src/api.js").await.unwrap();
    assert_eq!(actual.get("name"), Value::from("real"));

    let lodash = runner.import("lodash").await.unwrap();
    assert_eq!(lodash.origin(), ModuleOrigin::Redirect);
    assert_eq!(lodash.get("name").unwrap(), Value::from("lodash-mock"));
}
