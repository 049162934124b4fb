// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Structural auto-mocking
//!
//! [`mock_object`] mirrors an object graph, replacing every function with a
//! call-recording stub. The rules:
//!
//! - arrays become empty arrays
//! - plain objects and module namespaces are walked recursively
//! - functions become zero-arity stubs returning `undefined`, with their
//!   static properties mirrored
//! - everything else, including class instances and thenables, passes
//!   through unchanged
//!
//! Each identity is mocked once per call. Later sightings of the same
//! object are patched in after the walk, which is what makes cycles
//! terminate and keeps shared structure shared.

use modrunner_values::{
    ArrayRef, FunctionRef, ObjectKind, ObjectRef, Property, PropertyKey, PropertySlot, Symbol,
    Value,
};
use std::collections::HashMap;
use tracing::trace;

/// Properties every function has that must not be mirrored onto a stub
const FUNCTION_META_KEYS: &[&str] = &["length", "name", "arguments", "caller", "callee", "prototype"];

/// Maps original identities to the mocks produced for them.
#[derive(Default)]
struct RefTracker {
    ids: HashMap<usize, usize>,
    mocks: Vec<Value>,
}

impl RefTracker {
    fn track(&mut self, identity: usize, mock: Value) -> usize {
        let id = self.mocks.len();
        self.mocks.push(mock);
        self.ids.insert(identity, id);
        id
    }

    fn get_id(&self, identity: usize) -> Option<usize> {
        self.ids.get(&identity).copied()
    }

    fn get_mock(&self, id: usize) -> Option<&Value> {
        self.mocks.get(id)
    }
}

/// Assign `tracker` mock `ref_id` to `object[key]` once the walk is over.
struct Finalizer {
    object: ObjectRef,
    key: PropertyKey,
    ref_id: usize,
}

struct Mocker {
    tracker: RefTracker,
    finalizers: Vec<Finalizer>,
}

/// Mirror `source` onto `target` (a fresh plain object when `None`) and
/// return the target.
pub fn mock_object(source: &ObjectRef, target: Option<ObjectRef>) -> ObjectRef {
    let target = target.unwrap_or_default();
    let mut mocker = Mocker {
        tracker: RefTracker::default(),
        finalizers: Vec::new(),
    };

    mocker
        .tracker
        .track(source.identity(), Value::Object(target.clone()));
    mocker.mirror(source, &target, false);

    for finalizer in &mocker.finalizers {
        if let Some(mock) = mocker.tracker.get_mock(finalizer.ref_id) {
            finalizer.object.set(finalizer.key.clone(), mock.clone());
        }
    }

    trace!(
        properties = target.len(),
        deferred = mocker.finalizers.len(),
        "auto-mocked object"
    );
    target
}

impl Mocker {
    fn mirror(&mut self, source: &ObjectRef, target: &ObjectRef, is_function: bool) {
        let is_module = source.kind() == ObjectKind::Module;

        for (key, property) in source.own_properties() {
            if is_function && is_function_meta(&key) {
                continue;
            }

            if is_reserved(&key) {
                target.define(key, property);
                continue;
            }

            // Hidden module exports are mirrored; hidden plain-object
            // properties are dropped.
            if !property.enumerable && !is_module {
                continue;
            }

            let value = match &property.slot {
                PropertySlot::Data(value) => value.clone(),
                PropertySlot::Accessor(getter) if is_module => getter(),
                PropertySlot::Accessor(_) => {
                    target.define(key, property);
                    continue;
                }
            };

            if let Some(ref_id) = value.identity().and_then(|identity| self.tracker.get_id(identity)) {
                self.finalizers.push(Finalizer {
                    object: target.clone(),
                    key,
                    ref_id,
                });
                continue;
            }

            let mock = self.mock_value(value);
            target.define(key, Property::data(mock).with_enumerable(property.enumerable));
        }
    }

    fn mock_value(&mut self, value: Value) -> Value {
        match value {
            Value::Array(array) => {
                let mock = Value::Array(ArrayRef::new());
                self.tracker.track(array.identity(), mock.clone());
                mock
            }
            Value::Function(function) if function.is_stub() => Value::Function(function),
            Value::Function(function) => {
                let stub = FunctionRef::stub(function.name());
                self.tracker
                    .track(function.identity(), Value::Function(stub.clone()));
                self.mirror(function.properties(), stub.properties(), true);
                Value::Function(stub)
            }
            Value::Object(object) if object.is_structural() && !object.is_thenable() => {
                let mock = ObjectRef::new();
                self.tracker
                    .track(object.identity(), Value::Object(mock.clone()));
                self.mirror(&object, &mock, false);
                Value::Object(mock)
            }
            other => other,
        }
    }
}

fn is_reserved(key: &PropertyKey) -> bool {
    match key {
        PropertyKey::Symbol(symbol) => *symbol == Symbol::ITERATOR || *symbol == Symbol::ASYNC_ITERATOR,
        PropertyKey::String(name) => name == "__esModule",
    }
}

fn is_function_meta(key: &PropertyKey) -> bool {
    key.as_str().is_some_and(|name| FUNCTION_META_KEYS.contains(&name))
}
