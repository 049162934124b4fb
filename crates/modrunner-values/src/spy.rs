// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Call-recording state behind stub functions.

use crate::Error;
use crate::runtime::function::NativeFunction;
use crate::runtime::value::Value;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// The outcome of one recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum SpyResult {
    /// The call returned a value
    Return(Value),
    /// The call failed
    Throw(Error),
}

#[derive(Default)]
struct SpyState {
    calls: Vec<Vec<Value>>,
    results: Vec<SpyResult>,
    implementation: Option<NativeFunction>,
    once: VecDeque<NativeFunction>,
    return_value: Option<Value>,
}

/// Records every call made to a stub and decides what the stub returns.
///
/// Resolution order for a call: queued one-shot implementations first, then
/// the permanent implementation, then the fixed return value, and finally
/// `undefined`.
#[derive(Default)]
pub struct Spy {
    state: Mutex<SpyState>,
}

impl Spy {
    /// Creates a spy with no implementation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call and runs the selected implementation.
    pub fn invoke(&self, this: &Value, args: &[Value]) -> Result<Value, Error> {
        let implementation = {
            let mut state = self.state.lock();
            state.calls.push(args.to_vec());
            match state.once.pop_front() {
                Some(once) => Some(once),
                None => state.implementation.clone(),
            }
        };

        // Implementations run unlocked; they may call back into this stub.
        let result = match implementation {
            Some(implementation) => implementation(this, args),
            None => Ok(self.state.lock().return_value.clone().unwrap_or_default()),
        };

        self.state.lock().results.push(match &result {
            Ok(value) => SpyResult::Return(value.clone()),
            Err(err) => SpyResult::Throw(err.clone()),
        });
        result
    }

    /// Arguments of every call so far.
    pub fn calls(&self) -> Vec<Vec<Value>> {
        self.state.lock().calls.clone()
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Outcomes of every completed call so far.
    pub fn results(&self) -> Vec<SpyResult> {
        self.state.lock().results.clone()
    }

    /// Installs a permanent implementation.
    pub fn mock_implementation<F>(&self, func: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.state.lock().implementation = Some(Arc::new(func));
    }

    /// Queues an implementation used for exactly one call.
    pub fn mock_implementation_once<F>(&self, func: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.state.lock().once.push_back(Arc::new(func));
    }

    /// Makes every call without an implementation return `value`.
    pub fn mock_return_value(&self, value: impl Into<Value>) {
        self.state.lock().return_value = Some(value.into());
    }

    /// Forgets recorded calls and results; keeps implementations.
    pub fn mock_clear(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.results.clear();
    }

    /// Forgets recorded calls, results and every implementation.
    pub fn mock_reset(&self) {
        *self.state.lock() = SpyState::default();
    }
}
