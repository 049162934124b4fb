// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! JavaScript function representation.

use super::object::ObjectRef;
use super::value::Value;
use crate::Error;
use crate::spy::Spy;
use std::fmt;
use std::sync::Arc;

/// A native (Rust) function body. Receives `this` and the call arguments.
pub type NativeFunction = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, Error> + Send + Sync>;

/// What runs when a function is called.
pub enum Callable {
    /// A native Rust closure
    Native(NativeFunction),
    /// A call-recording stub
    Stub(Spy),
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(_) => write!(f, "Native"),
            Callable::Stub(spy) => write!(f, "Stub(calls = {})", spy.call_count()),
        }
    }
}

#[derive(Debug)]
struct FunctionData {
    name: String,
    arity: usize,
    callable: Callable,
    /// Own (static) properties of the function object
    statics: ObjectRef,
}

/// A shared handle to a JavaScript function.
#[derive(Clone)]
pub struct FunctionRef(Arc<FunctionData>);

impl FunctionRef {
    /// Creates a native function.
    pub fn native<F>(name: impl Into<String>, arity: usize, func: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self::from_callable(name, arity, Callable::Native(Arc::new(func)))
    }

    /// Creates a stub that records its calls and returns `undefined` until an
    /// implementation is installed. Stubs report an arity of zero.
    pub fn stub(name: impl Into<String>) -> Self {
        Self::from_callable(name, 0, Callable::Stub(Spy::new()))
    }

    fn from_callable(name: impl Into<String>, arity: usize, callable: Callable) -> Self {
        Self(Arc::new(FunctionData {
            name: name.into(),
            arity,
            callable,
            statics: ObjectRef::new(),
        }))
    }

    /// The function name (empty for anonymous functions).
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Returns the arity (the `length` property).
    pub fn arity(&self) -> usize {
        self.0.arity
    }

    /// The function's own property bag (statics such as `Foo.create`).
    pub fn properties(&self) -> &ObjectRef {
        &self.0.statics
    }

    /// Returns true if this function is a call-recording stub.
    pub fn is_stub(&self) -> bool {
        matches!(self.0.callable, Callable::Stub(_))
    }

    /// The spy behind a stub, or `None` for native functions.
    pub fn spy(&self) -> Option<&Spy> {
        match &self.0.callable {
            Callable::Stub(spy) => Some(spy),
            Callable::Native(_) => None,
        }
    }

    /// Calls the function.
    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value, Error> {
        match &self.0.callable {
            Callable::Native(func) => func(this, args),
            Callable::Stub(spy) => spy.invoke(this, args),
        }
    }

    /// Returns true if both handles point at the same function.
    pub fn ptr_eq(&self, other: &FunctionRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A stable identity for this function, valid while any handle is alive.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRef")
            .field("name", &self.0.name)
            .field("arity", &self.0.arity)
            .field("callable", &self.0.callable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add() -> FunctionRef {
        FunctionRef::native("add", 2, |_this, args| {
            let sum = args.iter().filter_map(Value::as_number).sum::<f64>();
            Ok(Value::Number(sum))
        })
    }

    #[test]
    fn test_native_call() {
        let func = add();
        let result = func.call(&Value::Undefined, &[Value::from(2), Value::from(3)]).unwrap();
        assert_eq!(result, Value::Number(5.0));
        assert_eq!(func.arity(), 2);
        assert!(!func.is_stub());
        assert!(func.spy().is_none());
    }

    #[test]
    fn test_native_error_propagates() {
        let func = FunctionRef::native("fail", 0, |_, _| Err(Error::thrown("nope")));
        assert_eq!(func.call(&Value::Undefined, &[]), Err(Error::thrown("nope")));
    }

    #[test]
    fn test_stub_defaults() {
        let stub = FunctionRef::stub("fetchUser");
        assert_eq!(stub.name(), "fetchUser");
        assert_eq!(stub.arity(), 0);
        assert!(stub.is_stub());
        assert!(stub.call(&Value::Undefined, &[Value::from(1)]).unwrap().is_undefined());
        assert_eq!(stub.spy().unwrap().calls(), vec![vec![Value::from(1)]]);
    }

    #[test]
    fn test_statics_are_shared() {
        let func = add();
        let alias = func.clone();
        alias.properties().set("version", "1.0");
        assert_eq!(func.properties().get("version"), Value::from("1.0"));
        assert!(func.ptr_eq(&alias));
    }

    #[test]
    fn test_debug_output() {
        let debug = format!("{:?}", FunctionRef::stub("myFunc"));
        assert!(debug.contains("myFunc"));
        assert!(debug.contains("Stub"));
    }
}
