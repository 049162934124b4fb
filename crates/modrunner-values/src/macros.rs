// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Literal-style constructors for values.

/// Create a JavaScript-style object literal as an [`ObjectRef`](crate::ObjectRef).
///
/// Keys are anything convertible into a [`PropertyKey`](crate::PropertyKey);
/// values are anything convertible into a [`Value`](crate::Value).
///
/// # Example
///
/// ```
/// use modrunner_values::{js_object, Value};
///
/// let obj = js_object! {
///     "name" => "Alice",
///     "age" => 30,
/// };
///
/// assert_eq!(obj.get("name"), Value::from("Alice"));
/// assert_eq!(obj.get("age"), Value::Number(30.0));
/// ```
#[macro_export]
macro_rules! js_object {
    () => {
        $crate::ObjectRef::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let object = $crate::ObjectRef::new();
        $(object.set($key, $crate::Value::from($value));)+
        object
    }};
}

/// Create a JavaScript-style array literal as an [`ArrayRef`](crate::ArrayRef).
///
/// # Example
///
/// ```
/// use modrunner_values::{js_array, Value};
///
/// let arr = js_array![1, "two", true];
/// assert_eq!(arr.len(), 3);
/// assert_eq!(arr.get(1), Value::from("two"));
/// ```
#[macro_export]
macro_rules! js_array {
    () => {
        $crate::ArrayRef::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::ArrayRef::from_vec(vec![$($crate::Value::from($value)),+])
    };
}

#[cfg(test)]
mod tests {
    use crate::{FunctionRef, Value};

    #[test]
    fn test_nested_literals() {
        let obj = js_object! {
            "list" => js_array![1, 2],
            "inner" => js_object! { "f" => FunctionRef::stub("f") },
        };
        assert_eq!(obj.get("list").as_array().map(|a| a.len()), Some(2));
        let inner = obj.get("inner");
        assert!(inner.as_object().unwrap().get("f").is_function());
    }

    #[test]
    fn test_empty_literals() {
        assert!(js_object!().is_empty());
        assert!(js_array![].is_empty());
        assert!(!Value::from(js_object!()).is_nullish());
    }
}
