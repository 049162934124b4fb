// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! JavaScript object representation.
//!
//! An [`ObjectRef`] is a shared handle: every clone points at the same
//! property table, and writes through one handle are visible through all
//! others. Module exports rely on this to stay observable while a module
//! body is still running.

use super::symbol::Symbol;
use super::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A property key: either a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String-keyed property
    String(String),
    /// Symbol-keyed property
    Symbol(Symbol),
}

impl PropertyKey {
    /// Returns the key as a string slice, if it is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            PropertyKey::Symbol(_) => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Symbol(symbol) => write!(f, "[{}]", symbol),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::String(s)
    }
}

impl From<&String> for PropertyKey {
    fn from(s: &String) -> Self {
        PropertyKey::String(s.clone())
    }
}

impl From<Symbol> for PropertyKey {
    fn from(symbol: Symbol) -> Self {
        PropertyKey::Symbol(symbol)
    }
}

/// A property getter.
pub type Getter = Arc<dyn Fn() -> Value + Send + Sync>;

/// Where a property's value comes from.
#[derive(Clone)]
pub enum PropertySlot {
    /// A plain stored value
    Data(Value),
    /// A value computed on every read
    Accessor(Getter),
}

impl fmt::Debug for PropertySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertySlot::Data(value) => f.debug_tuple("Data").field(value).finish(),
            PropertySlot::Accessor(_) => f.write_str("Accessor(<getter>)"),
        }
    }
}

/// A property descriptor.
#[derive(Debug, Clone)]
pub struct Property {
    /// The property value or getter
    pub slot: PropertySlot,
    /// Whether the property is writable
    pub writable: bool,
    /// Whether the property is enumerable
    pub enumerable: bool,
    /// Whether the property is configurable
    pub configurable: bool,
}

impl Property {
    /// A writable, enumerable, configurable data property.
    pub fn data(value: Value) -> Self {
        Self {
            slot: PropertySlot::Data(value),
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// An enumerable getter property.
    pub fn getter(getter: Getter) -> Self {
        Self {
            slot: PropertySlot::Accessor(getter),
            writable: false,
            enumerable: true,
            configurable: true,
        }
    }

    /// Returns a copy of this property with the given enumerability.
    pub fn with_enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = enumerable;
        self
    }

    /// Returns true if the property is backed by a getter.
    pub fn is_accessor(&self) -> bool {
        matches!(self.slot, PropertySlot::Accessor(_))
    }
}

/// What kind of object this is. Only plain objects and module namespaces are
/// structurally walked by the auto-mocker; instances pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    /// `{}` literal or `Object.create(Object.prototype)`
    Plain,
    /// A module namespace object (the exports of an ES module)
    Module,
    /// An instance of a class, identified by the class name
    Instance(String),
}

#[derive(Debug)]
struct ObjectData {
    kind: ObjectKind,
    properties: IndexMap<PropertyKey, Property>,
    extensible: bool,
}

/// A shared handle to a JavaScript object.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<ObjectData>>);

impl ObjectRef {
    /// Creates a new empty plain object.
    pub fn new() -> Self {
        Self::with_kind(ObjectKind::Plain)
    }

    /// Creates a new empty module namespace object.
    pub fn module_namespace() -> Self {
        Self::with_kind(ObjectKind::Module)
    }

    /// Creates a new empty instance of the named class.
    pub fn instance(class: impl Into<String>) -> Self {
        Self::with_kind(ObjectKind::Instance(class.into()))
    }

    /// Creates a new empty object of the given kind.
    pub fn with_kind(kind: ObjectKind) -> Self {
        Self(Arc::new(RwLock::new(ObjectData {
            kind,
            properties: IndexMap::new(),
            extensible: true,
        })))
    }

    /// The object's kind.
    pub fn kind(&self) -> ObjectKind {
        self.0.read().kind.clone()
    }

    /// Changes the object's kind in place. Used when a module's format is only
    /// known after its exports object has already been handed out.
    pub fn set_kind(&self, kind: ObjectKind) {
        self.0.write().kind = kind;
    }

    /// Returns true for plain objects and module namespaces.
    pub fn is_structural(&self) -> bool {
        matches!(self.0.read().kind, ObjectKind::Plain | ObjectKind::Module)
    }

    /// Reads a property, running its getter if it has one. Missing
    /// properties read as `undefined`.
    pub fn get(&self, key: impl Into<PropertyKey>) -> Value {
        self.get_own(key).unwrap_or_default()
    }

    /// Reads an own property, or `None` if the object does not have it.
    pub fn get_own(&self, key: impl Into<PropertyKey>) -> Option<Value> {
        let key = key.into();
        // The getter runs without the lock held so it may read this object.
        let slot = self.0.read().properties.get(&key).map(|p| p.slot.clone())?;
        Some(match slot {
            PropertySlot::Data(value) => value,
            PropertySlot::Accessor(getter) => getter(),
        })
    }

    /// Returns a copy of an own property descriptor.
    pub fn get_own_property(&self, key: impl Into<PropertyKey>) -> Option<Property> {
        self.0.read().properties.get(&key.into()).cloned()
    }

    /// Sets a data property, replacing any existing property under that key.
    /// Ignored when the object is not extensible and the key is new.
    pub fn set(&self, key: impl Into<PropertyKey>, value: impl Into<Value>) {
        self.define(key, Property::data(value.into()));
    }

    /// Defines a property from a full descriptor.
    pub fn define(&self, key: impl Into<PropertyKey>, property: Property) -> bool {
        let key = key.into();
        let mut data = self.0.write();
        if !data.extensible && !data.properties.contains_key(&key) {
            return false;
        }
        data.properties.insert(key, property);
        true
    }

    /// Defines an enumerable getter.
    pub fn define_getter(&self, key: impl Into<PropertyKey>, getter: impl Fn() -> Value + Send + Sync + 'static) {
        self.define(key, Property::getter(Arc::new(getter)));
    }

    /// Deletes a property.
    pub fn delete(&self, key: impl Into<PropertyKey>) -> bool {
        let key = key.into();
        let mut data = self.0.write();
        match data.properties.get(&key) {
            Some(prop) if prop.configurable => {
                data.properties.shift_remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Checks if an own property exists.
    pub fn has(&self, key: impl Into<PropertyKey>) -> bool {
        self.0.read().properties.contains_key(&key.into())
    }

    /// Own enumerable keys, in insertion order.
    pub fn keys(&self) -> Vec<PropertyKey> {
        self.0
            .read()
            .properties
            .iter()
            .filter(|(_, prop)| prop.enumerable)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// A snapshot of every own property, in insertion order.
    pub fn own_properties(&self) -> Vec<(PropertyKey, Property)> {
        self.0
            .read()
            .properties
            .iter()
            .map(|(key, prop)| (key.clone(), prop.clone()))
            .collect()
    }

    /// Number of own properties.
    pub fn len(&self) -> usize {
        self.0.read().properties.len()
    }

    /// Returns true if the object has no own properties.
    pub fn is_empty(&self) -> bool {
        self.0.read().properties.is_empty()
    }

    /// Prevents new properties from being added.
    pub fn prevent_extensions(&self) {
        self.0.write().extensible = false;
    }

    /// Whether new properties can be added.
    pub fn is_extensible(&self) -> bool {
        self.0.read().extensible
    }

    /// Returns true if the object exposes a callable `then`, which is how
    /// thenables are recognized. This is a heuristic: an ordinary object
    /// with a `then` method is indistinguishable from a promise.
    pub fn is_thenable(&self) -> bool {
        self.get_own("then").is_some_and(|then| then.is_function())
    }

    /// Returns true if both handles point at the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A stable identity for this object, valid while any handle is alive.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectRef {
    // Objects may be cyclic, so only the top level is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.read();
        let keys: Vec<String> = data.properties.keys().map(|k| k.to_string()).collect();
        f.debug_struct("ObjectRef")
            .field("kind", &data.kind)
            .field("keys", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_writes_are_shared_between_handles() {
        let exports = ObjectRef::module_namespace();
        let alias = exports.clone();
        alias.set("x", 1);
        assert_eq!(exports.get("x"), Value::Number(1.0));
        assert!(exports.ptr_eq(&alias));
        assert_eq!(exports.identity(), alias.identity());
    }

    #[test]
    fn test_missing_property_is_undefined() {
        let object = ObjectRef::new();
        assert!(object.get("nope").is_undefined());
        assert!(object.get_own("nope").is_none());
    }

    #[test]
    fn test_getter_runs_on_every_read() {
        let reads = Arc::new(AtomicUsize::new(0));
        let object = ObjectRef::new();
        let counter = Arc::clone(&reads);
        object.define_getter("value", move || Value::from(counter.fetch_add(1, Ordering::SeqCst) as u32));

        assert_eq!(object.get("value"), Value::Number(0.0));
        assert_eq!(object.get("value"), Value::Number(1.0));
        assert!(object.get_own_property("value").unwrap().is_accessor());
    }

    #[test]
    fn test_getter_can_read_its_own_object() {
        let object = ObjectRef::new();
        object.set("base", 2);
        let this = object.clone();
        object.define_getter("double", move || {
            Value::from(this.get("base").as_number().unwrap_or(0.0) * 2.0)
        });
        assert_eq!(object.get("double"), Value::Number(4.0));
    }

    #[test]
    fn test_keys_keep_insertion_order_and_skip_non_enumerable() {
        let object = ObjectRef::new();
        object.set("b", 1);
        object.set("a", 2);
        object.define("hidden", Property::data(Value::Null).with_enumerable(false));
        object.set(Symbol::ITERATOR, Value::Null);

        let keys = object.keys();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0], PropertyKey::from("b"));
        assert_eq!(keys[1], PropertyKey::from("a"));
        assert_eq!(keys[2], PropertyKey::Symbol(Symbol::ITERATOR));
        assert_eq!(object.own_properties().len(), 4);
    }

    #[test]
    fn test_delete_respects_configurable() {
        let object = ObjectRef::new();
        object.set("a", 1);
        let mut locked = Property::data(Value::from(2));
        locked.configurable = false;
        object.define("b", locked);

        assert!(object.delete("a"));
        assert!(!object.delete("b"));
        assert!(!object.delete("missing"));
        assert!(object.has("b"));
    }

    #[test]
    fn test_prevent_extensions() {
        let object = ObjectRef::new();
        object.set("a", 1);
        object.prevent_extensions();
        object.set("b", 2);
        object.set("a", 3);
        assert!(!object.has("b"));
        assert_eq!(object.get("a"), Value::Number(3.0));
    }

    #[test]
    fn test_kind() {
        let object = ObjectRef::module_namespace();
        assert!(object.is_structural());
        object.set_kind(ObjectKind::Plain);
        assert_eq!(object.kind(), ObjectKind::Plain);
        assert!(!ObjectRef::instance("Date").is_structural());
    }

    #[test]
    fn test_thenable_detection() {
        let object = ObjectRef::new();
        assert!(!object.is_thenable());
        object.set("then", "not callable");
        assert!(!object.is_thenable());
        object.set("then", crate::FunctionRef::stub("then"));
        assert!(object.is_thenable());
    }

    #[test]
    fn test_debug_does_not_recurse() {
        let object = ObjectRef::new();
        object.set("self", object.clone());
        let debug = format!("{:?}", object);
        assert!(debug.contains("self"));
    }
}
