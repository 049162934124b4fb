// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! JavaScript symbols.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Ids below this value are reserved for well-known symbols.
const FIRST_USER_SYMBOL: u64 = 64;

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(FIRST_USER_SYMBOL);

/// A unique symbol. Two symbols are equal only if they came from the same
/// constructor call (or are the same well-known symbol).
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Option<Cow<'static, str>>,
}

impl Symbol {
    /// `Symbol.iterator`
    pub const ITERATOR: Symbol = Symbol::well_known(1, "Symbol.iterator");
    /// `Symbol.asyncIterator`
    pub const ASYNC_ITERATOR: Symbol = Symbol::well_known(2, "Symbol.asyncIterator");
    /// `Symbol.toStringTag`
    pub const TO_STRING_TAG: Symbol = Symbol::well_known(3, "Symbol.toStringTag");

    const fn well_known(id: u64, description: &'static str) -> Self {
        Self {
            id,
            description: Some(Cow::Borrowed(description)),
        }
    }

    /// Creates a fresh symbol.
    pub fn new(description: Option<&str>) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: description.map(|d| Cow::Owned(d.to_string())),
        }
    }

    /// The symbol's description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns true for the symbols predefined by the language.
    pub fn is_well_known(&self) -> bool {
        self.id < FIRST_USER_SYMBOL
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(desc) if self.is_well_known() => write!(f, "{}", desc),
            Some(desc) => write!(f, "Symbol({})", desc),
            None => write!(f, "Symbol()"),
        }
    }
}
