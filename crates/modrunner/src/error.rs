// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module runner
//!
//! Errors are `Clone` because one failed load is handed to every requester
//! that was waiting on it.

use thiserror::Error;

/// Result type for module runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that can occur while loading, executing or mocking modules
#[derive(Debug, Clone, Error)]
pub enum RunnerError {
    /// The host could not resolve a specifier and it is not a builtin
    #[error("Cannot find module '{specifier}' imported from '{importer}'")]
    Resolution {
        /// The specifier as written
        specifier: String,
        /// The importing module id
        importer: String,
    },

    /// The transformer failed for a resolved module
    #[error("Failed to load '{id}': {message}")]
    Transform {
        /// Module id
        id: String,
        /// Reason for failure
        message: String,
    },

    /// A cycle was entered before any placeholder exports existed
    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency {
        /// Every module on the cycle, ending with the repeated one
        chain: Vec<String>,
    },

    /// A mock factory failed
    #[error(
        "There was an error when mocking '{id}'. If you are using a \"mock\" factory, make sure \
         there are no top level variables inside, since this call is hoisted to the top of the \
         file.\nCaused by: {message}"
    )]
    MockFactory {
        /// The mocked module id
        id: String,
        /// The factory's error
        message: String,
    },

    /// A mock factory returned something other than an object
    #[error("Mock factory for '{id}' must return an object, received {received}")]
    MockShape {
        /// The mocked module id
        id: String,
        /// Kind of value the factory produced
        received: String,
    },

    /// An export missing from the real module was read through an auto-mock
    #[error("No \"{export}\" export is defined on the auto-mocked '{id}' module")]
    AutoMockAccess {
        /// The mocked module id
        id: String,
        /// The export that was read
        export: String,
    },

    /// A module body failed while executing
    #[error("Error evaluating module '{id}': {message}")]
    Evaluation {
        /// Module id
        id: String,
        /// Reason for failure
        message: String,
    },

    /// Value-level error raised by module code
    #[error(transparent)]
    Value(#[from] modrunner_values::Error),

    /// The host channel went away
    #[error("Host channel closed: {0}")]
    Channel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File watcher error
    #[error("Watch error: {0}")]
    Watch(String),

    /// File system error
    #[error("File system error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RunnerError {
    /// Create a resolution error
    pub fn resolution(specifier: impl Into<String>, importer: impl Into<String>) -> Self {
        Self::Resolution {
            specifier: specifier.into(),
            importer: importer.into(),
        }
    }

    /// Create a transform error
    pub fn transform(id: impl Into<String>, message: impl ToString) -> Self {
        Self::Transform {
            id: id.into(),
            message: message.to_string(),
        }
    }

    /// Create an evaluation error
    pub fn evaluation(id: impl Into<String>, message: impl ToString) -> Self {
        Self::Evaluation {
            id: id.into(),
            message: message.to_string(),
        }
    }

    /// Create a circular dependency error for `id` re-entered from `callstack`.
    ///
    /// The chain starts at the first occurrence of `id` on the stack.
    pub fn circular(callstack: &[String], id: &str) -> Self {
        let start = callstack.iter().position(|c| c == id).unwrap_or(0);
        let mut chain: Vec<String> = callstack[start..].to_vec();
        chain.push(id.to_string());
        Self::CircularDependency { chain }
    }

    /// Returns true for errors a later retry may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transform { .. } | Self::Evaluation { .. } | Self::Io(_) | Self::Channel(_)
        )
    }
}

impl From<std::io::Error> for RunnerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for RunnerError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<regex::Error> for RunnerError {
    fn from(err: regex::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<notify::Error> for RunnerError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_chain() {
        let stack = vec!["/entry.js".to_string(), "/a.js".to_string(), "/b.js".to_string()];
        let err = RunnerError::circular(&stack, "/a.js");
        assert_eq!(err.to_string(), "Circular dependency detected: /a.js -> /b.js -> /a.js");
    }

    #[test]
    fn test_factory_error_mentions_hoisting() {
        let err = RunnerError::MockFactory {
            id: "/src/a.js".into(),
            message: "x is not defined".into(),
        };
        let message = err.to_string();
        assert!(message.contains("hoisted"));
        assert!(message.contains("x is not defined"));
    }

    #[test]
    fn test_value_error_is_transparent() {
        let err = RunnerError::from(modrunner_values::Error::type_error("f is not a function"));
        assert_eq!(err.to_string(), "TypeError: f is not a function");
    }

    #[test]
    fn test_retryable() {
        assert!(RunnerError::transform("/a.js", "syntax").is_retryable());
        assert!(!RunnerError::resolution("x", "/a.js").is_retryable());
    }
}
