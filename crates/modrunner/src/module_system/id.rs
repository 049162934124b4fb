// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Canonical module ids
//!
//! Every path a module can be reached by collapses to one id here, so the
//! cache and the mock maps never hold two entries for the same target.

use url::Url;

/// Node.js built-in modules
pub const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Built-in subpath modules (`fs/promises` and friends)
pub const BUILTIN_SUBPATHS: &[&str] = &[
    "assert/strict",
    "dns/promises",
    "fs/promises",
    "inspector/promises",
    "path/posix",
    "path/win32",
    "readline/promises",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "timers/promises",
    "util/types",
];

/// Built-ins that only exist with the `node:` prefix
pub const PREFIX_ONLY_BUILTINS: &[&str] = &["sea", "sqlite", "test", "test/reporters"];

/// Prefix of cache keys holding the mocked form of a module
pub const MOCK_PREFIX: &str = "mock:";

const NODE_PREFIX: &str = "node:";
const VIRTUAL_PREFIX: &str = "/@id/";
const FS_PREFIX: &str = "/@fs/";
const NULL_MARKER: &str = "__x00__";

/// Check if a specifier names a built-in module, with or without `node:`.
pub fn is_builtin(specifier: &str) -> bool {
    builtin_id(specifier).is_some()
}

/// The canonical `node:<name>` id of a built-in, or `None`.
pub fn builtin_id(specifier: &str) -> Option<String> {
    let (name, prefixed) = match specifier.strip_prefix(NODE_PREFIX) {
        Some(name) => (name, true),
        None => (specifier, false),
    };

    let known = BUILTIN_MODULES.contains(&name)
        || BUILTIN_SUBPATHS.contains(&name)
        || (prefixed && PREFIX_ONLY_BUILTINS.contains(&name));

    known.then(|| format!("{}{}", NODE_PREFIX, name))
}

/// Drop a `?query` or `#hash` suffix.
pub fn strip_query(id: &str) -> &str {
    match id.find(['?', '#']) {
        Some(pos) if pos > 0 => &id[..pos],
        _ => id,
    }
}

/// Canonicalize a resolved id.
///
/// Removes transport decorations (`file://`, `/@fs/`, `/@id/`, the `\0` and
/// `__x00__` virtual-module markers, query strings), unifies separators to
/// `/` and maps built-ins to `node:<name>`.
pub fn canonicalize_id(raw: &str) -> String {
    let mut id = if raw.starts_with("file://") {
        Url::parse(raw)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| raw.trim_start_matches("file://").to_string())
    } else {
        raw.to_string()
    };

    id = id.replace('\\', "/");
    id = strip_query(&id).to_string();

    if let Some(rest) = id.strip_prefix(FS_PREFIX) {
        id = format!("/{}", rest);
    }
    if let Some(rest) = id.strip_prefix(VIRTUAL_PREFIX) {
        id = rest.to_string();
    }
    if let Some(rest) = id.strip_prefix(NULL_MARKER) {
        id = rest.to_string();
    }
    if let Some(rest) = id.strip_prefix('\0') {
        id = rest.to_string();
    }

    builtin_id(&id).unwrap_or(id)
}

/// The cache key for the mocked form of `id`.
pub fn mock_path(id: &str) -> String {
    format!("{}{}", MOCK_PREFIX, id)
}

/// Returns true for cache keys created by [`mock_path`].
pub fn is_mock_path(key: &str) -> bool {
    key.starts_with(MOCK_PREFIX)
}

/// Strip the `node:` prefix, giving the name used for `__mocks__` lookups.
pub fn bare_builtin_name(id: &str) -> &str {
    id.strip_prefix(NODE_PREFIX).unwrap_or(id)
}
