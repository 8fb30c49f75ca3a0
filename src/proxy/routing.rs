//! First-segment routing.
//!
//! [`split_prefix`] pulls the routing key (the first non-empty path
//! segment) off a request path and returns the path to forward with that
//! segment removed. [`pattern_matches`] gates which paths a route's
//! listener serves, using `ServeMux`-style mount semantics: empty or `/`
//! serves everything, a trailing `/` serves a subtree, anything else is
//! an exact path.

/// Split `/svc1/items` into `("svc1", "/items")`.
///
/// Returns `None` when the path has no non-empty segment (e.g. `/`).
#[must_use]
pub fn split_prefix(path: &str) -> Option<(&str, String)> {
    let trimmed = path.trim_start_matches('/');
    let (prefix, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if prefix.is_empty() {
        return None;
    }
    Some((prefix, format!("/{rest}")))
}

#[must_use]
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern.is_empty() || pattern == "/" {
        return true;
    }
    if pattern.ends_with('/') {
        path.starts_with(pattern)
    } else {
        path == pattern
    }
}

/// Outgoing URI for an upstream: base URL, stripped path, original query.
#[must_use]
pub fn upstream_uri(base_url: &str, forward_path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{base_url}{forward_path}?{q}"),
        _ => format!("{base_url}{forward_path}"),
    }
}
