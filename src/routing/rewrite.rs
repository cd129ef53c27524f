//! Outbound path rewriting.
//!
//! Rewriting is a pure function of the inbound path and the matched route.
//! The query string is not part of the path and is carried separately.

use crate::routing::router::Route;

/// Compute the path forwarded upstream for `original_path`.
///
/// With `strip_prefix` the matched prefix is removed and the remainder is
/// normalized: runs of `/` collapse to one, a missing leading `/` is added,
/// and an empty remainder becomes `/`. A path that does not start with the
/// prefix is passed through untouched.
pub fn rewrite(original_path: &str, route: &Route) -> String {
    if !route.strip_prefix {
        return original_path.to_string();
    }
    match route.matcher.strip(original_path) {
        Some(rest) => normalize(rest),
        None => original_path.to_string(),
    }
}

/// Collapse repeated slashes and guarantee a leading `/`.
fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }
    if path.ends_with('/') && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Prepend the upstream's base path (no trailing slash, may be empty).
pub(crate) fn join_base_path(base: &str, path: &str) -> String {
    if base.is_empty() {
        return path.to_string();
    }
    if path == "/" {
        return format!("{base}/");
    }
    format!("{base}{path}")
}
