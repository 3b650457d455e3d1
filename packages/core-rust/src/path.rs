//! Path splitting and joining.
//!
//! A path is a list of segments joined by [`PATH_DELIMITER`], e.g.
//! `"users:get"`. Splitting always happens on the FIRST delimiter, so a key
//! that itself contains `:` can never be reached past its colon.

/// Separator between path segments.
pub const PATH_DELIMITER: char = ':';

/// Splits `path` into its first segment and the remainder.
///
/// The remainder is everything after the first delimiter (it may contain
/// further delimiters, or be empty). It is `None` only when `path` contains
/// no delimiter at all.
#[must_use]
pub fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once(PATH_DELIMITER) {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// Joins a parent path and a key. `None` parent means the key is top-level.
#[must_use]
pub fn join_path(parent: Option<&str>, key: &str) -> String {
    match parent {
        Some(parent) => format!("{parent}{PATH_DELIMITER}{key}"),
        None => key.to_owned(),
    }
}
