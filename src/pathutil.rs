//! Bidirectional mapping between user-visible and remote names (spec.md §4.7).
//!
//! A single suffix, [`NOTEBOOK_SUFFIX`], distinguishes notebook objects in
//! the user-visible namespace from their remote representation.

pub const NOTEBOOK_SUFFIX: &str = ".ipynb";

/// Strips a trailing notebook suffix, if present, to recover the remote name.
pub fn to_remote(user_name: &str) -> &str {
    user_name
        .strip_suffix(NOTEBOOK_SUFFIX)
        .unwrap_or(user_name)
}

/// Appends the notebook suffix to a remote name when `is_notebook` holds.
pub fn to_user(remote_name: &str, is_notebook: bool) -> String {
    if is_notebook && !remote_name.ends_with(NOTEBOOK_SUFFIX) {
        format!("{remote_name}{NOTEBOOK_SUFFIX}")
    } else {
        remote_name.to_string()
    }
}

/// Joins a parent path and a child name into a remote path, using `/` as the
/// separator and treating an empty `parent` as the workspace root.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Splits a remote path into `(parent, name)`. The root's parent is `""`.
pub fn split(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

/// Rejects paths containing a `..` component, per spec.md §4.5 `lookup`.
pub fn is_escaping(name: &str) -> bool {
    name == ".." || name.split('/').any(|part| part == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_notebook_names() {
        for name in ["a", "dir/b", "weird name.txt"] {
            assert_eq!(to_remote(&to_user(name, true)), name);
        }
    }

    #[test]
    fn to_remote_is_identity_for_non_notebooks() {
        assert_eq!(to_remote("plain.txt"), "plain.txt");
    }

    #[test]
    fn to_user_does_not_double_suffix() {
        assert_eq!(to_user("already.ipynb", true), "already.ipynb");
    }

    #[test]
    fn join_and_split_agree() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("dir", "a"), "dir/a");
        assert_eq!(split("dir/a"), ("dir", "a"));
        assert_eq!(split("a"), ("", "a"));
    }

    #[test]
    fn detects_parent_escape() {
        assert!(is_escaping(".."));
        assert!(is_escaping("../etc"));
        assert!(!is_escaping("a.."));
        assert!(!is_escaping("normal"));
    }
}
