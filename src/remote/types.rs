use std::collections::HashMap;

use serde::Deserialize;

/// Remote object kind, per spec.md §4.4 `object_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Directory,
    File,
    Notebook,
    Repo,
}

impl ObjectKind {
    pub fn is_directory(self) -> bool {
        matches!(self, ObjectKind::Directory | ObjectKind::Repo)
    }

    pub fn is_notebook(self) -> bool {
        matches!(self, ObjectKind::Notebook)
    }

    fn from_wire(s: &str) -> Self {
        match s {
            "DIRECTORY" => ObjectKind::Directory,
            "NOTEBOOK" => ObjectKind::Notebook,
            "REPO" => ObjectKind::Repo,
            _ => ObjectKind::File,
        }
    }
}

/// A pre-signed URL for a direct (non-proxied) read or write, with any
/// headers the caller must attach (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignedUrl {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Cached or freshly-fetched metadata about a single remote path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: String,
    pub kind: ObjectKind,
    pub size: u64,
    pub mtime_millis: i64,
    pub signed_url: Option<SignedUrl>,
}

/// Wire shape of `object_info` as returned by the workspace-files API.
#[derive(Debug, Deserialize)]
pub struct RawObjectInfo {
    pub path: String,
    pub object_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: i64,
}

impl FileInfo {
    pub fn from_raw(raw: RawObjectInfo, signed_url: Option<SignedUrl>) -> Self {
        FileInfo {
            path: raw.path,
            kind: ObjectKind::from_wire(&raw.object_type),
            size: raw.size,
            mtime_millis: raw.modified_at,
            signed_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_directory_and_repo_as_directories() {
        assert!(ObjectKind::Directory.is_directory());
        assert!(ObjectKind::Repo.is_directory());
        assert!(!ObjectKind::File.is_directory());
        assert!(!ObjectKind::Notebook.is_directory());
    }

    #[test]
    fn unknown_wire_type_defaults_to_file() {
        let raw = RawObjectInfo {
            path: "a".to_string(),
            object_type: "SOMETHING_NEW".to_string(),
            size: 0,
            modified_at: 0,
        };
        let info = FileInfo::from_raw(raw, None);
        assert_eq!(info.kind, ObjectKind::File);
    }
}
