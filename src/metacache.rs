//! TTL-bounded metadata cache mapping path -> file info, with negative
//! entries (spec.md §4.2).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::remote::FileInfo;

struct MetaEntry {
    info: Option<FileInfo>,
    expires_at: Instant,
}

pub struct MetadataCache {
    entries: Mutex<HashMap<String, MetaEntry>>,
    max_entries: usize,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            ttl,
        }
    }

    /// Returns `(info, present)`. `present == false` means no cached
    /// knowledge either way (caller must ask the remote). `present == true`
    /// with `info == None` is a negative entry ("this path does not exist").
    pub fn get(&self, path: &str) -> (Option<FileInfo>, bool) {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(path) {
            Some(entry) if entry.expires_at > Instant::now() => (entry.info.clone(), true),
            Some(_) => {
                entries.remove(path);
                (None, false)
            }
            None => (None, false),
        }
    }

    /// Inserts or updates an entry. `info = None` records a negative entry.
    pub fn set(&self, path: &str, info: Option<FileInfo>) {
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(path) && entries.len() >= self.max_entries {
            evict_oldest(&mut entries);
        }
        entries.insert(
            path.to_string(),
            MetaEntry {
                info,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Deletes both `path` and its parent directory's entry.
    pub fn invalidate(&self, path: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(path);
        let (parent, _) = crate::pathutil::split(path);
        entries.remove(parent);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict_oldest(entries: &mut HashMap<String, MetaEntry>) {
    if let Some(key) = entries
        .iter()
        .min_by_key(|(_, e)| e.expires_at)
        .map(|(k, _)| k.clone())
    {
        entries.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ObjectKind;

    fn info(path: &str) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            kind: ObjectKind::File,
            size: 0,
            mtime_millis: 0,
            signed_url: None,
        }
    }

    #[test]
    fn miss_when_absent() {
        let cache = MetadataCache::new(10, Duration::from_secs(5));
        assert_eq!(cache.get("a"), (None, false));
    }

    #[test]
    fn hit_positive_and_negative() {
        let cache = MetadataCache::new(10, Duration::from_secs(5));
        cache.set("a", Some(info("a")));
        assert_eq!(cache.get("a"), (Some(info("a")), true));

        cache.set("b", None);
        assert_eq!(cache.get("b"), (None, true));
    }

    #[test]
    fn expires_after_ttl() {
        let cache = MetadataCache::new(10, Duration::from_millis(10));
        cache.set("a", Some(info("a")));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("a"), (None, false));
    }

    #[test]
    fn invalidate_removes_path_and_parent() {
        let cache = MetadataCache::new(10, Duration::from_secs(5));
        cache.set("dir/a", Some(info("dir/a")));
        cache.set("dir", Some(info("dir")));
        cache.invalidate("dir/a");
        assert_eq!(cache.get("dir/a"), (None, false));
        assert_eq!(cache.get("dir"), (None, false));
    }

    #[test]
    fn evicts_earliest_expiration_at_capacity() {
        let cache = MetadataCache::new(2, Duration::from_secs(5));
        cache.set("a", Some(info("a")));
        std::thread::sleep(Duration::from_millis(5));
        cache.set("b", Some(info("b")));
        // "a" expires earliest; inserting "c" should evict it.
        cache.set("c", Some(info("c")));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), (None, false));
        assert!(cache.get("b").1);
        assert!(cache.get("c").1);
    }
}
