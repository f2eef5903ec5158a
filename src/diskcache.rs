//! Content-addressed, bounded disk cache (spec.md §4.3).
//!
//! Entries are stored under `cache_dir` keyed by a token derived from the
//! remote path. Hits are decided by mod-time + TTL, not payload
//! inspection — callers that need byte-level integrity compare the
//! returned checksum themselves (the node engine does this on `open`).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};

struct IndexEntry {
    size: u64,
    mod_time: i64,
    inserted_at: Instant,
    last_access: Instant,
    checksum: String,
}

/// `entries` is ordered most- to least-recently-used by the `lru` crate
/// itself (the same crate the teacher's `fs/cache.rs` wraps for its
/// attribute cache), giving O(1) access-order eviction per spec.md §4.3
/// ("a doubly-linked ordering by last-access time for O(1) LRU") instead of
/// a linear scan. Capacity is unbounded by entry count — the real bound is
/// `total_size <= max_bytes`, enforced in `set`/`evict_for_space`.
struct State {
    entries: LruCache<String, IndexEntry>,
    total_size: u64,
}

pub struct DiskCache {
    dir: PathBuf,
    max_bytes: u64,
    ttl: Duration,
    enabled: bool,
    state: Mutex<State>,
}

/// Returned by [`DiskCache::get`] on a hit.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub local_path: PathBuf,
    pub checksum: String,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache disabled")]
    Disabled,
    #[error("entry too large for cache")]
    TooLarge,
    #[error("cache full")]
    Full,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DiskCache {
    /// Opens `dir`, creating it if absent. The in-memory index always
    /// starts empty, so every regular file already present is an orphan
    /// (a prior run's payload, or its temp-file leftovers) and is removed.
    pub fn open(dir: PathBuf, max_bytes: u64, ttl: Duration, enabled: bool) -> io::Result<Self> {
        if enabled {
            fs::create_dir_all(&dir)?;
            set_dir_permissions(&dir)?;
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if entry.path().is_file() {
                    let _ = fs::remove_file(entry.path());
                }
            }
        }

        Ok(Self {
            dir,
            max_bytes,
            ttl,
            enabled,
            state: Mutex::new(State {
                entries: LruCache::unbounded(),
                total_size: 0,
            }),
        })
    }

    fn key_for(&self, remote_path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(remote_path.as_bytes());
        hex(&hasher.finalize())
    }

    fn local_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Hit iff an entry exists for `path`, its recorded mod-time equals
    /// `mod_time`, and it has not exceeded the TTL. Does not read or
    /// verify the payload. `get_mut` promotes the entry to
    /// most-recently-used in the same call that refreshes `last_access`.
    pub fn get(&self, path: &str, mod_time: i64) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        let key = self.key_for(path);
        let mut state = self.state.lock().unwrap();
        let entry = state.entries.get_mut(&key)?;
        if entry.mod_time != mod_time {
            return None;
        }
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        entry.last_access = Instant::now();
        Some(CacheEntry {
            local_path: self.local_path(&key),
            checksum: entry.checksum.clone(),
            size: entry.size,
        })
    }

    /// Writes `bytes` atomically (temp file, fsync, rename) and indexes
    /// the result under `path`, evicting by LRU (dropping expired entries
    /// opportunistically first) until the cache fits `max_bytes`.
    pub fn set(&self, path: &str, bytes: &[u8], mod_time: i64) -> Result<PathBuf, CacheError> {
        if !self.enabled {
            return Err(CacheError::Disabled);
        }
        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(CacheError::TooLarge);
        }

        let key = self.key_for(path);
        let checksum = checksum_of(bytes);
        let final_path = self.local_path(&key);
        let tmp_path = self
            .dir
            .join(format!("{key}.{}.tmp", std::process::id()));
        {
            let mut file = fs::File::create(&tmp_path)?;
            set_file_permissions(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;

        {
            let mut state = self.state.lock().unwrap();
            if let Some(old) = state.entries.pop(&key) {
                state.total_size = state.total_size.saturating_sub(old.size);
            }
            if state.total_size + size > self.max_bytes {
                evict_for_space(&mut state, self.max_bytes - size.min(self.max_bytes), self.ttl, &self.dir);
            }
            if state.total_size + size > self.max_bytes {
                let _ = fs::remove_file(&final_path);
                return Err(CacheError::Full);
            }
            state.entries.put(
                key,
                IndexEntry {
                    size,
                    mod_time,
                    inserted_at: Instant::now(),
                    last_access: Instant::now(),
                    checksum,
                },
            );
            state.total_size += size;
        }
        Ok(final_path)
    }

    /// Equivalent to [`DiskCache::set`] with bytes streamed from an
    /// existing local file.
    pub fn copy_to_cache(&self, path: &str, src_local_path: &Path, mod_time: i64) -> Result<PathBuf, CacheError> {
        let bytes = fs::read(src_local_path)?;
        self.set(path, &bytes, mod_time)
    }

    pub fn delete(&self, path: &str) {
        let key = self.key_for(path);
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.pop(&key) {
            state.total_size = state.total_size.saturating_sub(entry.size);
        }
        let _ = fs::remove_file(self.local_path(&key));
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        for (key, _) in state.entries.iter() {
            let _ = fs::remove_file(self.local_path(key));
        }
        state.entries.clear();
        state.total_size = 0;
    }

    pub fn total_bytes(&self) -> u64 {
        self.state.lock().unwrap().total_size
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Evicts entries until `total_size <= target`. Any TTL-expired entry is
/// dropped first, wherever it sits in recency order; otherwise the true
/// least-recently-used entry is popped in O(1) off the `lru` crate's tail
/// (spec.md §4.3's "oldest last-access first", with opportunistic
/// TTL-expired eviction folded in per the same section).
fn evict_for_space(state: &mut State, target: u64, ttl: Duration, dir: &Path) {
    loop {
        if state.total_size <= target {
            return;
        }
        let expired_key = state
            .entries
            .iter()
            .find(|(_, e)| e.inserted_at.elapsed() >= ttl)
            .map(|(k, _)| k.clone());

        let victim = match expired_key {
            Some(key) => state.entries.pop(&key).map(|entry| (key, entry)),
            None => state.entries.pop_lru(),
        };

        match victim {
            Some((key, entry)) => {
                state.total_size = state.total_size.saturating_sub(entry.size);
                let _ = fs::remove_file(dir.join(&key));
            }
            None => return,
        }
    }
}

pub fn checksum_of(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").unwrap();
    }
    s
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cache(max_bytes: u64) -> (tempfile::TempDir, DiskCache) {
        let dir = tempdir().unwrap();
        let cache =
            DiskCache::open(dir.path().to_path_buf(), max_bytes, Duration::from_secs(60), true).unwrap();
        (dir, cache)
    }

    #[test]
    fn miss_when_absent() {
        let (_dir, cache) = cache(1024);
        assert!(cache.get("a.txt", 1000).is_none());
    }

    #[test]
    fn set_then_get_round_trips_and_matches_checksum() {
        let (_dir, cache) = cache(1024);
        let data = b"hello world".to_vec();
        cache.set("a.txt", &data, 1000).unwrap();
        let entry = cache.get("a.txt", 1000).expect("hit");
        assert_eq!(entry.checksum, checksum_of(&data));
        let on_disk = fs::read(&entry.local_path).unwrap();
        assert_eq!(on_disk, data);
    }

    #[test]
    fn mod_time_mismatch_is_a_miss() {
        let (_dir, cache) = cache(1024);
        cache.set("a.txt", b"hello", 1000).unwrap();
        assert!(cache.get("a.txt", 2000).is_none());
    }

    #[test]
    fn entry_larger_than_capacity_fails() {
        let (_dir, cache) = cache(4);
        assert!(matches!(cache.set("a.txt", b"hello", 1), Err(CacheError::TooLarge)));
    }

    #[test]
    fn expires_after_ttl() {
        let dir = tempdir().unwrap();
        let cache =
            DiskCache::open(dir.path().to_path_buf(), 1024, Duration::from_millis(10), true).unwrap();
        cache.set("a.txt", b"hello", 1000).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get("a.txt", 1000).is_none());
    }

    #[test]
    fn lru_eviction_with_capacity_for_three() {
        // set(a); set(b); set(c); get(a); set(d) with capacity for exactly 3
        // equal-size entries evicts b (scenario 4 in spec.md §8).
        let (_dir, cache) = cache(30);
        cache.set("a", b"0123456789", 1).unwrap();
        cache.set("b", b"0123456789", 1).unwrap();
        cache.set("c", b"0123456789", 1).unwrap();
        cache.get("a", 1);
        cache.set("d", b"0123456789", 1).unwrap();

        assert!(cache.get("b", 1).is_none());
        assert!(cache.get("a", 1).is_some());
        assert!(cache.get("c", 1).is_some());
        assert!(cache.get("d", 1).is_some());
        assert!(cache.total_bytes() <= 30);
    }

    #[test]
    fn disabled_cache_is_always_a_miss_and_never_writes() {
        let dir = tempdir().unwrap();
        let cache =
            DiskCache::open(dir.path().to_path_buf(), 1024, Duration::from_secs(60), false).unwrap();
        assert!(matches!(cache.set("a.txt", b"hello", 1), Err(CacheError::Disabled)));
        assert!(cache.get("a.txt", 1).is_none());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn startup_scan_removes_all_preexisting_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x"), b"stray").unwrap();
        fs::write(dir.path().join("y"), b"stray").unwrap();
        let cache =
            DiskCache::open(dir.path().to_path_buf(), 1024, Duration::from_secs(60), true).unwrap();
        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(remaining.is_empty());
        assert_eq!(cache.total_bytes(), 0);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn delete_removes_entry_and_payload() {
        let (_dir, cache) = cache(1024);
        let entry = cache.set("a.txt", b"hello", 1).unwrap();
        cache.delete("a.txt");
        assert!(cache.get("a.txt", 1).is_none());
        assert!(!entry.exists());
    }
}
