use std::ffi::OsStr;

use fuser::{FileType, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen, Request};
use libc::{EIO, EISDIR, ENOENT};

use crate::diskcache::CacheEntry;
use crate::error::WsfsError;
use crate::pathutil;

use super::{FsState, FOPEN_KEEP_CACHE};

pub fn lookup(fs: &FsState, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
    let name_str = match name.to_str() {
        Some(s) => s,
        None => {
            reply.error(ENOENT);
            return;
        }
    };
    if pathutil::is_escaping(name_str) {
        reply.error(libc::EINVAL);
        return;
    }

    let parent_path = match fs.path_for(parent) {
        Some(p) => p,
        None => {
            reply.error(ENOENT);
            return;
        }
    };

    let remote_name = pathutil::to_remote(name_str);
    let full_path = pathutil::join(&parent_path, remote_name);

    match fs.runtime.block_on(fs.remote.stat(&full_path)) {
        Ok(info) => {
            let (ino, node) = fs.node_for_path(&full_path, info);
            let node = node.lock().unwrap();
            reply.entry(&fs.kernel_ttl, &fs.owner_attr(ino, &node.info), 0);
        }
        Err(WsfsError::NotFound(_)) => reply.error(ENOENT),
        Err(_) => reply.error(EIO),
    }
}

pub fn readdir(fs: &FsState, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
    let dir_path = match fs.path_for(ino) {
        Some(p) => p,
        None => {
            reply.error(ENOENT);
            return;
        }
    };
    match fs.node(ino) {
        Some(node) if !node.lock().unwrap().info.kind.is_directory() => {
            reply.error(libc::ENOTDIR);
            return;
        }
        Some(_) => {}
        None => {
            reply.error(ENOENT);
            return;
        }
    }

    let mut entries: Vec<(u64, FileType, String)> = Vec::new();
    if offset == 0 {
        entries.push((ino, FileType::Directory, ".".to_string()));
        let parent_ino = if ino == super::ROOT_INO {
            super::ROOT_INO
        } else {
            let (parent_path, _) = pathutil::split(&dir_path);
            fs.inode_for(parent_path).unwrap_or(super::ROOT_INO)
        };
        entries.push((parent_ino, FileType::Directory, "..".to_string()));
    }

    if offset < 2 {
        match fs.runtime.block_on(fs.remote.read_dir(&dir_path)) {
            Ok(children) => {
                for info in children {
                    let (_, name) = pathutil::split(&info.path);
                    let display_name = pathutil::to_user(name, info.kind.is_notebook());
                    let kind = if info.kind.is_directory() {
                        FileType::Directory
                    } else {
                        FileType::RegularFile
                    };
                    let child_path = info.path.clone();
                    let (child_ino, _) = fs.node_for_path(&child_path, info);
                    entries.push((child_ino, kind, display_name));
                }
            }
            Err(_) => {
                reply.ok();
                return;
            }
        }
    }

    for (i, (ino_to_add, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
        if reply.add(ino_to_add, (i + 1) as i64, kind, &name) {
            break;
        }
    }
    reply.ok();
}

pub fn open(fs: &FsState, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
    let node = match fs.node(ino) {
        Some(n) => n,
        None => {
            reply.error(ENOENT);
            return;
        }
    };
    if node.lock().unwrap().info.kind.is_directory() {
        reply.error(EISDIR);
        return;
    }

    if let Err(_e) = ensure_loaded(fs, ino) {
        reply.error(EIO);
        return;
    }

    if flags & libc::O_TRUNC != 0 {
        let mut node = node.lock().unwrap();
        node.buffer = Some(Vec::new());
        node.info.size = 0;
        node.dirty = true;
        fs.dirty_registry.mark(ino);
    }

    let fh = fs.new_fh();
    fs.register_open_file(fh, ino);
    reply.opened(fh, FOPEN_KEEP_CACHE);
}

/// Populates `ino`'s buffer if absent: disk cache first (verifying length
/// and checksum), falling back to the remote client on miss or corruption
/// (spec.md §4.5 `open`, §9 "buffer-vs-disk-cache coherence").
pub(super) fn ensure_loaded(fs: &FsState, ino: u64) -> Result<(), WsfsError> {
    let node = fs.node(ino).ok_or_else(|| WsfsError::NotFound(ino.to_string()))?;

    let (path, mod_time, already_loaded) = {
        let node = node.lock().unwrap();
        (node.path.clone(), node.info.mtime_millis, node.buffer.is_some())
    };
    if already_loaded {
        return Ok(());
    }

    let cached: Option<CacheEntry> = fs.disk_cache.get(&path, mod_time);
    let bytes = match cached {
        Some(entry) => match std::fs::read(&entry.local_path) {
            Ok(data) if crate::diskcache::checksum_of(&data) == entry.checksum => Some(data),
            _ => {
                fs.disk_cache.delete(&path);
                None
            }
        },
        None => None,
    };

    let bytes = match bytes {
        Some(b) => b,
        None => {
            let fetched = fs.runtime.block_on(fs.remote.read_all(&path))?;
            let _ = fs.disk_cache.set(&path, &fetched, mod_time);
            fetched.to_vec()
        }
    };

    node.lock().unwrap().buffer = Some(bytes);
    Ok(())
}

pub fn read(
    fs: &FsState,
    _req: &Request<'_>,
    ino: u64,
    _fh: u64,
    offset: i64,
    size: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyData,
) {
    let node = match fs.node(ino) {
        Some(n) => n,
        None => {
            reply.error(ENOENT);
            return;
        }
    };
    let node = node.lock().unwrap();
    let buffer = match &node.buffer {
        Some(b) => b,
        None => {
            reply.error(EIO);
            return;
        }
    };
    let start = offset as usize;
    if start >= buffer.len() {
        reply.data(&[]);
        return;
    }
    let end = std::cmp::min(start + size as usize, buffer.len());
    reply.data(&buffer[start..end]);
}
