use fuser::{ReplyEmpty, ReplyWrite, Request};
use libc::{EIO, ENOENT};

use super::FsState;

pub fn write(
    fs: &FsState,
    _req: &Request<'_>,
    ino: u64,
    _fh: u64,
    offset: i64,
    data: &[u8],
    _write_flags: u32,
    _flags: i32,
    _lock_owner: Option<u64>,
    reply: ReplyWrite,
) {
    let node = match fs.node(ino) {
        Some(n) => n,
        None => {
            reply.error(ENOENT);
            return;
        }
    };
    if let Err(_e) = super::read::ensure_loaded(fs, ino) {
        reply.error(EIO);
        return;
    }

    let mut node = node.lock().unwrap();
    let buffer = node.buffer.get_or_insert_with(Vec::new);
    let start = offset as usize;
    let end = start + data.len();
    if end > buffer.len() {
        buffer.resize(end, 0);
    }
    buffer[start..end].copy_from_slice(data);
    if end as u64 > node.info.size {
        node.info.size = end as u64;
    }
    node.dirty = true;
    drop(node);
    fs.dirty_registry.mark(ino);
    reply.written(data.len() as u32);
}

pub fn flush(fs: &FsState, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
    match fs.flush_node(ino) {
        Ok(()) => reply.ok(),
        Err(_) => reply.error(EIO),
    }
}

pub fn fsync(fs: &FsState, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
    match fs.flush_node(ino) {
        Ok(()) => reply.ok(),
        Err(_) => reply.error(EIO),
    }
}

/// Flushes if dirty, then drops the buffer unconditionally and closes the
/// handle. A failed flush leaves the node dirty in the registry even
/// though the buffer is gone (spec.md §4.5 `release`) — a reopen re-fetches
/// from the remote/disk cache, losing the unsaved edit; this mirrors the
/// spec's literal contract rather than papering over it.
pub fn release(
    fs: &FsState,
    _req: &Request<'_>,
    ino: u64,
    fh: u64,
    _flags: i32,
    _lock_owner: Option<u64>,
    _flush: bool,
    reply: ReplyEmpty,
) {
    let flush_result = fs.flush_node(ino);
    if let Some(node) = fs.node(ino) {
        node.lock().unwrap().buffer = None;
    }
    fs.close_fh(fh);
    match flush_result {
        Ok(()) => reply.ok(),
        Err(_) => reply.error(EIO),
    }
}
