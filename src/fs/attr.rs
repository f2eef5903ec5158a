use libc::{EACCES, ENOENT, ENOTSUP};

use fuser::{ReplyAttr, ReplyEmpty, ReplyStatfs, Request, TimeOrNow};

use super::FsState;

pub fn getattr(fs: &FsState, _req: &Request, ino: u64, reply: ReplyAttr) {
    match fs.node(ino) {
        Some(node) => {
            let node = node.lock().unwrap();
            reply.attr(&fs.kernel_ttl, &fs.owner_attr(ino, &node.info));
        }
        None => reply.error(ENOENT),
    }
}

pub fn access(fs: &FsState, req: &Request<'_>, _ino: u64, _mask: i32, reply: ReplyEmpty) {
    if fs.restrict_access && req.uid() != fs.owner_uid {
        reply.error(EACCES);
    } else {
        reply.ok();
    }
}

/// Synthetic but stable values (spec.md §4.5 `statfs`): large free/avail
/// space, a fixed 4 KiB block size, no real backing allocation.
pub fn statfs(_fs: &FsState, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
    const TOTAL_BLOCKS: u64 = 1 << 30;
    reply.statfs(TOTAL_BLOCKS, TOTAL_BLOCKS, TOTAL_BLOCKS, 0, 0, 4096, 255, 0);
}

/// Size truncation/extension and mtime updates are supported; atime-only
/// changes, chmod, and chown are not (spec.md §4.5, §1 Non-goals).
#[allow(clippy::too_many_arguments)]
pub fn setattr(
    fs: &FsState,
    _req: &Request<'_>,
    ino: u64,
    mode: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
    size: Option<u64>,
    atime: Option<TimeOrNow>,
    mtime: Option<TimeOrNow>,
    _ctime: Option<std::time::SystemTime>,
    _fh: Option<u64>,
    _crtime: Option<std::time::SystemTime>,
    _chgtime: Option<std::time::SystemTime>,
    _bkuptime: Option<std::time::SystemTime>,
    _flags: Option<u32>,
    reply: ReplyAttr,
) {
    if mode.is_some() || uid.is_some() || gid.is_some() || (atime.is_some() && mtime.is_none() && size.is_none()) {
        reply.error(ENOTSUP);
        return;
    }

    let node = match fs.node(ino) {
        Some(n) => n,
        None => {
            reply.error(ENOENT);
            return;
        }
    };

    {
        let mut node = node.lock().unwrap();
        if let Some(new_size) = size {
            if node.buffer.is_none() {
                drop(node);
                if let Err(_e) = load_buffer(fs, ino) {
                    reply.error(libc::EIO);
                    return;
                }
                node = fs.node(ino).unwrap().lock().unwrap();
            }
            let buffer = node.buffer.get_or_insert_with(Vec::new);
            buffer.resize(new_size as usize, 0);
            node.info.size = new_size;
            node.dirty = true;
            fs.dirty_registry.mark(ino);
        }
        if let Some(new_mtime) = mtime {
            node.info.mtime_millis = match new_mtime {
                TimeOrNow::SpecificTime(t) => t
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0),
                TimeOrNow::Now => now_millis(),
            };
        }
    }

    let node = node.lock().unwrap();
    reply.attr(&fs.kernel_ttl, &fs.owner_attr(ino, &node.info));
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Loads a node's buffer the same way `open` would (disk cache, else
/// remote), used by `setattr` truncation when the file wasn't already open.
fn load_buffer(fs: &FsState, ino: u64) -> Result<(), crate::error::WsfsError> {
    super::read::ensure_loaded(fs, ino)
}
