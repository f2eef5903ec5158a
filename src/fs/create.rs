use std::ffi::OsStr;

use fuser::{ReplyCreate, ReplyEntry, Request};
use libc::{EIO, ENOENT};

use crate::pathutil;
use crate::remote::{FileInfo, ObjectKind};

use super::FsState;

pub fn create(
    fs: &FsState,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    _mode: u32,
    _umask: u32,
    _flags: i32,
    reply: ReplyCreate,
) {
    let name_str = match name.to_str() {
        Some(s) => s,
        None => {
            reply.error(ENOENT);
            return;
        }
    };
    let parent_path = match fs.path_for(parent) {
        Some(p) => p,
        None => {
            reply.error(ENOENT);
            return;
        }
    };
    let full_path = pathutil::join(&parent_path, pathutil::to_remote(name_str));

    if fs
        .runtime
        .block_on(fs.remote.write(&full_path, bytes::Bytes::new()))
        .is_err()
    {
        reply.error(EIO);
        return;
    }

    let info = FileInfo {
        path: full_path.clone(),
        kind: ObjectKind::File,
        size: 0,
        mtime_millis: now_millis(),
        signed_url: None,
    };
    let (ino, node) = fs.node_for_path(&full_path, info);
    node.lock().unwrap().buffer = Some(Vec::new());

    let fh = fs.new_fh();
    fs.register_open_file(fh, ino);

    let attr = fs.owner_attr(ino, &node.lock().unwrap().info);
    reply.created(&fs.kernel_ttl, &attr, 0, fh, 0);
}

pub fn mkdir(
    fs: &FsState,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    _mode: u32,
    _umask: u32,
    reply: ReplyEntry,
) {
    let name_str = match name.to_str() {
        Some(s) => s,
        None => {
            reply.error(ENOENT);
            return;
        }
    };
    let parent_path = match fs.path_for(parent) {
        Some(p) => p,
        None => {
            reply.error(ENOENT);
            return;
        }
    };
    let full_path = pathutil::join(&parent_path, name_str);

    if fs.runtime.block_on(fs.remote.mkdir(&full_path)).is_err() {
        reply.error(EIO);
        return;
    }

    let info = FileInfo {
        path: full_path.clone(),
        kind: ObjectKind::Directory,
        size: 0,
        mtime_millis: now_millis(),
        signed_url: None,
    };
    let (ino, node) = fs.node_for_path(&full_path, info);
    let attr = fs.owner_attr(ino, &node.lock().unwrap().info);
    reply.entry(&fs.kernel_ttl, &attr, 0);
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
