use std::ffi::OsStr;

use fuser::{ReplyEmpty, Request};
use libc::{EIO, ENOENT};

use crate::error::WsfsError;
use crate::pathutil;

use super::FsState;

pub fn unlink(fs: &FsState, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
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

    match fs.runtime.block_on(fs.remote.delete(&full_path, false)) {
        Ok(()) => {
            fs.forget_path(&full_path);
            fs.disk_cache.delete(&full_path);
            reply.ok();
        }
        Err(WsfsError::NotFound(_)) => reply.error(ENOENT),
        Err(_) => reply.error(EIO),
    }
}

/// Relies on the remote API to reject non-empty directories rather than
/// doing a client-side pre-listing check (see DESIGN.md).
pub fn rmdir(fs: &FsState, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
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

    match fs.runtime.block_on(fs.remote.delete(&full_path, false)) {
        Ok(()) => {
            fs.forget_path(&full_path);
            fs.disk_cache.delete(&full_path);
            reply.ok();
        }
        Err(WsfsError::NotFound(_)) => reply.error(ENOENT),
        Err(_) => reply.error(EIO),
    }
}
