use std::ffi::OsStr;

use fuser::{ReplyEmpty, Request};
use libc::{EIO, ENOENT};

use crate::error::WsfsError;
use crate::pathutil;

use super::FsState;

#[allow(clippy::too_many_arguments)]
pub fn rename(
    fs: &FsState,
    _req: &Request<'_>,
    parent: u64,
    name: &OsStr,
    newparent: u64,
    newname: &OsStr,
    _flags: u32,
    reply: ReplyEmpty,
) {
    let (name_str, newname_str) = match (name.to_str(), newname.to_str()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            reply.error(ENOENT);
            return;
        }
    };
    let (parent_path, new_parent_path) = match (fs.path_for(parent), fs.path_for(newparent)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            reply.error(ENOENT);
            return;
        }
    };

    let old_path = pathutil::join(&parent_path, pathutil::to_remote(name_str));
    let new_path = pathutil::join(&new_parent_path, pathutil::to_remote(newname_str));

    match fs.runtime.block_on(fs.remote.rename(&old_path, &new_path)) {
        Ok(()) => {
            fs.move_path(&old_path, &new_path);
            fs.disk_cache.delete(&old_path);
            reply.ok();
        }
        Err(WsfsError::NotFound(_)) => reply.error(ENOENT),
        Err(_) => reply.error(EIO),
    }
}
