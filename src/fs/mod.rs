//! Root of the FUSE filesystem implementation (spec.md §4.5).
//!
//! Defines the shared [`FsState`] (remote client, disk cache, dirty
//! registry, inode bookkeeping) and [`FsWrapper`], the `Filesystem` trait
//! dispatcher that forwards each kernel callback to the matching
//! sub-module (`attr`, `read`, `write`, `create`, `delete`, `rename`).
//! Extended attributes, locks, and symlinks are out of scope (spec.md §1
//! Non-goals) and are left to `fuser`'s default `ENOSYS` behavior.

mod attr;
mod create;
mod delete;
mod read;
mod rename;
mod write;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
};

use crate::config::Config;
use crate::dirty::DirtyRegistry;
use crate::diskcache::DiskCache;
use crate::remote::{FileInfo, RemoteClient};

pub const ROOT_INO: u64 = 1;
/// `FOPEN_KEEP_CACHE`, hinting the kernel may retain cached page data
/// across opens of the same inode (spec.md §4.5 `open`).
const FOPEN_KEEP_CACHE: u32 = 1 << 1;

/// One in-memory node (spec.md §3 `Node`). `buffer` is absent until the
/// first read/open-for-read, and always absent for directories.
pub struct Node {
    pub path: String,
    pub info: FileInfo,
    pub buffer: Option<Vec<u8>>,
    pub dirty: bool,
}

impl Node {
    fn new(path: String, info: FileInfo) -> Self {
        Node {
            path,
            info,
            buffer: None,
            dirty: false,
        }
    }
}

/// State shared by every FUSE callback. Cheap, short-lived locks guard the
/// inode-mapping tables and the per-node map; node content mutation is
/// guarded by that node's own lock so unrelated inodes never block each
/// other (spec.md §5 "separate nodes may operate in parallel").
pub struct FsState {
    pub remote: RemoteClient,
    pub disk_cache: DiskCache,
    pub dirty_registry: DirtyRegistry,
    pub runtime: tokio::runtime::Runtime,
    pub owner_uid: u32,
    pub restrict_access: bool,
    /// Kernel attribute/entry cache TTL (spec.md §6 does not expose this as
    /// a CLI flag; it comes from the optional `config.toml` override layer,
    /// see `config::FileConfig`).
    pub kernel_ttl: Duration,

    inode_to_path: Mutex<HashMap<u64, String>>,
    path_to_inode: Mutex<HashMap<String, u64>>,
    nodes: Mutex<HashMap<u64, Arc<Mutex<Node>>>>,
    open_files: Mutex<HashMap<u64, u64>>,
    next_inode: Mutex<u64>,
    next_fh: Mutex<u64>,
}

impl FsState {
    pub fn new(
        config: &Config,
        remote: RemoteClient,
        disk_cache: DiskCache,
        dirty_registry: DirtyRegistry,
    ) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to start tokio runtime");

        let mut inode_to_path = HashMap::new();
        let mut path_to_inode = HashMap::new();
        inode_to_path.insert(ROOT_INO, String::new());
        path_to_inode.insert(String::new(), ROOT_INO);

        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INO,
            Arc::new(Mutex::new(Node::new(
                String::new(),
                FileInfo {
                    path: String::new(),
                    kind: crate::remote::ObjectKind::Directory,
                    size: 0,
                    mtime_millis: 0,
                    signed_url: None,
                },
            ))),
        );

        FsState {
            remote,
            disk_cache,
            dirty_registry,
            runtime,
            owner_uid: config.owner_uid,
            restrict_access: config.restrict_access,
            kernel_ttl: config.kernel_ttl,
            inode_to_path: Mutex::new(inode_to_path),
            path_to_inode: Mutex::new(path_to_inode),
            nodes: Mutex::new(nodes),
            open_files: Mutex::new(HashMap::new()),
            next_inode: Mutex::new(ROOT_INO + 1),
            next_fh: Mutex::new(1),
        }
    }

    fn path_for(&self, ino: u64) -> Option<String> {
        self.inode_to_path.lock().unwrap().get(&ino).cloned()
    }

    fn inode_for(&self, path: &str) -> Option<u64> {
        self.path_to_inode.lock().unwrap().get(path).copied()
    }

    /// Returns the existing inode for `path`, allocating a fresh one if
    /// needed, and ensures a [`Node`] is present with `info`.
    fn node_for_path(&self, path: &str, info: FileInfo) -> (u64, Arc<Mutex<Node>>) {
        let ino = {
            let mut path_to_inode = self.path_to_inode.lock().unwrap();
            if let Some(&ino) = path_to_inode.get(path) {
                ino
            } else {
                let mut next = self.next_inode.lock().unwrap();
                let ino = *next;
                *next += 1;
                path_to_inode.insert(path.to_string(), ino);
                self.inode_to_path.lock().unwrap().insert(ino, path.to_string());
                ino
            }
        };
        let node = {
            let mut nodes = self.nodes.lock().unwrap();
            nodes
                .entry(ino)
                .or_insert_with(|| Arc::new(Mutex::new(Node::new(path.to_string(), info.clone()))))
                .clone()
        };
        // A dirty node's locally-grown size/buffer is authoritative until the
        // next flush; a concurrent lookup/readdir re-stat must not clobber it
        // with stale remote metadata (spec.md §4.5 concurrency: the remote
        // FileInfo is only adopted wholesale on a successful flush).
        let mut locked = node.lock().unwrap();
        if !locked.dirty {
            locked.info = info;
        }
        drop(locked);
        (ino, node)
    }

    fn node(&self, ino: u64) -> Option<Arc<Mutex<Node>>> {
        self.nodes.lock().unwrap().get(&ino).cloned()
    }

    fn forget_path(&self, path: &str) {
        if let Some(ino) = self.path_to_inode.lock().unwrap().remove(path) {
            self.inode_to_path.lock().unwrap().remove(&ino);
            self.nodes.lock().unwrap().remove(&ino);
            self.dirty_registry.clear(ino);
        }
    }

    fn move_path(&self, old_path: &str, new_path: &str) {
        let ino = match self.path_to_inode.lock().unwrap().remove(old_path) {
            Some(ino) => ino,
            None => return,
        };
        self.path_to_inode
            .lock()
            .unwrap()
            .insert(new_path.to_string(), ino);
        self.inode_to_path
            .lock()
            .unwrap()
            .insert(ino, new_path.to_string());
        if let Some(node) = self.nodes.lock().unwrap().get(&ino) {
            let mut node = node.lock().unwrap();
            node.path = new_path.to_string();
            node.info.path = new_path.to_string();
        }
    }

    fn new_fh(&self) -> u64 {
        let mut next = self.next_fh.lock().unwrap();
        let fh = *next;
        *next += 1;
        fh
    }

    fn register_open_file(&self, fh: u64, ino: u64) {
        self.open_files.lock().unwrap().insert(fh, ino);
    }

    fn close_fh(&self, fh: u64) {
        self.open_files.lock().unwrap().remove(&fh);
    }

    /// Flushes `ino`'s dirty buffer (spec.md §4.5 flush/fsync). Copies the
    /// data needed for the upload out from under the node lock, performs
    /// the network call without holding it, then reacquires the lock to
    /// commit the result.
    pub fn flush_node(&self, ino: u64) -> Result<(), crate::error::WsfsError> {
        let node = match self.node(ino) {
            Some(n) => n,
            None => return Ok(()),
        };

        let (path, data) = {
            let node = node.lock().unwrap();
            if !node.dirty {
                return Ok(());
            }
            match &node.buffer {
                Some(buf) => (node.path.clone(), buf.clone()),
                None => return Ok(()),
            }
        };

        let result = self
            .runtime
            .block_on(self.remote.write(&path, bytes::Bytes::from(data.clone())));

        match result {
            Ok(()) => {
                let refreshed = self.runtime.block_on(self.remote.stat(&path)).ok();
                let mut node = node.lock().unwrap();
                if let Some(info) = refreshed {
                    let _ = self.disk_cache.set(&path, &data, info.mtime_millis);
                    node.info = info;
                } else {
                    let _ = self.disk_cache.set(&path, &data, node.info.mtime_millis);
                }
                node.dirty = false;
                self.dirty_registry.clear(ino);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn owner_attr(&self, ino: u64, info: &FileInfo) -> FileAttr {
        node_attr(ino, info, self.owner_uid)
    }
}

fn node_attr(ino: u64, info: &FileInfo, owner_uid: u32) -> FileAttr {
    let is_dir = info.kind.is_directory();
    let kind = if is_dir {
        FileType::Directory
    } else {
        FileType::RegularFile
    };
    let size = if is_dir { 0 } else { info.size };
    let mtime = std::time::UNIX_EPOCH + Duration::from_millis(info.mtime_millis.max(0) as u64);
    FileAttr {
        ino,
        size,
        blocks: (size + 511) / 512,
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind,
        perm: if is_dir { 0o755 } else { 0o644 },
        nlink: if is_dir { 2 } else { 1 },
        uid: owner_uid,
        gid: owner_uid,
        rdev: 0,
        flags: 0,
        blksize: 4096,
    }
}

#[derive(Clone)]
pub struct FsWrapper(pub Arc<FsState>);

impl Filesystem for FsWrapper {
    fn getattr(&mut self, req: &Request, ino: u64, reply: ReplyAttr) {
        attr::getattr(&self.0, req, ino, reply);
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<fuser::TimeOrNow>,
        mtime: Option<fuser::TimeOrNow>,
        ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        crtime: Option<std::time::SystemTime>,
        chgtime: Option<std::time::SystemTime>,
        bkuptime: Option<std::time::SystemTime>,
        flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        attr::setattr(
            &self.0, req, ino, mode, uid, gid, size, atime, mtime, ctime, fh, crtime, chgtime,
            bkuptime, flags, reply,
        );
    }

    fn access(&mut self, req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        attr::access(&self.0, req, ino, mask, reply);
    }

    fn statfs(&mut self, req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        attr::statfs(&self.0, req, ino, reply);
    }

    fn lookup(&mut self, req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        read::lookup(&self.0, req, parent, name, reply);
    }

    fn readdir(&mut self, req: &Request, ino: u64, fh: u64, offset: i64, reply: ReplyDirectory) {
        read::readdir(&self.0, req, ino, fh, offset, reply);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        read::open(&self.0, req, ino, flags, reply);
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        read::read(&self.0, req, ino, fh, offset, size, flags, lock_owner, reply);
    }

    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        write_flags: u32,
        flags: i32,
        lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        write::write(
            &self.0,
            req,
            ino,
            fh,
            offset,
            data,
            write_flags,
            flags,
            lock_owner,
            reply,
        );
    }

    fn flush(&mut self, req: &Request<'_>, ino: u64, fh: u64, lock_owner: u64, reply: ReplyEmpty) {
        write::flush(&self.0, req, ino, fh, lock_owner, reply);
    }

    fn fsync(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        datasync: bool,
        reply: ReplyEmpty,
    ) {
        write::fsync(&self.0, req, ino, fh, datasync, reply);
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        flags: i32,
        lock_owner: Option<u64>,
        flush: bool,
        reply: ReplyEmpty,
    ) {
        write::release(&self.0, req, ino, fh, flags, lock_owner, flush, reply);
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        create::create(&self.0, req, parent, name, mode, umask, flags, reply);
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        create::mkdir(&self.0, req, parent, name, mode, umask, reply);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::unlink(&self.0, req, parent, name, reply);
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        delete::rmdir(&self.0, req, parent, name, reply);
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        rename::rename(&self.0, req, parent, name, newparent, newname, flags, reply);
    }
}
