//! Crate-wide error type.
//!
//! Every fallible operation in `wsfs` returns a [`WsfsError`]. The FUSE
//! trait boundary (`impl Filesystem for FsWrapper`) is the only place that
//! converts these into raw posix error numbers, via [`WsfsError::errno`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsfsError {
    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote request failed: {0}")]
    Remote(String),

    #[error("cache error: {0}")]
    Cache(String),
}

impl WsfsError {
    /// Maps this error to the posix error number returned to the kernel bridge.
    pub fn errno(&self) -> i32 {
        match self {
            WsfsError::NotFound(_) => libc::ENOENT,
            WsfsError::NotADirectory(_) => libc::ENOTDIR,
            WsfsError::IsADirectory(_) => libc::EISDIR,
            WsfsError::NotSupported(_) => libc::ENOTSUP,
            WsfsError::PermissionDenied(_) => libc::EACCES,
            WsfsError::InvalidArgument(_) => libc::EINVAL,
            WsfsError::Io(_) => libc::EIO,
            WsfsError::Remote(_) => libc::EIO,
            WsfsError::Cache(_) => libc::EIO,
        }
    }
}

pub type WsfsResult<T> = Result<T, WsfsError>;
