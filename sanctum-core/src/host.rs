//! Contracts of the host collaborators.
//!
//! The kernel runs isolated from the host; everything that needs the host
//! (reading files, spawning OS threads) is a request on the trusted-call
//! channel. These traits are the kernel-side view of those requests.
use alloc::vec::Vec;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
/// Failure reported by the host for a trusted call.
pub enum HostError {
    #[error("Host object not found")]
    NotFound,
    #[error("Host I/O error")]
    Io,
    #[error("Operation not supported by the host")]
    Unsupported,
    #[error("Request rejected by the host")]
    Rejected,
}

pub type HostResult<T> = Result<T, HostError>;

/// File access provided by the host.
pub trait HostFiles {
    /// Reads a whole host file into memory.
    fn read_whole_file(&self, path: &str) -> HostResult<Vec<u8>>;

    /// Mirrors a host directory tree into the kernel's file system.
    ///
    /// With `ignore_errors`, entries that cannot be read are skipped
    /// instead of aborting the copy.
    fn copy_directory(&self, src_dir: &str, dst_dir: &str, ignore_errors: bool) -> HostResult<()>;
}

/// Thread creation provided by the host.
pub trait HostThreads: Send + Sync {
    /// Asks the host to start a new OS thread.
    ///
    /// The host thread re-enters the kernel with `cookie` as its only
    /// parameter. The call blocks until the host acknowledges the creation.
    fn create_thread(&self, cookie: u64) -> HostResult<()>;
}
