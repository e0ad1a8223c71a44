//! `/sys` pseudo-filesystem.
//!
//! A ramfs is mounted on `/sys` and filled with the host's CPU and NUMA
//! topology directories.
use sanctum_core::host::{HostError, HostFiles, HostResult};
use thiserror::Error;

/// Host directory mirrored for the CPU topology.
pub const SYS_DEVICE_CPU_DIR: &str = "/sys/devices/system/cpu";
/// Host directory mirrored for the NUMA topology.
pub const SYS_DEVICE_NODE_DIR: &str = "/sys/devices/system/node";

const MOUNT_POINT: &str = "/sys";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SysfsError {
    #[error("Failed to initialize the sys file system")]
    RamfsInit,
    #[error("Cannot create mount point for sysfs")]
    MountPoint,
    #[error("Cannot mount sys file system")]
    Mount,
    #[error("Failed to copy host directory")]
    Copy,
    #[error("Failed to release sysfs")]
    Release,
}

/// Kernel mount table, as far as sysfs needs it.
pub trait MountTable {
    /// Handle of a mounted file system.
    type Fs;

    fn init_ramfs(&mut self) -> HostResult<Self::Fs>;

    /// Creates `path` and its missing parents.
    fn mkdir_all(&mut self, path: &str) -> HostResult<()>;

    /// Mounts the `source` directory of `fs` on `target`.
    fn mount(&mut self, fs: &Self::Fs, source: &str, target: &str) -> HostResult<()>;

    fn release(&mut self, fs: Self::Fs) -> HostResult<()>;
}

/// A mounted sysfs.
#[derive(Debug)]
pub struct Sysfs<Fs> {
    fs: Fs,
}

impl<Fs> Sysfs<Fs> {
    /// Mounts a ramfs on `/sys` and mirrors the host topology into it.
    ///
    /// Unreadable host entries are skipped. On failure, the ramfs is released.
    pub fn setup<M, H>(mounts: &mut M, files: &H) -> Result<Self, SysfsError>
    where
        M: MountTable<Fs = Fs> + ?Sized,
        H: HostFiles + ?Sized,
    {
        let fs = mounts.init_ramfs().map_err(|err| {
            log::error!("Failed to initialize the sys file system: {err}");
            SysfsError::RamfsInit
        })?;

        match Self::populate(mounts, files, &fs) {
            Ok(()) => {
                log::debug!("sysfs mounted on {MOUNT_POINT}");
                Ok(Self { fs })
            }
            Err(err) => {
                if let Err(release_err) = mounts.release(fs) {
                    log::warn!("Failed to release sysfs after a failed setup: {release_err}");
                }
                Err(err)
            }
        }
    }

    fn populate<M, H>(mounts: &mut M, files: &H, fs: &Fs) -> Result<(), SysfsError>
    where
        M: MountTable<Fs = Fs> + ?Sized,
        H: HostFiles + ?Sized,
    {
        mounts.mkdir_all(MOUNT_POINT).map_err(|err| {
            log::error!("Cannot create mount point for sysfs: {err}");
            SysfsError::MountPoint
        })?;
        mounts.mount(fs, "/", MOUNT_POINT).map_err(|err| {
            log::error!("Cannot mount sys file system: {err}");
            SysfsError::Mount
        })?;

        for dir in [SYS_DEVICE_CPU_DIR, SYS_DEVICE_NODE_DIR] {
            files
                .copy_directory(dir, dir, true)
                .map_err(|err| copy_failed(dir, err))?;
        }
        Ok(())
    }

    #[must_use]
    #[inline]
    pub const fn fs(&self) -> &Fs {
        &self.fs
    }

    /// Releases the ramfs backing `/sys`.
    pub fn teardown<M>(self, mounts: &mut M) -> Result<(), SysfsError>
    where
        M: MountTable<Fs = Fs> + ?Sized,
    {
        mounts.release(self.fs).map_err(|err| {
            log::error!("Failed to release sysfs: {err}");
            SysfsError::Release
        })
    }
}

fn copy_failed(dir: &str, err: HostError) -> SysfsError {
    log::error!("Failed to copy host directory {dir}: {err}");
    SysfsError::Copy
}
