//! Error types for ELF image loading and provisioning.
use sanctum_core::host::HostError;
use thiserror::Error;

/// Errors that can occur while loading an ELF image.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ElfLoadError {
    #[error("failed to read binary from host: {0}")]
    Io(HostError),
    #[error("malformed ELF container")]
    InvalidFormat,
    #[error("unsupported ELF image")]
    UnsupportedImage,
    #[error("required section is missing")]
    MissingSection,
    #[error("corrupt program segment")]
    CorruptSegment,
    #[error("lowest loadable address is not zero")]
    BaseAddressNotZero,
    #[error("no loadable segments")]
    NoLoadableSegments,
    #[error("TLS segment does not match the .tdata section")]
    TlsMismatch,
    #[error("loadable segments overlap")]
    SegmentOverlap,
    #[error("failed to load relocations")]
    RelocationLoadFailed,
    #[error("out of memory")]
    OutOfMemory,
}

impl From<HostError> for ElfLoadError {
    fn from(error: HostError) -> Self {
        Self::Io(error)
    }
}

/// Errors that can occur while committing an image into an address space.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("invalid destination region")]
    InvalidDestination,
    #[error("page commit failed at {dest:#x}")]
    PageCommitFailed { dest: u64 },
}
