//! Staging of program binaries into the enclave address space.
use elf::{ElfImage, ElfLoadError, ElfLoader, PageAdder, ProvisionError};
use sanctum_core::host::HostFiles;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StageError {
    #[error("Failed to load the binary: {0}")]
    Load(#[from] ElfLoadError),
    #[error("Failed to provision the binary: {0}")]
    Provision(#[from] ProvisionError),
}

/// Loads the executable at `path` and commits its pages through `adder`.
///
/// `cursor` is advanced past the image and its relocations, see [`elf::provision`].
/// The returned image backs the committed pages and must outlive them.
pub fn stage<F, A>(
    files: &F,
    path: &str,
    dest_base: u64,
    dest_capacity: u64,
    adder: &mut A,
    cursor: &mut u64,
) -> Result<ElfImage, StageError>
where
    F: HostFiles + ?Sized,
    A: PageAdder + ?Sized,
{
    let image = ElfLoader::load(files, path)?;
    image.dump();

    elf::provision(&image, dest_base, dest_capacity, adder, cursor)?;
    log::info!(
        "Staged {path}: {} segments, {:#x} bytes",
        image.segments().len(),
        image.image_size()
    );

    Ok(image)
}
