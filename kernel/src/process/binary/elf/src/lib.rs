//! ELF image loader.
//!
//! Stages a statically laid out x86-64 executable into a page-aligned
//! in-memory image, then hands that image page by page to the page-table
//! builder of the enclave.
//!
//! # Usage
//!
//! ```rust
//! # use elf::{ElfLoader, ElfLoadError, mapper::PageAdd};
//! let binary_data: Vec<u8> = Vec::new(); // Binary data
//!
//! match ElfLoader::parse(binary_data) {
//!     Ok(image) => {
//!         let mut cursor = 0;
//!         let mut add_page = |_page: PageAdd| -> Result<(), ()> { Ok(()) };
//!         elf::provision(&image, 0x1_0000_0000, image.image_size(), &mut add_page, &mut cursor)
//!             .expect("page commit failed");
//!     }
//!     Err(err) => assert_eq!(err, ElfLoadError::InvalidFormat),
//! }
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]
#![no_std]

extern crate alloc;

mod buffer;
mod error;
mod image;
mod loader;
pub mod mapper;
mod provision;
pub mod relocations;
pub mod segments;

pub use buffer::PageBuffer;
pub use error::{ElfLoadError, ProvisionError};
pub use image::ElfImage;
pub use loader::ElfLoader;
pub use mapper::{PageAdder, PageFlags};
pub use provision::provision;
pub use segments::{Segment, SegmentFlags, TlsTemplate};

/// Result type for ELF loading operations
pub type Result<T> = core::result::Result<T, ElfLoadError>;
