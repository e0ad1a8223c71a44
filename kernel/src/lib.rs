//! Program-loading and thread-lifecycle core of the sanctum library-OS kernel.
//!
//! Binaries are staged through the [`elf`] loader, threads are created by the
//! host and tracked by a [`process::ThreadManager`].
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown
)]

pub mod arch;
pub mod atexit;
pub mod process;
pub mod sysfs;

extern crate alloc;
