//! Core primitives shared by the sanctum kernel crates.
//!
//! This crate holds what both the binary loader and the thread core need:
//! page-granular address arithmetic and the contracts of the host
//! collaborators the kernel talks to through the trusted-call channel.
#![no_std]
#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::doc_markdown)]

extern crate alloc;

pub mod host;
pub mod mem;

#[macro_export]
macro_rules! static_assert {
    ($condition:expr $(, $($arg:tt)+)?) => {
        const _: () = assert!($condition $(, $($arg)+)?);
    };
}
