//! Threads of the hosted process.
//!
//! A thread is created by asking the host for a genuine OS thread, which then
//! enters the kernel through [`run_thread`]. While its entry function runs,
//! the thread is registered under its TLS base; once it returns, the thread is
//! moved to the zombie list and its joiner is woken.
pub mod binary;
pub mod futex;
mod lifecycle;
pub mod registry;
pub mod thread;

pub use lifecycle::{CloneArgs, CloneError, RunError, ThreadManager, run_thread};
pub use registry::{RegisterError, ThreadRegistry};

/// Default capacity of the thread registry.
pub const MAX_THREADS: usize = 1024;

/// Thread pointer (TLS base) of the calling thread.
///
/// The value identifies the thread in the registry.
pub trait ThreadPointer: Send + Sync {
    fn get(&self) -> u64;

    /// Switches the calling thread to another TLS base.
    ///
    /// # Safety
    ///
    /// Every thread-local access made afterwards goes through `base`, which
    /// must point to a TLS block valid for the calling thread.
    unsafe fn set(&self, base: u64);
}
