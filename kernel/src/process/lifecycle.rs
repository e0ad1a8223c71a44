use super::{
    MAX_THREADS, ThreadPointer,
    futex::{Futex, FutexFlags},
    registry::{RegisterError, Rejected, ThreadRegistry},
    thread::{CloneFlags, ControlBlock, ThreadEntry, ThreadSnapshot, ThreadState, TlsHead},
};
use crate::atexit::AtExit;
use alloc::{boxed::Box, sync::Arc};
use core::sync::atomic::{AtomicI32, Ordering};
use sanctum_core::host::HostThreads;
use spin::Once;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CloneError {
    #[error("Invalid thread-local storage block")]
    InvalidTlsBlock,
    #[error("Host failed to create the thread")]
    HostThreadCreationFailed,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RunError {
    #[error("Invalid thread control block")]
    InvalidControlBlock,
    #[error("Thread registration failed: {0}")]
    RegistrationFailed(RegisterError),
}

/// Arguments of a `clone` request.
#[derive(Debug, Clone, Copy)]
pub struct CloneArgs {
    pub entry: ThreadEntry,
    pub arg: usize,
    pub child_stack: usize,
    pub flags: CloneFlags,
    /// Word receiving the tid of the new thread
    pub ptid: Option<&'static AtomicI32>,
    /// TLS block of the new thread
    pub newtls: *const TlsHead,
    /// Word cleared and woken when the thread exits
    pub ctid: Option<&'static AtomicI32>,
}

/// Creates host threads and drives them from entry to zombie.
pub struct ThreadManager {
    host: Arc<dyn HostThreads>,
    futex: Arc<dyn Futex>,
    thread_pointer: Arc<dyn ThreadPointer>,
    at_exit: Arc<AtExit>,
    capacity: usize,
    registry: Once<Arc<ThreadRegistry>>,
}

impl ThreadManager {
    #[must_use]
    pub fn new(
        host: Arc<dyn HostThreads>,
        futex: Arc<dyn Futex>,
        thread_pointer: Arc<dyn ThreadPointer>,
        at_exit: Arc<AtExit>,
    ) -> Self {
        Self::with_capacity(host, futex, thread_pointer, at_exit, MAX_THREADS)
    }

    #[must_use]
    pub fn with_capacity(
        host: Arc<dyn HostThreads>,
        futex: Arc<dyn Futex>,
        thread_pointer: Arc<dyn ThreadPointer>,
        at_exit: Arc<AtExit>,
        capacity: usize,
    ) -> Self {
        Self {
            host,
            futex,
            thread_pointer,
            at_exit,
            capacity,
            registry: Once::new(),
        }
    }

    /// Returns the thread registry, creating it on first use.
    ///
    /// Creating the registry installs the exit hooks that scrub it.
    pub fn registry(&self) -> &ThreadRegistry {
        self.registry.call_once(|| {
            let registry = Arc::new(ThreadRegistry::new(self.capacity));

            let live = registry.clone();
            self.at_exit.register(move || {
                let count = live.free_threads();
                log::debug!("Freed {count} live threads");
            });
            let zombies = registry.clone();
            self.at_exit.register(move || {
                let count = zombies.free_zombies();
                log::debug!("Freed {count} zombie threads");
            });

            registry
        })
    }

    /// Asks the host for a new thread running `args.entry(args.arg)`.
    ///
    /// The thread enters the kernel through [`run_thread`].
    ///
    /// # Safety
    ///
    /// `args.newtls` must be null or valid for reads of a `TlsHead`.
    pub unsafe fn clone_thread(self: &Arc<Self>, args: CloneArgs) -> Result<(), CloneError> {
        // Safety: upheld by the caller.
        if !unsafe { TlsHead::is_valid(args.newtls) } {
            return Err(CloneError::InvalidTlsBlock);
        }

        // Exit hooks must be in place before the first thread exists.
        self.registry();

        let block = Box::new(ControlBlock::new(
            args.entry,
            args.arg,
            args.child_stack,
            args.flags,
            args.ptid,
            args.ctid,
            args.newtls as u64,
            Arc::downgrade(self),
        ));
        let cookie = Box::into_raw(block);

        if let Err(err) = self.host.create_thread(cookie as u64) {
            log::warn!("Host thread creation failed: {err}");
            // Safety: the host refused the cookie, it was never handed to a thread.
            drop(unsafe { Box::from_raw(cookie) });
            return Err(CloneError::HostThreadCreationFailed);
        }

        Ok(())
    }

    /// Returns the calling thread's entry in the registry.
    #[must_use]
    pub fn lookup_current(&self) -> Option<ThreadSnapshot> {
        let registry = self.registry.get()?;
        registry.lookup(self.thread_pointer.get())
    }

    /// Returns the host tid of the calling thread.
    #[must_use]
    pub fn gettid(&self) -> Option<i32> {
        self.lookup_current().map(|snapshot| snapshot.tid())
    }

    #[must_use]
    #[inline]
    pub fn at_exit(&self) -> &AtExit {
        &self.at_exit
    }

    /// Removes the calling thread from the registry.
    fn remove_current(&self) -> Option<Box<ControlBlock>> {
        self.registry().remove(self.thread_pointer.get())
    }

    fn run(&self, mut block: Box<ControlBlock>, tid: i32, event: u64) -> Result<i32, RunError> {
        block.tid = tid;
        block.event = event;
        block.original_tls = self.thread_pointer.get();

        if let Some(ptid) = block.ptid {
            ptid.swap(tid, Ordering::AcqRel);
        }

        let tls = block.tls;
        let original_tls = block.original_tls;
        let entry = block.entry;
        let arg = block.arg;
        let ctid = block.ctid;
        let identity = core::ptr::from_ref::<ControlBlock>(&block);

        // Safety: the TLS block was validated when the thread was cloned.
        unsafe { self.thread_pointer.set(tls) };

        block.state = ThreadState::Running;
        if let Err(Rejected { error, block }) = self.registry().register(tls, block) {
            log::warn!("Thread {tid} could not be registered: {error}");
            // Safety: restores the base that was active on entry.
            unsafe { self.thread_pointer.set(original_tls) };
            drop(block);
            return Err(RunError::RegistrationFailed(error));
        }
        log::debug!("Thread {tid} running with TLS base {tls:#x}");

        let status = entry(arg);

        let Some(mut block) = self
            .remove_current()
            .filter(|removed| core::ptr::eq(&raw const **removed, identity))
        else {
            log::error!("Thread {tid} is not registered under its own TLS base");
            panic!("thread registry is corrupted");
        };
        block.state = ThreadState::Exiting;

        // The host may still reference the event word, keep the block alive.
        self.registry().push_zombie(block);

        if let Some(ctid) = ctid {
            ctid.swap(0, Ordering::AcqRel);
            self.futex.wake(ctid, FutexFlags::PRIVATE, 1);
        }

        // Safety: restores the base that was active on entry.
        unsafe { self.thread_pointer.set(original_tls) };
        log::debug!("Thread {tid} exited with status {status}");

        Ok(status)
    }
}

/// Entry of a host thread created by [`ThreadManager::clone_thread`].
///
/// Runs the thread to completion and returns the status of its entry function.
///
/// # Safety
///
/// `cookie` must be a value passed to [`HostThreads::create_thread`] by
/// `ThreadManager::clone_thread`, used at most once.
pub unsafe fn run_thread(cookie: u64, tid: i32, event: u64) -> Result<i32, RunError> {
    let Ok(addr) = usize::try_from(cookie) else {
        return Err(RunError::InvalidControlBlock);
    };
    let ptr = core::ptr::with_exposed_provenance_mut::<ControlBlock>(addr);
    // Safety: the cookie is the address of a control block, see function docs.
    if ptr.is_null() || !ptr.is_aligned() || !unsafe { (*ptr).is_valid() } {
        log::warn!("Rejected control block {cookie:#x}");
        return Err(RunError::InvalidControlBlock);
    }

    // Safety: the block was leaked by `ThreadManager::clone_thread`.
    let block = unsafe { Box::from_raw(ptr) };
    let Some(manager) = block.manager.upgrade() else {
        log::warn!("Thread manager of {cookie:#x} is gone");
        return Err(RunError::InvalidControlBlock);
    };

    manager.run(block, tid, event)
}
