use super::lifecycle::ThreadManager;
use alloc::{boxed::Box, sync::Weak};
use core::sync::atomic::AtomicI32;

/// Identity tag of a live control block.
pub const THREAD_MAGIC: u64 = 0x7468_7265_6164_6362;

/// Byte pattern written over a control block before it is freed.
pub const SCRUB_BYTE: u8 = 0xdd;

const SCRUBBED_WORD: u64 = u64::from_ne_bytes([SCRUB_BYTE; 8]);

/// Function run by a cloned thread.
pub type ThreadEntry = fn(usize) -> i32;

bitflags::bitflags! {
    /// Linux `clone` flags.
    ///
    /// They are recorded in the control block, the lifecycle does not branch on them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CloneFlags: u64 {
        const VM = 0x0000_0100;
        const FS = 0x0000_0200;
        const FILES = 0x0000_0400;
        const SIGHAND = 0x0000_0800;
        const THREAD = 0x0001_0000;
        const SYSVSEM = 0x0004_0000;
        const SETTLS = 0x0008_0000;
        const PARENT_SETTID = 0x0010_0000;
        const CHILD_CLEARTID = 0x0020_0000;
        const CHILD_SETTID = 0x0100_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Allocated, waiting for the host thread to enter
    Created,
    /// Registered and running its entry function
    Running,
    /// Entry function returned, leaving the registry
    Exiting,
    /// Exited, kept alive until process teardown
    Zombie,
}

/// Head of a thread-local storage block.
///
/// The first word of a TLS block points to the block itself.
#[repr(C)]
#[derive(Debug)]
pub struct TlsHead {
    pub self_ptr: *const Self,
}

impl TlsHead {
    #[must_use]
    #[inline]
    pub const fn unlinked() -> Self {
        Self {
            self_ptr: core::ptr::null(),
        }
    }

    #[must_use]
    #[inline]
    /// Checks that `head` is a fixed point of its self pointer.
    ///
    /// # Safety
    ///
    /// `head` must be null or valid for reads of a `TlsHead`.
    pub unsafe fn is_valid(head: *const Self) -> bool {
        if head.is_null() || !head.is_aligned() {
            return false;
        }
        // Safety: `head` is non-null and aligned, validity is upheld by the caller.
        let self_ptr = unsafe { (*head).self_ptr };
        core::ptr::eq(self_ptr, head)
    }
}

/// Per-thread record owned by the lifecycle manager.
pub struct ControlBlock {
    pub(super) magic: u64,
    pub(super) entry: ThreadEntry,
    pub(super) arg: usize,
    pub(super) child_stack: usize,
    pub(super) flags: CloneFlags,
    pub(super) ptid: Option<&'static AtomicI32>,
    pub(super) ctid: Option<&'static AtomicI32>,
    pub(super) tls: u64,
    pub(super) original_tls: u64,
    pub(super) tid: i32,
    pub(super) event: u64,
    pub(super) state: ThreadState,
    pub(super) manager: Weak<ThreadManager>,
    /// Link of the zombie list
    pub(super) next: Option<Box<Self>>,
}

impl ControlBlock {
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub(super) const fn new(
        entry: ThreadEntry,
        arg: usize,
        child_stack: usize,
        flags: CloneFlags,
        ptid: Option<&'static AtomicI32>,
        ctid: Option<&'static AtomicI32>,
        tls: u64,
        manager: Weak<ThreadManager>,
    ) -> Self {
        Self {
            magic: THREAD_MAGIC,
            entry,
            arg,
            child_stack,
            flags,
            ptid,
            ctid,
            tls,
            original_tls: 0,
            tid: 0,
            event: 0,
            state: ThreadState::Created,
            manager,
            next: None,
        }
    }

    #[must_use]
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.magic == THREAD_MAGIC
    }

    #[must_use]
    #[inline]
    pub const fn tid(&self) -> i32 {
        self.tid
    }

    #[must_use]
    #[inline]
    pub const fn tls(&self) -> u64 {
        self.tls
    }

    #[must_use]
    #[inline]
    pub const fn state(&self) -> ThreadState {
        self.state
    }

    #[must_use]
    #[inline]
    pub const fn flags(&self) -> CloneFlags {
        self.flags
    }

    #[must_use]
    #[inline]
    pub const fn child_stack(&self) -> usize {
        self.child_stack
    }

    #[must_use]
    #[inline]
    /// Host event word handed over on thread entry.
    pub const fn event(&self) -> u64 {
        self.event
    }

    #[must_use]
    #[inline]
    pub const fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            tid: self.tid,
            tls: self.tls,
            state: self.state,
            event: self.event,
        }
    }

    /// Overwrites the block with the scrub pattern and drops the references.
    ///
    /// A scrubbed block fails the magic check. `entry` and `state` cannot hold
    /// the pattern: the entry is kept and the state is pinned to `Zombie`.
    pub(super) fn scrub(&mut self) {
        self.magic = SCRUBBED_WORD;
        self.flags = CloneFlags::from_bits_retain(SCRUBBED_WORD);
        self.state = ThreadState::Zombie;
        self.arg = usize::from_ne_bytes([SCRUB_BYTE; size_of::<usize>()]);
        self.child_stack = self.arg;
        self.ptid = None;
        self.ctid = None;
        self.tls = SCRUBBED_WORD;
        self.original_tls = SCRUBBED_WORD;
        self.tid = i32::from_ne_bytes([SCRUB_BYTE; 4]);
        self.event = SCRUBBED_WORD;
        self.manager = Weak::new();
    }
}

impl core::fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControlBlock")
            .field("magic", &format_args!("{:#x}", self.magic))
            .field("tid", &self.tid)
            .field("tls", &format_args!("{:#x}", self.tls))
            .field("state", &self.state)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Represents a snapshot of a thread's state.
pub struct ThreadSnapshot {
    tid: i32,
    tls: u64,
    state: ThreadState,
    event: u64,
}

impl ThreadSnapshot {
    #[must_use]
    #[inline]
    pub const fn tid(&self) -> i32 {
        self.tid
    }

    #[must_use]
    #[inline]
    pub const fn tls(&self) -> u64 {
        self.tls
    }

    #[must_use]
    #[inline]
    pub const fn state(&self) -> ThreadState {
        self.state
    }

    #[must_use]
    #[inline]
    pub const fn event(&self) -> u64 {
        self.event
    }
}

#[cfg(test)]
pub(super) fn dummy_entry(arg: usize) -> i32 {
    i32::try_from(arg).unwrap_or(-1)
}

#[cfg(test)]
pub(super) fn test_block(tls: u64) -> Box<ControlBlock> {
    Box::new(ControlBlock::new(
        dummy_entry,
        0,
        0,
        CloneFlags::VM | CloneFlags::THREAD,
        None,
        None,
        tls,
        Weak::new(),
    ))
}
