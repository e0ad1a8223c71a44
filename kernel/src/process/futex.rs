use core::sync::atomic::AtomicI32;

bitflags::bitflags! {
    /// Futex operation modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FutexFlags: u32 {
        /// The word is only shared within the process.
        const PRIVATE = 128;
    }
}

/// Wake side of the futex word-wait/word-wake pair.
pub trait Futex: Send + Sync {
    /// Wakes at most `count` waiters blocked on `word`.
    ///
    /// Returns the number of waiters woken.
    fn wake(&self, word: &AtomicI32, flags: FutexFlags, count: u32) -> usize;
}
