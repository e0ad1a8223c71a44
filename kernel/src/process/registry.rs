//! Process-wide table of live threads and list of exited ones.
//!
//! Threads are keyed by their TLS base, which is unique among live threads.
//! The table is bounded and scanned linearly, everything sits behind one spinlock.
use super::thread::{ControlBlock, ThreadSnapshot, ThreadState};
use alloc::{boxed::Box, vec::Vec};
use spin::Mutex;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    #[error("TLS base is already registered")]
    AlreadyPresent,
    #[error("Thread table is full")]
    Full,
}

/// A rejected registration, handing the control block back to the caller.
#[derive(Debug)]
pub struct Rejected {
    pub error: RegisterError,
    pub block: Box<ControlBlock>,
}

struct Tables {
    live: Vec<(u64, Box<ControlBlock>)>,
    zombies: Option<Box<ControlBlock>>,
    zombie_count: usize,
}

pub struct ThreadRegistry {
    capacity: usize,
    tables: Mutex<Tables>,
}

impl ThreadRegistry {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tables: Mutex::new(Tables {
                live: Vec::with_capacity(capacity),
                zombies: None,
                zombie_count: 0,
            }),
        }
    }

    #[must_use]
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts `block` under `tls`.
    ///
    /// The table is never overwritten: a colliding or overflowing insert is
    /// rejected and the block is returned.
    pub fn register(&self, tls: u64, block: Box<ControlBlock>) -> Result<(), Rejected> {
        let mut tables = self.tables.lock();

        let error = if tables.live.iter().any(|(base, _)| *base == tls) {
            RegisterError::AlreadyPresent
        } else if tables.live.len() >= self.capacity {
            RegisterError::Full
        } else {
            tables.live.push((tls, block));
            return Ok(());
        };

        drop(tables);
        Err(Rejected { error, block })
    }

    #[must_use]
    pub fn lookup(&self, tls: u64) -> Option<ThreadSnapshot> {
        self.with_thread(tls, ControlBlock::snapshot)
    }

    #[must_use]
    pub fn contains(&self, tls: u64) -> bool {
        self.with_thread(tls, |_| ()).is_some()
    }

    /// Runs `f` on the live thread registered under `tls`, with the table locked.
    pub fn with_thread<R>(&self, tls: u64, f: impl FnOnce(&ControlBlock) -> R) -> Option<R> {
        let tables = self.tables.lock();
        tables
            .live
            .iter()
            .find(|(base, _)| *base == tls)
            .map(|(_, block)| f(block))
    }

    /// Removes the thread registered under `tls` and returns its control block.
    ///
    /// The table has no ordering, the last entry takes the freed slot.
    pub fn remove(&self, tls: u64) -> Option<Box<ControlBlock>> {
        let mut tables = self.tables.lock();
        let index = tables.live.iter().position(|(base, _)| *base == tls)?;
        Some(tables.live.swap_remove(index).1)
    }

    /// Pushes an exited thread on the zombie list.
    pub fn push_zombie(&self, mut block: Box<ControlBlock>) {
        block.state = ThreadState::Zombie;

        let mut tables = self.tables.lock();
        block.next = tables.zombies.take();
        tables.zombies = Some(block);
        tables.zombie_count += 1;
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.tables.lock().live.len()
    }

    #[must_use]
    pub fn zombie_count(&self) -> usize {
        self.tables.lock().zombie_count
    }

    /// Tids on the zombie list, most recent first.
    #[must_use]
    pub fn zombie_tids(&self) -> Vec<i32> {
        let tables = self.tables.lock();
        let mut tids = Vec::with_capacity(tables.zombie_count);
        let mut cursor = tables.zombies.as_deref();
        while let Some(block) = cursor {
            tids.push(block.tid);
            cursor = block.next.as_deref();
        }
        tids
    }

    /// Scrubs and frees every live control block.
    ///
    /// Returns the number of blocks freed.
    pub fn free_threads(&self) -> usize {
        let live = core::mem::take(&mut self.tables.lock().live);
        let count = live.len();
        for (_, mut block) in live {
            block.scrub();
        }
        count
    }

    /// Scrubs and frees every zombie.
    ///
    /// Returns the number of blocks freed.
    pub fn free_zombies(&self) -> usize {
        let mut next = {
            let mut tables = self.tables.lock();
            tables.zombie_count = 0;
            tables.zombies.take()
        };

        let mut count = 0;
        while let Some(mut block) = next {
            next = block.next.take();
            block.scrub();
            count += 1;
        }
        count
    }
}

impl Drop for ThreadRegistry {
    fn drop(&mut self) {
        // Unlink the zombie list iteratively rather than through recursive drops.
        self.free_zombies();
    }
}
