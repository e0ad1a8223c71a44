//! Process-exit hooks.
use alloc::{boxed::Box, vec::Vec};
use spin::Mutex;

type Hook = Box<dyn FnOnce() + Send>;

/// Callbacks run once when the hosted process exits.
///
/// Hooks run in reverse registration order.
pub struct AtExit {
    hooks: Mutex<Vec<Hook>>,
}

impl Default for AtExit {
    fn default() -> Self {
        Self::new()
    }
}

impl AtExit {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.lock().is_empty()
    }

    /// Runs and clears every hook, the most recent first.
    ///
    /// A hook may register further hooks, they run in the same call.
    /// Returns the number of hooks run.
    pub fn run(&self) -> usize {
        let mut count = 0;
        loop {
            // The lock is released before the hook runs.
            let Some(hook) = self.hooks.lock().pop() else {
                break;
            };
            hook();
            count += 1;
        }
        log::debug!("Ran {count} exit hooks");
        count
    }
}
