use crate::process::ThreadPointer;

/// Thread pointer held in the FS segment base.
///
/// Relies on the `FSGSBASE` instructions being enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsBase;

impl ThreadPointer for FsBase {
    #[inline]
    fn get(&self) -> u64 {
        let base: u64;
        unsafe {
            core::arch::asm!("rdfsbase {}", out(reg) base, options(nomem, nostack, preserves_flags));
        }
        base
    }

    #[inline]
    unsafe fn set(&self, base: u64) {
        unsafe {
            core::arch::asm!("wrfsbase {}", in(reg) base, options(nostack, preserves_flags));
        }
    }
}
