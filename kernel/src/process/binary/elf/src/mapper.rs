//! Page-add protocol.
//!
//! The loader never touches the target address space itself. Instead, the
//! page-table builder of the enclave implements [`PageAdder`] and receives
//! one request per page to commit.
use crate::segments::SegmentFlags;
use core::ffi::c_void;

/// Page flags for memory protection and access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFlags(u8);

impl PageFlags {
    const READABLE: u8 = 0b001;
    const WRITABLE: u8 = 0b010;
    const EXECUTABLE: u8 = 0b100;

    #[must_use]
    #[inline]
    /// Create read-only data flags
    pub const fn r() -> Self {
        Self(Self::READABLE)
    }
    #[must_use]
    #[inline]
    /// Create read-write data flags
    pub const fn rw() -> Self {
        Self(Self::READABLE | Self::WRITABLE)
    }
    #[must_use]
    #[inline]
    /// Create read-only executable flags
    pub const fn rx() -> Self {
        Self(Self::READABLE | Self::EXECUTABLE)
    }

    #[must_use]
    #[inline]
    pub const fn from_segment(flags: SegmentFlags) -> Self {
        let mut bits = 0;
        if flags.contains(SegmentFlags::READ) {
            bits |= Self::READABLE;
        }
        if flags.contains(SegmentFlags::WRITE) {
            bits |= Self::WRITABLE;
        }
        if flags.contains(SegmentFlags::EXECUTE) {
            bits |= Self::EXECUTABLE;
        }
        Self(bits)
    }

    #[must_use]
    #[inline]
    pub const fn is_readable(&self) -> bool {
        (self.0 & Self::READABLE) != 0
    }
    #[must_use]
    #[inline]
    pub const fn is_writable(&self) -> bool {
        (self.0 & Self::WRITABLE) != 0
    }
    #[must_use]
    #[inline]
    pub const fn is_executable(&self) -> bool {
        (self.0 & Self::EXECUTABLE) != 0
    }
}

/// A request to commit one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAdd {
    /// Base of the destination region
    pub region_base: u64,
    /// Destination address of the page
    pub dest: u64,
    /// Address of the page content in the kernel's memory
    pub src: u64,
    pub flags: PageFlags,
    /// Whether the page may be committed lazily
    pub extend: bool,
}

#[expect(clippy::result_unit_err)]
/// Abstract interface of the page-table builder.
pub trait PageAdder {
    /// Commit a single page.
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the page could not be committed.
    /// Pages committed before the failure are left to the implementor to unwind.
    fn add_page(&mut self, request: PageAdd) -> core::result::Result<(), ()>;
}

impl<F> PageAdder for F
where
    F: FnMut(PageAdd) -> core::result::Result<(), ()>,
{
    #[inline]
    fn add_page(&mut self, request: PageAdd) -> core::result::Result<(), ()> {
        self(request)
    }
}

/// C-ABI page-add callback, returning zero on success.
pub type AddPageFn = unsafe extern "C" fn(
    context: *mut c_void,
    region_base: u64,
    dest: u64,
    src: u64,
    readable: bool,
    writable: bool,
    executable: bool,
    extend: bool,
) -> i32;

/// Adapts a C page-add callback to [`PageAdder`].
pub struct CallbackAdder {
    callback: AddPageFn,
    context: *mut c_void,
}

impl CallbackAdder {
    #[must_use]
    #[inline]
    /// Wraps `callback`, passing `context` back on every call.
    ///
    /// # Safety
    ///
    /// `callback` must be safe to call with `context` for as long as the adder lives.
    pub const unsafe fn new(callback: AddPageFn, context: *mut c_void) -> Self {
        Self { callback, context }
    }
}

impl PageAdder for CallbackAdder {
    fn add_page(&mut self, request: PageAdd) -> core::result::Result<(), ()> {
        // Safety: upheld by the caller of `CallbackAdder::new`.
        let status = unsafe {
            (self.callback)(
                self.context,
                request.region_base,
                request.dest,
                request.src,
                request.flags.is_readable(),
                request.flags.is_writable(),
                request.flags.is_executable(),
                request.extend,
            )
        };
        if status == 0 { Ok(()) } else { Err(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_flags_from_segment() {
        let rx = PageFlags::from_segment(SegmentFlags::READ | SegmentFlags::EXECUTE);
        assert_eq!(rx, PageFlags::rx());
        assert!(rx.is_readable());
        assert!(!rx.is_writable());
        assert!(rx.is_executable());

        let rw = PageFlags::from_segment(SegmentFlags::READ | SegmentFlags::WRITE);
        assert_eq!(rw, PageFlags::rw());
        assert_eq!(PageFlags::from_segment(SegmentFlags::READ), PageFlags::r());
    }

    unsafe extern "C" fn count_pages(
        context: *mut c_void,
        _region_base: u64,
        dest: u64,
        _src: u64,
        _readable: bool,
        writable: bool,
        _executable: bool,
        _extend: bool,
    ) -> i32 {
        let count = unsafe { &mut *context.cast::<u32>() };
        *count += 1;
        i32::from(writable || dest == 0)
    }

    #[test]
    fn test_callback_adder() {
        let mut count = 0u32;
        let mut adder = unsafe { CallbackAdder::new(count_pages, (&raw mut count).cast()) };

        let mut request = PageAdd {
            region_base: 0x10000,
            dest: 0x10000,
            src: 0x2000,
            flags: PageFlags::r(),
            extend: true,
        };
        assert_eq!(adder.add_page(request), Ok(()));

        request.flags = PageFlags::rw();
        assert_eq!(adder.add_page(request), Err(()));
        assert_eq!(count, 2);
    }
}
