//! Owned page-aligned memory.
use crate::{Result, error::ElfLoadError};
use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use core::ptr::NonNull;
use sanctum_core::mem::{PAGE_SIZE, page_ceil};

/// A zeroed, page-aligned heap buffer whose length is a multiple of the page size.
pub struct PageBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// Safety:
// The buffer uniquely owns its allocation.
unsafe impl Send for PageBuffer {}
unsafe impl Sync for PageBuffer {}

impl PageBuffer {
    #[must_use]
    #[inline]
    pub const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Allocates a zeroed buffer of at least `size` bytes, rounded up to the page size.
    pub fn zeroed(size: u64) -> Result<Self> {
        let len = page_ceil(size)
            .and_then(|s| usize::try_from(s).ok())
            .ok_or(ElfLoadError::OutOfMemory)?;
        if len == 0 {
            return Ok(Self::empty());
        }

        let layout = Self::layout(len)?;
        // Safety: `layout` has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(ElfLoadError::OutOfMemory)?;

        Ok(Self { ptr, len })
    }

    /// Allocates a page-padded copy of `data`.
    pub fn padded_copy(data: &[u8]) -> Result<Self> {
        let mut buffer = Self::zeroed(data.len() as u64)?;
        buffer.as_mut_slice()[..data.len()].copy_from_slice(data);
        Ok(buffer)
    }

    fn layout(len: usize) -> Result<Layout> {
        let align = usize::try_from(PAGE_SIZE).map_err(|_| ElfLoadError::OutOfMemory)?;
        Layout::from_size_align(len, align).map_err(|_| ElfLoadError::OutOfMemory)
    }

    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    #[inline]
    /// Address of the first byte, as seen by the page-add protocol.
    pub fn base_addr(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    #[must_use]
    #[inline]
    pub const fn as_slice(&self) -> &[u8] {
        // Safety: `ptr` is valid for `len` initialized bytes (or dangling with `len == 0`).
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[must_use]
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: `ptr` is valid for `len` initialized bytes and uniquely borrowed.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for PageBuffer {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.len) {
            // Safety: the buffer was allocated with this exact layout.
            unsafe { dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

impl core::fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageBuffer")
            .field("base", &format_args!("{:#x}", self.base_addr()))
            .field("len", &self.len)
            .finish()
    }
}
