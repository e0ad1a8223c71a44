//! Page-granular address arithmetic.

/// Size of a page, for every rounding done by the loader and page-add protocol.
pub const PAGE_SIZE: u64 = 4096;

crate::static_assert!(PAGE_SIZE.is_power_of_two());

#[must_use]
#[inline]
/// Rounds `value` down to a multiple of `align`.
///
/// `align` must be a power of two.
pub const fn align_down(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

#[must_use]
#[inline]
/// Rounds `value` up to a multiple of `align`.
///
/// Returns `None` if the result does not fit in a `u64`.
pub const fn align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

#[must_use]
#[inline]
pub const fn page_floor(addr: u64) -> u64 {
    align_down(addr, PAGE_SIZE)
}

#[must_use]
#[inline]
pub const fn page_ceil(addr: u64) -> Option<u64> {
    align_up(addr, PAGE_SIZE)
}

#[must_use]
#[inline]
pub const fn is_page_aligned(addr: u64) -> bool {
    addr & (PAGE_SIZE - 1) == 0
}
