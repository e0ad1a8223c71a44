//! Streams a loaded image into a target address space, one page at a time.
use crate::{
    error::ProvisionError,
    image::ElfImage,
    mapper::{PageAdd, PageAdder, PageFlags},
    segments::Segment,
};
use sanctum_core::mem::{PAGE_SIZE, is_page_aligned, page_floor};

/// Commits every page of `image` through `adder`.
///
/// Segment pages land at `dest_base + page_addr + *cursor`. Once all segments
/// are committed, the cursor is advanced by the image size and the relocation
/// pages are committed read-only right after, advancing the cursor one page at
/// a time. The cursor lets further regions (stack, heap) be placed after the
/// image by subsequent calls.
///
/// # Errors
///
/// Returns `ProvisionError::InvalidDestination` if the destination cannot hold
/// the image, and `ProvisionError::PageCommitFailed` on the first page the
/// adder refuses. Pages committed before a failure are the adder's to unwind.
pub fn provision<A: PageAdder + ?Sized>(
    image: &ElfImage,
    dest_base: u64,
    dest_capacity: u64,
    adder: &mut A,
    cursor: &mut u64,
) -> Result<(), ProvisionError> {
    if dest_base == 0 || dest_capacity < image.image_size() {
        return Err(ProvisionError::InvalidDestination);
    }
    debug_assert!(is_page_aligned(image.image_size()));

    for segment in image.segments() {
        add_segment_pages(image.image_base(), dest_base, segment, adder, *cursor)?;
    }

    *cursor = cursor
        .checked_add(image.image_size())
        .ok_or(ProvisionError::InvalidDestination)?;

    add_relocation_pages(image, dest_base, adder, cursor)
}

fn add_segment_pages<A: PageAdder + ?Sized>(
    src_base: u64,
    dest_base: u64,
    segment: &Segment,
    adder: &mut A,
    cursor: u64,
) -> Result<(), ProvisionError> {
    let flags = PageFlags::from_segment(segment.flags);
    let segment_end = segment.end();

    let mut page = page_floor(segment.vaddr);
    while page < segment_end {
        let dest = dest_base
            .checked_add(page)
            .and_then(|addr| addr.checked_add(cursor))
            .ok_or(ProvisionError::InvalidDestination)?;

        commit(
            adder,
            PageAdd {
                region_base: dest_base,
                dest,
                src: src_base + page,
                flags,
                extend: true,
            },
        )?;

        page += PAGE_SIZE;
    }

    Ok(())
}

fn add_relocation_pages<A: PageAdder + ?Sized>(
    image: &ElfImage,
    dest_base: u64,
    adder: &mut A,
    cursor: &mut u64,
) -> Result<(), ProvisionError> {
    let pages = image.relocation_data().len() as u64 / PAGE_SIZE;
    let src_base = image.relocation_base();

    for i in 0..pages {
        let dest = dest_base
            .checked_add(*cursor)
            .ok_or(ProvisionError::InvalidDestination)?;

        commit(
            adder,
            PageAdd {
                region_base: dest_base,
                dest,
                src: src_base + i * PAGE_SIZE,
                flags: PageFlags::r(),
                extend: true,
            },
        )?;

        *cursor = cursor
            .checked_add(PAGE_SIZE)
            .ok_or(ProvisionError::InvalidDestination)?;
    }

    Ok(())
}

#[inline]
fn commit<A: PageAdder + ?Sized>(adder: &mut A, request: PageAdd) -> Result<(), ProvisionError> {
    adder.add_page(request).map_err(|()| {
        log::debug!("page add rejected at {:#x}", request.dest);
        ProvisionError::PageCommitFailed { dest: request.dest }
    })
}
