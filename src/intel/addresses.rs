//! 4 KiB page arithmetic on guest and host addresses.

use x86::bits64::paging::{PAddr, VAddr, BASE_PAGE_SHIFT};

/// Returns the 4 KiB-aligned base of a virtual address.
pub fn align_down_to_base_page(va: u64) -> u64 {
    VAddr::from(va).align_down_to_base_page().as_u64()
}

/// Returns the byte offset of a virtual address within its 4 KiB page.
pub fn base_page_offset(va: u64) -> usize {
    VAddr::from(va).base_page_offset() as usize
}

/// Returns the page frame number of a physical address.
pub fn pfn_from_pa(pa: u64) -> u64 {
    PAddr::from(pa).as_u64() >> BASE_PAGE_SHIFT
}
