//! Host-resident copies of guest pages.

use {
    crate::platform::PlatformOps,
    alloc::{
        alloc::{alloc_zeroed, dealloc, handle_alloc_error},
        sync::Arc,
    },
    core::{alloc::Layout, ptr::NonNull, slice},
    x86::bits64::paging::BASE_PAGE_SIZE,
};

/// The structure representing a single memory page (4KB).
#[repr(C, align(4096))]
#[derive(Debug, Clone, Copy)]
pub struct Page([u8; BASE_PAGE_SIZE]);

/// A page-aligned host copy of one guest page, presented to the guest in
/// place of the original frame through EPT redirection.
///
/// Hooks targeting the same guest page share one copy per view; the hook
/// catalog holds the only strong roots, so dropping it releases every
/// shadow page transitively. The buffer is reached through a raw pointer
/// because the execute view is rewritten after the copy has been shared,
/// and the read/write view is written by the guest itself once the EPT
/// points at it.
#[derive(Debug)]
pub struct ShadowPage {
    page: NonNull<Page>,
}

// Writes to a shared shadow page happen at passive level under the
// single-writer install discipline; VM-exit paths only read its address.
unsafe impl Send for ShadowPage {}
unsafe impl Sync for ShadowPage {}

impl ShadowPage {
    /// Allocates a zeroed page. Exhaustion of non-paged memory at this
    /// point is unrecoverable: the allocation error handler never returns.
    fn alloc_zeroed() -> NonNull<Page> {
        let layout = Layout::new::<Page>();
        let page = unsafe { alloc_zeroed(layout) }.cast::<Page>();
        match NonNull::new(page) {
            Some(page) => page,
            None => handle_alloc_error(layout),
        }
    }

    /// Captures the current contents of the guest page at `page_base_va`.
    pub fn copy_of_guest(platform: &impl PlatformOps, page_base_va: u64) -> Arc<Self> {
        let page = Self::alloc_zeroed();
        let buffer = unsafe { slice::from_raw_parts_mut(page.as_ptr().cast::<u8>(), BASE_PAGE_SIZE) };
        platform.read_guest(page_base_va, buffer);
        Arc::new(Self { page })
    }

    /// Duplicates another shadow page.
    pub fn duplicate(other: &Self) -> Arc<Self> {
        let page = Self::alloc_zeroed();
        unsafe { core::ptr::copy_nonoverlapping(other.page.as_ptr(), page.as_ptr(), 1) };
        Arc::new(Self { page })
    }

    /// Host virtual address of the copy.
    pub fn base_va(&self) -> u64 {
        self.page.as_ptr() as u64
    }

    /// The current bytes of the copy.
    pub fn bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.page.as_ptr().cast::<u8>(), BASE_PAGE_SIZE) }
    }

    /// Overwrites `bytes.len()` bytes of the copy starting at `offset`.
    pub(crate) fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= BASE_PAGE_SIZE);
        unsafe {
            core::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.page.as_ptr().cast::<u8>().add(offset),
                bytes.len(),
            )
        };
    }
}

impl Drop for ShadowPage {
    fn drop(&mut self) {
        unsafe { dealloc(self.page.as_ptr().cast(), Layout::new::<Page>()) };
    }
}
