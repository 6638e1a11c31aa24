//! The EPT page-table entry seam.
//!
//! The engine edits one leaf entry per hooked page and never walks or
//! builds paging structures itself; the host hands out entries through
//! [`EptOps`] and executes INVEPT on its behalf.

use bitfield::bitfield;

bitfield! {
    /// Represents an Extended Page Table Entry (EPT Entry) for a 4 KiB page.
    ///
    /// Reference: Intel® 64 and IA-32 Architectures Software Developer's Manual: 29.3.2 EPT Translation Mechanism
    #[derive(Clone, Copy, Default)]
    pub struct EptPtEntry(u64);
    impl Debug;

    pub readable, set_readable: 0;
    pub writable, set_writable: 1;
    pub executable, set_executable: 2;
    pub memory_type, set_memory_type: 5, 3;
    pub large, set_large: 7;
    pub pfn, set_pfn: 51, 12;
}

/// Access to the EPT paging structures active on the current processor.
pub trait EptOps {
    /// Returns the leaf page-table entry translating the page at `pa`.
    fn pt_entry_mut(&mut self, pa: u64) -> &mut EptPtEntry;

    /// Invalidates cached EPT translations across all contexts.
    fn invept_global(&mut self);
}
