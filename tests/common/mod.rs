//! Stubbed host seams for exercising the engine in userspace.
//!
//! Guest memory is a map of page-sized buffers keyed by page base VA,
//! each with an assigned fake physical address. Host-side buffers (shadow
//! pages, stubs) translate identity, so their "physical" address is the
//! buffer address itself.

#![allow(dead_code)]

use std::collections::BTreeMap;

use shadow_hook::error::ShadowHookError;
use shadow_hook::intel::ept::{EptOps, EptPtEntry};
use shadow_hook::intel::vmcs::VmcsOps;
use shadow_hook::platform::{Hypercall, PlatformOps};

pub const PAGE_SIZE: usize = 0x1000;

pub struct StubPlatform {
    /// Simulated guest pages keyed by page base VA.
    guest_pages: BTreeMap<u64, Vec<u8>>,
    /// Fake physical addresses assigned to guest page base VAs.
    page_pas: BTreeMap<u64, u64>,
    pub cache_invalidations: usize,
    pub fpu_saves: usize,
    pub fpu_restores: usize,
    pub fail_fpu_save: bool,
    pub processors: usize,
    pub vmcalls: Vec<Hypercall>,
}

impl StubPlatform {
    pub fn new() -> Self {
        Self {
            guest_pages: BTreeMap::new(),
            page_pas: BTreeMap::new(),
            cache_invalidations: 0,
            fpu_saves: 0,
            fpu_restores: 0,
            fail_fpu_save: false,
            processors: 1,
            vmcalls: Vec::new(),
        }
    }

    /// Registers a guest page at `page_base_va` backed by `pa`, filled
    /// with `bytes` at offset 0 and `0x90` elsewhere.
    pub fn add_guest_page(&mut self, page_base_va: u64, pa: u64, bytes: &[u8]) {
        assert_eq!(page_base_va % PAGE_SIZE as u64, 0);
        let mut page = vec![0x90u8; PAGE_SIZE];
        page[..bytes.len()].copy_from_slice(bytes);
        self.guest_pages.insert(page_base_va, page);
        self.page_pas.insert(page_base_va, pa);
    }

    pub fn guest_page(&self, page_base_va: u64) -> &[u8] {
        &self.guest_pages[&page_base_va]
    }
}

impl PlatformOps for StubPlatform {
    fn pa_from_va(&self, va: u64) -> u64 {
        let page = va & !0xFFF;
        match self.page_pas.get(&page) {
            Some(pa) => pa + (va & 0xFFF),
            // Host-side buffers translate identity.
            None => va,
        }
    }

    fn read_guest(&self, va: u64, buffer: &mut [u8]) {
        let page = va & !0xFFF;
        let offset = (va & 0xFFF) as usize;
        let bytes = self
            .guest_pages
            .get(&page)
            .unwrap_or_else(|| panic!("no guest page at {page:#x}"));
        buffer.copy_from_slice(&bytes[offset..offset + buffer.len()]);
    }

    fn invalidate_caches(&mut self) {
        self.cache_invalidations += 1;
    }

    fn save_fpu(&mut self) -> bool {
        if self.fail_fpu_save {
            return false;
        }
        self.fpu_saves += 1;
        true
    }

    fn restore_fpu(&mut self) {
        self.fpu_restores += 1;
    }

    fn vmcall(&mut self, command: Hypercall) -> Result<(), ShadowHookError> {
        self.vmcalls.push(command);
        Ok(())
    }

    fn for_each_processor(
        &mut self,
        f: &mut dyn FnMut(&mut Self) -> Result<(), ShadowHookError>,
    ) -> Result<(), ShadowHookError> {
        for _ in 0..self.processors {
            f(self)?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct StubEpt {
    entries: BTreeMap<u64, EptPtEntry>,
    pub invept_count: usize,
}

impl StubEpt {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for the page at `pa`, identity-mapped RWX until the
    /// engine edits it.
    pub fn entry(&mut self, pa: u64) -> EptPtEntry {
        *self.pt_entry_mut(pa)
    }
}

impl EptOps for StubEpt {
    fn pt_entry_mut(&mut self, pa: u64) -> &mut EptPtEntry {
        self.entries.entry(pa & !0xFFF).or_insert_with(|| {
            let mut entry = EptPtEntry::default();
            entry.set_readable(true);
            entry.set_writable(true);
            entry.set_executable(true);
            entry.set_pfn((pa & !0xFFF) >> 12);
            entry
        })
    }

    fn invept_global(&mut self) {
        self.invept_count += 1;
    }
}

#[derive(Default)]
pub struct StubVmcs {
    fields: BTreeMap<u32, u64>,
}

impl StubVmcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: u32, value: u64) {
        self.fields.insert(field, value);
    }
}

impl VmcsOps for StubVmcs {
    fn vmread(&self, field: u32) -> u64 {
        self.fields.get(&field).copied().unwrap_or(0)
    }

    fn vmwrite(&mut self, field: u32, value: u64) {
        self.fields.insert(field, value);
    }
}

/// Reads the original-call stub bytes published through a hook target.
pub fn stub_bytes(stub_va: u64, len: usize) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(stub_va as *const u8, len) }.to_vec()
}
