//! The processor-shared hook catalog and its installation protocol.
//!
//! Installs run at passive level under a single-writer discipline and are
//! forbidden between `enable_hooks` and `disable_hooks`; VM-exit handlers
//! only ever read the catalog, so the hot path takes no locks.

use {
    crate::{
        error::ShadowHookError,
        intel::{
            addresses::{align_down_to_base_page, base_page_offset},
            hooks::{
                decoder::{self, MAX_INSTRUCTION_SIZE},
                hook::{
                    FunctionHook, FunctionHookKind, HookTarget, MemoryMonitor, MonitorTarget,
                    PageHookEntry, PageHookKinds, PatchTarget, MAX_PATCH_CODE,
                },
                inline::{build_original_call, TrampolineCode, BREAKPOINT},
            },
            page::ShadowPage,
        },
        platform::PlatformOps,
    },
    alloc::{boxed::Box, sync::Arc, vec::Vec},
    core::sync::atomic::Ordering,
    log::debug,
    x86::bits64::paging::BASE_PAGE_SIZE,
};

/// Hook state shared across all logical processors.
///
/// Allocated once by the host and passed by reference into every API
/// call; dropping it releases all shadow pages and original-call stubs
/// transitively.
#[derive(Debug, Default)]
pub struct SharedHookState {
    /// One entry per distinct guest page carrying hooks, in install order.
    pub page_entries: Vec<PageHookEntry>,

    /// Every function-level hook, including several on one page.
    pub function_hooks: Vec<FunctionHook>,

    /// Every memory monitor, including several on one page.
    pub memory_monitors: Vec<MemoryMonitor>,
}

impl SharedHookState {
    /// Allocates the processor-shared hook state.
    pub fn new() -> Box<Self> {
        Box::default()
    }

    /// First page entry covering `va`, if the page carries any hook.
    pub fn find_page(&self, va: u64) -> Option<&PageHookEntry> {
        let page = align_down_to_base_page(va);
        self.page_entries.iter().find(|entry| entry.page_base_va == page)
    }

    /// First function hook whose patch address lives on the same page as
    /// `va`.
    pub fn find_function_by_page(&self, va: u64) -> Option<&FunctionHook> {
        let page = align_down_to_base_page(va);
        self.function_hooks
            .iter()
            .find(|hook| align_down_to_base_page(hook.patch_address) == page)
    }

    /// Function hook installed exactly at `va`.
    pub fn find_function_by_address(&self, va: u64) -> Option<&FunctionHook> {
        self.function_hooks.iter().find(|hook| hook.patch_address == va)
    }

    /// First memory monitor whose range begins on the same page as `va`.
    pub fn find_monitor_by_page(&self, va: u64) -> Option<&MemoryMonitor> {
        let page = align_down_to_base_page(va);
        self.memory_monitors
            .iter()
            .find(|monitor| align_down_to_base_page(monitor.mem_address) == page)
    }

    /// Sets up an inline hook at `target.target_address` without
    /// activating it.
    ///
    /// The first victim instruction is displaced into an original-call
    /// stub chained to a jump back past the breakpoint, and its address
    /// is published through `target.original_call`; the execute view of
    /// the page receives a single `0xCC` at the patch offset. Nothing is
    /// committed to the catalog on failure.
    ///
    /// # Arguments
    ///
    /// * `platform` - The host services used for translation, guest reads
    ///   and cache maintenance.
    /// * `target` - The resolved victim address and handler.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the hook was recorded, `Err(ShadowHookError)` when
    ///   the first instruction cannot be measured or the stub cannot be
    ///   allocated.
    pub fn install_inline_hook(
        &mut self,
        platform: &mut impl PlatformOps,
        target: &HookTarget,
    ) -> Result<(), ShadowHookError> {
        let patch_address = target.target_address;
        let (exec_shadow, rw_shadow) = self.shadow_pair_for(platform, patch_address);

        let mut first_instruction = [0u8; MAX_INSTRUCTION_SIZE];
        platform.read_guest(patch_address, &mut first_instruction);
        let patch_size = decoder::instruction_size(platform, &first_instruction)?;

        // Build trampoline code (copied stub -> in the middle of original).
        let jmp_to_original = TrampolineCode::new(patch_address + patch_size as u64);
        let original_call = build_original_call(&first_instruction[..patch_size], &jmp_to_original)?;
        target
            .original_call
            .store(original_call.as_ptr() as u64, Ordering::Release);

        let offset = base_page_offset(patch_address);
        exec_shadow.write_bytes(offset, &[BREAKPOINT]);
        platform.invalidate_caches();

        debug!(
            "Hook = {:#x}, Exec = {:#x}, RW = {:#x}, Trampoline = {:#x}",
            patch_address,
            exec_shadow.base_va() + offset as u64,
            rw_shadow.base_va() + offset as u64,
            original_call.as_ptr() as u64
        );

        let hook = FunctionHook {
            patch_address,
            kind: FunctionHookKind::Breakpoint {
                handler: target.handler,
                original_call,
            },
            exec_base_pa: platform.pa_from_va(exec_shadow.base_va()),
            rw_base_pa: platform.pa_from_va(rw_shadow.base_va()),
            exec_shadow,
            rw_shadow,
        };
        self.commit_function_hook(platform, hook);

        Ok(())
    }

    /// Copies raw patch code over the execute view of the target page
    /// without activating it.
    pub fn install_patch(
        &mut self,
        platform: &mut impl PlatformOps,
        target: &PatchTarget,
    ) -> Result<(), ShadowHookError> {
        let patch_address = target.target_address;

        if target.patch_length == 0 {
            return Err(ShadowHookError::EmptyPatchCode);
        }
        if target.patch_length > MAX_PATCH_CODE {
            return Err(ShadowHookError::PatchTooLong);
        }
        let offset = base_page_offset(patch_address);
        if offset + target.patch_length > BASE_PAGE_SIZE {
            return Err(ShadowHookError::PatchCrossesPageBoundary);
        }

        let (exec_shadow, rw_shadow) = self.shadow_pair_for(platform, patch_address);
        let new_code = &target.new_code[..target.patch_length];
        exec_shadow.write_bytes(offset, new_code);
        platform.invalidate_caches();

        debug!(
            "Patch = {:#x}, Exec = {:#x}, RW = {:#x}",
            patch_address,
            exec_shadow.base_va() + offset as u64,
            rw_shadow.base_va() + offset as u64
        );

        let hook = FunctionHook {
            patch_address,
            kind: FunctionHookKind::Patch {
                new_code: new_code.to_vec(),
            },
            exec_base_pa: platform.pa_from_va(exec_shadow.base_va()),
            rw_base_pa: platform.pa_from_va(rw_shadow.base_va()),
            exec_shadow,
            rw_shadow,
        };
        self.commit_function_hook(platform, hook);

        Ok(())
    }

    /// Registers a monitor for reads and writes of the guest range
    /// `[target.target_address, target.target_address + target.len]`.
    pub fn install_memory_monitor(
        &mut self,
        platform: &mut impl PlatformOps,
        target: &MonitorTarget,
    ) -> Result<(), ShadowHookError> {
        let rw_shadow = self.rw_shadow_for(platform, target.target_address);
        let rw_base_pa = platform.pa_from_va(rw_shadow.base_va());

        debug!(
            "MemMon = {:#x}, RW = {:#x}",
            target.target_address,
            rw_shadow.base_va() + base_page_offset(target.target_address) as u64
        );

        let page_base_va = align_down_to_base_page(target.target_address);
        self.memory_monitors.push(MemoryMonitor {
            mem_address: target.target_address,
            mem_len: target.len,
            handler: target.handler,
            rw_shadow,
            rw_base_pa,
        });
        self.upsert_page_entry(platform, page_base_va, PageHookKinds::MONITOR);

        Ok(())
    }

    /// Creates or reuses the pair of page copies for the page containing
    /// `va`: every function hook on one page shares one execute view and
    /// one read/write view.
    fn shadow_pair_for(
        &self,
        platform: &impl PlatformOps,
        va: u64,
    ) -> (Arc<ShadowPage>, Arc<ShadowPage>) {
        if let Some(existing) = self.find_function_by_page(va) {
            return (
                Arc::clone(&existing.exec_shadow),
                Arc::clone(&existing.rw_shadow),
            );
        }

        // A page that so far only carries monitors keeps its pristine
        // copy; only the execute view is new.
        if let Some(monitor) = self.find_monitor_by_page(va) {
            let exec_shadow = ShadowPage::duplicate(&monitor.rw_shadow);
            return (exec_shadow, Arc::clone(&monitor.rw_shadow));
        }

        let page_base = align_down_to_base_page(va);
        (
            ShadowPage::copy_of_guest(platform, page_base),
            ShadowPage::copy_of_guest(platform, page_base),
        )
    }

    /// Creates or reuses the pristine page copy for the page containing
    /// `va`, whichever kind of hook currently owns one.
    fn rw_shadow_for(&self, platform: &impl PlatformOps, va: u64) -> Arc<ShadowPage> {
        if let Some(monitor) = self.find_monitor_by_page(va) {
            return Arc::clone(&monitor.rw_shadow);
        }
        if let Some(hook) = self.find_function_by_page(va) {
            return Arc::clone(&hook.rw_shadow);
        }
        ShadowPage::copy_of_guest(platform, align_down_to_base_page(va))
    }

    fn commit_function_hook(&mut self, platform: &impl PlatformOps, hook: FunctionHook) {
        let page_base_va = align_down_to_base_page(hook.patch_address);
        self.function_hooks.push(hook);
        self.upsert_page_entry(platform, page_base_va, PageHookKinds::FUNCTION);
    }

    fn upsert_page_entry(
        &mut self,
        platform: &impl PlatformOps,
        page_base_va: u64,
        kind: PageHookKinds,
    ) {
        if let Some(entry) = self
            .page_entries
            .iter_mut()
            .find(|entry| entry.page_base_va == page_base_va)
        {
            entry.kinds |= kind;
            return;
        }

        self.page_entries.push(PageHookEntry {
            page_base_va,
            page_base_pa: platform.pa_from_va(page_base_va),
            kinds: kind,
        });
    }
}

/// Per-processor shadow hook state.
///
/// Threads the page entry observed by the EPT-violation handler to the
/// MTF handler that follows it on the same processor; the slot is never
/// read from another processor.
#[derive(Debug, Default)]
pub struct CpuHookState {
    last_hook: Option<PageHookEntry>,
}

impl CpuHookState {
    /// Allocates the per-processor state.
    pub fn new() -> Box<Self> {
        Box::default()
    }

    /// Remembers `entry` for the upcoming MTF VM-exit. The slot must be
    /// empty: a second EPT violation before the pending MTF fires is a
    /// programming error.
    pub fn save_last_hook(&mut self, entry: PageHookEntry) {
        debug_assert!(self.last_hook.is_none());
        self.last_hook = Some(entry);
    }

    /// Takes the entry stashed by the EPT-violation handler.
    pub fn take_last_hook(&mut self) -> Option<PageHookEntry> {
        self.last_hook.take()
    }

    /// Whether an EPT-violation/MTF pair is currently in flight.
    pub fn has_pending_hook(&self) -> bool {
        self.last_hook.is_some()
    }
}
