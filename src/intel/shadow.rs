//! EPT view switching for shadowed pages.
//!
//! A page carrying function hooks normally presents its execute view:
//! execution sees the planted bytes while reads and writes trap, flip the
//! page to the pristine read/write view for exactly one instruction, and
//! flip back from the MTF handler. A page carrying only monitors stays on
//! the original frame with reads and writes denied so every access traps.

use {
    crate::{
        error::ShadowHookError,
        intel::{
            addresses::pfn_from_pa,
            ept::EptOps,
            hooks::{hook::PageHookKinds, registry::SharedHookState},
        },
        platform::{Hypercall, PlatformOps},
    },
    log::trace,
};

/// Presents the execute view of a shadowed page: reads and writes trap,
/// execution sees the copy with the planted breakpoint or patch.
pub fn show_shadow_for_exec(ept: &mut impl EptOps, page_base_pa: u64, exec_base_pa: u64) {
    {
        let entry = ept.pt_entry_mut(page_base_pa);
        entry.set_readable(false);
        entry.set_writable(false);
        entry.set_pfn(pfn_from_pa(exec_base_pa));
    }
    ept.invept_global();
}

/// Presents the read/write view of a shadowed page: the guest reads and
/// writes the pristine copy, and its modifications land there.
pub fn show_shadow_for_rw(ept: &mut impl EptOps, page_base_pa: u64, rw_base_pa: u64) {
    {
        let entry = ept.pt_entry_mut(page_base_pa);
        entry.set_readable(true);
        entry.set_writable(true);
        entry.set_pfn(pfn_from_pa(rw_base_pa));
    }
    ept.invept_global();
}

/// Stops shadowing a page: original frame, full read and write access.
pub fn restore_identity(ept: &mut impl EptOps, page_base_pa: u64) {
    {
        let entry = ept.pt_entry_mut(page_base_pa);
        entry.set_readable(true);
        entry.set_writable(true);
        entry.set_pfn(pfn_from_pa(page_base_pa));
    }
    ept.invept_global();
}

/// Denies reads and writes of a monitored page so every access traps.
pub fn deny_monitored_access(ept: &mut impl EptOps, page_base_pa: u64) {
    {
        let entry = ept.pt_entry_mut(page_base_pa);
        entry.set_readable(false);
        entry.set_writable(false);
        entry.set_pfn(pfn_from_pa(page_base_pa));
    }
    ept.invept_global();
}

/// Lets the in-flight access of a monitored page complete.
pub fn allow_monitored_access(ept: &mut impl EptOps, page_base_pa: u64) {
    {
        let entry = ept.pt_entry_mut(page_base_pa);
        entry.set_readable(true);
        entry.set_writable(true);
        entry.set_pfn(pfn_from_pa(page_base_pa));
    }
    ept.invept_global();
}

/// Applies the resting view of every hooked page on the current
/// processor.
///
/// Runs in VM-exit context, reached through the host's hypercall
/// dispatcher after [`enable_hooks`] broadcast.
pub fn enable_page_shadowing(shared: &SharedHookState, ept: &mut impl EptOps) {
    for entry in &shared.page_entries {
        if entry.kinds.contains(PageHookKinds::FUNCTION) {
            if let Some(hook) = shared.find_function_by_page(entry.page_base_va) {
                show_shadow_for_exec(ept, entry.page_base_pa, hook.exec_base_pa);
            }
        } else {
            deny_monitored_access(ept, entry.page_base_pa);
        }
    }
}

/// Returns every hooked page to the original frame on the current
/// processor.
pub fn disable_page_shadowing(shared: &SharedHookState, ept: &mut impl EptOps) {
    for entry in &shared.page_entries {
        if entry.kinds.contains(PageHookKinds::FUNCTION) {
            restore_identity(ept, entry.page_base_pa);
        } else {
            allow_monitored_access(ept, entry.page_base_pa);
        }
    }
}

/// Activates page shadowing for every installed hook on all logical
/// processors.
pub fn enable_hooks<P: PlatformOps>(platform: &mut P) -> Result<(), ShadowHookError> {
    trace!("Enabling page shadowing on all processors");
    platform.for_each_processor(&mut |processor| processor.vmcall(Hypercall::EnablePageShadowing))
}

/// Deactivates page shadowing for every installed hook on all logical
/// processors.
pub fn disable_hooks<P: PlatformOps>(platform: &mut P) -> Result<(), ShadowHookError> {
    trace!("Disabling page shadowing on all processors");
    platform.for_each_processor(&mut |processor| processor.vmcall(Hypercall::DisablePageShadowing))
}
