//! EPT violation VM-exit handling.

use {
    crate::intel::{
        ept::EptOps,
        hooks::{
            hook::PageHookKinds,
            registry::{CpuHookState, SharedHookState},
        },
        shadow,
        vmcs::VmcsOps,
        vmexit::mtf::set_monitor_trap_flag,
    },
    log::trace,
    x86::vmx::vmcs,
};

/// Handles an EPT violation VM-exit.
///
/// A violation on a shadowed page means the guest is reading or writing a
/// page currently set execute-only, or touching a monitored page whose
/// access is denied. Either way the page is opened for exactly one
/// instruction: the view is flipped, MTF is armed, and the entry is
/// stashed so the MTF handler can flip the view back. Violations on pages
/// the engine does not own return without effect.
pub fn handle_ept_violation(
    cpu: &mut CpuHookState,
    shared: &SharedHookState,
    ept: &mut impl EptOps,
    vmcs: &mut impl VmcsOps,
    fault_va: u64,
) {
    trace!("EPT violation at {:#x}", fault_va);

    let entry = match shared.find_page(fault_va) {
        Some(entry) => *entry,
        None => return,
    };

    if entry.kinds.contains(PageHookKinds::FUNCTION) {
        // Present the pristine bytes for the read or write the guest is
        // about to perform.
        let hook = match shared.find_function_by_page(fault_va) {
            Some(hook) => hook,
            None => return,
        };
        shadow::show_shadow_for_rw(ept, entry.page_base_pa, hook.rw_base_pa);
    } else {
        shadow::allow_monitored_access(ept, entry.page_base_pa);
    }

    set_monitor_trap_flag(vmcs, true);
    cpu.save_last_hook(entry);

    if entry.kinds.contains(PageHookKinds::MONITOR) {
        if let Some(monitor) = shared.find_monitor_by_page(fault_va) {
            if fault_va >= monitor.mem_address && fault_va <= monitor.mem_address + monitor.mem_len
            {
                (monitor.handler)(fault_va, vmcs.vmread(vmcs::guest::RIP));
            }
        }
    }
}
