//! Monitor Trap Flag VM-exit handling.

use {
    crate::intel::{
        ept::EptOps,
        hooks::{
            hook::PageHookKinds,
            registry::{CpuHookState, SharedHookState},
        },
        shadow,
        vmcs::VmcsOps,
    },
    log::trace,
    x86::vmx::vmcs::{self, control::PrimaryControls},
};

/// Handles the MTF VM-exit that follows the single-stepped instruction on
/// a shadowed page: re-hides the page and clears MTF.
///
/// An empty per-processor slot here means no EPT violation armed the
/// trap; that pairing is broken only by a programming error, so it
/// escalates to a bug check.
pub fn handle_monitor_trap_flag(
    cpu: &mut CpuHookState,
    shared: &SharedHookState,
    ept: &mut impl EptOps,
    vmcs: &mut impl VmcsOps,
) {
    trace!("Monitor trap after single step");

    let entry = cpu
        .take_last_hook()
        .expect("monitor trap flag fired without a preceding EPT violation");

    if entry.kinds.contains(PageHookKinds::FUNCTION) {
        if let Some(hook) = shared.find_function_by_page(entry.page_base_va) {
            shadow::show_shadow_for_exec(ept, entry.page_base_pa, hook.exec_base_pa);
        }
    } else {
        shadow::deny_monitored_access(ept, entry.page_base_pa);
    }

    set_monitor_trap_flag(vmcs, false);
}

/// Sets or clears the monitor trap flag on the current processor.
///
/// # Arguments
///
/// * `vmcs` - The current VMCS.
/// * `enable` - A flag indicating whether to set the monitor trap flag.
pub fn set_monitor_trap_flag(vmcs: &mut impl VmcsOps, enable: bool) {
    let controls = vmcs.vmread(vmcs::control::PRIMARY_PROCBASED_EXEC_CONTROLS);
    let mut primary_controls = unsafe { PrimaryControls::from_bits_unchecked(controls as u32) };

    if enable {
        primary_controls.insert(PrimaryControls::MONITOR_TRAP_FLAG);
    } else {
        primary_controls.remove(PrimaryControls::MONITOR_TRAP_FLAG);
    }

    vmcs.vmwrite(
        vmcs::control::PRIMARY_PROCBASED_EXEC_CONTROLS,
        primary_controls.bits() as u64,
    );
}
