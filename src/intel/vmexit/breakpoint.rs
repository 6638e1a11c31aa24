//! #BP VM-exit handling.

use {
    crate::intel::{
        hooks::{hook::FunctionHookKind, registry::SharedHookState},
        vmcs::VmcsOps,
    },
    log::trace,
    x86::vmx::vmcs,
};

/// Handles #BP. Checks whether the breakpoint is one the engine planted
/// and, if so, overwrites the guest RIP with the hook handler so the
/// guest resumes inside it. The handler is expected to call back through
/// the published original-call stub when it wants the original behavior.
///
/// Returns `false` for breakpoints the engine does not own; the host
/// dispatcher reinjects those into the guest.
pub fn handle_breakpoint(
    shared: &SharedHookState,
    vmcs: &mut impl VmcsOps,
    guest_ip: u64,
) -> bool {
    if shared.find_page(guest_ip).is_none() {
        return false;
    }

    let hook = match shared.find_function_by_address(guest_ip) {
        Some(hook) => hook,
        None => return false,
    };

    let handler = match &hook.kind {
        FunctionHookKind::Breakpoint { handler, .. } => *handler,
        FunctionHookKind::Patch { .. } => return false,
    };

    trace!("Redirecting guest RIP {:#x} to handler {:#x}", guest_ip, handler);
    vmcs.vmwrite(vmcs::guest::RIP, handler);

    true
}
