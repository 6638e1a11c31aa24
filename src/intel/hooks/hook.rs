//! Hook records and user-facing target descriptions.

use {
    crate::intel::page::ShadowPage,
    alloc::{boxed::Box, sync::Arc, vec::Vec},
    bitflags::bitflags,
    core::sync::atomic::AtomicU64,
};

/// Handler invoked when a monitored memory range is touched.
///
/// Receives the faulting guest VA and the guest RIP performing the
/// access. Runs synchronously in VM-exit context and must not block.
pub type MemoryMonitorHandler = fn(fault_va: u64, guest_rip: u64);

/// Upper bound on raw patch code copied into an execute view.
pub const MAX_PATCH_CODE: usize = 0x100;

bitflags! {
    /// The kinds of hooks present on one guest page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageHookKinds: u8 {
        /// At least one function-level hook (breakpoint or patch).
        const FUNCTION = 0b01;
        /// At least one memory-access monitor.
        const MONITOR = 0b10;
    }
}

/// Index entry for one guest page carrying hooks.
///
/// Exactly one entry exists per distinct hooked page; its kind set tells
/// the VM-exit handlers which sub-catalogs to consult.
#[derive(Debug, Clone, Copy)]
pub struct PageHookEntry {
    /// 4 KiB-aligned guest VA of the hooked page.
    pub page_base_va: u64,

    /// Physical address of the original frame, captured at install time
    /// so VM-exit paths never translate addresses.
    pub page_base_pa: u64,

    /// Which kinds of hooks the page carries.
    pub kinds: PageHookKinds,
}

/// Payload distinguishing breakpoint hooks from raw patches.
#[derive(Debug)]
pub enum FunctionHookKind {
    /// `0xCC` planted at the patch offset; #BP redirects the guest to
    /// `handler`. `original_call` owns the displaced prologue bytes
    /// followed by a jump back past the breakpoint.
    Breakpoint { handler: u64, original_call: Box<[u8]> },

    /// Raw bytes copied over the execute view; no redirection happens.
    Patch { new_code: Vec<u8> },
}

/// A function-level hook living in the execute view of one guest page.
#[derive(Debug)]
pub struct FunctionHook {
    /// Guest VA of the first byte of the victim instruction.
    pub patch_address: u64,

    /// Breakpoint or raw patch.
    pub kind: FunctionHookKind,

    /// Copy of the page presented for execution; carries the planted bytes.
    pub exec_shadow: Arc<ShadowPage>,

    /// Copy of the page presented for reads and writes; pristine bytes.
    pub rw_shadow: Arc<ShadowPage>,

    /// Physical address of the execute view.
    pub exec_base_pa: u64,

    /// Physical address of the read/write view.
    pub rw_base_pa: u64,
}

/// A monitor observing reads and writes of a guest memory range.
#[derive(Debug)]
pub struct MemoryMonitor {
    /// Guest VA of the first monitored byte; arbitrary alignment.
    pub mem_address: u64,

    /// Extent of the monitored range in bytes.
    pub mem_len: u64,

    /// Callback fired for accesses inside the range.
    pub handler: MemoryMonitorHandler,

    /// Copy of the page presented for reads and writes.
    pub rw_shadow: Arc<ShadowPage>,

    /// Physical address of the read/write view.
    pub rw_base_pa: u64,
}

/// Where to install an inline hook and who handles it.
///
/// Name and export resolution of the victim stays with the caller; the
/// engine receives the resolved address.
#[derive(Debug)]
pub struct HookTarget {
    /// Resolved guest VA of the function to hook.
    pub target_address: u64,

    /// Host VA the guest is redirected to on #BP.
    pub handler: u64,

    /// Receives the host VA of the original-call stub once the hook is
    /// installed; the handler loads it to reach the displaced original.
    pub original_call: AtomicU64,
}

impl HookTarget {
    pub fn new(target_address: u64, handler: u64) -> Self {
        Self {
            target_address,
            handler,
            original_call: AtomicU64::new(0),
        }
    }
}

/// Where to apply a raw patch and what to write there.
pub struct PatchTarget {
    /// Resolved guest VA of the first patched byte.
    pub target_address: u64,

    /// Number of `new_code` bytes copied over the execute view.
    pub patch_length: usize,

    /// The patch code.
    pub new_code: [u8; MAX_PATCH_CODE],
}

/// A guest memory range to monitor for reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct MonitorTarget {
    /// Guest VA of the first monitored byte.
    pub target_address: u64,

    /// Extent of the monitored range in bytes.
    pub len: u64,

    /// Callback fired for accesses inside the range.
    pub handler: MemoryMonitorHandler,
}
