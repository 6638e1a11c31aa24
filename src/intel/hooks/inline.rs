//! Trampoline code emission for inline hooks.
//!
//! An inline hook plants `0xCC` in the execute view of the victim page
//! and parks the displaced first instruction in a host stub; the stub
//! chains a small absolute jump back into the victim so hook handlers can
//! still call the original.

use {
    crate::error::ShadowHookError,
    alloc::{boxed::Box, vec::Vec},
    core::{mem, slice},
    static_assertions::const_assert_eq,
};

/// Breakpoint opcode planted at the patch offset of an execute view.
pub const BREAKPOINT: u8 = 0xCC;

/// An absolute-jump stub branching to an arbitrary host address.
///
/// ```text
/// 90               nop
/// ff2500000000     jmp qword ptr cs:[rip]
/// dq target
/// ```
///
/// The leading NOP is a consistent anchor byte when the stub is chained
/// after relocated prologue bytes.
#[cfg(target_arch = "x86_64")]
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct TrampolineCode {
    nop: u8,
    jmp: [u8; 6],
    address: u64,
}

#[cfg(target_arch = "x86_64")]
const_assert_eq!(mem::size_of::<TrampolineCode>(), 15);

#[cfg(target_arch = "x86_64")]
impl TrampolineCode {
    /// Builds a stub branching to `target`.
    pub fn new(target: u64) -> Self {
        Self {
            nop: 0x90,
            jmp: [0xFF, 0x25, 0x00, 0x00, 0x00, 0x00],
            address: target,
        }
    }
}

/// An absolute-jump stub branching to an arbitrary host address.
///
/// ```text
/// 90               nop
/// 68xxxxxxxx       push target
/// c3               ret
/// ```
#[cfg(target_arch = "x86")]
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct TrampolineCode {
    nop: u8,
    push: u8,
    address: u32,
    ret: u8,
}

#[cfg(target_arch = "x86")]
const_assert_eq!(mem::size_of::<TrampolineCode>(), 7);

#[cfg(target_arch = "x86")]
impl TrampolineCode {
    /// Builds a stub branching to `target`.
    pub fn new(target: u64) -> Self {
        Self {
            nop: 0x90,
            push: 0x68,
            address: target as u32,
            ret: 0xC3,
        }
    }
}

impl TrampolineCode {
    /// The raw bytes of the stub.
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self as *const Self as *const u8, mem::size_of::<Self>()) }
    }
}

/// Builds the original-call stub for an inline hook: the displaced
/// prologue bytes followed by a trampoline back to the instruction after
/// the breakpoint.
///
/// The stub is served by the global allocator, which the host must back
/// with executable non-paged memory; the guest-side handler calls through
/// it to reach the original function.
pub fn build_original_call(
    prologue: &[u8],
    jmp_to_original: &TrampolineCode,
) -> Result<Box<[u8]>, ShadowHookError> {
    let mut stub = Vec::new();
    stub.try_reserve_exact(prologue.len() + mem::size_of::<TrampolineCode>())
        .map_err(|_| ShadowHookError::StubAllocationFailed)?;
    stub.extend_from_slice(prologue);
    stub.extend_from_slice(jmp_to_original.as_bytes());
    Ok(stub.into_boxed_slice())
}
