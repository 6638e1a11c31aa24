//! Thin adapter over the x86 instruction decoder.

use {
    crate::{error::ShadowHookError, platform::PlatformOps},
    iced_x86::{Decoder, DecoderOptions},
};

/// Longest encodable x86 instruction.
pub const MAX_INSTRUCTION_SIZE: usize = 15;

#[cfg(target_arch = "x86_64")]
const BITNESS: u32 = 64;
#[cfg(target_arch = "x86")]
const BITNESS: u32 = 32;

/// Returns the length in bytes of the first instruction in `bytes`.
///
/// The decoder may touch SIMD registers, so the floating point state of
/// the current processor is saved and restored around it. A state-save
/// failure or an undecodable byte sequence aborts hook installation.
pub fn instruction_size(
    platform: &mut impl PlatformOps,
    bytes: &[u8],
) -> Result<usize, ShadowHookError> {
    if !platform.save_fpu() {
        return Err(ShadowHookError::FpuStateSaveFailed);
    }

    let mut decoder = Decoder::new(BITNESS, bytes, DecoderOptions::NONE);
    let instruction = decoder.decode();
    let size = if instruction.is_invalid() { 0 } else { instruction.len() };

    platform.restore_fpu();

    if size == 0 {
        return Err(ShadowHookError::InstructionDecodeFailed);
    }

    Ok(size)
}
