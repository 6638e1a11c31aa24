//! The VMCS access seam.

/// Read and write access to the current VMCS.
///
/// Fields are the encodings of the `x86` crate's `vmx::vmcs` module; the
/// engine touches `guest::RIP` and
/// `control::PRIMARY_PROCBASED_EXEC_CONTROLS` only.
pub trait VmcsOps {
    /// Reads a specified field from the VMCS.
    fn vmread(&self, field: u32) -> u64;

    /// Writes to a specified field in the VMCS.
    fn vmwrite(&mut self, field: u32, value: u64);
}
