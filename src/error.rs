use thiserror_no_std::Error;

#[derive(Error, Debug)]
pub enum ShadowHookError {
    #[error("Failed to save the floating point state")]
    FpuStateSaveFailed,

    #[error("Failed to determine the length of the target instruction")]
    InstructionDecodeFailed,

    #[error("Failed to allocate the original-call stub")]
    StubAllocationFailed,

    #[error("Patch code is empty")]
    EmptyPatchCode,

    #[error("Patch code exceeds the supported maximum")]
    PatchTooLong,

    #[error("Patch code would cross a page boundary")]
    PatchCrossesPageBoundary,

    #[error("Hypercall was rejected by the host dispatcher")]
    HypercallFailed,

    #[error("Failed to run on every logical processor")]
    ProcessorBroadcastFailed,
}
