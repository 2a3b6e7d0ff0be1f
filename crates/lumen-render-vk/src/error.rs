// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Swap chain (re)creation failures.
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("surface advertises no formats")]
    NoCompatibleFormat,
    #[error("surface advertises no present modes")]
    NoCompatiblePresentMode,
    #[error("device rejected swap chain resources: {0}")]
    DeviceRejected(#[from] vk::Result),
}

/// Loop-fatal failures. Stale or suboptimal presentation never shows up here.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("waiting on frame fence failed: {0}")]
    FenceWait(vk::Result),
    #[error("acquire_next_image failed: {0}")]
    Acquire(vk::Result),
    #[error("command buffer recording failed: {0}")]
    Record(vk::Result),
    #[error("queue_submit failed: {0}")]
    Submit(vk::Result),
    #[error("queue_present failed: {0}")]
    Present(vk::Result),
    #[error("device call failed: {0}")]
    Device(vk::Result),
    #[error("swap chain recreation failed: {0}")]
    Recreate(#[from] SurfaceError),
}

/// Startup failures: unmet environment preconditions, never retried.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("validation layer {0} requested but not available")]
    ValidationUnavailable(&'static str),
    #[error("no GPU with graphics + present queues and swapchain support")]
    NoSuitableGpu,
    #[error("no memory type matches bits {type_bits:#x} with {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },
}
