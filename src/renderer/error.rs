use ash::vk;
use thiserror::Error;

/// Fatal renderer errors that callers may want to tell apart.
///
/// Recoverable presentation states (stale or suboptimal surfaces) are never
/// reported through this type, see [`AcquireOutcome`] and [`PresentOutcome`].
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("No suitable physical device found")]
    NoSuitableDevice,

    #[error("Surface reports no formats")]
    NoSurfaceFormat,

    #[error("None of the requested present modes {requested:?} are supported (available: {available:?})")]
    PresentModeUnavailable {
        requested: Vec<vk::PresentModeKHR>,
        available: Vec<vk::PresentModeKHR>,
    },

    #[error("Frame slot {slot} did not finish within {timeout_ns} ns")]
    FenceTimeout {
        slot: usize,
        timeout_ns: u64,
    },

    #[error("No supported depth attachment format")]
    NoDepthFormat,

    #[error("Swapchain attachments changed on recreation: {old:?} -> {new:?}")]
    FormatMismatch {
        old: AttachmentFormats,
        new: AttachmentFormats,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
    pub samples: vk::SampleCountFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready(u32),
    /// The surface must be recreated before it can be drawn to.
    Stale,
    /// The frame slot's previous submission did not finish in time.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    Stale,
}

impl PresentOutcome {
    pub fn needs_recreation(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}
