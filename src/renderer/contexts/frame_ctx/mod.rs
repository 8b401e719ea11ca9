pub mod frame;

use ash::vk;
use color_eyre::Result;
use crate::renderer::error::{AcquireOutcome, PresentOutcome};

pub use frame::FrameController;

/// Everything the frame loop needs from a presentation surface.
///
/// `slot` is always the frame-in-flight index chosen by the [`FrameController`],
/// so targets never keep their own frame counter.
pub trait FrameTarget {
    fn extent(&self) -> vk::Extent2D;

    fn allocate_command_buffers(&mut self, count: u32) -> Result<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&mut self, command_buffers: &[vk::CommandBuffer]);

    /// Wait for `slot` to be free and acquire the next image
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    fn begin_commands(&mut self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn end_commands(&mut self, command_buffer: vk::CommandBuffer) -> Result<()>;

    fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer, image_index: u32);
    fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer);

    fn present(
        &mut self,
        slot: usize,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<PresentOutcome>;

    /// Rebuild the swapchain for `extent`. Returns `false` when the surface has
    /// zero area and the old swapchain was kept.
    fn recreate(&mut self, extent: vk::Extent2D) -> Result<bool>;
}
