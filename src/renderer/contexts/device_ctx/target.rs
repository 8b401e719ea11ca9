use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, Surface};
use crate::renderer::contexts::frame_ctx::FrameTarget;
use crate::renderer::error::{AcquireOutcome, PresentOutcome};
use crate::renderer::internals::swapchain::{Swapchain, SwapchainResources, SurfacePlan, SurfaceSupport};

pub struct RenderTarget {
    swapchain: Swapchain,
    swapchain_loader: ash::khr::swapchain::Device,
    command_pool: vk::CommandPool,

    present_modes: Vec<vk::PresentModeKHR>,
    clear_color: [f32; 4],
    acquire_timeout_ns: u64,

    device: Arc<RenderDevice>,
    // Destroyed after the swapchain built on it
    surface: Surface,
}

impl RenderTarget {
    pub fn new(
        instance: &RenderInstance,
        device: Arc<RenderDevice>,
        surface: Surface,
        extent: vk::Extent2D,
        config: &RenderConfig,
    ) -> Result<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance.instance, &device.logical);

        let support = SurfaceSupport::query(&surface.loader, device.physical, surface.handle)?;
        let plan = SurfacePlan::new(
            &support,
            extent,
            &config.present_modes,
            device.depth_format,
            device.msaa_samples,
        )?;
        let swapchain = Swapchain::new(
            &SwapchainResources {
                device: &device.logical,
                memory_allocator: device.memory_allocator(),
                loader: &swapchain_loader,
                surface: surface.handle,
                queue: device.graphics_queue.handle,
            },
            plan,
            vk::SwapchainKHR::null(),
        )?;

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_queue.family.index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            device.logical.create_command_pool(&command_pool_info, None)?
        };

        Ok(Self {
            swapchain,
            swapchain_loader,
            command_pool,

            present_modes: config.present_modes.clone(),
            clear_color: config.clear_color,
            acquire_timeout_ns: config.acquire_timeout_ns(),

            device,
            surface,
        })
    }

    pub fn plan(&self) -> &SurfacePlan {
        self.swapchain.plan()
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }
}

impl FrameTarget for RenderTarget {
    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn allocate_command_buffers(&mut self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe {
            self.device.logical.allocate_command_buffers(&allocate_info)?
        })
    }

    fn free_command_buffers(&mut self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe {
            self.device.logical.free_command_buffers(self.command_pool, command_buffers);
        }
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        self.swapchain.acquire_next_image(slot, self.acquire_timeout_ns)
    }

    fn begin_commands(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.logical.reset_command_buffer(
                command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
            self.device.logical.begin_command_buffer(command_buffer, &begin_info)?;
        }
        Ok(())
    }

    fn end_commands(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device.logical.end_command_buffer(command_buffer)?;
        }
        Ok(())
    }

    fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer, image_index: u32) {
        self.swapchain.begin_render_pass(command_buffer, image_index, self.clear_color);
    }

    fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) {
        self.swapchain.end_render_pass(command_buffer);
    }

    fn present(
        &mut self,
        slot: usize,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<PresentOutcome> {
        self.swapchain.present(slot, command_buffer, image_index, self.acquire_timeout_ns)
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> Result<bool> {
        self.device.wait_idle()?;

        let support = SurfaceSupport::query(
            &self.surface.loader,
            self.device.physical,
            self.surface.handle,
        )?;
        let plan = SurfacePlan::new(
            &support,
            extent,
            &self.present_modes,
            self.device.depth_format,
            self.device.msaa_samples,
        )?;
        if plan.extent.width == 0 || plan.extent.height == 0 {
            log::debug!("Surface has zero area, keeping the current swapchain");
            return Ok(false);
        }
        plan.ensure_compatible_with(self.swapchain.plan())?;

        let swapchain = Swapchain::new(
            &SwapchainResources {
                device: &self.device.logical,
                memory_allocator: self.device.memory_allocator(),
                loader: &self.swapchain_loader,
                surface: self.surface.handle,
                queue: self.device.graphics_queue.handle,
            },
            plan,
            self.swapchain.handle(),
        )?;
        // The retired swapchain is destroyed here, after its replacement exists
        self.swapchain = swapchain;

        Ok(true)
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle: {}", e);
            }
            self.device.logical.destroy_command_pool(self.command_pool, None);
        }
    }
}
