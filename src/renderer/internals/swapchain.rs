use std::sync::{Arc, Mutex};
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;
use gpu_allocator::vulkan::Allocator;
use smallvec::SmallVec;
use crate::renderer::error::{AcquireOutcome, AttachmentFormats, PresentOutcome, RenderError};
use crate::renderer::internals::image::Image;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }
}

/// Every choice a swapchain is built from.
///
/// The render pass, the attachments, and the framebuffers are all derived
/// from one plan, so they cannot disagree about formats or image count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
}

impl SurfacePlan {
    pub fn new(
        support: &SurfaceSupport,
        requested_extent: vk::Extent2D,
        present_modes: &[vk::PresentModeKHR],
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Result<Self, RenderError> {
        let caps = &support.capabilities;
        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        Ok(Self {
            surface_format: choose_surface_format(&support.formats)
                .ok_or(RenderError::NoSurfaceFormat)?,
            present_mode: choose_present_mode(&support.present_modes, present_modes)?,
            extent: choose_extent(caps, requested_extent),
            image_count: choose_image_count(caps),
            pre_transform,
            depth_format,
            samples,
        })
    }

    pub fn attachment_formats(&self) -> AttachmentFormats {
        AttachmentFormats {
            color: self.surface_format.format,
            depth: self.depth_format,
            samples: self.samples,
        }
    }

    /// Pipelines built against `previous` must stay valid for `self`
    pub fn ensure_compatible_with(&self, previous: &SurfacePlan) -> Result<(), RenderError> {
        let old = previous.attachment_formats();
        let new = self.attachment_formats();
        if old == new {
            Ok(())
        } else {
            Err(RenderError::FormatMismatch { old, new })
        }
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| **format == PREFERRED_SURFACE_FORMAT)
        .or_else(|| formats.first())
        .copied()
}

/// First requested mode the surface supports. There is deliberately no fallback.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    requested: &[vk::PresentModeKHR],
) -> Result<vk::PresentModeKHR, RenderError> {
    requested
        .iter()
        .find(|mode| available.contains(mode))
        .copied()
        .ok_or_else(|| RenderError::PresentModeUnavailable {
            requested: requested.to_vec(),
            available: available.to_vec(),
        })
}

pub fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: requested.width.clamp(
                caps.min_image_extent.width,
                caps.max_image_extent.width,
            ),
            height: requested.height.clamp(
                caps.min_image_extent.height,
                caps.max_image_extent.height,
            ),
        }
    }
}

pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    // Request one more image than the minimum so acquiring rarely waits on the driver.
    // A maximum of 0 means there is no limit.
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub fn choose_depth_format(
    candidates: &[vk::Format],
    supports_depth_attachment: impl Fn(vk::Format) -> bool,
) -> Option<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|format| supports_depth_attachment(*format))
}

/// Highest multisample count up to `max_samples` usable for both color and depth.
/// Falls back to 4, which every device supports for both.
pub fn choose_sample_count(
    color_counts: vk::SampleCountFlags,
    depth_counts: vk::SampleCountFlags,
    max_samples: u32,
) -> vk::SampleCountFlags {
    let usable = color_counts & depth_counts;
    [
        (64, vk::SampleCountFlags::TYPE_64),
        (32, vk::SampleCountFlags::TYPE_32),
        (16, vk::SampleCountFlags::TYPE_16),
        (8, vk::SampleCountFlags::TYPE_8),
        (4, vk::SampleCountFlags::TYPE_4),
        (2, vk::SampleCountFlags::TYPE_2),
    ]
    .into_iter()
    .find(|(count, flag)| *count <= max_samples && usable.contains(*flag))
    .map_or(vk::SampleCountFlags::TYPE_4, |(_, flag)| flag)
}

pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

struct FrameSync {
    image_available: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
    render_finished: [vk::Semaphore; MAX_FRAMES_IN_FLIGHT],
    in_flight: [vk::Fence; MAX_FRAMES_IN_FLIGHT],
    device: Arc<ash::Device>,
}

impl FrameSync {
    fn new(device: Arc<ash::Device>) -> Result<Self> {
        let mut sync = Self {
            image_available: [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT],
            render_finished: [vk::Semaphore::null(); MAX_FRAMES_IN_FLIGHT],
            in_flight: [vk::Fence::null(); MAX_FRAMES_IN_FLIGHT],
            device,
        };

        // Fences start signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            unsafe {
                sync.image_available[slot] = sync
                    .device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;
                sync.render_finished[slot] = sync
                    .device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;
                sync.in_flight[slot] = sync.device.create_fence(&fence_info, None)?;
            }
        }

        Ok(sync)
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        // Destroying null handles is a no-op, so a partially built set is fine
        unsafe {
            for slot in 0..MAX_FRAMES_IN_FLIGHT {
                self.device.destroy_semaphore(self.image_available[slot], None);
                self.device.destroy_semaphore(self.render_finished[slot], None);
                self.device.destroy_fence(self.in_flight[slot], None);
            }
        }
    }
}

// Frame slot whose fence guards the last submission targeting each image
#[derive(Debug, Default)]
struct ImagesInFlight {
    owners: SmallVec<[Option<usize>; 4]>,
}

impl ImagesInFlight {
    fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    /// Hand `image` to `slot`, returning the other slot that must finish with it first
    fn claim(&mut self, image: usize, slot: usize) -> Option<usize> {
        self.owners[image]
            .replace(slot)
            .filter(|&owner| owner != slot)
    }
}

fn check_fence_wait(result: VkResult<()>, slot: usize, timeout_ns: u64) -> Result<(), RenderError> {
    match result {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(RenderError::FenceTimeout { slot, timeout_ns }),
        Err(e) => Err(RenderError::Vulkan(e)),
    }
}

struct SwapchainImage {
    view: vk::ImageView,
    framebuffer: vk::Framebuffer,
    _color: Image,
    _depth: Image,
}

pub struct SwapchainResources<'a> {
    pub device: &'a Arc<ash::Device>,
    pub memory_allocator: &'a Arc<Mutex<Allocator>>,
    pub loader: &'a ash::khr::swapchain::Device,
    pub surface: vk::SurfaceKHR,
    pub queue: vk::Queue,
}

pub struct Swapchain {
    plan: SurfacePlan,
    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    render_pass: vk::RenderPass,
    images: Vec<SwapchainImage>,
    sync: FrameSync,
    images_in_flight: ImagesInFlight,
    queue: vk::Queue,
    device: Arc<ash::Device>,
}

impl Swapchain {
    pub fn new(
        res: &SwapchainResources,
        plan: SurfacePlan,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let device = res.device.clone();
        let sync = FrameSync::new(device.clone())?;

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(res.surface)
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(old_swapchain);
        let swapchain = unsafe {
            res.loader.create_swapchain(&swapchain_info, None)?
        };

        let mut chain = Self {
            plan,
            swapchain,
            swapchain_loader: res.loader.clone(),
            render_pass: vk::RenderPass::null(),
            images: Vec::new(),
            sync,
            images_in_flight: ImagesInFlight::default(),
            queue: res.queue,
            device,
        };

        // From here on `chain` owns everything, so an early return cleans up through Drop
        chain.render_pass = Self::create_render_pass(&chain.device, &plan)?;
        chain.images = chain.create_images(res.memory_allocator)?;
        chain.images_in_flight.reset(chain.images.len());

        log::info!(
            "Created swapchain: {} images, {}x{}, {:?}, {:?}, {:?} MSAA",
            chain.images.len(),
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.present_mode,
            plan.samples,
        );

        Ok(chain)
    }

    fn create_render_pass(
        device: &ash::Device,
        plan: &SurfacePlan,
    ) -> Result<vk::RenderPass> {
        let attachments = [
            // Multisampled color, resolved below and never stored
            vk::AttachmentDescription::default()
                .format(plan.surface_format.format)
                .samples(plan.samples)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            vk::AttachmentDescription::default()
                .format(plan.depth_format)
                .samples(plan.samples)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            // Swapchain image the color attachment resolves into
            vk::AttachmentDescription::default()
                .format(plan.surface_format.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::DONT_CARE)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        ];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let resolve_refs = [vk::AttachmentReference {
            attachment: 2,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)
            .resolve_attachments(&resolve_refs)];

        // Writes to the attachments wait for whatever previously used them outside the pass
        let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependencies = [vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(attachment_stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(attachment_stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )];

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        Ok(unsafe {
            device.create_render_pass(&render_pass_info, None)?
        })
    }

    fn create_images(
        &self,
        memory_allocator: &Arc<Mutex<Allocator>>,
    ) -> Result<Vec<SwapchainImage>> {
        let swapchain_images = unsafe {
            self.swapchain_loader.get_swapchain_images(self.swapchain)?
        };
        let views = swapchain_images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.plan.surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::R,
                        g: vk::ComponentSwizzle::G,
                        b: vk::ComponentSwizzle::B,
                        a: vk::ComponentSwizzle::A,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image(*image);
                unsafe {
                    self.device.create_image_view(&view_info, None)
                }
            })
            .collect::<VkResult<Vec<vk::ImageView>>>()?;

        let mut images = Vec::with_capacity(views.len());
        for view in views {
            let color = Image::new_color_attachment(
                self.plan.surface_format.format,
                self.plan.extent,
                self.plan.samples,
                memory_allocator.clone(),
                self.device.clone(),
            )?;
            let depth = Image::new_depth_attachment(
                self.plan.depth_format,
                self.plan.extent,
                self.plan.samples,
                memory_allocator.clone(),
                self.device.clone(),
            )?;

            // Attachment order matches the render pass: color, depth, resolve
            let attachments = [color.view, depth.view, view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.plan.extent.width)
                .height(self.plan.extent.height)
                .layers(1);
            let framebuffer = unsafe {
                self.device.create_framebuffer(&framebuffer_info, None)?
            };

            images.push(SwapchainImage {
                view,
                framebuffer,
                _color: color,
                _depth: depth,
            });
        }

        Ok(images)
    }

    pub fn plan(&self) -> &SurfacePlan {
        &self.plan
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    /// Block until `slot` is free, then acquire the next presentable image
    pub fn acquire_next_image(
        &mut self,
        slot: usize,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        let fence = self.sync.in_flight[slot];
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => {
                log::warn!("Frame slot {} still busy after {} ns", slot, timeout_ns);
                return Ok(AcquireOutcome::TimedOut);
            }
            Err(e) => return Err(RenderError::from(e).into()),
        }

        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                self.sync.image_available[slot],
                vk::Fence::null(),
            )
        };
        match acquired {
            // A suboptimal image is still drawn, presentation reports it again
            Ok((image_index, _suboptimal)) => Ok(AcquireOutcome::Ready(image_index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(AcquireOutcome::TimedOut),
            Err(e) => Err(RenderError::from(e).into()),
        }
    }

    pub fn present(
        &mut self,
        slot: usize,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        timeout_ns: u64,
    ) -> Result<PresentOutcome> {
        let fence = self.sync.in_flight[slot];

        // Another slot may still be rendering into this image
        if let Some(owner) = self.images_in_flight.claim(image_index as usize, slot) {
            let waited = unsafe {
                self.device.wait_for_fences(&[self.sync.in_flight[owner]], true, timeout_ns)
            };
            check_fence_wait(waited, owner, timeout_ns)?;
        }

        let wait_semaphores = [self.sync.image_available[slot]];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_finished[slot]];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.device.reset_fences(&[fence])?;
            self.device.queue_submit(self.queue, &[submit_info], fence)?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented = unsafe {
            self.swapchain_loader.queue_present(self.queue, &present_info)
        };
        match presented {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(RenderError::from(e).into()),
        }
    }

    pub fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        clear_color: [f32; 4],
    ) {
        let extent = self.plan.extent;
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            },
        ];
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(self.images[image_index as usize].framebuffer)
            .render_area(full_scissor(extent))
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
            self.device.cmd_set_viewport(command_buffer, 0, &[full_viewport(extent)]);
            self.device.cmd_set_scissor(command_buffer, 0, &[full_scissor(extent)]);
        }
    }

    pub fn end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_end_render_pass(command_buffer);
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for image in self.images.drain(..) {
                self.device.destroy_framebuffer(image.framebuffer, None);
                self.device.destroy_image_view(image.view, None);
            }
            self.device.destroy_render_pass(self.render_pass, None);
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32, current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 64, height: 64 },
            max_image_extent: vk::Extent2D { width: 4096, height: 2048 },
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    const UNDEFINED_EXTENT: vk::Extent2D = vk::Extent2D { width: u32::MAX, height: u32::MAX };

    fn support(current: vk::Extent2D) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: caps(2, 8, current),
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                PREFERRED_SURFACE_FORMAT,
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    fn plan_for(support: &SurfaceSupport, requested: vk::Extent2D) -> SurfacePlan {
        SurfacePlan::new(
            support,
            requested,
            &[vk::PresentModeKHR::MAILBOX],
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_4,
        )
        .unwrap()
    }

    #[test]
    fn prefers_srgb_surface_format() {
        let formats = support(UNDEFINED_EXTENT).formats;
        assert_eq!(choose_surface_format(&formats), Some(PREFERRED_SURFACE_FORMAT));
    }

    #[test]
    fn falls_back_to_first_surface_format() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_follows_priority_order() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        let requested = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(
            choose_present_mode(&available, &requested).unwrap(),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn missing_present_mode_is_an_error() {
        let result = choose_present_mode(&[vk::PresentModeKHR::FIFO], &[vk::PresentModeKHR::IMMEDIATE]);
        assert!(matches!(result, Err(RenderError::PresentModeUnavailable { .. })));
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let current = vk::Extent2D { width: 800, height: 600 };
        let extent = choose_extent(&caps(2, 3, current), vk::Extent2D { width: 10, height: 10 });
        assert_eq!(extent, current);
    }

    #[test]
    fn requested_extent_is_clamped() {
        let extent = choose_extent(
            &caps(2, 3, UNDEFINED_EXTENT),
            vk::Extent2D { width: 10, height: 9000 },
        );
        assert_eq!(extent, vk::Extent2D { width: 64, height: 2048 });
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        let any = vk::Extent2D { width: 1, height: 1 };
        assert_eq!(choose_image_count(&caps(2, 8, any)), 3);
        assert_eq!(choose_image_count(&caps(3, 3, any)), 3);
        assert_eq!(choose_image_count(&caps(2, 0, any)), 3);
    }

    #[test]
    fn depth_format_uses_first_supported_candidate() {
        let format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |f| f != vk::Format::D32_SFLOAT);
        assert_eq!(format, Some(vk::Format::D32_SFLOAT_S8_UINT));
        assert_eq!(choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| false), None);
    }

    #[test]
    fn sample_count_respects_both_attachments_and_cap() {
        let color = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        let depth = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;
        assert_eq!(choose_sample_count(color, depth, 8), vk::SampleCountFlags::TYPE_4);
        assert_eq!(choose_sample_count(color, color, 8), vk::SampleCountFlags::TYPE_8);
        assert_eq!(choose_sample_count(color, color, 2), vk::SampleCountFlags::TYPE_2);
        assert_eq!(choose_sample_count(color, color, 1), vk::SampleCountFlags::TYPE_4);
    }

    #[test]
    fn resize_keeps_attachment_formats_compatible() {
        let before = plan_for(&support(UNDEFINED_EXTENT), vk::Extent2D { width: 800, height: 600 });
        let after = plan_for(&support(UNDEFINED_EXTENT), vk::Extent2D { width: 1920, height: 1080 });

        assert_eq!(after.extent, vk::Extent2D { width: 1920, height: 1080 });
        assert_eq!(after.image_count, before.image_count);
        assert_eq!(after.attachment_formats(), before.attachment_formats());
        assert!(after.ensure_compatible_with(&before).is_ok());
    }

    #[test]
    fn changed_surface_format_is_fatal() {
        let before = plan_for(&support(UNDEFINED_EXTENT), vk::Extent2D { width: 800, height: 600 });

        let mut changed = support(UNDEFINED_EXTENT);
        changed.formats.retain(|f| *f != PREFERRED_SURFACE_FORMAT);
        let after = plan_for(&changed, vk::Extent2D { width: 800, height: 600 });

        assert!(matches!(
            after.ensure_compatible_with(&before),
            Err(RenderError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn viewport_covers_extent_with_unit_depth() {
        let extent = vk::Extent2D { width: 640, height: 480 };
        let viewport = full_viewport(extent);
        assert_eq!((viewport.width, viewport.height), (640.0, 480.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
        assert_eq!(full_scissor(extent).extent, extent);
    }

    fn images_in_flight(image_count: usize) -> ImagesInFlight {
        let mut tracker = ImagesInFlight::default();
        tracker.reset(image_count);
        tracker
    }

    #[test]
    fn first_use_of_an_image_needs_no_wait() {
        let mut tracker = images_in_flight(3);
        assert_eq!(tracker.claim(0, 0), None);
        assert_eq!(tracker.claim(1, 1), None);
        assert_eq!(tracker.claim(2, 0), None);
    }

    #[test]
    fn reused_image_waits_on_the_slot_that_last_wrote_it() {
        let mut tracker = images_in_flight(3);
        assert_eq!(tracker.claim(0, 1), None);
        assert_eq!(tracker.claim(0, 0), Some(1));
        assert_eq!(tracker.claim(0, 1), Some(0));
        // Other images keep their own owners
        assert_eq!(tracker.claim(2, 1), None);
    }

    #[test]
    fn same_slot_reclaiming_an_image_needs_no_wait() {
        let mut tracker = images_in_flight(2);
        assert_eq!(tracker.claim(1, 0), None);
        assert_eq!(tracker.claim(1, 0), None);
    }

    #[test]
    fn reset_forgets_owners_and_follows_the_new_image_count() {
        let mut tracker = images_in_flight(2);
        tracker.claim(0, 0);
        tracker.claim(1, 1);

        tracker.reset(4);
        assert_eq!(tracker.owners.len(), 4);
        assert_eq!(tracker.claim(0, 1), None);
        assert_eq!(tracker.claim(1, 0), None);
        assert_eq!(tracker.claim(3, 1), None);
    }

    #[test]
    fn fence_timeout_is_fatal_with_the_slot_it_waited_on() {
        assert!(check_fence_wait(Ok(()), 0, 10).is_ok());
        assert!(matches!(
            check_fence_wait(Err(vk::Result::TIMEOUT), 1, 5_000),
            Err(RenderError::FenceTimeout { slot: 1, timeout_ns: 5_000 })
        ));
        assert!(matches!(
            check_fence_wait(Err(vk::Result::ERROR_DEVICE_LOST), 0, 10),
            Err(RenderError::Vulkan(vk::Result::ERROR_DEVICE_LOST))
        ));
    }
}
