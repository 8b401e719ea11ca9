use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use bytemuck::Pod;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, Surface};
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamily};
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::error::RenderError;
use crate::renderer::internals::buffer::Buffer;
use crate::renderer::internals::swapchain::{choose_depth_format, choose_sample_count, DEPTH_FORMAT_CANDIDATES};

pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,

    // Culling and drawing are recorded into the same command buffer, so one queue does everything
    pub graphics_queue: Arc<Queue>,

    pub depth_format: vk::Format,
    pub msaa_samples: vk::SampleCountFlags,

    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    transfer_context: ManuallyDrop<TransferContext>,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: &Surface,
        max_msaa_samples: u32,
    ) -> Result<Self> {
        let (physical_device, queue_family) = Self::select_physical_device(
            &instance.instance,
            surface,
        )?;

        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical_device)
        };
        log::info!(
            "Selected physical device: {:?} ({:?})",
            properties.device_name_as_c_str().unwrap_or(c"<unknown>"),
            properties.device_type,
        );

        let depth_format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            let props = unsafe {
                instance
                    .instance
                    .get_physical_device_format_properties(physical_device, format)
            };
            props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(RenderError::NoDepthFormat)?;
        let msaa_samples = choose_sample_count(
            properties.limits.framebuffer_color_sample_counts,
            properties.limits.framebuffer_depth_sample_counts,
            max_msaa_samples,
        );

        let (logical_device, graphics_queue) = Self::create_logical_device(
            &instance.instance,
            physical_device,
            queue_family,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: true,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let memory_allocator = match memory_allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { logical_device.destroy_device(None) };
                return Err(e.into());
            }
        };

        let logical_device = Arc::new(logical_device);
        let graphics_queue = Arc::new(graphics_queue);

        let transfer_context = match TransferContext::new(
            graphics_queue.clone(),
            logical_device.clone(),
        ) {
            Ok(ctx) => ctx,
            Err(e) => {
                drop(memory_allocator);
                unsafe { logical_device.destroy_device(None) };
                return Err(e);
            }
        };

        log::info!("Depth format {:?}, {:?} MSAA", depth_format, msaa_samples);

        Ok(Self {
            logical: logical_device,
            physical: physical_device,
            properties,

            graphics_queue,

            depth_format,
            msaa_samples,

            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            transfer_context: ManuallyDrop::new(transfer_context),
        })
    }

    pub fn memory_allocator(&self) -> &Arc<Mutex<Allocator>> {
        &self.memory_allocator
    }

    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        self.transfer_context.immediate_submit(func)
    }

    pub fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
        location: MemoryLocation,
    ) -> Result<Buffer> {
        Buffer::new(
            size,
            usage,
            name,
            location,
            (*self.memory_allocator).clone(),
            self.logical.clone(),
        )
    }

    pub fn create_device_local_buffer<T: Pod>(
        &self,
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Buffer> {
        let size = std::mem::size_of_val(data) as u64;
        let mut staging = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{} staging", name),
            MemoryLocation::CpuToGpu,
        )?;
        staging.write(data, 0)?;

        let buffer = self.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            name,
            MemoryLocation::GpuOnly,
        )?;

        if size > 0 {
            self.immediate_submit(|cmd, device| {
                let region = vk::BufferCopy::default().size(size);
                unsafe {
                    device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
                }
                Ok(())
            })?;
        }

        Ok(buffer)
    }

    pub fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &Surface,
    ) -> Result<(vk::PhysicalDevice, QueueFamily)> {
        let req_device_exts = Self::get_required_device_extensions();

        let devices = unsafe { instance.enumerate_physical_devices()? };
        devices
            .into_iter()
            // Filter out devices that do not contain the required device extensions
            .filter(|device| {
                let supported_extensions = unsafe {
                    instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default()
                };
                req_device_exts.iter().all(|req_ext| {
                    let supported = supported_extensions
                        .iter()
                        .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *req_ext));
                    if !supported {
                        log::warn!("Device extension not supported: {:?}", req_ext);
                    }
                    supported
                })
            })
            // Filter out devices that cannot draw indirectly with per-draw first instances
            .filter(|device| {
                let features = unsafe { instance.get_physical_device_features(*device) };
                let supported = features.multi_draw_indirect == vk::TRUE
                    && features.draw_indirect_first_instance == vk::TRUE;
                if !supported {
                    log::warn!("Device lacks multiDrawIndirect or drawIndirectFirstInstance");
                }
                supported
            })
            // Filter out devices without a queue that can draw, dispatch, and present
            .filter_map(|device| {
                let props = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };
                props
                    .into_iter()
                    .enumerate()
                    .map(|(i, props)| QueueFamily::new(i as u32, props))
                    .find(|family| {
                        let supports_present = unsafe {
                            surface.loader.get_physical_device_surface_support(
                                device,
                                family.index,
                                surface.handle,
                            )
                        }
                        .unwrap_or(false);
                        family.supports_graphics_and_compute() && supports_present
                    })
                    .map(|family| (device, family))
            })
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    vk::PhysicalDeviceType::CPU => 3,
                    vk::PhysicalDeviceType::OTHER => 4,
                    _ => 5,
                }
            })
            .ok_or_else(|| RenderError::NoSuitableDevice.into())
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: QueueFamily,
    ) -> Result<(ash::Device, Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family.index)
                .queue_priorities(&queue_priorities),
        ];

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default()
            .multi_draw_indirect(true)
            .draw_indirect_first_instance(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        let device = unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(queue_family.index, 0);
            Queue::new(queue_family, queue)
        };

        Ok((device, graphics_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle on shutdown: {}", e);
            }
            ManuallyDrop::drop(&mut self.transfer_context);
            // Any buffer still holding the allocator would free into a destroyed device
            if Arc::strong_count(&self.memory_allocator) > 1 {
                log::error!("Memory allocator still shared while the device is destroyed");
            }
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_device(None);
        }
    }
}
