use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::camera::Camera;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::pipeline_ctx::batch::DrawBatchList;
use crate::renderer::internals::buffer::Buffer;
use crate::renderer::internals::descriptor_set_layout_builder::DescriptorSetLayoutBuilder;
use crate::renderer::internals::swapchain::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::resources::material::{ComputeMaterialBuilder, GraphicsMaterialBuilder, Material};
use crate::renderer::resources::mesh::GeometryBuffers;
use crate::renderer::resources::shader::{ComputeShader, GraphicsShader};
use crate::renderer::resources::vertex::VertexInputDescription;
use crate::renderer::scene::Scene;
use crate::renderer::shader_data::{DrawBatch, InstanceCullRecord, InstanceData, SceneFrameUniform};
use crate::renderer::util::{pad_uniform_buffer_size, workgroup_count};

/// Must match `@workgroup_size` in `instance_cull.wgsl`
const CULL_WORKGROUP_SIZE: u32 = 64;

const FRAME_UNIFORM_BINDING: u32 = 0;
const DRAW_BATCH_BINDING: u32 = 1;
const CULL_RECORD_BINDING: u32 = 2;
const INSTANCE_DATA_BINDING: u32 = 3;
const VISIBLE_INSTANCE_BINDING: u32 = 4;

struct SlotResources {
    descriptor_set: vk::DescriptorSet,
    frame_uniform: Buffer,
    draw_batches: Buffer,
    cull_records: Buffer,
    instance_data: Buffer,
    visible_instances: Buffer,
}

struct DescriptorResources {
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pipeline_layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl Drop for DescriptorResources {
    fn drop(&mut self) {
        // Null handles are ignored, so a partially built set is fine
        unsafe {
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

/// Builds indirect draws from the scene, culls instances on the GPU, and draws the survivors.
///
/// Every frame slot has its own copy of every buffer the GPU reads or writes,
/// so recording slot `n` never touches memory a submission of the other slot may still use.
pub struct DrawCullPipeline {
    cull_material: Material,
    draw_material: Material,
    slots: Vec<SlotResources>,
    cleared_batches: Buffer,
    geometry: GeometryBuffers,
    descriptors: DescriptorResources,

    batches: DrawBatchList,
    built_epoch: Option<u64>,
    frame_uniform_size: u64,

    device: Arc<RenderDevice>,
}

impl DrawCullPipeline {
    pub fn new(
        device: Arc<RenderDevice>,
        render_pass: vk::RenderPass,
        samples: vk::SampleCountFlags,
        geometry: GeometryBuffers,
    ) -> Result<Self> {
        let logical = device.logical.clone();
        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::COMPUTE;
        let layout_builder = DescriptorSetLayoutBuilder::new()
            .add_binding(FRAME_UNIFORM_BINDING, vk::DescriptorType::UNIFORM_BUFFER, stages)
            .add_binding(DRAW_BATCH_BINDING, vk::DescriptorType::STORAGE_BUFFER, stages)
            .add_binding(CULL_RECORD_BINDING, vk::DescriptorType::STORAGE_BUFFER, stages)
            .add_binding(INSTANCE_DATA_BINDING, vk::DescriptorType::STORAGE_BUFFER, stages)
            .add_binding(VISIBLE_INSTANCE_BINDING, vk::DescriptorType::STORAGE_BUFFER, stages);

        let mut descriptors = DescriptorResources {
            set_layout: vk::DescriptorSetLayout::null(),
            pool: vk::DescriptorPool::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            device: logical.clone(),
        };
        descriptors.set_layout = layout_builder.build(&logical)?;

        let pool_sizes = layout_builder.pool_sizes(MAX_FRAMES_IN_FLIGHT as u32);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(MAX_FRAMES_IN_FLIGHT as u32)
            .pool_sizes(&pool_sizes);
        descriptors.pool = unsafe { logical.create_descriptor_pool(&pool_info, None)? };

        let set_layouts = [descriptors.set_layout];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts);
        descriptors.pipeline_layout = unsafe {
            logical.create_pipeline_layout(&pipeline_layout_info, None)?
        };

        let descriptor_sets = {
            let set_layouts = [descriptors.set_layout; MAX_FRAMES_IN_FLIGHT];
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(descriptors.pool)
                .set_layouts(&set_layouts);
            unsafe { logical.allocate_descriptor_sets(&allocate_info)? }
        };

        let cull_material = ComputeMaterialBuilder::new(logical.clone())
            .with_shader(ComputeShader::new("instance_cull", logical.clone())?)
            .with_pipeline_layout(descriptors.pipeline_layout)
            .build()?;
        let draw_material = GraphicsMaterialBuilder::new(logical.clone())
            .with_shader(GraphicsShader::new("mesh", logical.clone())?)
            .with_pipeline_layout(descriptors.pipeline_layout)
            .with_render_pass(render_pass, 0)
            .with_samples(samples)
            .with_vertex_input(VertexInputDescription::per_vertex_data())
            .with_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .with_polygon_mode(vk::PolygonMode::FILL)
            .with_cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
            .with_blending_disabled()
            .with_depth_test(true, Some(vk::CompareOp::LESS_OR_EQUAL))
            .build()?;

        let frame_uniform_size = pad_uniform_buffer_size(
            size_of::<SceneFrameUniform>() as u64,
            device.min_uniform_buffer_offset_alignment(),
        );

        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for (slot, descriptor_set) in descriptor_sets.into_iter().enumerate() {
            slots.push(SlotResources {
                descriptor_set,
                frame_uniform: device.create_buffer(
                    frame_uniform_size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    &format!("Frame uniform {}", slot),
                    MemoryLocation::CpuToGpu,
                )?,
                draw_batches: Self::create_draw_batch_buffer(&device, &[], slot)?,
                cull_records: Self::create_cull_record_buffer(&device, &[], slot)?,
                instance_data: Self::create_instance_data_buffer(&device, 0, slot)?,
                visible_instances: Self::create_visible_instance_buffer(&device, 0, slot)?,
            });
        }
        let cleared_batches = device.create_device_local_buffer::<DrawBatch>(
            &[],
            vk::BufferUsageFlags::TRANSFER_SRC,
            "Cleared draw batches",
        )?;

        let pipeline = Self {
            cull_material,
            draw_material,
            slots,
            cleared_batches,
            geometry,
            descriptors,

            batches: DrawBatchList::default(),
            built_epoch: None,
            frame_uniform_size,

            device,
        };
        pipeline.write_descriptor_sets();

        Ok(pipeline)
    }

    /// Rebuild batches and records if the scene's population changed since the last build.
    /// Returns whether anything was rebuilt.
    pub fn sync_with_scene(&mut self, scene: &Scene) -> Result<bool> {
        let epoch = scene.population_epoch();
        if self.built_epoch == Some(epoch) {
            return Ok(false);
        }

        // Every slot is rewritten, so nothing in flight may still read them
        self.device.wait_idle()?;

        let batches = DrawBatchList::build(scene);
        self.rebuild_draw_batches(&batches)?;
        self.rebuild_instance_records(&batches)?;
        self.batches = batches;
        self.write_descriptor_sets();
        self.built_epoch = Some(epoch);

        log::info!(
            "Rebuilt {} draw batches for {} instances",
            self.batches.batch_count(),
            self.batches.instance_count(),
        );

        Ok(true)
    }

    // One indirect draw per mesh with objects, uploaded into every slot and the cleared template
    fn rebuild_draw_batches(&mut self, batches: &DrawBatchList) -> Result<()> {
        self.cleared_batches = self.device.create_device_local_buffer(
            &batches.cleared_batches(),
            vk::BufferUsageFlags::TRANSFER_SRC,
            "Cleared draw batches",
        )?;
        for (slot, resources) in self.slots.iter_mut().enumerate() {
            resources.draw_batches = Self::create_draw_batch_buffer(&self.device, &batches.batches, slot)?;
        }

        log::debug!("Uploaded {} draw batches", batches.batch_count());
        Ok(())
    }

    // Records in global batch order, plus the per-slot buffers sized by instance count
    fn rebuild_instance_records(&mut self, batches: &DrawBatchList) -> Result<()> {
        let records = batches.instance_records();
        let instance_count = batches.instance_count();
        for (slot, resources) in self.slots.iter_mut().enumerate() {
            resources.cull_records = Self::create_cull_record_buffer(&self.device, &records, slot)?;
            resources.instance_data = Self::create_instance_data_buffer(&self.device, instance_count, slot)?;
            resources.visible_instances = Self::create_visible_instance_buffer(&self.device, instance_count, slot)?;
        }

        log::debug!("Uploaded {} instance cull records", records.len());
        Ok(())
    }

    pub fn update_instance_data(&mut self, scene: &Scene, slot: usize) -> Result<()> {
        let data = self.batches.instance_data(scene);
        if data.len() != self.batches.instance_count() as usize {
            return Err(eyre!(
                "Scene population changed without a rebuild: {} of {} instances found",
                data.len(),
                self.batches.instance_count(),
            ));
        }
        self.slots[slot].instance_data.write(&data, 0)
    }

    pub fn update_frame_uniform(&mut self, camera: &Camera, slot: usize) -> Result<()> {
        let uniform = SceneFrameUniform::new(camera, self.batches.instance_count());
        self.slots[slot].frame_uniform.write(&[uniform], 0)
    }

    /// Reset the slot's indirect draws and record the cull pass that refills their instance counts
    pub fn dispatch_cull(&self, command_buffer: vk::CommandBuffer, slot: usize) {
        let device = &self.device.logical;
        let resources = &self.slots[slot];
        let batch_bytes = (self.batches.batches.len() * size_of::<DrawBatch>()) as u64;

        unsafe {
            if batch_bytes > 0 {
                let region = vk::BufferCopy::default().size(batch_bytes);
                device.cmd_copy_buffer(
                    command_buffer,
                    self.cleared_batches.buffer,
                    resources.draw_batches.buffer,
                    &[region],
                );
            }

            let reset_barrier = vk::MemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE);
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::DependencyFlags::empty(),
                &[reset_barrier],
                &[],
                &[],
            );
        }

        self.cull_material.bind_pipeline(command_buffer);
        self.cull_material.bind_descriptor_sets(command_buffer, 0, &[resources.descriptor_set]);

        let group_count = workgroup_count(self.batches.instance_count(), CULL_WORKGROUP_SIZE);
        unsafe {
            if group_count > 0 {
                device.cmd_dispatch(command_buffer, group_count, 1, 1);
            }

            let cull_barrier = vk::MemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(vk::AccessFlags::INDIRECT_COMMAND_READ | vk::AccessFlags::SHADER_READ);
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::DRAW_INDIRECT | vk::PipelineStageFlags::VERTEX_SHADER,
                vk::DependencyFlags::empty(),
                &[cull_barrier],
                &[],
                &[],
            );
        }
    }

    /// Issue every batch of the slot as one multi-draw. Must be inside the render pass.
    pub fn draw(&self, command_buffer: vk::CommandBuffer, slot: usize) {
        let batch_count = self.batches.batch_count();
        if batch_count == 0 {
            return;
        }
        let device = &self.device.logical;
        let resources = &self.slots[slot];

        self.draw_material.bind_pipeline(command_buffer);
        self.draw_material.bind_descriptor_sets(command_buffer, 0, &[resources.descriptor_set]);
        unsafe {
            device.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[self.geometry.vertex_buffer.buffer],
                &[0],
            );
            device.cmd_bind_index_buffer(
                command_buffer,
                self.geometry.index_buffer.buffer,
                0,
                vk::IndexType::UINT32,
            );
            device.cmd_draw_indexed_indirect(
                command_buffer,
                resources.draw_batches.buffer,
                0,
                batch_count,
                size_of::<vk::DrawIndexedIndirectCommand>() as u32,
            );
        }
    }

    fn write_descriptor_sets(&self) {
        for resources in &self.slots {
            let uniform_info = [vk::DescriptorBufferInfo::default()
                .buffer(resources.frame_uniform.buffer)
                .offset(0)
                .range(self.frame_uniform_size)];
            let batch_info = [resources.draw_batches.descriptor_info()];
            let record_info = [resources.cull_records.descriptor_info()];
            let instance_info = [resources.instance_data.descriptor_info()];
            let visible_info = [resources.visible_instances.descriptor_info()];

            let set = resources.descriptor_set;
            let writes = [
                buffer_write(set, FRAME_UNIFORM_BINDING, vk::DescriptorType::UNIFORM_BUFFER, &uniform_info),
                buffer_write(set, DRAW_BATCH_BINDING, vk::DescriptorType::STORAGE_BUFFER, &batch_info),
                buffer_write(set, CULL_RECORD_BINDING, vk::DescriptorType::STORAGE_BUFFER, &record_info),
                buffer_write(set, INSTANCE_DATA_BINDING, vk::DescriptorType::STORAGE_BUFFER, &instance_info),
                buffer_write(set, VISIBLE_INSTANCE_BINDING, vk::DescriptorType::STORAGE_BUFFER, &visible_info),
            ];
            unsafe {
                self.device.logical.update_descriptor_sets(&writes, &[]);
            }
        }
    }

    fn create_draw_batch_buffer(device: &RenderDevice, batches: &[DrawBatch], slot: usize) -> Result<Buffer> {
        device.create_device_local_buffer(
            batches,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::INDIRECT_BUFFER,
            &format!("Draw batches {}", slot),
        )
    }

    fn create_cull_record_buffer(device: &RenderDevice, records: &[InstanceCullRecord], slot: usize) -> Result<Buffer> {
        device.create_device_local_buffer(
            records,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &format!("Cull records {}", slot),
        )
    }

    fn create_instance_data_buffer(device: &RenderDevice, instance_count: u32, slot: usize) -> Result<Buffer> {
        device.create_buffer(
            instance_count as u64 * size_of::<InstanceData>() as u64,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &format!("Instance data {}", slot),
            MemoryLocation::CpuToGpu,
        )
    }

    fn create_visible_instance_buffer(device: &RenderDevice, instance_count: u32, slot: usize) -> Result<Buffer> {
        device.create_buffer(
            instance_count as u64 * size_of::<u32>() as u64,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &format!("Visible instances {}", slot),
            MemoryLocation::GpuOnly,
        )
    }
}

fn buffer_write<'a>(
    set: vk::DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    info: &'a [vk::DescriptorBufferInfo],
) -> vk::WriteDescriptorSet<'a> {
    vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(descriptor_type)
        .buffer_info(info)
}
