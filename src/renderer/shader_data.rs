use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use crate::renderer::camera::Camera;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct SceneFrameUniform {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    pub frustum_planes: [Vec4; 6],
    pub frustum_corners: [Vec4; 8],
    pub flags: u32,
    pub instance_count: u32,
    _padding: [u32; 2],
}

impl SceneFrameUniform {
    pub const FLAG_FRUSTUM_CULLING: u32 = 1 << 0;

    pub fn new(camera: &Camera, instance_count: u32) -> Self {
        let mut uniform = Self {
            projection: camera.get_proj_mat(),
            view: camera.get_view_mat(),
            inverse_view: camera.get_inverse_view_mat(),
            instance_count,
            ..Default::default()
        };

        if camera.is_frustum_culling_enabled() {
            let frustum = camera.view_frustum();
            uniform.flags |= Self::FLAG_FRUSTUM_CULLING;
            uniform.frustum_planes = frustum.planes;
            uniform.frustum_corners = frustum.corners.map(|corner| corner.extend(1.0));
        }

        uniform
    }

    pub fn frustum_culling_enabled(&self) -> bool {
        self.flags & Self::FLAG_FRUSTUM_CULLING != 0
    }
}

/// One indexed indirect draw per mesh, laid out exactly like [`vk::DrawIndexedIndirectCommand`]
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawBatch {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

const _: () = assert!(size_of::<DrawBatch>() == size_of::<vk::DrawIndexedIndirectCommand>());

/// Links an instance slot to the object it draws and the batch it is counted in
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct InstanceCullRecord {
    pub instance_index: u32,
    pub batch_index: u32,
}

/// Data unique to each instance passed as elements into a storage buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct InstanceData {
    pub model: Mat4,
    pub normal: Mat4,
    /// World-space bounding sphere, center in xyz and radius in w
    pub bounds: Vec4,
    pub material_id: u32,
    pub object_id: u32,
    _padding: [u32; 2],
}

impl InstanceData {
    pub fn new(model: Mat4, normal: Mat4, bounds: Vec4, material_id: u32, object_id: u32) -> Self {
        Self {
            model,
            normal,
            bounds,
            material_id,
            object_id,
            _padding: [0; 2],
        }
    }
}

/// Data unique to each vertex passed as elements into a vertex buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PerVertexData {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_struct_sizes_match_shader_layouts() {
        assert_eq!(size_of::<SceneFrameUniform>(), 432);
        assert_eq!(size_of::<DrawBatch>(), 20);
        assert_eq!(size_of::<InstanceCullRecord>(), 8);
        assert_eq!(size_of::<InstanceData>(), 160);
        assert_eq!(size_of::<PerVertexData>(), 36);
    }

    #[test]
    fn uniform_carries_frustum_only_when_culling() {
        let mut camera = Camera::new();
        let culled = SceneFrameUniform::new(&camera, 7);
        assert!(culled.frustum_culling_enabled());
        assert_eq!(culled.instance_count, 7);
        assert_eq!(culled.frustum_planes, camera.view_frustum().planes);

        camera.set_frustum_culling(false);
        let unculled = SceneFrameUniform::new(&camera, 7);
        assert!(!unculled.frustum_culling_enabled());
        assert_eq!(unculled.frustum_planes, [Vec4::ZERO; 6]);
        assert_eq!(unculled.view, camera.get_view_mat());
    }
}
