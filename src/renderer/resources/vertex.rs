use std::mem::offset_of;
use ash::vk;
use glam::Vec3;
use crate::renderer::shader_data::PerVertexData;

#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub fn as_shader_data(&self) -> PerVertexData {
        PerVertexData {
            position: self.position,
            normal: self.normal,
            color: self.color,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub flags: vk::PipelineVertexInputStateCreateFlags,
}

impl VertexInputDescription {
    /// One interleaved binding of [`PerVertexData`], locations in field order
    pub fn per_vertex_data() -> Self {
        let bindings = vec![
            vk::VertexInputBindingDescription::default()
                .binding(0)
                .stride(size_of::<PerVertexData>() as u32)
                .input_rate(vk::VertexInputRate::VERTEX),
        ];
        let attribute = |location: u32, offset: usize| {
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(location)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset as u32)
        };
        let attributes = vec![
            attribute(0, offset_of!(PerVertexData, position)),
            attribute(1, offset_of!(PerVertexData, normal)),
            attribute(2, offset_of!(PerVertexData, color)),
        ];

        Self {
            bindings,
            attributes,
            flags: vk::PipelineVertexInputStateCreateFlags::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_follow_vertex_layout() {
        let desc = VertexInputDescription::per_vertex_data();
        assert_eq!(desc.bindings[0].stride, 36);
        let offsets: Vec<u32> = desc.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        let locations: Vec<u32> = desc.attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2]);
    }
}
