use ash::vk;
use color_eyre::Result;
use glam::Vec3;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::internals::buffer::Buffer;
use crate::renderer::resources::vertex::Vertex;
use crate::renderer::scene::MeshInfo;
use crate::renderer::shader_data::PerVertexData;

/// CPU-side geometry, counter-clockwise front faces
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
        }
    }

    /// Distance from the local origin to the farthest vertex
    pub fn bounding_radius(&self) -> f32 {
        self.vertices
            .iter()
            .map(|vertex| vertex.position.length())
            .fold(0.0, f32::max)
    }

    pub fn new_triangle() -> Self {
        let vertices = vec![
            Vertex { // Bottom left
                position: [-0.5, -0.5, 0.0].into(),
                normal: [0.0, 0.0, 1.0].into(),
                color: [1.0, 0.0, 0.0].into(),
            },
            Vertex { // Bottom right
                position: [0.5, -0.5, 0.0].into(),
                normal: [0.0, 0.0, 1.0].into(),
                color: [0.0, 1.0, 0.0].into(),
            },
            Vertex { // Top
                position: [0.0, 0.5, 0.0].into(),
                normal: [0.0, 0.0, 1.0].into(),
                color: [0.0, 0.0, 1.0].into(),
            },
        ];

        Self::new(vertices, vec![0, 1, 2])
    }

    pub fn new_quad() -> Self {
        let normal = Vec3::Z;
        let vertices = vec![
            Vertex { // Top left
                position: [-1.0, 1.0, 0.0].into(),
                normal,
                color: [1.0, 0.0, 0.0].into(),
            },
            Vertex { // Bottom left
                position: [-1.0, -1.0, 0.0].into(),
                normal,
                color: [0.0, 1.0, 0.0].into(),
            },
            Vertex { // Top right
                position: [1.0, 1.0, 0.0].into(),
                normal,
                color: [0.0, 0.0, 1.0].into(),
            },
            Vertex { // Bottom right
                position: [1.0, -1.0, 0.0].into(),
                normal,
                color: [1.0, 1.0, 0.0].into(),
            },
        ];

        let indices = vec![
            0, 1, 2, // Top left triangle
            2, 1, 3, // Bottom right triangle
        ];

        Self::new(vertices, indices)
    }

    /// Unit cube centered on the origin with flat per-face normals
    pub fn new_cube() -> Self {
        // Face normal and one in-plane axis; the other axis is normal x tangent
        let faces = [
            (Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (Vec3::NEG_Y, Vec3::X),
            (Vec3::Z, Vec3::X),
            (Vec3::NEG_Z, Vec3::NEG_X),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, tangent) in faces {
            let bitangent = normal.cross(tangent);
            let base = vertices.len() as u32;
            let color = normal.abs() * 0.5 + Vec3::splat(0.5);
            for (u, v) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                vertices.push(Vertex {
                    position: (normal + tangent * u + bitangent * v) * 0.5,
                    normal,
                    color,
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(vertices, indices)
    }
}

/// Packs meshes back to back before they are uploaded into [`GeometryBuffers`]
#[derive(Debug, Default)]
pub struct GeometryBuilder {
    vertices: Vec<PerVertexData>,
    indices: Vec<u32>,
}

impl GeometryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: &Mesh) -> MeshInfo {
        let info = MeshInfo {
            index_count: mesh.indices.len() as u32,
            first_index: self.indices.len() as u32,
            vertex_offset: self.vertices.len() as i32,
            bounding_radius: mesh.bounding_radius(),
        };
        self.vertices.extend(mesh.vertices.iter().map(Vertex::as_shader_data));
        self.indices.extend_from_slice(&mesh.indices);
        info
    }

    pub fn upload(self, device: &RenderDevice) -> Result<GeometryBuffers> {
        log::debug!(
            "Uploading {} vertices and {} indices",
            self.vertices.len(),
            self.indices.len(),
        );
        Ok(GeometryBuffers {
            vertex_buffer: device.create_device_local_buffer(
                &self.vertices,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                "Mesh vertices",
            )?,
            index_buffer: device.create_device_local_buffer(
                &self.indices,
                vk::BufferUsageFlags::INDEX_BUFFER,
                "Mesh indices",
            )?,
        })
    }
}

pub struct GeometryBuffers {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_faces_point_along_normals(mesh: &Mesh) {
        for triangle in mesh.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.vertices[triangle[i] as usize]);
            let winding = (b.position - a.position).cross(c.position - a.position);
            assert!(
                winding.dot(a.normal) > 0.0,
                "triangle {:?} winds against its normal",
                triangle
            );
        }
    }

    #[test]
    fn primitives_wind_counter_clockwise() {
        assert_faces_point_along_normals(&Mesh::new_triangle());
        assert_faces_point_along_normals(&Mesh::new_quad());
        assert_faces_point_along_normals(&Mesh::new_cube());
    }

    #[test]
    fn cube_has_flat_faces() {
        let cube = Mesh::new_cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!((cube.bounding_radius() - 0.75f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn meshes_pack_back_to_back() {
        let mut geometry = GeometryBuilder::new();
        let triangle = geometry.add_mesh(&Mesh::new_triangle());
        let quad = geometry.add_mesh(&Mesh::new_quad());

        assert_eq!((triangle.first_index, triangle.vertex_offset, triangle.index_count), (0, 0, 3));
        assert_eq!((quad.first_index, quad.vertex_offset, quad.index_count), (3, 3, 6));
        assert!((quad.bounding_radius - 2.0f32.sqrt()).abs() < 1e-6);
    }
}
