//! Minimal object and mesh registry the draw/cull pipeline reads from.
//!
//! Entities live in ordered maps keyed by integer handles handed out by an
//! explicit [`IdAllocator`], so iteration follows registration order and is
//! identical between any two reads of the same population.

use std::collections::BTreeMap;
use std::fmt;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use glam::{EulerRot, Mat4, Quat, Vec3};

macro_rules! handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

handle!(MeshId);
handle!(ObjectId);
handle!(MaterialId);

impl MaterialId {
    pub const DEFAULT: MaterialId = MaterialId(0);

    pub fn new(raw: u32) -> Self {
        Self(raw)
    }
}

/// Hands out increasing ids, one counter per entity kind
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_mesh: u32,
    next_object: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_mesh(&mut self) -> MeshId {
        let id = MeshId(self.next_mesh);
        self.next_mesh += 1;
        id
    }

    pub fn next_object(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object);
        self.next_object += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshInfo {
    pub index_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    /// Radius of the mesh's bounding sphere around its local origin
    pub bounding_radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    /// Euler angles in radians, applied in Y, X, Z order
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn model_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(EulerRot::YXZ, self.rotation.y, self.rotation.x, self.rotation.z);
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.translation)
    }

    pub fn normal_matrix(&self) -> Mat4 {
        self.model_matrix().inverse().transpose()
    }

    pub fn max_scale(&self) -> f32 {
        self.scale.abs().max_element()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub mesh: MeshId,
    pub material: MaterialId,
    pub transform: Transform,
}

#[derive(Default)]
pub struct Scene {
    ids: IdAllocator,
    meshes: BTreeMap<MeshId, MeshInfo>,
    objects: BTreeMap<ObjectId, SceneObject>,
    population_epoch: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, info: MeshInfo) -> MeshId {
        let id = self.ids.next_mesh();
        self.meshes.insert(id, info);
        self.population_epoch += 1;
        id
    }

    pub fn add_object(
        &mut self,
        mesh: MeshId,
        material: MaterialId,
        transform: Transform,
    ) -> Result<ObjectId> {
        if !self.meshes.contains_key(&mesh) {
            return Err(eyre!("Cannot add object referencing unknown {}", mesh));
        }
        let id = self.ids.next_object();
        self.objects.insert(id, SceneObject { mesh, material, transform });
        self.population_epoch += 1;
        Ok(id)
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Option<SceneObject> {
        let removed = self.objects.remove(&id);
        if removed.is_some() {
            self.population_epoch += 1;
        }
        removed
    }

    /// Mutable access for transform edits, which leave the population epoch untouched
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id)
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshInfo> {
        self.meshes.get(&id)
    }

    /// Meshes in registration order
    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &MeshInfo)> {
        self.meshes.iter().map(|(id, info)| (*id, info))
    }

    /// Objects in registration order
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> {
        self.objects.iter().map(|(id, object)| (*id, object))
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = (ObjectId, &mut SceneObject)> {
        self.objects.iter_mut().map(|(id, object)| (*id, object))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Changes whenever meshes or objects are added or removed
    pub fn population_epoch(&self) -> u64 {
        self.population_epoch
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn mesh_info(index_count: u32, first_index: u32) -> MeshInfo {
        MeshInfo {
            index_count,
            first_index,
            vertex_offset: 0,
            bounding_radius: 1.0,
        }
    }

    #[test]
    fn allocators_are_independent_and_deterministic() {
        let mut a = IdAllocator::new();
        let mut b = IdAllocator::new();
        assert_eq!(a.next_mesh().raw(), 0);
        assert_eq!(a.next_object().raw(), 0);
        assert_eq!(a.next_object().raw(), 1);
        assert_eq!(b.next_object().raw(), 0);
        assert_eq!(a.next_mesh().raw(), 1);
    }

    #[test]
    fn epoch_tracks_population_not_transforms() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(mesh_info(36, 0));
        let object = scene
            .add_object(mesh, MaterialId::DEFAULT, Transform::default())
            .unwrap();
        let epoch = scene.population_epoch();

        scene.object_mut(object).unwrap().transform.translation = Vec3::X;
        assert_eq!(scene.population_epoch(), epoch);

        scene.remove_object(object);
        assert!(scene.population_epoch() > epoch);

        let epoch = scene.population_epoch();
        assert!(scene.remove_object(object).is_none());
        assert_eq!(scene.population_epoch(), epoch);
    }

    #[test]
    fn objects_must_reference_known_meshes() {
        let mut scene = Scene::new();
        let mut other = Scene::new();
        let foreign = other.add_mesh(mesh_info(3, 0));
        let _ = other.add_mesh(mesh_info(3, 0));
        let unknown = other.add_mesh(mesh_info(3, 0));

        scene.add_mesh(mesh_info(3, 0));
        assert!(scene.add_object(foreign, MaterialId::DEFAULT, Transform::default()).is_ok());
        assert!(scene.add_object(unknown, MaterialId::DEFAULT, Transform::default()).is_err());
    }

    #[test]
    fn iteration_follows_registration_order() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(mesh_info(3, 0));
        let ids: Vec<_> = (0..5)
            .map(|i| {
                scene
                    .add_object(mesh, MaterialId::new(i), Transform::default())
                    .unwrap()
            })
            .collect();
        scene.remove_object(ids[2]);

        let seen: Vec<_> = scene.objects().map(|(id, _)| id).collect();
        assert_eq!(seen, vec![ids[0], ids[1], ids[3], ids[4]]);
    }

    #[test]
    fn normal_matrix_handles_non_uniform_scale() {
        let transform = Transform::from_translation(Vec3::new(4.0, 0.0, 0.0))
            .with_scale(Vec3::new(2.0, 1.0, 1.0));
        let normal = transform.normal_matrix() * Vec3::X.extend(0.0);
        assert!(normal.truncate().normalize().abs_diff_eq(Vec3::X, 1e-5));
        assert_eq!(transform.max_scale(), 2.0);
        assert!(
            (transform.model_matrix() * glam::Vec4::W)
                .truncate()
                .abs_diff_eq(Vec3::new(4.0, 0.0, 0.0), 1e-5)
        );
    }

    #[test]
    fn yaw_rotation_is_applied_before_translation() {
        let transform = Transform::from_translation(Vec3::new(0.0, 1.0, 0.0))
            .with_rotation(Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0))
            .with_scale(Vec3::splat(2.0));
        let point = transform.model_matrix() * Vec3::X.extend(1.0);
        assert!(point.truncate().abs_diff_eq(Vec3::new(0.0, 1.0, -2.0), 1e-5));
    }
}
