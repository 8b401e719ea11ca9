use std::collections::BTreeMap;
use glam::Vec4;
use crate::renderer::scene::{MeshId, ObjectId, Scene};
use crate::renderer::shader_data::{DrawBatch, InstanceCullRecord, InstanceData};

/// Indirect draws derived from one scene population.
///
/// Batches follow mesh registration order and only exist for meshes with at
/// least one object. Instance slots are numbered globally in batch order:
/// the objects of batch 0 (in object order) come first, then batch 1, and so
/// on. Everything written per instance uses that same numbering.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DrawBatchList {
    pub batches: Vec<DrawBatch>,
    pub meshes: Vec<MeshId>,
    /// Object drawn by each global instance slot
    pub instances: Vec<ObjectId>,
}

impl DrawBatchList {
    pub fn build(scene: &Scene) -> Self {
        let mut objects_per_mesh: BTreeMap<MeshId, Vec<ObjectId>> = BTreeMap::new();
        for (id, object) in scene.objects() {
            objects_per_mesh.entry(object.mesh).or_default().push(id);
        }

        let mut list = Self::default();
        for (mesh_id, mesh) in scene.meshes() {
            let Some(objects) = objects_per_mesh.remove(&mesh_id) else {
                continue;
            };

            list.batches.push(DrawBatch {
                index_count: mesh.index_count,
                instance_count: objects.len() as u32,
                first_index: mesh.first_index,
                vertex_offset: mesh.vertex_offset,
                first_instance: list.instances.len() as u32,
            });
            list.meshes.push(mesh_id);
            list.instances.extend(objects);
        }

        list
    }

    pub fn batch_count(&self) -> u32 {
        self.batches.len() as u32
    }

    pub fn instance_count(&self) -> u32 {
        self.instances.len() as u32
    }

    /// The batch list with every instance count zeroed, restored before each cull pass
    pub fn cleared_batches(&self) -> Vec<DrawBatch> {
        self.batches
            .iter()
            .map(|batch| DrawBatch {
                instance_count: 0,
                ..*batch
            })
            .collect()
    }

    pub fn instance_records(&self) -> Vec<InstanceCullRecord> {
        self.batches
            .iter()
            .enumerate()
            .flat_map(|(batch_index, batch)| {
                let first = batch.first_instance as usize;
                let count = batch.instance_count as usize;
                self.instances[first..first + count]
                    .iter()
                    .map(move |object| InstanceCullRecord {
                        instance_index: object.raw(),
                        batch_index: batch_index as u32,
                    })
            })
            .collect()
    }

    pub fn instance_data(&self, scene: &Scene) -> Vec<InstanceData> {
        self.instances
            .iter()
            .filter_map(|id| {
                let object = scene.object(*id)?;
                let radius = scene
                    .mesh(object.mesh)
                    .map_or(0.0, |mesh| mesh.bounding_radius);
                let model = object.transform.model_matrix();
                let center = model.w_axis.truncate();
                Some(InstanceData::new(
                    model,
                    object.transform.normal_matrix(),
                    Vec4::from((center, radius * object.transform.max_scale())),
                    object.material.raw(),
                    id.raw(),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use crate::renderer::scene::tests::mesh_info;
    use crate::renderer::scene::{MaterialId, Transform};

    fn add(scene: &mut Scene, mesh: MeshId) -> ObjectId {
        scene
            .add_object(mesh, MaterialId::DEFAULT, Transform::default())
            .unwrap()
    }

    #[test]
    fn one_batch_per_referenced_mesh() {
        let mut scene = Scene::new();
        let a = scene.add_mesh(mesh_info(3, 0));
        let b = scene.add_mesh(mesh_info(36, 3));
        let a0 = add(&mut scene, a);
        let b0 = add(&mut scene, b);
        let b1 = add(&mut scene, b);
        let b2 = add(&mut scene, b);

        let list = DrawBatchList::build(&scene);

        assert_eq!(list.meshes, vec![a, b]);
        assert_eq!(
            list.batches,
            vec![
                DrawBatch { index_count: 3, instance_count: 1, first_index: 0, vertex_offset: 0, first_instance: 0 },
                DrawBatch { index_count: 36, instance_count: 3, first_index: 3, vertex_offset: 0, first_instance: 1 },
            ]
        );
        assert_eq!(
            list.instance_records(),
            vec![
                InstanceCullRecord { instance_index: a0.raw(), batch_index: 0 },
                InstanceCullRecord { instance_index: b0.raw(), batch_index: 1 },
                InstanceCullRecord { instance_index: b1.raw(), batch_index: 1 },
                InstanceCullRecord { instance_index: b2.raw(), batch_index: 1 },
            ]
        );
    }

    #[test]
    fn batches_follow_mesh_order_not_object_order() {
        let mut scene = Scene::new();
        let a = scene.add_mesh(mesh_info(3, 0));
        let b = scene.add_mesh(mesh_info(6, 3));
        let b0 = add(&mut scene, b);
        let a0 = add(&mut scene, a);
        let b1 = add(&mut scene, b);

        let list = DrawBatchList::build(&scene);

        assert_eq!(list.meshes, vec![a, b]);
        assert_eq!(list.instances, vec![a0, b0, b1]);
        assert_eq!(list.batches[1].first_instance, 1);
    }

    #[test]
    fn meshes_without_objects_are_skipped() {
        let mut scene = Scene::new();
        let unused = scene.add_mesh(mesh_info(3, 0));
        let used = scene.add_mesh(mesh_info(6, 3));
        add(&mut scene, used);

        let list = DrawBatchList::build(&scene);

        assert_eq!(list.batch_count(), 1);
        assert!(!list.meshes.contains(&unused));
        assert_eq!(list.instance_records()[0].batch_index, 0);
    }

    #[test]
    fn instance_counts_sum_to_object_count() {
        let mut scene = Scene::new();
        let meshes: Vec<_> = (0..5).map(|i| scene.add_mesh(mesh_info(3, i * 3))).collect();
        for i in 0..97usize {
            add(&mut scene, meshes[(i * 7) % 4]);
        }
        let removed = scene.objects().nth(10).map(|(id, _)| id).unwrap();
        scene.remove_object(removed);

        let list = DrawBatchList::build(&scene);
        let total: u32 = list.batches.iter().map(|b| b.instance_count).sum();

        assert_eq!(total as usize, scene.object_count());
        assert_eq!(list.instance_count() as usize, scene.object_count());
    }

    #[test]
    fn records_point_at_their_mesh_batch() {
        let mut scene = Scene::new();
        let meshes: Vec<_> = (0..3).map(|i| scene.add_mesh(mesh_info(3, i * 3))).collect();
        for i in 0..20usize {
            add(&mut scene, meshes[i % 3]);
        }

        let list = DrawBatchList::build(&scene);
        let records = list.instance_records();

        assert_eq!(records.len(), list.instances.len());
        for (slot, record) in records.iter().enumerate() {
            let object = scene.objects().find(|(id, _)| id.raw() == record.instance_index).unwrap().1;
            assert_eq!(list.meshes[record.batch_index as usize], object.mesh);

            let batch = list.batches[record.batch_index as usize];
            let slot = slot as u32;
            assert!(slot >= batch.first_instance && slot < batch.first_instance + batch.instance_count);
        }
    }

    #[test]
    fn rebuilding_an_unchanged_scene_is_byte_identical() {
        let mut scene = Scene::new();
        let a = scene.add_mesh(mesh_info(3, 0));
        let b = scene.add_mesh(mesh_info(6, 3));
        for i in 0..10 {
            add(&mut scene, if i % 3 == 0 { a } else { b });
        }

        let first = DrawBatchList::build(&scene);
        let second = DrawBatchList::build(&scene);

        assert_eq!(
            bytemuck::cast_slice::<DrawBatch, u8>(&first.batches),
            bytemuck::cast_slice::<DrawBatch, u8>(&second.batches)
        );
        assert_eq!(first.instance_records(), second.instance_records());
    }

    #[test]
    fn cleared_batches_only_zero_instance_counts() {
        let mut scene = Scene::new();
        let a = scene.add_mesh(mesh_info(3, 0));
        add(&mut scene, a);
        add(&mut scene, a);

        let list = DrawBatchList::build(&scene);
        let cleared = list.cleared_batches();

        assert_eq!(cleared[0].instance_count, 0);
        assert_eq!(cleared[0].index_count, list.batches[0].index_count);
        assert_eq!(cleared[0].first_instance, list.batches[0].first_instance);
    }

    #[test]
    fn instance_data_uses_global_slot_order() {
        let mut scene = Scene::new();
        let a = scene.add_mesh(mesh_info(3, 0));
        let b = scene.add_mesh(mesh_info(6, 3));
        let far = scene
            .add_object(b, MaterialId::new(2), Transform::from_translation(Vec3::new(0.0, 0.0, -40.0)).with_scale(Vec3::splat(3.0)))
            .unwrap();
        let near = scene
            .add_object(a, MaterialId::new(1), Transform::from_translation(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();

        let list = DrawBatchList::build(&scene);
        let data = list.instance_data(&scene);

        assert_eq!(data[0].object_id, near.raw());
        assert_eq!(data[0].material_id, 1);
        assert_eq!(data[0].bounds, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(data[1].object_id, far.raw());
        assert_eq!(data[1].bounds, Vec4::new(0.0, 0.0, -40.0, 3.0));
    }

    #[test]
    fn population_change_resizes_every_per_instance_array() {
        let mut scene = Scene::new();
        let cube = scene.add_mesh(mesh_info(36, 0));
        let quad = scene.add_mesh(mesh_info(6, 36));
        add(&mut scene, cube);
        add(&mut scene, quad);
        let before = DrawBatchList::build(&scene);

        add(&mut scene, quad);
        add(&mut scene, cube);
        assert_ne!(before.instance_count() as usize, scene.object_count());

        let after = DrawBatchList::build(&scene);
        assert_eq!(after.instance_count(), 4);
        assert_eq!(after.instance_records().len(), 4);
        assert_eq!(after.instance_data(&scene).len(), 4);
        assert_eq!(after.batches.iter().map(|b| b.instance_count).sum::<u32>(), 4);
    }

    #[test]
    fn empty_scene_builds_nothing() {
        let list = DrawBatchList::build(&Scene::new());
        assert_eq!(list.batch_count(), 0);
        assert!(list.instance_records().is_empty());
    }
}
