use crate::interaction::{InteractionId, Primitive};
use crate::layout::{PadRecord, TraceRecord};
use crate::mesh::Mesh;
use crate::picking::{ray_hit_mesh, ray_hit_obb, Ray};
use bevy_ecs::prelude::{Component, Entity, Mut, Resource, World};
use glam::{Mat4, Quat, Vec2, Vec3};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform3D {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }
}

impl Transform3D {
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Default::default() }
    }

    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self { translation, rotation, scale }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// The board slab. Its geometry is unique to each build and owned here; the material is
/// shared through the resource cache.
#[derive(Component, Clone, Debug)]
pub struct BoardSlab {
    pub mesh: Arc<Mesh>,
    /// Resource cache key of the board's Phong material.
    pub material: String,
}

/// All pads as one instanced draw of a shared unit box.
#[derive(Component, Clone, Debug)]
pub struct PadBatch {
    pub geometry: Arc<Mesh>,
    pub records: Vec<PadRecord>,
    pub matrices: Vec<Mat4>,
    /// Per-instance hit identifier. Equal to the instance index.
    pub instance_ids: Vec<f32>,
    needs_upload: bool,
}

impl PadBatch {
    pub fn new(geometry: Arc<Mesh>, records: Vec<PadRecord>, matrices: Vec<Mat4>, instance_ids: Vec<f32>) -> Self {
        Self { geometry, records, matrices, instance_ids, needs_upload: true }
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn matrix_at(&self, index: usize) -> Option<Mat4> {
        self.matrices.get(index).copied()
    }

    pub fn set_matrix_at(&mut self, index: usize, matrix: Mat4) -> bool {
        match self.matrices.get_mut(index) {
            Some(slot) => {
                *slot = matrix;
                self.needs_upload = true;
                true
            }
            None => false,
        }
    }

    pub fn index_of(&self, pad_id: &str) -> Option<usize> {
        self.records.iter().position(|record| record.id == pad_id)
    }

    pub fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    /// Returns whether instance data changed since the last call and clears the flag.
    pub fn take_needs_upload(&mut self) -> bool {
        std::mem::take(&mut self.needs_upload)
    }
}

/// One trace ribbon. Geometry is built in board coordinates; `Transform3D` on the same
/// entity carries any later drag offset.
#[derive(Component, Clone, Debug)]
pub struct TraceMesh {
    pub record: TraceRecord,
    pub interaction_id: InteractionId,
    pub mesh: Arc<Mesh>,
    built_points: Vec<[f32; 2]>,
}

impl TraceMesh {
    pub fn new(record: TraceRecord, interaction_id: InteractionId, mesh: Arc<Mesh>) -> Self {
        let built_points = record.points.clone();
        Self { record, interaction_id, mesh, built_points }
    }

    /// Rewrites the retained points as built points shifted by the horizontal translation.
    pub fn write_back(&mut self, transform: &Transform3D) {
        let offset = Vec2::new(transform.translation.x, transform.translation.z);
        for (point, built) in self.record.points.iter_mut().zip(&self.built_points) {
            *point = (Vec2::from_array(*built) + offset).to_array();
        }
    }
}

/// Free transform the gizmo manipulates on behalf of one pad instance.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct GizmoProxy;

/// Explicit index of everything that can be hovered or selected. Maintained by the
/// builders on every rebuild.
#[derive(Resource, Default, Debug)]
pub struct Interactables {
    pad_batch: Option<Entity>,
    traces: Vec<(InteractionId, Entity)>,
    by_id: HashMap<InteractionId, Primitive>,
}

impl Interactables {
    pub fn register_pads(&mut self, batch: Entity, count: usize) {
        self.clear_pads();
        self.pad_batch = Some(batch);
        for index in 0..count {
            self.by_id.insert(InteractionId::pad(index), Primitive::Pad { index });
        }
    }

    pub fn clear_pads(&mut self) {
        self.pad_batch = None;
        self.by_id.retain(|_, primitive| !matches!(primitive, Primitive::Pad { .. }));
    }

    pub fn register_trace(&mut self, id: InteractionId, entity: Entity) {
        self.traces.push((id, entity));
        self.by_id.insert(id, Primitive::Trace { entity });
    }

    pub fn clear_traces(&mut self) {
        self.traces.clear();
        self.by_id.retain(|_, primitive| !matches!(primitive, Primitive::Trace { .. }));
    }

    pub fn pad_batch(&self) -> Option<Entity> {
        self.pad_batch
    }

    pub fn traces(&self) -> &[(InteractionId, Entity)] {
        &self.traces
    }

    pub fn resolve(&self, id: InteractionId) -> Option<Primitive> {
        self.by_id.get(&id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = InteractionId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickHit {
    pub id: InteractionId,
    pub primitive: Primitive,
    pub distance: f32,
}

/// Scene storage: a bevy `World` holding board, pad batch, trace and proxy entities.
pub struct SceneGraph {
    pub world: World,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut world = World::new();
        world.insert_resource(Interactables::default());
        Self { world }
    }

    pub fn interactables(&self) -> &Interactables {
        self.world.resource::<Interactables>()
    }

    pub fn interactables_mut(&mut self) -> Mut<'_, Interactables> {
        self.world.resource_mut::<Interactables>()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world.entities().contains(entity)
    }

    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.world.despawn(entity)
    }

    pub fn transform(&self, entity: Entity) -> Option<Transform3D> {
        self.world.get::<Transform3D>(entity).copied()
    }

    pub fn set_transform(&mut self, entity: Entity, transform: Transform3D) -> bool {
        match self.world.get_mut::<Transform3D>(entity) {
            Some(mut slot) => {
                *slot = transform;
                true
            }
            None => false,
        }
    }

    pub fn pad_batch(&self) -> Option<&PadBatch> {
        let entity = self.interactables().pad_batch()?;
        self.world.get::<PadBatch>(entity)
    }

    pub fn pad_batch_mut(&mut self) -> Option<Mut<'_, PadBatch>> {
        let entity = self.interactables().pad_batch()?;
        self.world.get_mut::<PadBatch>(entity)
    }

    pub fn trace(&self, entity: Entity) -> Option<&TraceMesh> {
        self.world.get::<TraceMesh>(entity)
    }

    pub fn trace_mut(&mut self, entity: Entity) -> Option<Mut<'_, TraceMesh>> {
        self.world.get_mut::<TraceMesh>(entity)
    }

    pub fn trace_by_record_id(&self, trace_id: &str) -> Option<Entity> {
        self.interactables()
            .traces()
            .iter()
            .map(|(_, entity)| *entity)
            .find(|entity| self.trace(*entity).is_some_and(|trace| trace.record.id == trace_id))
    }

    /// Re-derives a trace's retained points from its current transform.
    pub fn write_back_trace(&mut self, entity: Entity) {
        let Some(transform) = self.transform(entity) else {
            return;
        };
        if let Some(mut trace) = self.trace_mut(entity) {
            trace.write_back(&transform);
        }
    }

    pub fn resolve(&self, id: InteractionId) -> Option<Primitive> {
        self.interactables().resolve(id)
    }

    /// Nearest interactable hit by `ray`, if any.
    pub fn pick(&self, ray: &Ray) -> Option<PickHit> {
        if ray.dir.length_squared() <= f32::EPSILON {
            return None;
        }
        let mut nearest: Option<PickHit> = None;
        let mut consider = |hit: PickHit| {
            if nearest.map_or(true, |best| hit.distance < best.distance) {
                nearest = Some(hit);
            }
        };

        if let Some(batch) = self.pad_batch() {
            let bounds = batch.geometry.bounds;
            for (index, matrix) in batch.matrices.iter().enumerate() {
                if let Some(distance) = ray_hit_obb(ray, matrix, &bounds) {
                    consider(PickHit {
                        id: InteractionId::pad(index),
                        primitive: Primitive::Pad { index },
                        distance,
                    });
                }
            }
        }

        for &(id, entity) in self.interactables().traces() {
            let (Some(trace), Some(transform)) = (self.trace(entity), self.transform(entity)) else {
                continue;
            };
            if let Some(distance) = ray_hit_mesh(ray, &transform.to_matrix(), &trace.mesh) {
                consider(PickHit { id, primitive: Primitive::Trace { entity }, distance });
            }
        }
        nearest
    }

    pub fn board(&self, entity: Entity) -> Option<(&BoardSlab, Transform3D)> {
        Some((self.world.get::<BoardSlab>(entity)?, self.transform(entity)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_matrix_round_trip() {
        let transform = Transform3D {
            translation: Vec3::new(3.0, 0.05, -2.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::new(2.0, 0.1, 4.0),
        };
        let back = Transform3D::from_matrix(&transform.to_matrix());
        assert_eq!(back.translation, transform.translation);
        assert!((back.scale - transform.scale).length() < 1e-6);
    }

    #[test]
    fn trace_write_back_shifts_points() {
        let record = TraceRecord { id: "t".into(), points: vec![[0.0, 0.0], [10.0, 0.0]], width: 1.0, numeric_id: 2 };
        let mesh = Arc::new(Mesh::ribbon(Vec2::ZERO, Vec2::new(10.0, 0.0), 1.0, 10_002.0));
        let mut trace = TraceMesh::new(record, InteractionId::trace(2), mesh);
        trace.write_back(&Transform3D::from_translation(Vec3::new(1.5, 0.0, -2.0)));
        assert_eq!(trace.record.points, vec![[1.5, -2.0], [11.5, -2.0]]);
        trace.write_back(&Transform3D::default());
        assert_eq!(trace.record.points, vec![[0.0, 0.0], [10.0, 0.0]]);
    }

    #[test]
    fn registry_resolves_both_kinds() {
        let mut graph = SceneGraph::new();
        let batch = graph.world.spawn_empty().id();
        let trace = graph.world.spawn_empty().id();
        graph.interactables_mut().register_pads(batch, 3);
        graph.interactables_mut().register_trace(InteractionId::trace(4), trace);
        assert_eq!(graph.resolve(InteractionId(2)), Some(Primitive::Pad { index: 2 }));
        assert_eq!(graph.resolve(InteractionId(3)), None);
        assert_eq!(graph.resolve(InteractionId(10_004)), Some(Primitive::Trace { entity: trace }));
        graph.interactables_mut().clear_pads();
        assert_eq!(graph.resolve(InteractionId(0)), None);
        assert_eq!(graph.interactables().len(), 1);
    }
}
