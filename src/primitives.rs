use crate::interaction::InteractionId;
use crate::layout::{PadRecord, TraceRecord};
use crate::mesh::Mesh;
use crate::resources::{Material, ResourceCache, COPPER_MATERIAL, PAD_GEOMETRY};
use crate::scene_graph::{PadBatch, SceneGraph, TraceMesh, Transform3D};
use bevy_ecs::prelude::Entity;
use glam::{Mat4, Quat, Vec2, Vec3};
use std::collections::HashSet;
use std::sync::Arc;

/// Pads at or above this count would collide with the trace id range.
pub const MAX_PADS: usize = crate::interaction::TRACE_ID_BASE as usize;
/// Vertical extent of a pad instance.
pub const PAD_THICKNESS: f32 = 0.1;

/// Instance transform of a pad: positioned at `pos`, scaled to `(width, 0.1, depth)`.
pub fn pad_matrix(pad: &PadRecord) -> Mat4 {
    let [width, depth] = pad.size;
    Mat4::from_scale_rotation_translation(
        Vec3::new(width, PAD_THICKNESS, depth),
        Quat::IDENTITY,
        Vec3::from_array(pad.pos),
    )
}

/// Builds the pad batch and trace meshes and keeps the interactable registry in step.
///
/// Every call is a full rebuild. Interaction ids handed out by an earlier build are stale
/// afterwards, even when record ids match.
#[derive(Default)]
pub struct PrimitivesBuilder {
    pad_batch: Option<Entity>,
    traces: Vec<Entity>,
    /// Pads past `MAX_PADS`, kept for export only.
    overflow_pads: Vec<PadRecord>,
    /// Traces without enough points for geometry, kept for export.
    unbuilt_traces: Vec<TraceRecord>,
}

impl PrimitivesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_pads(&mut self, graph: &mut SceneGraph, resources: &mut ResourceCache, pads: &[PadRecord]) {
        self.dispose_pads(graph);
        if pads.is_empty() {
            log::debug!("[primitives] pad list empty; no batch");
            return;
        }
        let pads = if pads.len() > MAX_PADS {
            log::warn!(
                "[primitives] {} pads exceed the id range; only the first {MAX_PADS} are built",
                pads.len()
            );
            self.overflow_pads = pads[MAX_PADS..].to_vec();
            &pads[..MAX_PADS]
        } else {
            pads
        };
        let mut seen: HashSet<&str> = HashSet::new();
        for pad in pads {
            if !seen.insert(pad.id.as_str()) {
                log::warn!("[primitives] pad id '{}' is not unique; pads are told apart by instance index", pad.id);
            }
        }

        let geometry = resources.get_geometry(PAD_GEOMETRY, || Mesh::cuboid(Vec3::ONE));
        resources.get_material(COPPER_MATERIAL, Material::copper);

        let matrices: Vec<Mat4> = pads.iter().map(pad_matrix).collect();
        let instance_ids: Vec<f32> = (0..pads.len()).map(|index| index as f32).collect();
        let batch = PadBatch::new(geometry, pads.to_vec(), matrices, instance_ids);
        let entity = graph.world.spawn(batch).id();
        graph.interactables_mut().register_pads(entity, pads.len());
        self.pad_batch = Some(entity);
        log::debug!("[primitives] rebuilt pad batch: {} pads", pads.len());
    }

    pub fn create_traces(&mut self, graph: &mut SceneGraph, resources: &mut ResourceCache, traces: &[TraceRecord]) {
        self.dispose_traces(graph);
        resources.get_material(COPPER_MATERIAL, Material::copper);

        let mut used: HashSet<u32> = HashSet::new();
        let mut next_free = traces.iter().map(|trace| trace.numeric_id).max().map_or(0, |max| max.saturating_add(1));
        for trace in traces {
            let mut record = trace.clone();
            if !used.insert(record.numeric_id) {
                log::warn!(
                    "[primitives] trace '{}' reuses numericId {}; reassigned to {next_free}",
                    record.id,
                    record.numeric_id
                );
                record.numeric_id = next_free;
                used.insert(next_free);
                next_free = next_free.saturating_add(1);
            }

            if record.points.len() < 2 {
                log::debug!("[primitives] trace '{}' has {} point(s); no geometry", record.id, record.points.len());
                self.unbuilt_traces.push(record);
                continue;
            }

            let id = InteractionId::trace(record.numeric_id);
            let start = Vec2::from_array(record.points[0]);
            let end = Vec2::from_array(record.points[1]);
            let mesh = Arc::new(Mesh::ribbon(start, end, record.width, id.0 as f32));
            let entity = graph.world.spawn((TraceMesh::new(record, id, mesh), Transform3D::default())).id();
            graph.interactables_mut().register_trace(id, entity);
            self.traces.push(entity);
        }
        log::debug!(
            "[primitives] rebuilt traces: {} with geometry, {} without",
            self.traces.len(),
            self.unbuilt_traces.len()
        );
    }

    pub fn pad_batch(&self) -> Option<Entity> {
        self.pad_batch
    }

    pub fn trace_entities(&self) -> &[Entity] {
        &self.traces
    }

    /// Current batch index of the pad with record id `pad_id`.
    pub fn pad_index(&self, graph: &SceneGraph, pad_id: &str) -> Option<usize> {
        graph.pad_batch()?.index_of(pad_id)
    }

    pub fn trace_entity(&self, graph: &SceneGraph, trace_id: &str) -> Option<Entity> {
        graph.trace_by_record_id(trace_id)
    }

    /// Built pads in batch order followed by any pads past `MAX_PADS`.
    pub fn pad_records(&self, graph: &SceneGraph) -> Vec<PadRecord> {
        let mut records = graph.pad_batch().map(|batch| batch.records.clone()).unwrap_or_default();
        records.extend(self.overflow_pads.iter().cloned());
        records
    }

    /// Built traces in build order followed by traces retained without geometry.
    pub fn trace_records(&self, graph: &SceneGraph) -> Vec<TraceRecord> {
        self.traces
            .iter()
            .filter_map(|entity| graph.trace(*entity).map(|trace| trace.record.clone()))
            .chain(self.unbuilt_traces.iter().cloned())
            .collect()
    }

    pub fn dispose(&mut self, graph: &mut SceneGraph) {
        self.dispose_pads(graph);
        self.dispose_traces(graph);
    }

    fn dispose_pads(&mut self, graph: &mut SceneGraph) {
        if let Some(entity) = self.pad_batch.take() {
            graph.despawn(entity);
        }
        self.overflow_pads.clear();
        graph.interactables_mut().clear_pads();
    }

    fn dispose_traces(&mut self, graph: &mut SceneGraph) {
        for entity in self.traces.drain(..) {
            graph.despawn(entity);
        }
        self.unbuilt_traces.clear();
        graph.interactables_mut().clear_traces();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{Primitive, TRACE_ID_BASE};

    fn pads(n: usize) -> Vec<PadRecord> {
        (0..n).map(|i| PadRecord { id: format!("p{i}"), pos: [i as f32 * 3.0, 0.05, 0.0], size: [2.0, 1.0] }).collect()
    }

    fn trace(id: &str, numeric_id: u32, points: Vec<[f32; 2]>) -> TraceRecord {
        TraceRecord { id: id.into(), points, width: 1.0, numeric_id }
    }

    #[test]
    fn ids_are_unique_and_partitioned() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = PrimitivesBuilder::new();
        builder.create_pads(&mut graph, &mut cache, &pads(12));
        builder.create_traces(
            &mut graph,
            &mut cache,
            &[trace("a", 1, vec![[0.0, 0.0], [5.0, 0.0]]), trace("b", 2, vec![[0.0, 1.0], [0.0, 9.0]])],
        );

        let ids: Vec<InteractionId> = graph.interactables().ids().collect();
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
        assert_eq!(ids.len(), 14);
        for id in ids {
            match graph.resolve(id) {
                Some(Primitive::Pad { index }) => assert!(index < 12 && id.0 as usize == index),
                Some(Primitive::Trace { .. }) => assert!(id.0 >= TRACE_ID_BASE),
                None => panic!("registered id {id} must resolve"),
            }
        }
        cache.dispose_all();
    }

    #[test]
    fn pad_instances_carry_index_and_scale() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = PrimitivesBuilder::new();
        builder.create_pads(&mut graph, &mut cache, &pads(3));
        let batch = graph.pad_batch().expect("batch");
        assert_eq!(batch.instance_ids, vec![0.0, 1.0, 2.0]);
        let (scale, _, translation) = batch.matrices[2].to_scale_rotation_translation();
        assert!((scale - Vec3::new(2.0, PAD_THICKNESS, 1.0)).length() < 1e-6);
        assert_eq!(translation, Vec3::new(6.0, 0.05, 0.0));
        assert_eq!(builder.pad_index(&graph, "p1"), Some(1));
        cache.dispose_all();
    }

    #[test]
    fn empty_pad_list_leaves_no_batch() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = PrimitivesBuilder::new();
        builder.create_pads(&mut graph, &mut cache, &pads(2));
        builder.create_pads(&mut graph, &mut cache, &[]);
        assert!(graph.pad_batch().is_none());
        assert!(builder.pad_batch().is_none());
        assert!(graph.interactables().is_empty());
        cache.dispose_all();
    }

    #[test]
    fn rebuilding_pads_invalidates_old_ids() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = PrimitivesBuilder::new();
        builder.create_pads(&mut graph, &mut cache, &pads(4));
        let captured = InteractionId::pad(3);
        let old_batch = builder.pad_batch().expect("batch");

        let mut reordered = pads(2);
        reordered.reverse();
        builder.create_pads(&mut graph, &mut cache, &reordered);
        assert!(!graph.contains(old_batch));
        assert_eq!(graph.resolve(captured), None);
        assert_eq!(builder.pad_index(&graph, "p0"), Some(1));
        cache.dispose_all();
    }

    #[test]
    fn pads_past_the_id_range_are_exported_but_not_built() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = PrimitivesBuilder::new();
        let all = pads(MAX_PADS + 2);
        builder.create_pads(&mut graph, &mut cache, &all);

        let batch = graph.pad_batch().expect("batch");
        assert_eq!(batch.len(), MAX_PADS);
        assert_eq!(graph.resolve(InteractionId::pad(MAX_PADS - 1)), Some(Primitive::Pad { index: MAX_PADS - 1 }));
        assert!(graph.resolve(InteractionId::pad(MAX_PADS)).is_none());
        assert_eq!(builder.pad_records(&graph), all);

        builder.create_pads(&mut graph, &mut cache, &pads(1));
        assert_eq!(builder.pad_records(&graph).len(), 1);
        cache.dispose_all();
    }

    #[test]
    fn short_traces_have_no_geometry_but_are_retained() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = PrimitivesBuilder::new();
        builder.create_traces(&mut graph, &mut cache, &[trace("dot", 3, vec![[1.0, 1.0]]), trace("none", 4, vec![])]);
        assert!(builder.trace_entities().is_empty());
        assert!(graph.interactables().is_empty());
        let kept: Vec<String> = builder.trace_records(&graph).into_iter().map(|t| t.id).collect();
        assert_eq!(kept, ["dot", "none"]);
        cache.dispose_all();
    }

    #[test]
    fn duplicate_numeric_ids_are_reassigned() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = PrimitivesBuilder::new();
        let segment = vec![[0.0, 0.0], [1.0, 0.0]];
        builder.create_traces(&mut graph, &mut cache, &[trace("a", 7, segment.clone()), trace("b", 7, segment)]);
        let records = builder.trace_records(&graph);
        assert_eq!(records[0].numeric_id, 7);
        assert_eq!(records[1].numeric_id, 8);
        assert!(graph.resolve(InteractionId::trace(8)).is_some());
        cache.dispose_all();
    }

    #[test]
    fn ribbon_vertices_share_trace_id() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = PrimitivesBuilder::new();
        builder.create_traces(&mut graph, &mut cache, &[trace("t1", 5, vec![[0.0, 0.0], [10.0, 0.0], [10.0, 5.0]])]);
        let entity = builder.trace_entity(&graph, "t1").expect("trace built");
        let mesh = &graph.trace(entity).expect("trace mesh").mesh;
        assert!(mesh.vertices.iter().all(|v| v.interaction_id == 10_005.0));
        assert!(mesh.vertices.iter().all(|v| v.position[1] == 0.0));
        assert_eq!(builder.trace_records(&graph)[0].points.len(), 3);
        cache.dispose_all();
    }
}
