use crate::layout::BoardSpec;
use crate::mesh::Mesh;
use crate::resources::{board_material_key, Material, ResourceCache};
use crate::scene_graph::{BoardSlab, SceneGraph, Transform3D};
use bevy_ecs::prelude::Entity;
use glam::Vec3;
use std::sync::Arc;

/// FR4 green.
pub const DEFAULT_BOARD_COLOR: [f32; 3] = [0.180, 0.545, 0.341];

/// Creates and replaces the single board slab.
#[derive(Default)]
pub struct BoardBuilder {
    entity: Option<Entity>,
    spec: Option<BoardSpec>,
}

impl BoardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previous board with a `width × thickness × height` slab whose top face
    /// sits at y = 0, the reference plane shared by pads and traces. The slab's Phong
    /// material lives in `resources` under a key derived from `color`.
    pub fn create_board(
        &mut self,
        graph: &mut SceneGraph,
        resources: &mut ResourceCache,
        spec: BoardSpec,
        color: [f32; 3],
    ) -> Entity {
        self.dispose(graph);
        let material = board_material_key(color);
        resources.get_material(&material, || Material::board(color));
        let mesh = Mesh::cuboid(Vec3::new(spec.width, spec.thickness, spec.height));
        let transform = Transform3D::from_translation(Vec3::new(0.0, -spec.thickness * 0.5, 0.0));
        let entity = graph.world.spawn((BoardSlab { mesh: Arc::new(mesh), material }, transform)).id();
        log::debug!("[board] created {}x{}x{} board", spec.width, spec.height, spec.thickness);
        self.entity = Some(entity);
        self.spec = Some(spec);
        entity
    }

    pub fn entity(&self) -> Option<Entity> {
        self.entity
    }

    pub fn spec(&self) -> Option<BoardSpec> {
        self.spec
    }

    /// Removes the board if present. No-op otherwise.
    pub fn dispose(&mut self, graph: &mut SceneGraph) {
        if let Some(entity) = self.entity.take() {
            graph.despawn(entity);
        }
        self.spec = None;
    }
}

/// Parses `#rrggbb` (or `rrggbb`) into linear-ish float RGB.
pub fn parse_hex_color(value: &str) -> Option<[f32; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let rgb = u32::from_str_radix(hex, 16).ok()?;
    let channel = |shift: u32| ((rgb >> shift) & 0xff) as f32 / 255.0;
    Some([channel(16), channel(8), channel(0)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::PhongMaterial;
    use crate::scene_graph::BoardSlab;

    #[test]
    fn repeated_creation_leaves_one_board() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = BoardBuilder::new();
        let first = builder.create_board(&mut graph, &mut cache, BoardSpec::default(), DEFAULT_BOARD_COLOR);
        let spec = BoardSpec { width: 50.0, height: 40.0, thickness: 1.0 };
        let second = builder.create_board(&mut graph, &mut cache, spec, DEFAULT_BOARD_COLOR);
        assert!(!graph.contains(first));
        assert_eq!(graph.world.query::<&BoardSlab>().iter(&graph.world).count(), 1);
        assert_eq!(builder.spec(), Some(spec));

        let (slab, transform) = graph.board(second).expect("board spawned");
        let top = transform.translation.y + slab.mesh.bounds.max.y;
        assert!(top.abs() < 1e-6, "board top must sit at y = 0, got {top}");
        assert_eq!(cache.created_count(), 1, "one material shared by both builds");
        cache.dispose_all();
    }

    #[test]
    fn board_material_is_cached_per_color() {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = BoardBuilder::new();
        let red = [1.0, 0.0, 0.0];
        let entity = builder.create_board(&mut graph, &mut cache, BoardSpec::default(), red);
        let (slab, _) = graph.board(entity).expect("board spawned");
        match cache.material(&slab.material) {
            Some(Material::Phong(PhongMaterial { color, .. })) => assert_eq!(*color, red),
            other => panic!("expected phong board material, got {other:?}"),
        }

        builder.create_board(&mut graph, &mut cache, BoardSpec::default(), DEFAULT_BOARD_COLOR);
        assert!(cache.material(&board_material_key(DEFAULT_BOARD_COLOR)).is_some());
        assert_eq!(cache.created_count(), 2);
        cache.dispose_all();
    }

    #[test]
    fn dispose_without_board_is_safe() {
        let mut graph = SceneGraph::new();
        let mut builder = BoardBuilder::new();
        builder.dispose(&mut graph);
        assert!(builder.entity().is_none());
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("#ff0000"), Some([1.0, 0.0, 0.0]));
        assert_eq!(parse_hex_color("00ff00"), Some([0.0, 1.0, 0.0]));
        assert!(parse_hex_color("#12345").is_none());
    }
}
