//! Pointer state machine: ray casts against the interactable registry, hover/select
//! bookkeeping, direct planar dragging of traces, and camera orbit forwarding.
//!
//! Selection changes are queued as [`EditorEvent::SelectionChanged`] and drained by the
//! scene manager, which owns gizmo attachment.

use crate::camera3d::{Camera3D, OrbitControls};
use crate::events::{EditorEvent, EventBus};
use crate::interaction::{InteractionId, Primitive, Selection};
use crate::picking::ray_horizontal_plane;
use crate::resources::ResourceCache;
use crate::scene_graph::SceneGraph;
use bevy_ecs::prelude::Entity;
use glam::{Vec2, Vec3};
use winit::dpi::PhysicalSize;
use winit::window::CursorIcon;

/// Height of the board top, shared by pads and traces.
pub const BOARD_REFERENCE_HEIGHT: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Auxiliary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Move { position: Vec2 },
    Down { button: PointerButton, position: Vec2 },
    Up { button: PointerButton, position: Vec2 },
    /// Positive values zoom towards the orbit target.
    Wheel { delta: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerState {
    Idle,
    Hovering(InteractionId),
    Dragging(InteractionId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TraceDrag {
    id: InteractionId,
    entity: Entity,
    /// Plane hit minus the trace translation at press time.
    offset: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

pub struct InputController {
    camera: Camera3D,
    camera_settings: CameraSettings,
    orbit: Option<OrbitControls>,
    viewport: PhysicalSize<u32>,
    cursor: Vec2,
    hovered: Option<InteractionId>,
    selected: Option<InteractionId>,
    selected_pad: Option<usize>,
    drag: Option<TraceDrag>,
    cursor_icon: CursorIcon,
    attached: bool,
    events: EventBus,
}

impl InputController {
    pub fn new(orbit: OrbitControls, camera_settings: CameraSettings, viewport: PhysicalSize<u32>) -> Self {
        let camera = orbit.to_camera(camera_settings.fov_y_radians, camera_settings.near, camera_settings.far);
        Self {
            camera,
            camera_settings,
            orbit: Some(orbit),
            viewport,
            cursor: Vec2::ZERO,
            hovered: None,
            selected: None,
            selected_pad: None,
            drag: None,
            cursor_icon: CursorIcon::Default,
            attached: true,
            events: EventBus::default(),
        }
    }

    pub fn camera(&self) -> &Camera3D {
        &self.camera
    }

    pub fn orbit(&self) -> Option<&OrbitControls> {
        self.orbit.as_ref()
    }

    pub fn viewport(&self) -> PhysicalSize<u32> {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: PhysicalSize<u32>) {
        self.viewport = viewport;
    }

    pub fn cursor(&self) -> Vec2 {
        self.cursor
    }

    pub fn cursor_icon(&self) -> CursorIcon {
        self.cursor_icon
    }

    pub fn hovered(&self) -> Option<InteractionId> {
        self.hovered
    }

    pub fn selected(&self) -> Option<InteractionId> {
        self.selected
    }

    /// Batch index of the selected pad, if the selection is a pad.
    pub fn selected_pad(&self) -> Option<usize> {
        self.selected_pad
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn state(&self) -> PointerState {
        match (self.drag, self.hovered) {
            (Some(drag), _) => PointerState::Dragging(drag.id),
            (None, Some(id)) => PointerState::Hovering(id),
            (None, None) => PointerState::Idle,
        }
    }

    pub fn drain_events(&mut self) -> Vec<EditorEvent> {
        self.events.drain()
    }

    /// Moves the cursor. `suspend_hover` is set while the gizmo owns a drag.
    pub fn pointer_move(
        &mut self,
        graph: &mut SceneGraph,
        resources: &mut ResourceCache,
        position: Vec2,
        suspend_hover: bool,
    ) {
        if !self.attached {
            return;
        }
        self.cursor = position;
        if let Some(orbit) = self.orbit.as_mut() {
            if orbit.pointer_move(position) {
                self.refresh_camera();
            }
        }

        if let Some(drag) = self.drag {
            self.drag_trace(graph, drag, position);
            return;
        }
        if suspend_hover {
            return;
        }

        let hit = self
            .camera
            .screen_ray(position, self.viewport)
            .and_then(|ray| graph.pick(&ray))
            .map(|hit| hit.id);
        if hit != self.hovered {
            self.hovered = hit;
            self.push_uniforms(resources);
            self.cursor_icon = if hit.is_some() { CursorIcon::Pointer } else { CursorIcon::Default };
        }
    }

    /// Press handling. `gizmo_axis_active` reports whether the gizmo claimed the press.
    pub fn pointer_down(
        &mut self,
        graph: &mut SceneGraph,
        resources: &mut ResourceCache,
        button: PointerButton,
        position: Vec2,
        gizmo_axis_active: bool,
    ) {
        if !self.attached {
            return;
        }
        self.cursor = position;
        match button {
            PointerButton::Secondary => {
                if let Some(orbit) = self.orbit.as_mut() {
                    orbit.begin_rotate(position);
                }
                return;
            }
            PointerButton::Auxiliary => return,
            PointerButton::Primary => {}
        }
        if gizmo_axis_active {
            return;
        }

        // Presses act on the hover state of the last move only.
        let Some(id) = self.hovered else {
            self.clear_selection(resources);
            return;
        };
        match graph.resolve(id) {
            Some(Primitive::Pad { index }) => self.select_pad(graph, resources, id, index),
            Some(Primitive::Trace { entity }) => self.select_trace(graph, resources, id, entity, position),
            None => {
                log::debug!("[input] hovered id {id} no longer resolves; clearing selection");
                self.hovered = None;
                self.clear_selection(resources);
            }
        }
    }

    pub fn pointer_up(&mut self, button: PointerButton) {
        if !self.attached {
            return;
        }
        match button {
            PointerButton::Primary => {
                if let Some(drag) = self.drag.take() {
                    log::debug!("[input] finished dragging {}", drag.id);
                    if let Some(orbit) = self.orbit.as_mut() {
                        orbit.enabled = true;
                    }
                }
            }
            PointerButton::Secondary => {
                if let Some(orbit) = self.orbit.as_mut() {
                    orbit.end_rotate();
                }
            }
            PointerButton::Auxiliary => {}
        }
    }

    pub fn wheel(&mut self, delta: f32) {
        if !self.attached {
            return;
        }
        if let Some(orbit) = self.orbit.as_mut() {
            if orbit.wheel(delta) {
                self.refresh_camera();
            }
        }
    }

    /// Drops hover/selection/drag state after the interactables were rebuilt.
    pub fn reset_selection(&mut self, resources: &mut ResourceCache) {
        let had_selection = self.selected.is_some();
        self.hovered = None;
        self.selected = None;
        self.selected_pad = None;
        self.cursor_icon = CursorIcon::Default;
        if self.drag.take().is_some() {
            if let Some(orbit) = self.orbit.as_mut() {
                orbit.enabled = true;
            }
        }
        self.push_uniforms(resources);
        if had_selection {
            self.events.push(EditorEvent::SelectionChanged(None));
        }
    }

    /// Releases the orbit controller and stops reacting to pointer input.
    pub fn dispose(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        self.orbit = None;
        self.drag = None;
        self.hovered = None;
        self.selected = None;
        self.selected_pad = None;
        self.cursor_icon = CursorIcon::Default;
        self.events.clear();
        log::debug!("[input] controller disposed");
    }

    fn select_pad(&mut self, graph: &SceneGraph, resources: &mut ResourceCache, id: InteractionId, index: usize) {
        let Some(record) = graph.pad_batch().and_then(|batch| batch.records.get(index)) else {
            log::warn!("[input] pad {id} has no record; clearing selection");
            self.clear_selection(resources);
            return;
        };
        let selection =
            Selection::Pad { id: record.id.clone(), interaction_id: id, pos: record.pos, size: record.size };
        self.selected = Some(id);
        self.selected_pad = Some(index);
        self.push_uniforms(resources);
        self.events.push(EditorEvent::SelectionChanged(Some(selection)));
    }

    fn select_trace(
        &mut self,
        graph: &SceneGraph,
        resources: &mut ResourceCache,
        id: InteractionId,
        entity: Entity,
        position: Vec2,
    ) {
        let (Some(trace), Some(transform)) = (graph.trace(entity), graph.transform(entity)) else {
            log::warn!("[input] trace {id} has no entity; clearing selection");
            self.clear_selection(resources);
            return;
        };
        let selection = Selection::Trace { id: trace.record.id.clone(), interaction_id: id };
        self.selected = Some(id);
        self.selected_pad = None;

        let plane_hit = self
            .camera
            .screen_ray(position, self.viewport)
            .and_then(|ray| ray_horizontal_plane(&ray, BOARD_REFERENCE_HEIGHT));
        if let Some(hit) = plane_hit {
            self.drag = Some(TraceDrag { id, entity, offset: hit - transform.translation });
            if let Some(orbit) = self.orbit.as_mut() {
                orbit.enabled = false;
                orbit.end_rotate();
            }
        }
        self.push_uniforms(resources);
        self.events.push(EditorEvent::SelectionChanged(Some(selection)));
    }

    fn clear_selection(&mut self, resources: &mut ResourceCache) {
        self.selected = None;
        self.selected_pad = None;
        self.push_uniforms(resources);
        self.events.push(EditorEvent::SelectionChanged(None));
    }

    fn drag_trace(&mut self, graph: &mut SceneGraph, drag: TraceDrag, position: Vec2) {
        let Some(hit) = self
            .camera
            .screen_ray(position, self.viewport)
            .and_then(|ray| ray_horizontal_plane(&ray, BOARD_REFERENCE_HEIGHT))
        else {
            return;
        };
        let Some(mut transform) = graph.transform(drag.entity) else {
            log::debug!("[input] drag target {} vanished", drag.id);
            self.drag = None;
            return;
        };
        let target = hit - drag.offset;
        transform.translation.x = target.x;
        transform.translation.z = target.z;
        graph.set_transform(drag.entity, transform);
    }

    fn push_uniforms(&self, resources: &mut ResourceCache) {
        resources.set_interaction_ids(
            InteractionId::uniform_value(self.hovered),
            InteractionId::uniform_value(self.selected),
        );
    }

    fn refresh_camera(&mut self) {
        if let Some(orbit) = self.orbit.as_ref() {
            let settings = self.camera_settings;
            self.camera = orbit.to_camera(settings.fov_y_radians, settings.near, settings.far);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{PadRecord, TraceRecord};
    use crate::primitives::PrimitivesBuilder;

    fn controller() -> InputController {
        let orbit = OrbitControls::looking_at(Vec3::new(0.0, 50.0, 50.0), Vec3::ZERO);
        let settings = CameraSettings { fov_y_radians: 45f32.to_radians(), near: 0.1, far: 1000.0 };
        InputController::new(orbit, settings, PhysicalSize::new(800, 600))
    }

    fn scene() -> (SceneGraph, ResourceCache) {
        let mut graph = SceneGraph::new();
        let mut cache = ResourceCache::new();
        let mut builder = PrimitivesBuilder::new();
        builder.create_pads(
            &mut graph,
            &mut cache,
            &[PadRecord { id: "p1".into(), pos: [0.0, 0.05, 0.0], size: [2.0, 2.0] }],
        );
        builder.create_traces(
            &mut graph,
            &mut cache,
            &[TraceRecord { id: "t1".into(), points: vec![[10.0, 10.0], [20.0, 10.0]], width: 2.0, numeric_id: 5 }],
        );
        (graph, cache)
    }

    fn screen_of(input: &InputController, world: Vec3) -> Vec2 {
        input.camera().project_point(world, input.viewport()).expect("visible")
    }

    #[test]
    fn hover_tracks_nearest_hit_and_cursor() {
        let (mut graph, mut cache) = scene();
        let mut input = controller();
        let over_pad = screen_of(&input, Vec3::new(0.0, 0.05, 0.0));
        input.pointer_move(&mut graph, &mut cache, over_pad, false);
        assert_eq!(input.state(), PointerState::Hovering(InteractionId(0)));
        assert_eq!(input.cursor_icon(), CursorIcon::Pointer);

        input.pointer_move(&mut graph, &mut cache, Vec2::new(2.0, 2.0), false);
        assert_eq!(input.state(), PointerState::Idle);
        assert_eq!(input.cursor_icon(), CursorIcon::Default);
        cache.dispose_all();
    }

    #[test]
    fn secondary_press_never_selects() {
        let (mut graph, mut cache) = scene();
        let mut input = controller();
        let over_pad = screen_of(&input, Vec3::new(0.0, 0.05, 0.0));
        input.pointer_move(&mut graph, &mut cache, over_pad, false);
        input.pointer_down(&mut graph, &mut cache, PointerButton::Secondary, over_pad, false);
        assert!(input.selected().is_none());
        assert!(input.drain_events().is_empty());
        assert!(input.orbit().is_some_and(|orbit| orbit.is_rotating()));
        cache.dispose_all();
    }

    #[test]
    fn press_without_hover_clears_instead_of_selecting() {
        let (mut graph, mut cache) = scene();
        let mut input = controller();
        let over_pad = screen_of(&input, Vec3::new(0.0, 0.05, 0.0));
        input.pointer_down(&mut graph, &mut cache, PointerButton::Primary, over_pad, false);
        assert!(input.selected().is_none());
        assert!(input.hovered().is_none());
        assert_eq!(input.drain_events(), vec![EditorEvent::SelectionChanged(None)]);
        cache.dispose_all();
    }

    #[test]
    fn gizmo_axis_blocks_selection() {
        let (mut graph, mut cache) = scene();
        let mut input = controller();
        let over_pad = screen_of(&input, Vec3::new(0.0, 0.05, 0.0));
        input.pointer_move(&mut graph, &mut cache, over_pad, false);
        input.pointer_down(&mut graph, &mut cache, PointerButton::Primary, over_pad, true);
        assert!(input.selected().is_none());
        cache.dispose_all();
    }

    #[test]
    fn trace_drag_keeps_height_and_disables_orbit() {
        let (mut graph, mut cache) = scene();
        let mut input = controller();
        let on_trace = screen_of(&input, Vec3::new(14.0, 0.0, 10.5));
        input.pointer_move(&mut graph, &mut cache, on_trace, false);
        assert_eq!(input.hovered(), Some(InteractionId(10_005)));
        input.pointer_down(&mut graph, &mut cache, PointerButton::Primary, on_trace, false);
        assert_eq!(input.state(), PointerState::Dragging(InteractionId(10_005)));
        assert!(input.orbit().is_some_and(|orbit| !orbit.enabled));

        let entity = graph.interactables().traces()[0].1;
        let target = screen_of(&input, Vec3::new(17.0, 0.0, 6.5));
        input.pointer_move(&mut graph, &mut cache, target, false);
        let moved = graph.transform(entity).expect("transform").translation;
        assert!((moved.x - 3.0).abs() < 1e-2 && (moved.z + 4.0).abs() < 1e-2, "moved to {moved}");
        assert_eq!(moved.y, 0.0);

        input.pointer_up(PointerButton::Primary);
        assert!(!input.is_dragging());
        assert!(input.orbit().is_some_and(|orbit| orbit.enabled));
        cache.dispose_all();
    }

    #[test]
    fn disposed_controller_ignores_events() {
        let (mut graph, mut cache) = scene();
        let mut input = controller();
        input.dispose();
        let over_pad = screen_of(&input, Vec3::new(0.0, 0.05, 0.0));
        input.pointer_move(&mut graph, &mut cache, over_pad, false);
        input.pointer_down(&mut graph, &mut cache, PointerButton::Primary, over_pad, false);
        input.wheel(3.0);
        assert!(input.hovered().is_none());
        assert!(input.selected().is_none());
        assert!(input.orbit().is_none());
        assert!(input.drain_events().is_empty());
        cache.dispose_all();
    }
}
