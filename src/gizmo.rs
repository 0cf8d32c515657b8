use crate::camera3d::Camera3D;
use crate::picking::{ray_horizontal_plane, Ray};
use crate::scene_graph::SceneGraph;
use bevy_ecs::prelude::Entity;
use glam::{Vec2, Vec3};
use winit::dpi::PhysicalSize;

/// Screen-space tolerance for grabbing an axis handle.
pub const GIZMO_AXIS_PICK_RADIUS_PX: f32 = 12.0;
/// Handle length as a fraction of the camera distance, so the gizmo keeps a constant screen size.
pub const GIZMO_SIZE_FACTOR: f32 = 0.15;
/// Side of the XZ plane handle relative to the axis length.
pub const GIZMO_PLANE_HANDLE_FRACTION: f32 = 0.3;

/// Handles of the board-plane translate gizmo. There is no vertical handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GizmoAxis {
    X,
    Z,
    Plane,
}

impl GizmoAxis {
    pub fn label(self) -> &'static str {
        match self {
            GizmoAxis::X => "X axis",
            GizmoAxis::Z => "Z axis",
            GizmoAxis::Plane => "XZ plane",
        }
    }

    /// Keeps only the components of `delta` this handle may move.
    pub fn constrain(self, delta: Vec3) -> Vec3 {
        match self {
            GizmoAxis::X => Vec3::new(delta.x, 0.0, 0.0),
            GizmoAxis::Z => Vec3::new(0.0, 0.0, delta.z),
            GizmoAxis::Plane => Vec3::new(delta.x, 0.0, delta.z),
        }
    }

    pub fn color(self) -> [f32; 3] {
        match self {
            GizmoAxis::X => [0.9, 0.2, 0.2],
            GizmoAxis::Z => [0.2, 0.4, 0.95],
            GizmoAxis::Plane => [0.95, 0.85, 0.2],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GizmoDrag {
    axis: GizmoAxis,
    start_translation: Vec3,
    start_hit: Vec3,
}

/// Line segment of a drawn handle, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleSegment {
    pub axis: GizmoAxis,
    pub start: Vec3,
    pub end: Vec3,
    pub highlighted: bool,
}

/// Translation widget restricted to the board plane. Attaches to one entity with a
/// `Transform3D` at a time and writes that transform while dragged.
#[derive(Debug, Default)]
pub struct TranslateGizmo {
    object: Option<Entity>,
    hovered_axis: Option<GizmoAxis>,
    drag: Option<GizmoDrag>,
}

impl TranslateGizmo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, entity: Entity) {
        self.detach();
        self.object = Some(entity);
    }

    pub fn detach(&mut self) {
        self.object = None;
        self.hovered_axis = None;
        self.drag = None;
    }

    pub fn object(&self) -> Option<Entity> {
        self.object
    }

    /// Axis under the pointer or being dragged. `Some` means the gizmo owns the next press.
    pub fn active_axis(&self) -> Option<GizmoAxis> {
        self.drag.map(|drag| drag.axis).or(self.hovered_axis)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    fn center(&self, graph: &SceneGraph) -> Option<Vec3> {
        graph.transform(self.object?).map(|transform| transform.translation)
    }

    fn handle_length(camera: &Camera3D, center: Vec3) -> f32 {
        (camera.position.distance(center) * GIZMO_SIZE_FACTOR).max(0.01)
    }

    /// Handle geometry for drawing: both axes plus the outline of the plane square.
    pub fn handle_segments(&self, graph: &SceneGraph, camera: &Camera3D) -> Vec<HandleSegment> {
        let Some(center) = self.center(graph) else {
            return Vec::new();
        };
        let length = Self::handle_length(camera, center);
        let active = self.active_axis();
        let side = length * GIZMO_PLANE_HANDLE_FRACTION;
        let corner_x = center + Vec3::X * side;
        let corner_z = center + Vec3::Z * side;
        let corner_xz = center + Vec3::new(side, 0.0, side);
        let segment = |axis: GizmoAxis, start: Vec3, end: Vec3| HandleSegment {
            axis,
            start,
            end,
            highlighted: active == Some(axis),
        };
        vec![
            segment(GizmoAxis::X, center, center + Vec3::X * length),
            segment(GizmoAxis::Z, center, center + Vec3::Z * length),
            segment(GizmoAxis::Plane, corner_x, corner_xz),
            segment(GizmoAxis::Plane, corner_z, corner_xz),
        ]
    }

    fn pick_axis(
        &self,
        graph: &SceneGraph,
        camera: &Camera3D,
        viewport: PhysicalSize<u32>,
        screen: Vec2,
    ) -> Option<GizmoAxis> {
        let center = self.center(graph)?;
        let length = Self::handle_length(camera, center);

        let ray = camera.screen_ray(screen, viewport)?;
        if let Some(hit) = ray_horizontal_plane(&ray, center.y) {
            let local = hit - center;
            let side = length * GIZMO_PLANE_HANDLE_FRACTION;
            if (0.0..=side).contains(&local.x) && (0.0..=side).contains(&local.z) {
                return Some(GizmoAxis::Plane);
            }
        }

        let center_px = camera.project_point(center, viewport)?;
        let mut best: Option<(GizmoAxis, f32)> = None;
        for (axis, dir) in [(GizmoAxis::X, Vec3::X), (GizmoAxis::Z, Vec3::Z)] {
            let Some(end_px) = camera.project_point(center + dir * length, viewport) else {
                continue;
            };
            let distance = distance_to_segment(screen, center_px, end_px);
            if distance <= GIZMO_AXIS_PICK_RADIUS_PX && best.map_or(true, |(_, d)| distance < d) {
                best = Some((axis, distance));
            }
        }
        best.map(|(axis, _)| axis)
    }

    /// Updates the hovered handle, or moves the attached object while dragging.
    /// Returns true when the attached transform changed.
    pub fn pointer_move(
        &mut self,
        graph: &mut SceneGraph,
        camera: &Camera3D,
        viewport: PhysicalSize<u32>,
        screen: Vec2,
    ) -> bool {
        let Some(entity) = self.object else {
            self.hovered_axis = None;
            return false;
        };
        let Some(drag) = self.drag else {
            self.hovered_axis = self.pick_axis(graph, camera, viewport, screen);
            return false;
        };
        let Some(hit) = drag_plane_hit(camera, viewport, screen, drag.start_translation.y) else {
            return false;
        };
        let Some(mut transform) = graph.transform(entity) else {
            log::debug!("[gizmo] attached entity vanished mid-drag");
            self.detach();
            return false;
        };
        transform.translation = drag.start_translation + drag.axis.constrain(hit - drag.start_hit);
        graph.set_transform(entity, transform)
    }

    /// Starts a drag when the press lands on a handle. Returns true when the press was consumed.
    pub fn pointer_down(
        &mut self,
        graph: &SceneGraph,
        camera: &Camera3D,
        viewport: PhysicalSize<u32>,
        screen: Vec2,
    ) -> bool {
        let Some(center) = self.center(graph) else {
            return false;
        };
        let Some(axis) = self.hovered_axis.or_else(|| self.pick_axis(graph, camera, viewport, screen)) else {
            return false;
        };
        let Some(start_hit) = drag_plane_hit(camera, viewport, screen, center.y) else {
            return false;
        };
        self.hovered_axis = Some(axis);
        self.drag = Some(GizmoDrag { axis, start_translation: center, start_hit });
        log::debug!("[gizmo] dragging {}", axis.label());
        true
    }

    /// Ends an active drag. Returns true if one was active.
    pub fn pointer_up(&mut self) -> bool {
        self.drag.take().is_some()
    }
}

fn drag_plane_hit(camera: &Camera3D, viewport: PhysicalSize<u32>, screen: Vec2, height: f32) -> Option<Vec3> {
    let ray: Ray = camera.screen_ray(screen, viewport)?;
    ray_horizontal_plane(&ray, height)
}

fn distance_to_segment(point: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}
