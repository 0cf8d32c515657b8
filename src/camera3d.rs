use crate::picking::Ray;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use winit::dpi::PhysicalSize;

const DEFAULT_UP: Vec3 = Vec3::Y;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Perspective camera used for both rendering and pointer ray casts.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera3D {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera3D {
    pub fn new(position: Vec3, target: Vec3, fov_y_radians: f32, near: f32, far: f32) -> Self {
        Self { position, target, up: DEFAULT_UP, fov_y_radians, near, far }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect.max(0.0001), self.near, self.far)
    }

    pub fn view_projection(&self, viewport: PhysicalSize<u32>) -> Mat4 {
        self.projection_matrix(aspect_of(viewport)) * self.view_matrix()
    }

    /// World-space ray from the camera through a pixel position (origin top-left).
    pub fn screen_ray(&self, screen: Vec2, viewport: PhysicalSize<u32>) -> Option<Ray> {
        if viewport.width == 0 || viewport.height == 0 {
            return None;
        }
        let ndc_x = (2.0 * screen.x / viewport.width as f32) - 1.0;
        let ndc_y = 1.0 - (2.0 * screen.y / viewport.height as f32);
        let inv_view_proj = self.view_projection(viewport).inverse();
        let world = inv_view_proj * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        if world.w.abs() < f32::EPSILON {
            return None;
        }
        let dir = (world.truncate() / world.w) - self.position;
        if dir.length_squared() <= f32::EPSILON {
            return None;
        }
        Some(Ray::new(self.position, dir))
    }

    pub fn project_point(&self, point: Vec3, viewport: PhysicalSize<u32>) -> Option<Vec2> {
        if viewport.width == 0 || viewport.height == 0 {
            return None;
        }
        let clip = self.view_projection(viewport) * point.extend(1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let x = (ndc.x + 1.0) * 0.5 * viewport.width as f32;
        let y = (1.0 - ndc.y) * 0.5 * viewport.height as f32;
        Some(Vec2::new(x, y))
    }
}

fn aspect_of(viewport: PhysicalSize<u32>) -> f32 {
    if viewport.height > 0 {
        viewport.width as f32 / viewport.height as f32
    } else {
        1.0
    }
}

/// Orbit controller storing yaw/pitch/radius around a target. Secondary-button drags
/// orbit, the wheel zooms. While `enabled` is false all input is ignored.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub radius: f32,
    pub yaw_radians: f32,
    pub pitch_radians: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub enabled: bool,
    rotating_from: Option<Vec2>,
}

impl OrbitControls {
    pub fn new(target: Vec3, radius: f32) -> Self {
        Self {
            target,
            radius: radius.max(0.01),
            yaw_radians: 0.0,
            pitch_radians: 0.0,
            rotate_speed: 0.005,
            zoom_speed: 0.1,
            enabled: true,
            rotating_from: None,
        }
    }

    /// Builds a controller whose camera sits at `position` looking at `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let offset = position - target;
        let radius = offset.length().max(0.01);
        let mut controls = Self::new(target, radius);
        controls.yaw_radians = offset.x.atan2(offset.z);
        controls.pitch_radians = (-offset.y / radius).clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        controls
    }

    pub fn camera_position(&self) -> Vec3 {
        let rotation = Quat::from_euler(glam::EulerRot::YXZ, self.yaw_radians, self.pitch_radians, 0.0);
        self.target + rotation * Vec3::new(0.0, 0.0, self.radius)
    }

    pub fn to_camera(&self, fov_y_radians: f32, near: f32, far: f32) -> Camera3D {
        Camera3D::new(self.camera_position(), self.target, fov_y_radians, near, far)
    }

    pub fn orbit(&mut self, delta: Vec2) {
        self.yaw_radians += delta.x;
        self.pitch_radians = (self.pitch_radians + delta.y).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn zoom(&mut self, factor: f32) {
        self.radius = (self.radius * factor).clamp(0.1, 10_000.0);
    }

    pub fn begin_rotate(&mut self, screen: Vec2) {
        if self.enabled {
            self.rotating_from = Some(screen);
        }
    }

    pub fn end_rotate(&mut self) {
        self.rotating_from = None;
    }

    pub fn is_rotating(&self) -> bool {
        self.rotating_from.is_some()
    }

    /// Applies a pointer move. Returns true when the camera changed.
    pub fn pointer_move(&mut self, screen: Vec2) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(from) = self.rotating_from else {
            return false;
        };
        let delta = screen - from;
        self.rotating_from = Some(screen);
        if delta.length_squared() <= f32::EPSILON {
            return false;
        }
        self.orbit(-delta * self.rotate_speed);
        true
    }

    /// Applies a wheel step (positive = towards the target). Returns true when the camera changed.
    pub fn wheel(&mut self, delta: f32) -> bool {
        if !self.enabled || delta.abs() <= f32::EPSILON {
            return false;
        }
        let factor = (1.0 - self.zoom_speed).powf(delta);
        self.zoom(factor);
        true
    }
}
