use crate::mesh::{Mesh, MeshBounds};
use glam::{Mat4, Vec3};

/// A world-space ray. `dir` is expected to be normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self { origin, dir: dir.normalize_or_zero() }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}

pub fn ray_plane_intersection(ray: &Ray, plane_origin: Vec3, plane_normal: Vec3) -> Option<Vec3> {
    let denom = plane_normal.dot(ray.dir);
    if denom.abs() < 1e-4 {
        return None;
    }
    let t = (plane_origin - ray.origin).dot(plane_normal) / denom;
    if t < 0.0 {
        return None;
    }
    Some(ray.at(t))
}

/// Intersects `ray` with the horizontal plane `y = height`.
pub fn ray_horizontal_plane(ray: &Ray, height: f32) -> Option<Vec3> {
    ray_plane_intersection(ray, Vec3::new(0.0, height, 0.0), Vec3::Y)
}

/// Ray against a box given by local `bounds` placed with `world`. Returns world distance.
pub fn ray_hit_obb(ray: &Ray, world: &Mat4, bounds: &MeshBounds) -> Option<f32> {
    let inv = world.inverse();
    if !matrix_is_finite(&inv) {
        return None;
    }
    let origin_local = inv.transform_point3(ray.origin);
    let dir_local = inv.transform_vector3(ray.dir);
    if dir_local.length_squared() <= f32::EPSILON {
        return None;
    }
    let dir_local = dir_local.normalize();
    let (t_local, hit_local) = ray_aabb_intersection(origin_local, dir_local, bounds.min, bounds.max)?;
    if t_local < 0.0 {
        return None;
    }
    let hit_world = world.transform_point3(hit_local);
    Some((hit_world - ray.origin).length())
}

/// Nearest hit of `ray` against the triangles of `mesh` placed with `world`.
pub fn ray_hit_mesh(ray: &Ray, world: &Mat4, mesh: &Mesh) -> Option<f32> {
    let mut nearest: Option<f32> = None;
    for [a, b, c] in mesh.triangles() {
        let a = world.transform_point3(a);
        let b = world.transform_point3(b);
        let c = world.transform_point3(c);
        if let Some(t) = ray_triangle_intersection(ray, a, b, c) {
            if nearest.map_or(true, |best| t < best) {
                nearest = Some(t);
            }
        }
    }
    nearest
}

/// Möller–Trumbore, double sided.
pub fn ray_triangle_intersection(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    let edge1 = b - a;
    let edge2 = c - a;
    let p = ray.dir.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = ray.dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    if t < 0.0 {
        return None;
    }
    Some(t)
}

pub fn matrix_is_finite(mat: &Mat4) -> bool {
    mat.to_cols_array().iter().all(|v| v.is_finite())
}

pub fn ray_aabb_intersection(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut t_min: f32 = 0.0;
    let mut t_max: f32 = f32::INFINITY;
    let origin_arr = origin.to_array();
    let dir_arr = dir.to_array();
    let min_arr = min.to_array();
    let max_arr = max.to_array();
    for i in 0..3 {
        let o = origin_arr[i];
        let d = dir_arr[i];
        if d.abs() < 1e-6 {
            if o < min_arr[i] || o > max_arr[i] {
                return None;
            }
        } else {
            let inv_d = 1.0 / d;
            let mut t1 = (min_arr[i] - o) * inv_d;
            let mut t2 = (max_arr[i] - o) * inv_d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
    }
    if t_max < 0.0 {
        return None;
    }
    let t_hit = if t_min >= 0.0 { t_min } else { t_max };
    Some((t_hit, origin + dir * t_hit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec2};

    #[test]
    fn plane_hit_from_above() {
        let ray = Ray::new(Vec3::new(2.0, 10.0, -3.0), Vec3::NEG_Y);
        let hit = ray_horizontal_plane(&ray, 0.0).expect("plane hit");
        assert!((hit - Vec3::new(2.0, 0.0, -3.0)).length() < 1e-5);
    }

    #[test]
    fn plane_parallel_ray_misses() {
        let ray = Ray::new(Vec3::new(0.0, 1.0, 0.0), Vec3::X);
        assert!(ray_horizontal_plane(&ray, 0.0).is_none());
    }

    #[test]
    fn scaled_box_hit_and_miss() {
        let bounds = MeshBounds { min: Vec3::splat(-0.5), max: Vec3::splat(0.5) };
        let world = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 0.1, 2.0),
            Quat::IDENTITY,
            Vec3::new(4.0, 0.05, 0.0),
        );
        let down = Ray::new(Vec3::new(4.5, 10.0, 0.5), Vec3::NEG_Y);
        let distance = ray_hit_obb(&down, &world, &bounds).expect("box hit");
        assert!((distance - 9.9).abs() < 1e-4);
        let beside = Ray::new(Vec3::new(5.5, 10.0, 0.0), Vec3::NEG_Y);
        assert!(ray_hit_obb(&beside, &world, &bounds).is_none());
    }

    #[test]
    fn ribbon_mesh_hit_respects_transform() {
        let mesh = Mesh::ribbon(Vec2::ZERO, Vec2::new(10.0, 0.0), 1.0, 10001.0);
        let shifted = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let ray = Ray::new(Vec3::new(5.0, 3.0, 5.0), Vec3::NEG_Y);
        assert!(ray_hit_mesh(&ray, &Mat4::IDENTITY, &mesh).is_none());
        let t = ray_hit_mesh(&ray, &shifted, &mesh).expect("ribbon hit");
        assert!((t - 3.0).abs() < 1e-5);
    }
}
