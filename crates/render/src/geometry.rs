//! Ray and triangle primitives used by the host traversal.

use glam::{Vec3, Vec3A};
use rtobj_common::Bounds;

/// Computes the inverse of `x` avoiding division by zero.
#[inline(always)]
pub fn safe_inverse(x: f32) -> f32 {
    if x.abs() <= f32::EPSILON {
        x.signum() / f32::EPSILON
    } else {
        1.0 / x
    }
}

/// A ray with a `[tmin, tmax]` validity interval.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3A,
    pub direction: Vec3A,
    /// Component-wise inverse of `direction`, for slab tests.
    pub inv_direction: Vec3A,
    pub tmin: f32,
    pub tmax: f32,
}

impl Ray {
    #[inline(always)]
    pub fn new(origin: Vec3A, direction: Vec3A, tmin: f32, tmax: f32) -> Self {
        Self {
            origin,
            direction,
            inv_direction: Vec3A::new(
                safe_inverse(direction.x),
                safe_inverse(direction.y),
                safe_inverse(direction.z),
            ),
            tmin,
            tmax,
        }
    }

    #[inline(always)]
    pub fn new_inf(origin: Vec3A, direction: Vec3A) -> Self {
        Self::new(origin, direction, 0.0, f32::INFINITY)
    }

    /// Entry distance into the box, or `f32::INFINITY` on a miss.
    #[inline(always)]
    pub fn intersect_aabb(&self, min: Vec3A, max: Vec3A) -> f32 {
        let t1 = (min - self.origin) * self.inv_direction;
        let t2 = (max - self.origin) * self.inv_direction;

        let tmin = t1.min(t2).max_element().max(self.tmin);
        let tmax = t1.max(t2).min_element().min(self.tmax);

        if tmax >= tmin { tmin } else { f32::INFINITY }
    }
}

/// A triangle in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Triangle {
    pub v0: Vec3A,
    pub v1: Vec3A,
    pub v2: Vec3A,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self {
            v0: v0.into(),
            v1: v1.into(),
            v2: v2.into(),
        }
    }

    /// Unit geometric normal (zero for degenerate triangles).
    #[inline(always)]
    pub fn normal(&self) -> Vec3A {
        (self.v1 - self.v0).cross(self.v2 - self.v0).normalize_or_zero()
    }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::EMPTY;
        b.grow(self.v0.into());
        b.grow(self.v1.into());
        b.grow(self.v2.into());
        b
    }

    pub fn centroid(&self) -> Vec3 {
        ((self.v0 + self.v1 + self.v2) / 3.0).into()
    }

    /// Distance along the ray to the hit, or `f32::INFINITY` for a miss.
    ///
    /// Möller-Trumbore, two-sided.
    #[inline(always)]
    pub fn intersect(&self, ray: &Ray) -> f32 {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        let p = ray.direction.cross(e2);
        let det = e1.dot(p);
        if det.abs() < 1e-12 {
            return f32::INFINITY;
        }
        let inv_det = 1.0 / det;

        let s = ray.origin - self.v0;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return f32::INFINITY;
        }
        let q = s.cross(e1);
        let v = ray.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return f32::INFINITY;
        }

        let t = e2.dot(q) * inv_det;
        if t >= ray.tmin && t <= ray.tmax {
            t
        } else {
            f32::INFINITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> Triangle {
        Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y)
    }

    #[test]
    fn ray_hits_triangle_from_both_sides() {
        let tri = unit_triangle();
        let front = Ray::new_inf(Vec3A::new(0.25, 0.25, 1.0), Vec3A::NEG_Z);
        assert!((tri.intersect(&front) - 1.0).abs() < 1e-6);
        let back = Ray::new_inf(Vec3A::new(0.25, 0.25, -2.0), Vec3A::Z);
        assert!((tri.intersect(&back) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn ray_misses_outside_edges() {
        let tri = unit_triangle();
        let ray = Ray::new_inf(Vec3A::new(0.75, 0.75, 1.0), Vec3A::NEG_Z);
        assert_eq!(tri.intersect(&ray), f32::INFINITY);
    }

    #[test]
    fn hit_beyond_tmax_is_a_miss() {
        let tri = unit_triangle();
        let ray = Ray::new(Vec3A::new(0.25, 0.25, 1.0), Vec3A::NEG_Z, 0.0, 0.5);
        assert_eq!(tri.intersect(&ray), f32::INFINITY);
    }

    #[test]
    fn parallel_ray_misses() {
        let tri = unit_triangle();
        let ray = Ray::new_inf(Vec3A::new(-1.0, 0.25, 0.0), Vec3A::X);
        assert_eq!(tri.intersect(&ray), f32::INFINITY);
    }

    #[test]
    fn slab_test() {
        let ray = Ray::new_inf(Vec3A::new(0.5, 0.5, 5.0), Vec3A::NEG_Z);
        let t = ray.intersect_aabb(Vec3A::ZERO, Vec3A::ONE);
        assert!((t - 4.0).abs() < 1e-6);
        let miss = ray.intersect_aabb(Vec3A::new(2.0, 2.0, 0.0), Vec3A::new(3.0, 3.0, 1.0));
        assert_eq!(miss, f32::INFINITY);
        // Origin inside the box enters at tmin.
        let inside = Ray::new_inf(Vec3A::splat(0.5), Vec3A::X);
        assert_eq!(inside.intersect_aabb(Vec3A::ZERO, Vec3A::ONE), 0.0);
    }

    #[test]
    fn normal_and_centroid() {
        let tri = unit_triangle();
        assert_eq!(tri.normal(), Vec3A::Z);
        assert!((tri.centroid() - Vec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0)).length() < 1e-6);
        let b = tri.bounds();
        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, Vec3::new(1.0, 1.0, 0.0));
    }
}
