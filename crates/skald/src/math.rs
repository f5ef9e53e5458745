//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so users don't need to
//! depend on it directly. [`Transform`] is the local placement of an entity,
//! [`Aabb`] the axis-aligned bounds used by the spatial index.

use serde::{Deserialize, Serialize};

pub use glam::{Mat4, Quat, Vec3};

/// A 3D transform: position, rotation, and scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform (origin, no rotation, uniform scale of 1).
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a transform at the given position.
    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        Self {
            translation: Vec3::new(x, y, z),
            ..Self::IDENTITY
        }
    }

    /// Return a copy with uniform scale applied.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    /// Compute the 4x4 model matrix.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// True if `other` lies entirely inside `self` (touching faces count).
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.min.cmple(p).all() && self.max.cmpge(p).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Smallest box enclosing both.
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Bounds of this box after transformation, computed from all 8 corners.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for corner in 0..8 {
            let p = Vec3::new(
                if corner & 1 != 0 { self.max.x } else { self.min.x },
                if corner & 2 != 0 { self.max.y } else { self.min.y },
                if corner & 4 != 0 { self.max.z } else { self.min.z },
            );
            let t = matrix.transform_point3(p);
            min = min.min(t);
            max = max.max(t);
        }
        Aabb { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_contains_and_intersects() {
        let outer = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(10.0));
        let inner = Aabb::from_center_half_extents(Vec3::new(2.0, 0.0, 0.0), Vec3::ONE);
        let straddling = Aabb::from_center_half_extents(Vec3::new(10.0, 0.0, 0.0), Vec3::ONE);

        assert!(outer.contains(&inner));
        assert!(!outer.contains(&straddling));
        assert!(outer.intersects(&straddling));
        assert!(!inner.intersects(&straddling));
    }

    #[test]
    fn aabb_transformed_by_translation_and_scale() {
        let unit = Aabb::new(Vec3::splat(-1.0), Vec3::ONE);
        let m = Transform::from_xyz(5.0, 0.0, 0.0).with_scale(2.0).matrix();
        let t = unit.transformed(&m);
        assert!((t.min - Vec3::new(3.0, -2.0, -2.0)).length() < 1e-5);
        assert!((t.max - Vec3::new(7.0, 2.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn aabb_new_orders_corners() {
        let b = Aabb::new(Vec3::ONE, Vec3::ZERO);
        assert_eq!(b.min, Vec3::ZERO);
        assert_eq!(b.max, Vec3::ONE);
    }
}
