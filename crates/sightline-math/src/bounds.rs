//! Combined box and sphere bounds for renderable objects.

use glam::Vec3;

/// An axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Vec3,
    /// Maximum corner of the bounding box.
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from two corners. Components are sorted so that
    /// `min <= max` on every axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents (half-size along each axis).
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Returns true if this AABB overlaps `other`, touching faces included.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }
}

/// World bounds of a renderable object: an origin shared by an axis-aligned
/// box (half extents) and a bounding sphere.
///
/// The sphere is used for cheap rejects and screen-size estimates; the box is
/// the authoritative volume for frustum and occlusion tests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxSphereBounds {
    /// Center of both the box and the sphere.
    pub origin: Vec3,
    /// Half extents of the box.
    pub box_extent: Vec3,
    /// Radius of the bounding sphere.
    pub sphere_radius: f32,
}

impl BoxSphereBounds {
    /// Create bounds from explicit parts.
    pub fn new(origin: Vec3, box_extent: Vec3, sphere_radius: f32) -> Self {
        Self {
            origin,
            box_extent,
            sphere_radius,
        }
    }

    /// Create bounds from a center and half extents; the sphere circumscribes
    /// the box.
    pub fn from_extent(origin: Vec3, box_extent: Vec3) -> Self {
        Self {
            origin,
            box_extent,
            sphere_radius: box_extent.length(),
        }
    }

    /// Create bounds that circumscribe an AABB.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self::from_extent(aabb.center(), aabb.extents())
    }

    /// The box part as an AABB.
    pub fn aabb(&self) -> Aabb {
        Aabb {
            min: self.origin - self.box_extent,
            max: self.origin + self.box_extent,
        }
    }

    /// Grow both the box and the sphere by `amount` on every side.
    #[must_use]
    pub fn expand_by(&self, amount: f32) -> Self {
        Self {
            origin: self.origin,
            box_extent: self.box_extent + Vec3::splat(amount),
            sphere_radius: self.sphere_radius + amount,
        }
    }

    /// Squared distance from `point` to the closest point of the box.
    /// Zero when the point is inside the box.
    pub fn squared_distance_from_box_to_point(&self, point: Vec3) -> f32 {
        let delta = (point - self.origin).abs() - self.box_extent;
        delta.max(Vec3::ZERO).length_squared()
    }
}
