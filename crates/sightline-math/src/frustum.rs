//! View frustum extracted from a reverse-Z view-projection matrix.
//!
//! Planes are stored as `Vec4(nx, ny, nz, d)` with inward-pointing unit
//! normals, so a point `p` is inside a plane when `n·p + d >= 0`.

use glam::{Mat4, Vec3, Vec4};

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Three-way result of a volume test against the frustum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intersection {
    /// Fully inside every plane.
    Inside,
    /// Straddles at least one plane.
    Intersecting,
    /// Fully outside at least one plane.
    Outside,
}

/// Projection of a box's half extents onto a plane normal: how far the box
/// reaches past its center along that normal.
#[inline]
pub fn box_push_out(normal: Vec3, extent: Vec3) -> f32 {
    extent.x * normal.x.abs() + extent.y * normal.y.abs() + extent.z * normal.z.abs()
}

/// A view frustum defined by six inward-pointing planes.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    /// Six planes: left, right, bottom, top, near, far.
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a combined view-projection matrix using
    /// the Gribb-Hartmann method.
    ///
    /// Assumes reverse-Z with a `[0, 1]` depth range: the near plane maps to
    /// depth 1 and the far plane to depth 0. An infinite far plane yields a
    /// degenerate far plane that never rejects anything.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        // Reverse-Z: z_clip <= w_clip at the near plane, z_clip >= 0 at the far.
        planes[NEAR] = rows[3] - rows[2];
        planes[FAR] = rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 1e-8 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Build a frustum from explicit inward-facing planes.
    pub fn from_planes(planes: [Vec4; 6]) -> Self {
        Self { planes }
    }

    /// All six planes.
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// The near clipping plane (normal pointing away from the viewer).
    pub fn near_plane(&self) -> Vec4 {
        self.planes[NEAR]
    }

    /// Returns `true` if a box given by center and half extents is at least
    /// partially inside the frustum.
    ///
    /// Conservative: boxes near frustum corners may pass while being fully
    /// outside, but a visible box is never rejected.
    pub fn intersects_box(&self, origin: Vec3, extent: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            normal.dot(origin) + plane.w >= -box_push_out(normal, extent)
        })
    }

    /// Returns `true` if a sphere is at least partially inside the frustum.
    pub fn intersects_sphere(&self, origin: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(origin) + plane.w >= -radius)
    }

    /// Three-way classification of a box against the frustum.
    pub fn classify_box(&self, origin: Vec3, extent: Vec3) -> Intersection {
        let mut all_inside = true;
        for plane in &self.planes {
            let normal = plane.truncate();
            let reach = box_push_out(normal, extent);
            let signed_dist = normal.dot(origin) + plane.w;
            if signed_dist < -reach {
                return Intersection::Outside;
            }
            if signed_dist < reach {
                all_inside = false;
            }
        }
        if all_inside {
            Intersection::Inside
        } else {
            Intersection::Intersecting
        }
    }
}
