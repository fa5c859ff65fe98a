//! Screen-space size estimates used for LOD selection and small-object culling.

use glam::{Mat4, Vec3};

/// Half the larger of the two projection scale terms. Multiplying a world
/// radius by this and dividing by distance gives a screen-relative radius.
#[inline]
pub fn screen_multiple(projection: &Mat4) -> f32 {
    (0.5 * projection.x_axis.x).max(0.5 * projection.y_axis.y)
}

/// True for perspective projections, false for orthographic ones.
#[inline]
pub fn is_perspective(projection: &Mat4) -> bool {
    projection.w_axis.w == 0.0
}

/// Squared screen-relative radius of a sphere seen from `view_origin`.
///
/// The distance is clamped to at least one unit so nearby objects do not blow
/// up to infinity.
pub fn bounds_screen_radius_squared(
    origin: Vec3,
    sphere_radius: f32,
    view_origin: Vec3,
    projection: &Mat4,
) -> f32 {
    let multiple = screen_multiple(projection);
    let dist_sq = origin.distance_squared(view_origin);
    (multiple * sphere_radius).powi(2) / dist_sq.max(1.0)
}

/// Screen-relative diameter of a sphere: 1.0 means it spans the viewport.
///
/// Orthographic projections ignore distance.
pub fn bounds_screen_size(
    origin: Vec3,
    sphere_radius: f32,
    view_origin: Vec3,
    projection: &Mat4,
) -> f32 {
    let multiple = screen_multiple(projection);
    if is_perspective(projection) {
        let dist = origin.distance(view_origin);
        2.0 * multiple * sphere_radius / dist.max(1.0)
    } else {
        2.0 * multiple * sphere_radius
    }
}
