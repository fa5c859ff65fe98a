//! Geometry shared by the visibility pipeline: box+sphere bounds, frustum
//! planes extracted from view-projection matrices, and screen-size projection
//! used for LOD selection.

mod bounds;
mod frustum;
mod projection;

pub use bounds::{Aabb, BoxSphereBounds};
pub use frustum::{Frustum, Intersection, box_push_out};
pub use projection::{
    bounds_screen_radius_squared, bounds_screen_size, is_perspective, screen_multiple,
};
