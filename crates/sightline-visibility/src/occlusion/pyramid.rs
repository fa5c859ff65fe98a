//! CPU hierarchical depth pyramid with reverse-Z.
//!
//! Depth 1.0 is the near plane and 0.0 the far plane, so "farther" means
//! smaller. Each mip texel stores the farthest depth of the four texels below
//! it, which makes a single coarse lookup a conservative bound for the whole
//! area it covers.

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4Swizzles};

/// Reverse-Z clear value: the far plane.
pub const FAR_DEPTH: f32 = 0.0;

/// Texels per axis a tested rectangle may span on the chosen mip.
const MAX_FOOTPRINT: u32 = 4;

/// A box projected to the screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    /// Top-left corner in pixels.
    pub min: Vec2,
    /// Bottom-right corner in pixels.
    pub max: Vec2,
    /// Depth of the closest corner.
    pub nearest: f32,
    /// Depth of the farthest corner.
    pub farthest: f32,
}

/// Project a box into a `size` pixel viewport. Returns `None` when any corner
/// lies on or behind the camera plane.
pub fn project_box(view_projection: &Mat4, origin: Vec3, extent: Vec3, size: UVec2) -> Option<ScreenRect> {
    let mut min = Vec2::splat(f32::MAX);
    let mut max = Vec2::splat(f32::MIN);
    let mut nearest = f32::MIN;
    let mut farthest = f32::MAX;
    for i in 0..8 {
        let sign = Vec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        );
        let clip = *view_projection * (origin + sign * extent).extend(1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let ndc = clip.xyz() / clip.w;
        let pixel = Vec2::new(
            (ndc.x * 0.5 + 0.5) * size.x as f32,
            (0.5 - ndc.y * 0.5) * size.y as f32,
        );
        min = min.min(pixel);
        max = max.max(pixel);
        nearest = nearest.max(ndc.z);
        farthest = farthest.min(ndc.z);
    }
    Some(ScreenRect {
        min,
        max,
        nearest,
        farthest,
    })
}

/// Farthest-depth mip chain over a depth buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthPyramid {
    levels: Vec<Level>,
}

#[derive(Clone, Debug, PartialEq)]
struct Level {
    size: UVec2,
    texels: Vec<f32>,
}

impl Level {
    fn texel(&self, x: u32, y: u32) -> f32 {
        self.texels[(y * self.size.x + x) as usize]
    }
}

impl DepthPyramid {
    /// Build the chain from a row-major depth buffer of `size` pixels.
    ///
    /// # Panics
    ///
    /// Panics if `depth` does not hold exactly `size.x * size.y` values.
    pub fn from_depth(size: UVec2, depth: Vec<f32>) -> Self {
        assert_eq!(
            depth.len(),
            (size.x * size.y) as usize,
            "depth buffer does not match {}x{}",
            size.x,
            size.y
        );
        let mut levels = vec![Level { size, texels: depth }];
        while let Some(prev) = levels.last().filter(|l| l.size.x > 1 || l.size.y > 1) {
            let next_size = UVec2::new(prev.size.x.div_ceil(2), prev.size.y.div_ceil(2));
            let mut texels = Vec::with_capacity((next_size.x * next_size.y) as usize);
            for y in 0..next_size.y {
                for x in 0..next_size.x {
                    let x0 = (2 * x).min(prev.size.x - 1);
                    let x1 = (2 * x + 1).min(prev.size.x - 1);
                    let y0 = (2 * y).min(prev.size.y - 1);
                    let y1 = (2 * y + 1).min(prev.size.y - 1);
                    let farthest = prev
                        .texel(x0, y0)
                        .min(prev.texel(x1, y0))
                        .min(prev.texel(x0, y1))
                        .min(prev.texel(x1, y1));
                    texels.push(farthest);
                }
            }
            levels.push(Level {
                size: next_size,
                texels,
            });
        }
        Self { levels }
    }

    /// A pyramid whose level 0 is cleared to the far plane, with each
    /// occluder box stamped over its screen rectangle at its farthest depth.
    ///
    /// Only exact for flat occluders facing the camera; that is what the demo
    /// and tests use it for.
    pub fn from_occluders(size: UVec2, view_projection: &Mat4, occluders: &[(Vec3, Vec3)]) -> Self {
        let mut depth = vec![FAR_DEPTH; (size.x * size.y) as usize];
        for (origin, extent) in occluders {
            let Some(rect) = project_box(view_projection, *origin, *extent, size) else {
                continue;
            };
            let x0 = rect.min.x.max(0.0).ceil() as u32;
            let y0 = rect.min.y.max(0.0).ceil() as u32;
            let x1 = (rect.max.x.floor() as u32).min(size.x);
            let y1 = (rect.max.y.floor() as u32).min(size.y);
            for y in y0..y1 {
                for x in x0..x1 {
                    let texel = &mut depth[(y * size.x + x) as usize];
                    *texel = texel.max(rect.farthest);
                }
            }
        }
        Self::from_depth(size, depth)
    }

    /// Size of level 0 in pixels.
    pub fn size(&self) -> UVec2 {
        self.levels[0].size
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Conservative visibility test for a box.
    ///
    /// Boxes crossing the camera plane and boxes entirely off-screen are
    /// reported visible.
    pub fn is_box_visible(&self, view_projection: &Mat4, origin: Vec3, extent: Vec3) -> bool {
        let size = self.size();
        let Some(rect) = project_box(view_projection, origin, extent, size) else {
            return true;
        };
        if rect.max.x < 0.0 || rect.max.y < 0.0 || rect.min.x >= size.x as f32 || rect.min.y >= size.y as f32 {
            return true;
        }
        let clamp_x = |v: f32| (v.max(0.0) as u32).min(size.x - 1);
        let clamp_y = |v: f32| (v.max(0.0) as u32).min(size.y - 1);
        let (mut x0, mut y0) = (clamp_x(rect.min.x), clamp_y(rect.min.y));
        let (mut x1, mut y1) = (clamp_x(rect.max.x), clamp_y(rect.max.y));

        let mut level = 0;
        while level + 1 < self.levels.len() && (x1 - x0 + 1 > MAX_FOOTPRINT || y1 - y0 + 1 > MAX_FOOTPRINT) {
            level += 1;
            x0 >>= 1;
            y0 >>= 1;
            x1 >>= 1;
            y1 >>= 1;
        }

        let mip = &self.levels[level];
        let mut farthest = f32::MAX;
        for y in y0..=y1.min(mip.size.y - 1) {
            for x in x0..=x1.min(mip.size.x - 1) {
                farthest = farthest.min(mip.texel(x, y));
            }
        }
        rect.nearest >= farthest
    }
}
