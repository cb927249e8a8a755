// Viewport and MVP types shared between interactors and graphics pipelines
// (§3 "MVP", "Viewport").

use cgmath::{Matrix4, SquareMatrix};

/// Model/view/projection matrix triple. Default = identity × identity ×
/// identity.
#[derive(Debug, Clone, Copy)]
pub struct Mvp {
    pub model: Matrix4<f32>,
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
}

impl Default for Mvp {
    fn default() -> Self {
        Self {
            model: Matrix4::identity(),
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
        }
    }
}

impl Mvp {
    /// Combined model-view-projection matrix, recomputed on demand rather
    /// than cached since interactors mutate model/view independently.
    pub fn combined(&self) -> Matrix4<f32> {
        self.projection * self.view * self.model
    }
}

/// A rectangular draw region, distinguishing framebuffer pixels from screen
/// pixels to support high-DPI displays (§3 "Viewport").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub offset: (i32, i32),
    pub shape: (u32, u32),
    pub margins: (u32, u32, u32, u32),
    pub screen_size: (u32, u32),
    pub framebuffer_size: (u32, u32),
    pub flags: u32,
}

impl Viewport {
    pub fn new(shape: (u32, u32)) -> Self {
        Self {
            offset: (0, 0),
            shape,
            margins: (0, 0, 0, 0),
            screen_size: shape,
            framebuffer_size: shape,
            flags: 0,
        }
    }

    /// Ratio between framebuffer pixels and screen pixels, e.g. 2.0 on a
    /// retina display where the window reports logical (screen) pixels.
    pub fn content_scale(&self) -> (f32, f32) {
        let (sw, sh) = self.screen_size;
        let (fw, fh) = self.framebuffer_size;
        let sx = if sw == 0 { 1.0 } else { fw as f32 / sw as f32 };
        let sy = if sh == 0 { 1.0 } else { fh as f32 / sh as f32 };
        (sx, sy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mvp_is_identity() {
        let mvp = Mvp::default();
        assert_eq!(mvp.combined(), Matrix4::identity());
    }

    #[test]
    fn content_scale_matches_framebuffer_ratio() {
        let mut vp = Viewport::new((800, 600));
        vp.framebuffer_size = (1600, 1200);
        assert_eq!(vp.content_scale(), (2.0, 2.0));
    }
}
