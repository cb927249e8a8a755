// Panzoom interactor (§4.9): left-drag pans, wheel zooms around the
// cursor, double-click resets, and a held modifier locks panning to
// whichever axis has the larger displacement.

use super::{Interactor, Mods};
use crate::gesture::Gesture;
use crate::input::router::MouseButton;
use crate::viewport::Mvp;
use cgmath::{Matrix4, Vector3};

/// Modifier mask that locks panning to a single axis, matching the
/// convention used elsewhere in this crate for held-key modifiers.
pub const AXIS_LOCK_MOD: Mods = 0x1;

#[derive(Debug, Clone, Copy)]
pub struct Panzoom {
    center: (f32, f32),
    zoom: (f32, f32),
    initial_center: (f32, f32),
    initial_zoom: (f32, f32),
    drag_origin: Option<(f32, f32)>,
}

impl Panzoom {
    pub fn new() -> Self {
        Self {
            center: (0.0, 0.0),
            zoom: (1.0, 1.0),
            initial_center: (0.0, 0.0),
            initial_zoom: (1.0, 1.0),
            drag_origin: None,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        self.center
    }

    pub fn zoom(&self) -> (f32, f32) {
        self.zoom
    }
}

impl Default for Panzoom {
    fn default() -> Self {
        Self::new()
    }
}

impl Interactor for Panzoom {
    fn on_gesture(&mut self, gesture: &Gesture, mods: Mods) -> bool {
        match *gesture {
            Gesture::DragStart { button: MouseButton::Left, .. } => {
                self.drag_origin = Some(self.center);
                false
            }
            Gesture::Drag { shift, button: MouseButton::Left, .. } => {
                let origin = self.drag_origin.unwrap_or(self.center);
                let mut dx = shift.0 / self.zoom.0;
                let mut dy = shift.1 / self.zoom.1;
                if mods & AXIS_LOCK_MOD != 0 {
                    if dx.abs() >= dy.abs() {
                        dy = 0.0;
                    } else {
                        dx = 0.0;
                    }
                }
                self.center = (origin.0 - dx, origin.1 - dy);
                true
            }
            Gesture::DragStop { button: MouseButton::Left } => {
                self.drag_origin = None;
                false
            }
            Gesture::DoubleClick { .. } => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn on_wheel(&mut self, dir: (f32, f32), cursor: (f32, f32)) -> bool {
        // Zoom factor per wheel notch; keep the point under the cursor
        // fixed by adjusting the center along with the zoom level.
        let factor = (1.0 + dir.1 * 0.1).max(0.1);
        let before = self.center;
        self.zoom = (self.zoom.0 * factor, self.zoom.1 * factor);
        // Re-anchor center so `cursor` maps to the same world point before
        // and after the zoom change.
        self.center = (
            cursor.0 + (before.0 - cursor.0) / factor,
            cursor.1 + (before.1 - cursor.1) / factor,
        );
        true
    }

    fn reset(&mut self) {
        self.center = self.initial_center;
        self.zoom = self.initial_zoom;
        self.drag_origin = None;
    }

    fn mvp(&self) -> Mvp {
        let mut mvp = Mvp::default();
        mvp.view = Matrix4::from_translation(Vector3::new(-self.center.0, -self.center.1, 0.0));
        mvp.projection = Matrix4::from_nonuniform_scale(self.zoom.0, self.zoom.1, 1.0);
        mvp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_drag_pans_by_the_shift_scaled_by_zoom() {
        let mut p = Panzoom::new();
        p.on_gesture(
            &Gesture::DragStart { press_pos: (0.0, 0.0), button: MouseButton::Left },
            0,
        );
        p.on_gesture(
            &Gesture::Drag {
                press_pos: (0.0, 0.0),
                last_pos: (0.0, 0.0),
                shift: (10.0, 0.0),
                button: MouseButton::Left,
            },
            0,
        );
        assert_eq!(p.center(), (-10.0, 0.0));
    }

    #[test]
    fn double_click_resets_to_initial_pose() {
        let mut p = Panzoom::new();
        p.on_wheel((0.0, 1.0), (0.0, 0.0));
        assert_ne!(p.zoom(), (1.0, 1.0));
        p.on_gesture(&Gesture::DoubleClick { pos: (0.0, 0.0), button: MouseButton::Left }, 0);
        assert_eq!(p.zoom(), (1.0, 1.0));
        assert_eq!(p.center(), (0.0, 0.0));
    }

    #[test]
    fn axis_lock_keeps_only_the_dominant_shift_component() {
        let mut p = Panzoom::new();
        p.on_gesture(
            &Gesture::DragStart { press_pos: (0.0, 0.0), button: MouseButton::Left },
            0,
        );
        p.on_gesture(
            &Gesture::Drag {
                press_pos: (0.0, 0.0),
                last_pos: (0.0, 0.0),
                shift: (10.0, 3.0),
                button: MouseButton::Left,
            },
            AXIS_LOCK_MOD,
        );
        assert_eq!(p.center(), (-10.0, 0.0));
    }
}
