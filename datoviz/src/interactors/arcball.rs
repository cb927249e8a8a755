// Arcball interactor (§4.9): left-drag maps the cursor onto a unit sphere
// and accumulates a rotation, wheel changes the camera distance,
// right-drag pans the focus point, double-click resets.

use super::{Interactor, Mods};
use crate::gesture::Gesture;
use crate::input::router::MouseButton;
use crate::viewport::Mvp;
use cgmath::{InnerSpace, Matrix4, Quaternion, Rotation3, Vector3, Zero};

#[derive(Debug, Clone, Copy)]
pub struct Arcball {
    rotation: Quaternion<f32>,
    initial_rotation: Quaternion<f32>,
    distance: f32,
    initial_distance: f32,
    focus: Vector3<f32>,
    initial_focus: Vector3<f32>,
    viewport_size: (f32, f32),
    drag: Option<(Quaternion<f32>, Vector3<f32>)>,
    pan_origin: Option<Vector3<f32>>,
}

impl Arcball {
    pub fn new() -> Self {
        Self {
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            initial_rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            distance: 5.0,
            initial_distance: 5.0,
            focus: Vector3::zero(),
            initial_focus: Vector3::zero(),
            viewport_size: (800.0, 600.0),
            drag: None,
            pan_origin: None,
        }
    }

    pub fn set_viewport_size(&mut self, size: (f32, f32)) {
        self.viewport_size = size;
    }

    pub fn rotation(&self) -> Quaternion<f32> {
        self.rotation
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn focus(&self) -> Vector3<f32> {
        self.focus
    }

    /// Map a cursor position, in pixels, to a point on (or inside) the
    /// unit sphere centered on the viewport, per the classic Shoemake
    /// arcball projection.
    fn project_to_sphere(&self, pos: (f32, f32)) -> Vector3<f32> {
        let (w, h) = self.viewport_size;
        let radius = w.min(h) * 0.5;
        let cx = w * 0.5;
        let cy = h * 0.5;
        let x = (pos.0 - cx) / radius;
        let y = (cy - pos.1) / radius;
        let d2 = x * x + y * y;
        if d2 <= 1.0 {
            Vector3::new(x, y, (1.0 - d2).sqrt())
        } else {
            Vector3::new(x, y, 0.0).normalize()
        }
    }
}

impl Default for Arcball {
    fn default() -> Self {
        Self::new()
    }
}

impl Interactor for Arcball {
    fn on_gesture(&mut self, gesture: &Gesture, _mods: Mods) -> bool {
        match *gesture {
            Gesture::DragStart { press_pos, button: MouseButton::Left } => {
                self.drag = Some((self.rotation, self.project_to_sphere(press_pos)));
                false
            }
            Gesture::Drag { last_pos, button: MouseButton::Left, .. } => {
                if let Some((start_rot, start_vec)) = self.drag {
                    let cur_vec = self.project_to_sphere(last_pos);
                    let dot = start_vec.dot(cur_vec).clamp(-1.0, 1.0);
                    let axis = start_vec.cross(cur_vec);
                    let rotation = if axis.magnitude2() < 1e-12 {
                        Quaternion::new(1.0, 0.0, 0.0, 0.0)
                    } else {
                        Quaternion::from_axis_angle(axis.normalize(), cgmath::Rad(dot.acos()))
                    };
                    self.rotation = (rotation * start_rot).normalize();
                    true
                } else {
                    false
                }
            }
            Gesture::DragStop { button: MouseButton::Left } => {
                self.drag = None;
                false
            }
            Gesture::DragStart { button: MouseButton::Right, .. } => {
                self.pan_origin = Some(self.focus);
                false
            }
            Gesture::Drag { shift, button: MouseButton::Right, .. } => {
                if let Some(origin) = self.pan_origin {
                    self.focus = origin + Vector3::new(-shift.0 * 0.01, shift.1 * 0.01, 0.0);
                    true
                } else {
                    false
                }
            }
            Gesture::DragStop { button: MouseButton::Right } => {
                self.pan_origin = None;
                false
            }
            Gesture::DoubleClick { .. } => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn on_wheel(&mut self, dir: (f32, f32), _cursor: (f32, f32)) -> bool {
        self.distance = (self.distance * (1.0 - dir.1 * 0.1)).max(0.01);
        true
    }

    fn reset(&mut self) {
        self.rotation = self.initial_rotation;
        self.distance = self.initial_distance;
        self.focus = self.initial_focus;
        self.drag = None;
        self.pan_origin = None;
    }

    fn mvp(&self) -> Mvp {
        let mut mvp = Mvp::default();
        let rot: Matrix4<f32> = self.rotation.into();
        let translate = Matrix4::from_translation(-self.focus - Vector3::new(0.0, 0.0, self.distance));
        mvp.view = translate * rot;
        mvp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_adjusts_distance() {
        let mut a = Arcball::new();
        let before = a.distance();
        a.on_wheel((0.0, 1.0), (0.0, 0.0));
        assert!(a.distance() < before);
    }

    #[test]
    fn right_drag_pans_focus() {
        let mut a = Arcball::new();
        a.on_gesture(&Gesture::DragStart { press_pos: (0.0, 0.0), button: MouseButton::Right }, 0);
        a.on_gesture(
            &Gesture::Drag {
                press_pos: (0.0, 0.0),
                last_pos: (0.0, 0.0),
                shift: (10.0, 0.0),
                button: MouseButton::Right,
            },
            0,
        );
        assert_ne!(a.focus(), Vector3::zero());
    }

    #[test]
    fn left_drag_accumulates_rotation() {
        let mut a = Arcball::new();
        a.set_viewport_size((800.0, 600.0));
        a.on_gesture(&Gesture::DragStart { press_pos: (400.0, 300.0), button: MouseButton::Left }, 0);
        a.on_gesture(
            &Gesture::Drag {
                press_pos: (400.0, 300.0),
                last_pos: (500.0, 300.0),
                shift: (100.0, 0.0),
                button: MouseButton::Left,
            },
            0,
        );
        assert_ne!(a.rotation(), Quaternion::new(1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn double_click_resets() {
        let mut a = Arcball::new();
        a.on_wheel((0.0, 1.0), (0.0, 0.0));
        a.on_gesture(&Gesture::DoubleClick { pos: (0.0, 0.0), button: MouseButton::Left }, 0);
        assert_eq!(a.distance(), 5.0);
    }
}
