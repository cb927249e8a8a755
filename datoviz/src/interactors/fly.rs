// Fly interactor (§4.9): left-drag updates yaw/pitch from the displacement
// relative to the press position, right-drag moves horizontally/vertically
// in camera space, wheel translates forward/backward, arrow keys add
// translation, double-click resets to the captured initial pose.
//
// The mouse-look formula and pitch clamp are transcribed from
// `original_source/src/scene/fly.c`'s `dvz_fly_mouse`/`dvz_fly_rotate`:
// `dx = DVZ_FLY_MOUSE_SPEED * (pos - press_pos) / viewport_size`, rotated
// into `yaw`/`pitch` by a factor of `PI`, with pitch clamped to
// `±(M_PI_2 - 0.1)`.

use super::{Interactor, Mods};
use crate::gesture::Gesture;
use crate::input::router::MouseButton;
use crate::viewport::Mvp;
use cgmath::{Matrix3, Matrix4, Rad, Vector3};

// GLFW key codes for the arrow keys, matched for plausibility since this
// crate does not otherwise define a keymap of its own.
pub const KEY_RIGHT: u32 = 262;
pub const KEY_LEFT: u32 = 263;
pub const KEY_DOWN: u32 = 264;
pub const KEY_UP: u32 = 265;

// `DVZ_FLY_MOUSE_SPEED` in `fly.c`.
const MOUSE_SPEED: f32 = 0.5;
// `M_PI_2 - 0.1` in `fly.c`'s `dvz_fly_rotate` pitch clamp.
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.1;

fn wrap_roll(roll: f32) -> f32 {
    let two_pi = std::f32::consts::TAU;
    let mut r = roll % two_pi;
    if r <= -std::f32::consts::PI {
        r += two_pi;
    } else if r > std::f32::consts::PI {
        r -= two_pi;
    }
    r
}

#[derive(Debug, Clone, Copy)]
pub struct Fly {
    position: Vector3<f32>,
    yaw: f32,
    pitch: f32,
    roll: f32,
    initial: (Vector3<f32>, f32, f32, f32),
    /// Negates drag-derived yaw/pitch deltas when set.
    pub invert_mouse: bool,
    /// Normalizes drag displacement into the mouse-look formula; default
    /// 800x600 matches `dvz_fly()`'s own default (`fly.c`).
    viewport_size: (f32, f32),
    drag_origin: Option<(f32, f32, f32)>,
    pan_origin: Option<Vector3<f32>>,
    held_keys: [bool; 4],
}

impl Fly {
    pub fn new(position: Vector3<f32>, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch,
            roll: 0.0,
            initial: (position, yaw, pitch, 0.0),
            invert_mouse: false,
            viewport_size: (800.0, 600.0),
            drag_origin: None,
            pan_origin: None,
            held_keys: [false; 4],
        }
    }

    /// `dvz_fly_resize`: update the viewport size the mouse-look formula
    /// normalizes drag displacement against.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport_size = (width, height);
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn roll(&self) -> f32 {
        self.roll
    }

    fn basis(&self) -> (Vector3<f32>, Vector3<f32>, Vector3<f32>) {
        let rot = Matrix3::from_angle_y(Rad(self.yaw)) * Matrix3::from_angle_x(Rad(self.pitch));
        let forward = rot * Vector3::new(0.0, 0.0, -1.0);
        let right = rot * Vector3::new(1.0, 0.0, 0.0);
        let up = rot * Vector3::new(0.0, 1.0, 0.0);
        (forward, right, up)
    }

    /// Advance the fly-cam by one tick's worth of held-arrow-key
    /// translation. Call once per frame from the Canvas frame loop; has no
    /// effect if no arrow key is currently held.
    pub fn tick(&mut self, dt: f32, speed: f32) -> bool {
        if self.held_keys.iter().all(|h| !h) {
            return false;
        }
        let (forward, right, _up) = self.basis();
        let mut delta = Vector3::new(0.0, 0.0, 0.0);
        if self.held_keys[0] {
            delta -= right;
        }
        if self.held_keys[1] {
            delta += right;
        }
        if self.held_keys[2] {
            delta -= forward;
        }
        if self.held_keys[3] {
            delta += forward;
        }
        self.position += delta * speed * dt;
        true
    }
}

impl Interactor for Fly {
    fn on_gesture(&mut self, gesture: &Gesture, _mods: Mods) -> bool {
        match *gesture {
            Gesture::DragStart { button: MouseButton::Left, .. } => {
                self.drag_origin = Some((self.yaw, self.pitch, 0.0));
                false
            }
            Gesture::Drag { shift, button: MouseButton::Left, .. } => {
                if let Some((yaw0, pitch0, _)) = self.drag_origin {
                    let sign = if self.invert_mouse { -1.0 } else { 1.0 };
                    let pi = std::f32::consts::PI;
                    let dx = MOUSE_SPEED * shift.0 / self.viewport_size.0;
                    let dy = MOUSE_SPEED * shift.1 / self.viewport_size.1;
                    self.yaw = yaw0 + sign * dx * pi;
                    self.pitch = (pitch0 - sign * dy * pi).clamp(-PITCH_LIMIT, PITCH_LIMIT);
                    true
                } else {
                    false
                }
            }
            Gesture::DragStop { button: MouseButton::Left } => {
                self.drag_origin = None;
                false
            }
            Gesture::DragStart { button: MouseButton::Right, .. } => {
                self.pan_origin = Some(self.position);
                false
            }
            Gesture::Drag { shift, button: MouseButton::Right, .. } => {
                if let Some(origin) = self.pan_origin {
                    let (_, right, up) = self.basis();
                    self.position = origin + right * (shift.0 * 0.01) + up * (-shift.1 * 0.01);
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
        let (forward, _right, _up) = self.basis();
        self.position += forward * dir.1 * 0.5;
        true
    }

    fn on_key(&mut self, key: u32, pressed: bool, _mods: Mods) -> bool {
        let idx = match key {
            KEY_LEFT => 0,
            KEY_RIGHT => 1,
            KEY_DOWN => 2,
            KEY_UP => 3,
            _ => return false,
        };
        self.held_keys[idx] = pressed;
        false
    }

    fn reset(&mut self) {
        let (pos, yaw, pitch, roll) = self.initial;
        self.position = pos;
        self.yaw = yaw;
        self.pitch = pitch;
        self.roll = wrap_roll(roll);
        self.drag_origin = None;
        self.pan_origin = None;
        self.held_keys = [false; 4];
    }

    fn mvp(&self) -> Mvp {
        let mut mvp = Mvp::default();
        let rot = Matrix3::from_angle_y(Rad(-self.yaw))
            * Matrix3::from_angle_x(Rad(-self.pitch))
            * Matrix3::from_angle_z(Rad(self.roll));
        mvp.view = Matrix4::from(rot) * Matrix4::from_translation(-self.position);
        mvp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_is_clamped_near_poles() {
        let mut f = Fly::new(Vector3::new(0.0, 0.0, 0.0), 0.0, 0.0);
        f.on_gesture(&Gesture::DragStart { press_pos: (0.0, 0.0), button: MouseButton::Left }, 0);
        f.on_gesture(
            &Gesture::Drag {
                press_pos: (0.0, 0.0),
                last_pos: (0.0, 0.0),
                shift: (0.0, -100000.0),
                button: MouseButton::Left,
            },
            0,
        );
        assert!(f.pitch() <= PITCH_LIMIT);
        assert!(f.pitch() >= -PITCH_LIMIT);
    }

    #[test]
    fn roll_wraps_into_pi_range() {
        assert!((wrap_roll(std::f32::consts::PI * 3.0) - std::f32::consts::PI).abs() < 1e-4);
        assert!((wrap_roll(-std::f32::consts::PI * 3.0) + std::f32::consts::PI).abs() < 1e-3);
    }

    #[test]
    fn double_click_resets_pose() {
        let mut f = Fly::new(Vector3::new(1.0, 2.0, 3.0), 0.5, 0.2);
        f.on_wheel((0.0, 1.0), (0.0, 0.0));
        assert_ne!(f.position(), Vector3::new(1.0, 2.0, 3.0));
        f.on_gesture(&Gesture::DoubleClick { pos: (0.0, 0.0), button: MouseButton::Left }, 0);
        assert_eq!(f.position(), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(f.yaw(), 0.5);
        assert_eq!(f.pitch(), 0.2);
    }

    #[test]
    fn arrow_keys_translate_over_time() {
        let mut f = Fly::new(Vector3::new(0.0, 0.0, 0.0), 0.0, 0.0);
        f.on_key(KEY_UP, true, 0);
        let moved = f.tick(1.0, 1.0);
        assert!(moved);
        assert_ne!(f.position(), Vector3::new(0.0, 0.0, 0.0));
    }
}
