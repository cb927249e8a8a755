// Gesture Interpreter (C8).
//
// Direct transcription of `original_source/src/input/pointer.c`'s
// `DvzMouseState` state machine (`_after_press`/`_after_move`/
// `_after_release`/`_after_wheel`), not a reinterpretation of the §4.8
// prose table alone: the table and the code agree on the happy path, but
// the code pins the edge cases used below (double-click only fires on the
// `release` out of `click-press`, never on the `press`; a wheel or move
// while in `double-click` force-exits to `release` rather than swallowing
// the event silently forever).

use crate::input::router::{MouseButton, PointerEvent, PointerEventKind};
use cat5_utils::log;

/// Maximum press-to-release gap, in seconds, that still counts as a click.
pub const CLICK_MAX_DELAY: f64 = 0.25;
/// Maximum cursor displacement, in pixels, that still counts as a click
/// (i.e. the drag-start threshold).
pub const CLICK_MAX_SHIFT: f32 = 5.0;
/// Maximum press-to-press gap, in seconds, that arms a double-click.
/// `pointer.c`'s `_after_press` gates this on `time - last_press` (the
/// previous press, not the intervening release/click), so a slow
/// press-to-release hold on the first click can miss the window even if
/// the second press follows the release almost instantly.
pub const DOUBLE_CLICK_MAX_DELAY: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Release,
    Press,
    Click,
    ClickPress,
    Dragging,
    DoubleClick,
}

/// A higher-level pointer gesture, derived from the raw press/move/release/
/// wheel stream by the state machine below.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Press { pos: (f32, f32), button: MouseButton },
    Release { pos: (f32, f32), button: MouseButton },
    Click { pos: (f32, f32), button: MouseButton },
    DoubleClick { pos: (f32, f32), button: MouseButton },
    DragStart { press_pos: (f32, f32), button: MouseButton },
    Drag {
        press_pos: (f32, f32),
        last_pos: (f32, f32),
        shift: (f32, f32),
        button: MouseButton,
    },
    DragStop { button: MouseButton },
}

fn shift(a: (f32, f32), b: (f32, f32)) -> (f32, f32) {
    (a.0 - b.0, a.1 - b.1)
}

fn magnitude(v: (f32, f32)) -> f32 {
    (v.0 * v.0 + v.1 * v.1).sqrt()
}

/// Per-pointer gesture state, one instance per input device (a canvas
/// typically owns a single instance for "the mouse").
pub struct GestureInterpreter {
    state: GestureState,
    button: MouseButton,
    press_pos: (f32, f32),
    last_pos: (f32, f32),
    press_time: f64,
}

impl GestureInterpreter {
    pub fn new() -> Self {
        Self {
            state: GestureState::Release,
            button: MouseButton::None,
            press_pos: (0.0, 0.0),
            last_pos: (0.0, 0.0),
            press_time: 0.0,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    /// Feed one raw pointer event through the state machine. `now` is the
    /// event's timestamp in seconds (see `utils::timing::get_current_seconds`).
    /// Returns the gestures emitted by this transition, in order; most
    /// transitions emit zero or one, but a drag-start emits the drag-start
    /// alongside nothing else and a `click-press -> dragging` transition
    /// (a quick second press immediately followed by a big move) still
    /// only emits `drag-start`, matching `pointer.c`.
    pub fn feed(&mut self, event: &PointerEvent, now: f64) -> Vec<Gesture> {
        match event.kind {
            PointerEventKind::Press => self.after_press(event, now),
            PointerEventKind::Release => self.after_release(event, now),
            PointerEventKind::Move => self.after_move(event),
            PointerEventKind::Wheel { .. } => self.after_wheel(),
            // DragStart/Drag/DragStop/Click/DoubleClick are gesture-level
            // events already, not raw input; the interpreter only consumes
            // the raw kinds above. Anything else is ignored here.
            _ => Vec::new(),
        }
    }

    fn after_press(&mut self, event: &PointerEvent, now: f64) -> Vec<Gesture> {
        match self.state {
            GestureState::Release => {
                self.state = GestureState::Press;
                self.button = event.button;
                self.press_pos = event.pos;
                self.last_pos = event.pos;
                self.press_time = now;
                vec![Gesture::Press { pos: event.pos, button: self.button }]
            }
            GestureState::Click => {
                self.button = event.button;
                // `self.press_time` still holds the *previous* press's
                // timestamp here (only `after_press` ever updates it), so
                // this reproduces `pointer.c`'s `delay = time - last_press`
                // gate rather than gating on the intervening release/click.
                if now - self.press_time <= DOUBLE_CLICK_MAX_DELAY {
                    self.state = GestureState::ClickPress;
                    self.press_pos = event.pos;
                    self.last_pos = event.pos;
                    self.press_time = now;
                    vec![Gesture::Press { pos: event.pos, button: self.button }]
                } else {
                    // Too slow to arm a double-click; treat as a fresh press.
                    self.state = GestureState::Press;
                    self.press_pos = event.pos;
                    self.last_pos = event.pos;
                    self.press_time = now;
                    vec![Gesture::Press { pos: event.pos, button: self.button }]
                }
            }
            GestureState::DoubleClick => {
                // pointer.c: a press while settling a double-click force-exits
                // back to release and swallows the event.
                self.state = GestureState::Release;
                Vec::new()
            }
            _ => {
                log::warn!("gesture: unexpected press in state {:?}", self.state);
                Vec::new()
            }
        }
    }

    fn after_move(&mut self, event: &PointerEvent) -> Vec<Gesture> {
        match self.state {
            GestureState::Press | GestureState::ClickPress => {
                if magnitude(shift(event.pos, self.press_pos)) > CLICK_MAX_SHIFT {
                    self.state = GestureState::Dragging;
                    self.last_pos = event.pos;
                    vec![Gesture::DragStart {
                        press_pos: self.press_pos,
                        button: self.button,
                    }]
                } else {
                    Vec::new()
                }
            }
            GestureState::Dragging => {
                let s = shift(event.pos, self.press_pos);
                let prev = self.last_pos;
                self.last_pos = event.pos;
                vec![Gesture::Drag {
                    press_pos: self.press_pos,
                    last_pos: prev,
                    shift: s,
                    button: self.button,
                }]
            }
            GestureState::DoubleClick => {
                // pointer.c: a move while settling a double-click also
                // force-exits to release.
                self.state = GestureState::Release;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn after_release(&mut self, event: &PointerEvent, now: f64) -> Vec<Gesture> {
        match self.state {
            GestureState::Press => {
                if now - self.press_time <= CLICK_MAX_DELAY {
                    self.state = GestureState::Click;
                    vec![Gesture::Click { pos: event.pos, button: self.button }]
                } else {
                    self.state = GestureState::Release;
                    vec![Gesture::Release { pos: event.pos, button: self.button }]
                }
            }
            GestureState::ClickPress => {
                // The release out of click-press is what actually emits the
                // double-click, not the press that armed it.
                self.state = GestureState::DoubleClick;
                vec![Gesture::DoubleClick { pos: event.pos, button: self.button }]
            }
            GestureState::Dragging => {
                self.state = GestureState::Release;
                vec![Gesture::DragStop { button: self.button }]
            }
            _ => Vec::new(),
        }
    }

    fn after_wheel(&mut self) -> Vec<Gesture> {
        if self.state == GestureState::DoubleClick {
            // pointer.c: wheel events force-exit a settling double-click.
            self.state = GestureState::Release;
        }
        Vec::new()
    }
}

impl Default for GestureInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(pos: (f32, f32)) -> PointerEvent {
        PointerEvent {
            kind: PointerEventKind::Press,
            pos,
            button: MouseButton::Left,
            mods: 0,
            content_scale: (1.0, 1.0),
            timestamp_ns: 0,
        }
    }

    fn release(pos: (f32, f32)) -> PointerEvent {
        PointerEvent {
            kind: PointerEventKind::Release,
            pos,
            button: MouseButton::Left,
            mods: 0,
            content_scale: (1.0, 1.0),
            timestamp_ns: 0,
        }
    }

    fn mv(pos: (f32, f32)) -> PointerEvent {
        PointerEvent {
            kind: PointerEventKind::Move,
            pos,
            button: MouseButton::Left,
            mods: 0,
            content_scale: (1.0, 1.0),
            timestamp_ns: 0,
        }
    }

    #[test]
    fn quick_small_release_is_a_click() {
        let mut g = GestureInterpreter::new();
        assert_eq!(
            g.feed(&press((100.0, 100.0)), 0.0),
            vec![Gesture::Press { pos: (100.0, 100.0), button: MouseButton::Left }]
        );
        assert_eq!(
            g.feed(&release((102.0, 101.0)), 0.10),
            vec![Gesture::Click { pos: (102.0, 101.0), button: MouseButton::Left }]
        );
        assert_eq!(g.state(), GestureState::Click);
    }

    #[test]
    fn large_move_after_press_starts_a_drag() {
        let mut g = GestureInterpreter::new();
        g.feed(&press((100.0, 100.0)), 0.0);
        assert_eq!(
            g.feed(&mv((130.0, 100.0)), 0.01),
            vec![Gesture::DragStart { press_pos: (100.0, 100.0), button: MouseButton::Left }]
        );
        assert_eq!(g.state(), GestureState::Dragging);
        let drag = g.feed(&mv((140.0, 100.0)), 0.02);
        assert_eq!(
            drag,
            vec![Gesture::Drag {
                press_pos: (100.0, 100.0),
                last_pos: (130.0, 100.0),
                shift: (40.0, 0.0),
                button: MouseButton::Left,
            }]
        );
        assert_eq!(
            g.feed(&release((140.0, 100.0)), 0.03),
            vec![Gesture::DragStop { button: MouseButton::Left }]
        );
        assert_eq!(g.state(), GestureState::Release);
    }

    #[test]
    fn click_then_quick_press_release_is_double_click() {
        let mut g = GestureInterpreter::new();
        g.feed(&press((10.0, 10.0)), 0.0);
        g.feed(&release((10.0, 10.0)), 0.05);
        assert_eq!(g.state(), GestureState::Click);

        g.feed(&press((10.0, 10.0)), 0.10);
        assert_eq!(g.state(), GestureState::ClickPress);

        let emitted = g.feed(&release((10.0, 10.0)), 0.12);
        assert_eq!(
            emitted,
            vec![Gesture::DoubleClick { pos: (10.0, 10.0), button: MouseButton::Left }]
        );
        assert_eq!(g.state(), GestureState::DoubleClick);
    }

    #[test]
    fn slow_hold_before_click_does_not_arm_double_click() {
        // press@0, release@0.24 (just inside CLICK_MAX_DELAY -> a click),
        // second press@0.3: pointer.c gates the double-click window on
        // press-to-press delay (0.3 - 0.0 = 0.3 > 0.2), not click-to-press
        // (0.3 - 0.24 = 0.06 <= 0.2), so this must NOT arm a double-click.
        let mut g = GestureInterpreter::new();
        g.feed(&press((10.0, 10.0)), 0.0);
        g.feed(&release((10.0, 10.0)), 0.24);
        assert_eq!(g.state(), GestureState::Click);

        g.feed(&press((10.0, 10.0)), 0.3);
        assert_eq!(g.state(), GestureState::Press);
    }

    #[test]
    fn slow_release_after_press_is_a_plain_release_not_a_click() {
        let mut g = GestureInterpreter::new();
        g.feed(&press((0.0, 0.0)), 0.0);
        let emitted = g.feed(&release((0.0, 0.0)), 1.0);
        assert_eq!(
            emitted,
            vec![Gesture::Release { pos: (0.0, 0.0), button: MouseButton::Left }]
        );
        assert_eq!(g.state(), GestureState::Release);
    }

    #[test]
    fn wheel_force_exits_double_click_settling() {
        let mut g = GestureInterpreter::new();
        g.feed(&press((0.0, 0.0)), 0.0);
        g.feed(&release((0.0, 0.0)), 0.01);
        g.feed(&press((0.0, 0.0)), 0.02);
        g.feed(&release((0.0, 0.0)), 0.03);
        assert_eq!(g.state(), GestureState::DoubleClick);

        let wheel = PointerEvent {
            kind: PointerEventKind::Wheel { dir: (0.0, 1.0) },
            pos: (0.0, 0.0),
            button: MouseButton::None,
            mods: 0,
            content_scale: (1.0, 1.0),
            timestamp_ns: 0,
        };
        g.feed(&wheel, 0.04);
        assert_eq!(g.state(), GestureState::Release);
    }
}
