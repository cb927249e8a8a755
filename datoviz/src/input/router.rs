// Input Router (C7).
//
// Direct transcription of `original_source/src/input/input_router.c`: five
// independent subscription vectors (pointer, keyboard, resize, scale, and
// a union-event list), each dispatched by cloning the current subscriber
// list into a local buffer before invoking callbacks so a callback may
// freely add/remove subscriptions mid-dispatch without invalidating the
// iteration (§4.7 "Emission discipline"). The C uses `_ensure_capacity` +
// `memcpy`; Rust gets the same behavior for free from `Vec::clone`.
//
// Two-stage dispatch: `emit_pointer` (etc) first dispatches to the typed
// `pointer` subscriber list, then wraps the event into a `UnionEvent` and
// dispatches to the union list. `emit_event` dispatches *only* to the union
// list — it does not get re-wrapped, since it already is a union event.
// This asymmetry is in the C and is preserved exactly.

use std::sync::Mutex;

pub type Mods = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEventKind {
    Press,
    Release,
    Move,
    Wheel { dir: (f32, f32) },
    DragStart { press_pos: (f32, f32) },
    Drag {
        press_pos: (f32, f32),
        last_pos: (f32, f32),
        shift: (f32, f32),
        is_press_valid: bool,
    },
    DragStop,
    Click { pos: (f32, f32) },
    DoubleClick { pos: (f32, f32) },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub pos: (f32, f32),
    pub button: MouseButton,
    pub mods: Mods,
    pub content_scale: (f32, f32),
    pub timestamp_ns: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyboardEvent {
    pub key: u32,
    pub pressed: bool,
    pub mods: Mods,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeEvent {
    pub framebuffer_width: u32,
    pub framebuffer_height: u32,
    pub window_width: u32,
    pub window_height: u32,
    pub content_scale: (f32, f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleEvent {
    pub content_scale: (f32, f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Pointer(PointerEvent),
    Keyboard(KeyboardEvent),
    Resize(ResizeEvent),
    Scale(ScaleEvent),
}

type PointerCb = std::sync::Arc<dyn Fn(&PointerEvent) + Send + Sync>;
type KeyboardCb = std::sync::Arc<dyn Fn(&KeyboardEvent) + Send + Sync>;
type ResizeCb = std::sync::Arc<dyn Fn(&ResizeEvent) + Send + Sync>;
type ScaleCb = std::sync::Arc<dyn Fn(&ScaleEvent) + Send + Sync>;
type EventCb = std::sync::Arc<dyn Fn(&InputEvent) + Send + Sync>;

/// A subscription token, returned by `subscribe_*` so callers can
/// `unsubscribe` without needing to compare closures for equality (the C
/// compares `{callback, user_data}` pointer pairs; we use a generation
/// counter instead, which is the idiomatic Rust equivalent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subs<T> {
    next_id: u64,
    list: Vec<(SubscriptionId, T)>,
}

impl<T: Clone> Subs<T> {
    fn new() -> Self {
        Self {
            next_id: 1,
            list: Vec::new(),
        }
    }

    fn subscribe(&mut self, cb: T) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.list.push((id, cb));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.list.retain(|(existing, _)| *existing != id);
    }

    /// Snapshot-before-iterate: clone the subscriber list, then let the
    /// caller invoke each callback against the snapshot. A subscription
    /// added during `f`'s execution cannot appear in this snapshot; one
    /// removed during its own callback still finishes that invocation,
    /// since we already hold a clone of the entry.
    fn snapshot(&self) -> Vec<(SubscriptionId, T)> {
        self.list.clone()
    }
}

struct RouterState {
    pointer: Subs<PointerCb>,
    keyboard: Subs<KeyboardCb>,
    resize: Subs<ResizeCb>,
    scale: Subs<ScaleCb>,
    event: Subs<EventCb>,
}

/// Thread-safe subscription fan-out for pointer/keyboard/resize/scale
/// events, plus a union-event view (§4.7).
pub struct InputRouter {
    state: Mutex<RouterState>,
}

impl InputRouter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RouterState {
                pointer: Subs::new(),
                keyboard: Subs::new(),
                resize: Subs::new(),
                scale: Subs::new(),
                event: Subs::new(),
            }),
        }
    }

    pub fn subscribe_pointer(&self, cb: PointerCb) -> SubscriptionId {
        self.state.lock().unwrap().pointer.subscribe(cb)
    }
    pub fn unsubscribe_pointer(&self, id: SubscriptionId) {
        self.state.lock().unwrap().pointer.unsubscribe(id)
    }

    pub fn subscribe_keyboard(&self, cb: KeyboardCb) -> SubscriptionId {
        self.state.lock().unwrap().keyboard.subscribe(cb)
    }
    pub fn unsubscribe_keyboard(&self, id: SubscriptionId) {
        self.state.lock().unwrap().keyboard.unsubscribe(id)
    }

    pub fn subscribe_resize(&self, cb: ResizeCb) -> SubscriptionId {
        self.state.lock().unwrap().resize.subscribe(cb)
    }
    pub fn unsubscribe_resize(&self, id: SubscriptionId) {
        self.state.lock().unwrap().resize.unsubscribe(id)
    }

    pub fn subscribe_scale(&self, cb: ScaleCb) -> SubscriptionId {
        self.state.lock().unwrap().scale.subscribe(cb)
    }
    pub fn unsubscribe_scale(&self, id: SubscriptionId) {
        self.state.lock().unwrap().scale.unsubscribe(id)
    }

    pub fn subscribe_event(&self, cb: EventCb) -> SubscriptionId {
        self.state.lock().unwrap().event.subscribe(cb)
    }
    pub fn unsubscribe_event(&self, id: SubscriptionId) {
        self.state.lock().unwrap().event.unsubscribe(id)
    }

    /// Dispatch to the typed pointer subscribers, then re-wrap into a
    /// union event for the union subscribers.
    pub fn emit_pointer(&self, event: PointerEvent) {
        let snapshot = self.state.lock().unwrap().pointer.snapshot();
        for (_, cb) in &snapshot {
            cb(&event);
        }
        self.emit_union(InputEvent::Pointer(event));
    }

    pub fn emit_keyboard(&self, event: KeyboardEvent) {
        let snapshot = self.state.lock().unwrap().keyboard.snapshot();
        for (_, cb) in &snapshot {
            cb(&event);
        }
        self.emit_union(InputEvent::Keyboard(event));
    }

    pub fn emit_resize(&self, event: ResizeEvent) {
        let snapshot = self.state.lock().unwrap().resize.snapshot();
        for (_, cb) in &snapshot {
            cb(&event);
        }
        self.emit_union(InputEvent::Resize(event));
    }

    pub fn emit_scale(&self, event: ScaleEvent) {
        let snapshot = self.state.lock().unwrap().scale.snapshot();
        for (_, cb) in &snapshot {
            cb(&event);
        }
        self.emit_union(InputEvent::Scale(event));
    }

    fn emit_union(&self, event: InputEvent) {
        let snapshot = self.state.lock().unwrap().event.snapshot();
        for (_, cb) in &snapshot {
            cb(&event);
        }
    }

    /// Dispatches only to the union subscribers, with no re-wrapping —
    /// the asymmetry `input_router.c` has relative to `emit_pointer` et al.
    pub fn emit_event(&self, event: InputEvent) {
        self.emit_union(event);
    }
}

impl Default for InputRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pointer_event() -> PointerEvent {
        PointerEvent {
            kind: PointerEventKind::Move,
            pos: (1.0, 2.0),
            button: MouseButton::None,
            mods: 0,
            content_scale: (1.0, 1.0),
            timestamp_ns: 0,
        }
    }

    #[test]
    fn typed_emit_also_reaches_union_subscribers() {
        let router = InputRouter::new();
        let typed_hits = Arc::new(AtomicUsize::new(0));
        let union_hits = Arc::new(AtomicUsize::new(0));

        let th = typed_hits.clone();
        router.subscribe_pointer(Arc::new(move |_| {
            th.fetch_add(1, Ordering::SeqCst);
        }));
        let uh = union_hits.clone();
        router.subscribe_event(Arc::new(move |_| {
            uh.fetch_add(1, Ordering::SeqCst);
        }));

        router.emit_pointer(pointer_event());

        assert_eq!(typed_hits.load(Ordering::SeqCst), 1);
        assert_eq!(union_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emit_event_skips_typed_subscribers() {
        let router = InputRouter::new();
        let typed_hits = Arc::new(AtomicUsize::new(0));
        let union_hits = Arc::new(AtomicUsize::new(0));

        let th = typed_hits.clone();
        router.subscribe_pointer(Arc::new(move |_| {
            th.fetch_add(1, Ordering::SeqCst);
        }));
        let uh = union_hits.clone();
        router.subscribe_event(Arc::new(move |_| {
            uh.fetch_add(1, Ordering::SeqCst);
        }));

        router.emit_event(InputEvent::Pointer(pointer_event()));

        assert_eq!(typed_hits.load(Ordering::SeqCst), 0);
        assert_eq!(union_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_added_during_emit_is_not_invoked_this_round() {
        let router = std::sync::Arc::new(InputRouter::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let router_clone = router.clone();
        let hits_clone = hits.clone();
        router.subscribe_pointer(Arc::new(move |_| {
            let h = hits_clone.clone();
            router_clone.subscribe_pointer(Arc::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        router.emit_pointer(pointer_event());
        assert_eq!(hits.load(Ordering::SeqCst), 0, "added mid-dispatch should not fire this round");

        router.emit_pointer(pointer_event());
        assert_eq!(hits.load(Ordering::SeqCst), 1, "should fire on the next emit");
    }

    #[test]
    fn unsubscribe_stops_future_dispatch() {
        let router = InputRouter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let id = router.subscribe_pointer(Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        router.emit_pointer(pointer_event());
        router.unsubscribe_pointer(id);
        router.emit_pointer(pointer_event());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
