// Interactors (C9): stateful gesture-to-MVP converters.
//
// Each interactor owns its own "camera" parameterization (pan/zoom center,
// arcball quaternion, fly pose) and exposes it as an `Mvp`, recomputed from
// the parameters on every `mvp()` call the same way `Viewport::content_scale`
// recomputes rather than caches (§4.9: "on change, produces a new MVP").

pub mod arcball;
pub mod fly;
pub mod panzoom;

pub use arcball::Arcball;
pub use fly::Fly;
pub use panzoom::Panzoom;

use crate::gesture::Gesture;
use crate::viewport::Mvp;

/// A modifier-key bitmask, same representation as `input::router::Mods`.
pub type Mods = u32;

/// Common interface implemented by all interactors so the Canvas/Renderer
/// glue can drive any of them uniformly (§4.9: "signals the enclosing
/// scene to mark its command buffers dirty").
pub trait Interactor {
    /// Feed a gesture (click/drag/double-click). Returns `true` if the MVP
    /// changed as a result.
    fn on_gesture(&mut self, gesture: &Gesture, mods: Mods) -> bool;

    /// Feed a raw wheel event; gestures never carry wheel deltas since the
    /// gesture interpreter only uses wheel events to reset its own state.
    fn on_wheel(&mut self, dir: (f32, f32), cursor: (f32, f32)) -> bool;

    /// Feed a keyboard event (used by `Fly` for arrow-key translation).
    fn on_key(&mut self, _key: u32, _pressed: bool, _mods: Mods) -> bool {
        false
    }

    /// Reset to the interactor's initial pose.
    fn reset(&mut self);

    /// The interactor's current view as an MVP triple.
    fn mvp(&self) -> Mvp;
}
