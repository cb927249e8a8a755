// Datoviz renderer crate root.
//
// Wires together the Object Registry (C1), Request Batch (C2), Resource
// Manager (C3), Pipeline Cache (C4), Command Recorder (C5), Canvas/Frame
// Loop (C6), Input Router (C7), Gesture Interpreter (C8) and Interactors
// (C9) behind a single `Renderer` facade.
//
// Austin Shafer - 2024

extern crate utils as cat5_utils;

pub mod batch;
pub mod config;
pub mod deletion_queue;
pub mod descpool;
pub mod device;
pub mod error;
pub mod gesture;
pub mod input;
pub mod instance;
pub mod interactors;
pub mod pipeline;
pub mod platform;
pub mod recorder;
pub mod registry;
pub mod renderer;
pub mod request;
pub mod resources;
pub mod viewport;

pub mod backend;
pub mod canvas;
pub mod frame;
#[cfg(feature = "sdl")]
pub mod sdl_backend;

pub use batch::{Batch, PrintFlags};
pub use config::{
    CanvasConfig, CanvasConfigBuilder, ColorFormat, Config, Host, PresentMode, RendererConfig,
    RendererConfigBuilder,
};
pub use deletion_queue::DeletionQueue;
pub use device::Device;
pub use error::{default_error_callback, DvzError, ErrorCallback, Result};
pub use gesture::{Gesture, GestureInterpreter, GestureState};
pub use input::router::{
    InputEvent, InputRouter, KeyboardEvent, MouseButton, PointerEvent, PointerEventKind,
    ResizeEvent, ScaleEvent, SubscriptionId,
};
pub use instance::Instance;
pub use registry::{ObjectStatus, ObjectType, Registry};
pub use renderer::Renderer;
pub use request::{Action, BufferType, Content, Request, PROTOCOL_VERSION};
pub use viewport::{Mvp, Viewport};

/// Marker trait for resources that the `Device`'s deletion queue can hold
/// until their owning timeline point has been signaled. Anything that can
/// be dropped qualifies; the trait exists purely so the queue can name a
/// trait object (`Box<dyn Droppable + Send + Sync>`) without tying itself
/// to a concrete resource type.
pub trait Droppable {}
impl<T> Droppable for T {}
