// Windowing backends.
//
// A `Backend` owns a swapchain's images and knows how to present them; the
// Canvas/Frame Loop (C6) drives any backend through this one trait so
// `glfw`/`qt`/headless can share the same frame machinery. Grounded on
// `thundr::display`'s `Swapchain` trait and its headless implementation.
//
// Austin Shafer - 2024

use crate::error::{DvzError, Result};
use crate::device::Device;
use ash::vk;
use std::sync::Arc;

/// Per-backend surface state: the swapchain images/views the Canvas
/// renders into, plus the index of the image currently acquired.
pub struct SurfaceState {
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub resolution: vk::Extent2D,
    pub format: vk::Format,
    pub current_image: u32,
}

/// Common interface for a windowing/presentation backend (§4.6's
/// "window-handle" half of a Canvas). `probe` picks a queue family that
/// can present; `create`/`destroy` manage swapchain lifetime; `poll`
/// drains OS events into the attached `InputRouter`; `request_frame`
/// acquires the next image; `surface` exposes the current image set.
pub trait Backend: Send + Sync {
    /// Select a graphics+present-capable queue family for this backend.
    fn probe(&self) -> Result<u32>;

    /// (Re)create the swapchain at its current size.
    fn create(&mut self, state: &mut SurfaceState) -> Result<()>;

    fn destroy(&mut self, state: &mut SurfaceState);

    /// Pump OS/windowing events. Implementations that drive an
    /// `InputRouter` should call its `emit_*` methods here.
    fn poll(&mut self);

    /// Acquire the next swapchain image into `state.current_image`.
    /// Returns `DvzError::WaitSurface` if the surface is transiently
    /// unavailable (e.g. zero extent) rather than a hard error.
    fn request_frame(&mut self, state: &mut SurfaceState) -> Result<()>;

    /// Present the currently acquired image.
    fn present(&mut self, state: &SurfaceState) -> Result<()>;

    /// True if the backend's surface was resized since the last
    /// `request_frame` (drives the swapchain `ready -> out-of-date`
    /// transition in §4.6).
    fn was_resized(&mut self) -> bool;
}

const HEADLESS_WIDTH: u32 = 640;
const HEADLESS_HEIGHT: u32 = 480;
const HEADLESS_IMAGE_COUNT: usize = 2;

/// Offscreen backend used for testing and server-side rendering: owns a
/// small ring of linearly-tiled images and never actually presents them.
/// Grounded directly on `thundr::display::headless::HeadlessSwapchain`.
pub struct HeadlessBackend {
    dev: Arc<Device>,
    memories: Vec<vk::DeviceMemory>,
}

impl HeadlessBackend {
    pub fn new(dev: Arc<Device>) -> Self {
        Self {
            dev,
            memories: Vec::new(),
        }
    }
}

impl Backend for HeadlessBackend {
    fn probe(&self) -> Result<u32> {
        Ok(0)
    }

    fn create(&mut self, state: &mut SurfaceState) -> Result<()> {
        self.destroy(state);

        let resolution = vk::Extent2D {
            width: HEADLESS_WIDTH,
            height: HEADLESS_HEIGHT,
        };
        for _ in 0..HEADLESS_IMAGE_COUNT {
            let (image, view, mem) = self.dev.create_image(
                &resolution,
                vk::Format::B8G8R8A8_UNORM,
                vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
                vk::MemoryPropertyFlags::DEVICE_LOCAL
                    | vk::MemoryPropertyFlags::HOST_COHERENT
                    | vk::MemoryPropertyFlags::HOST_VISIBLE,
                vk::ImageTiling::LINEAR,
            );
            state.images.push(image);
            state.views.push(view);
            self.memories.push(mem);
        }
        state.resolution = resolution;
        state.format = vk::Format::B8G8R8A8_UNORM;
        state.current_image = 0;
        Ok(())
    }

    fn destroy(&mut self, state: &mut SurfaceState) {
        for mem in self.memories.drain(..) {
            unsafe { self.dev.free_memory(mem) };
        }
        state.images.clear();
        state.views.clear();
    }

    fn poll(&mut self) {}

    fn request_frame(&mut self, state: &mut SurfaceState) -> Result<()> {
        if state.images.is_empty() {
            return Err(DvzError::WaitSurface);
        }
        state.current_image = (state.current_image + 1) % state.images.len() as u32;
        Ok(())
    }

    fn present(&mut self, _state: &SurfaceState) -> Result<()> {
        Ok(())
    }

    fn was_resized(&mut self) -> bool {
        false
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        for mem in self.memories.drain(..) {
            unsafe { self.dev.free_memory(mem) };
        }
    }
}

/// The `glfw`-named backend. This crate carries `sdl2`, not `glfw`, so when
/// the `sdl` feature is enabled this wraps a real `Sdl2Backend`; without the
/// feature it's an inert placeholder that reports itself unsupported rather
/// than refusing to compile (§6: "Named backends: `glfw`, `offscreen`, `qt`
/// (stub)").
pub struct GlfwBackend {
    #[cfg(feature = "sdl")]
    inner: crate::sdl_backend::Sdl2Backend,
}

impl GlfwBackend {
    #[cfg(feature = "sdl")]
    pub fn new(dev: Arc<Device>, sdl: &sdl2::Sdl, window: sdl2::video::Window) -> Result<Self> {
        Ok(Self {
            inner: crate::sdl_backend::Sdl2Backend::new(dev, sdl, window)?,
        })
    }
}

impl Backend for GlfwBackend {
    fn probe(&self) -> Result<u32> {
        #[cfg(feature = "sdl")]
        {
            self.inner.probe()
        }
        #[cfg(not(feature = "sdl"))]
        {
            Err(DvzError::UnsupportedCapability(
                "glfw backend requires the \"sdl\" feature".to_string(),
            ))
        }
    }

    fn create(&mut self, state: &mut SurfaceState) -> Result<()> {
        #[cfg(feature = "sdl")]
        {
            self.inner.create(state)
        }
        #[cfg(not(feature = "sdl"))]
        {
            let _ = state;
            Err(DvzError::UnsupportedCapability(
                "glfw backend requires the \"sdl\" feature".to_string(),
            ))
        }
    }

    fn destroy(&mut self, state: &mut SurfaceState) {
        #[cfg(feature = "sdl")]
        {
            self.inner.destroy(state);
        }
        #[cfg(not(feature = "sdl"))]
        {
            let _ = state;
        }
    }

    fn poll(&mut self) {
        #[cfg(feature = "sdl")]
        {
            self.inner.poll();
        }
    }

    fn request_frame(&mut self, state: &mut SurfaceState) -> Result<()> {
        #[cfg(feature = "sdl")]
        {
            self.inner.request_frame(state)
        }
        #[cfg(not(feature = "sdl"))]
        {
            let _ = state;
            Err(DvzError::WaitSurface)
        }
    }

    fn present(&mut self, state: &SurfaceState) -> Result<()> {
        #[cfg(feature = "sdl")]
        {
            self.inner.present(state)
        }
        #[cfg(not(feature = "sdl"))]
        {
            let _ = state;
            Ok(())
        }
    }

    fn was_resized(&mut self) -> bool {
        #[cfg(feature = "sdl")]
        {
            self.inner.was_resized()
        }
        #[cfg(not(feature = "sdl"))]
        {
            false
        }
    }
}

/// The `qt`-named backend. Genuinely a stub per §6 ("`qt` (stub)"): no Qt
/// dependency is carried anywhere in this workspace, so every operation
/// reports `UnsupportedCapability` rather than pretending to render.
pub struct QtBackend;

impl QtBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for QtBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for QtBackend {
    fn probe(&self) -> Result<u32> {
        Err(DvzError::UnsupportedCapability(
            "qt backend is a stub".to_string(),
        ))
    }

    fn create(&mut self, _state: &mut SurfaceState) -> Result<()> {
        Err(DvzError::UnsupportedCapability(
            "qt backend is a stub".to_string(),
        ))
    }

    fn destroy(&mut self, _state: &mut SurfaceState) {}

    fn poll(&mut self) {}

    fn request_frame(&mut self, _state: &mut SurfaceState) -> Result<()> {
        Err(DvzError::UnsupportedCapability(
            "qt backend is a stub".to_string(),
        ))
    }

    fn present(&mut self, _state: &SurfaceState) -> Result<()> {
        Err(DvzError::UnsupportedCapability(
            "qt backend is a stub".to_string(),
        ))
    }

    fn was_resized(&mut self) -> bool {
        false
    }
}
