// Startup configuration: environment variables read once into a `Config`
// struct (mirroring the "replace globals with context structs" redesign
// flag) plus the builder-style `RendererConfig`/`CanvasConfig` used to
// create a renderer and its canvases, in the spirit of the
// `CreateInfo::builder()...build()` convention this workspace already uses
// elsewhere.

use crate::error::{default_error_callback, ErrorCallback};
use std::ffi::CString;
use std::sync::Arc;

/// Color format carried throughout the protocol. Fixed at build time per
/// §4.3's "Format policy".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    /// 8-bit-per-channel RGBA unorm.
    Rgba8,
    /// 32-bit-per-channel float RGBA.
    Rgba32F,
}

impl Default for ColorFormat {
    fn default() -> Self {
        ColorFormat::Rgba8
    }
}

/// Environment-derived settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// `DVZ_DUMP=1` — dump the committed request stream on shutdown.
    pub dump_on_shutdown: bool,
    /// `DVZ_LOG_LEVEL=0..5` — trace..fatal. Consumed directly by the
    /// logging macros; kept here too so callers can inspect it.
    pub log_level: u32,
    /// `DVZ_CAPTURE=1` — enable validation/diagnostics in development builds.
    pub capture: bool,
    /// `DVZ_CANVAS_GLFW_LOOP=1` — keep the event loop alive until Escape;
    /// used by tests and the demo harness.
    pub glfw_loop: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            dump_on_shutdown: env_flag("DVZ_DUMP"),
            log_level: std::env::var("DVZ_LOG_LEVEL")
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v <= 5)
                .unwrap_or(4),
            capture: env_flag("DVZ_CAPTURE"),
            glfw_loop: env_flag("DVZ_CANVAS_GLFW_LOOP"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

/// Per-process context passed down instead of using module-level statics:
/// holds the environment config and the installable error callback from
/// §7's "Propagation policy".
pub struct Host {
    pub config: Config,
    pub error_callback: ErrorCallback,
}

impl Host {
    pub fn new() -> Self {
        Self {
            config: Config::from_env(),
            error_callback: default_error_callback(),
        }
    }

    pub fn set_error_callback(&mut self, cb: ErrorCallback) {
        self.error_callback = cb;
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration consumed by `Instance`/`Device` creation.
pub struct RendererConfig {
    /// Instance extensions required by the windowing backend in use
    /// (e.g. `VK_KHR_surface` + the platform-specific surface extension).
    pub backend_extensions: Vec<CString>,
    /// Mirrors `Config::capture`; threaded through separately so Instance
    /// creation does not need the whole `Host`.
    pub capture: bool,
    pub color_format: ColorFormat,
}

impl RendererConfig {
    pub fn builder() -> RendererConfigBuilder {
        RendererConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct RendererConfigBuilder {
    backend_extensions: Vec<CString>,
    capture: bool,
    color_format: Option<ColorFormat>,
}

impl RendererConfigBuilder {
    pub fn backend_extensions(mut self, exts: Vec<CString>) -> Self {
        self.backend_extensions = exts;
        self
    }

    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn color_format(mut self, format: ColorFormat) -> Self {
        self.color_format = Some(format);
        self
    }

    pub fn build(self) -> RendererConfig {
        RendererConfig {
            backend_extensions: self.backend_extensions,
            capture: self.capture,
            color_format: self.color_format.unwrap_or_default(),
        }
    }
}

/// Present modes a Canvas's swapchain can be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentMode {
    Fifo,
    Mailbox,
    Immediate,
}

impl Default for PresentMode {
    fn default() -> Self {
        PresentMode::Fifo
    }
}

/// Configuration consumed by `Canvas::create` (§4.6).
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
    pub present_mode: PresentMode,
    pub enable_video_sink: bool,
    /// Number of samples retained by the canvas's frame-timing ring buffer.
    pub timing_history: usize,
}

impl CanvasConfig {
    pub fn builder() -> CanvasConfigBuilder {
        CanvasConfigBuilder::default()
    }
}

pub struct CanvasConfigBuilder {
    width: u32,
    height: u32,
    present_mode: PresentMode,
    enable_video_sink: bool,
    timing_history: usize,
}

impl Default for CanvasConfigBuilder {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            present_mode: PresentMode::default(),
            enable_video_sink: false,
            timing_history: 60,
        }
    }
}

impl CanvasConfigBuilder {
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn present_mode(mut self, mode: PresentMode) -> Self {
        self.present_mode = mode;
        self
    }

    pub fn enable_video_sink(mut self, enable: bool) -> Self {
        self.enable_video_sink = enable;
        self
    }

    pub fn timing_history(mut self, samples: usize) -> Self {
        self.timing_history = samples;
        self
    }

    pub fn build(self) -> CanvasConfig {
        CanvasConfig {
            width: self.width,
            height: self.height,
            present_mode: self.present_mode,
            enable_video_sink: self.enable_video_sink,
            timing_history: self.timing_history,
        }
    }
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_config_defaults() {
        let cfg = CanvasConfig::builder().build();
        assert_eq!(cfg.width, 640);
        assert_eq!(cfg.height, 480);
        assert_eq!(cfg.present_mode, PresentMode::Fifo);
        assert!(!cfg.enable_video_sink);
    }

    #[test]
    fn canvas_config_builder_overrides() {
        let cfg = CanvasConfig::builder()
            .size(800, 600)
            .present_mode(PresentMode::Mailbox)
            .enable_video_sink(true)
            .timing_history(120)
            .build();
        assert_eq!((cfg.width, cfg.height), (800, 600));
        assert_eq!(cfg.present_mode, PresentMode::Mailbox);
        assert!(cfg.enable_video_sink);
        assert_eq!(cfg.timing_history, 120);
    }
}
