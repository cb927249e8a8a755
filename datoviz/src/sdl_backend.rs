// SDL2-backed windowing backend (§4.6's "window-handle" half of a Canvas).
//
// The protocol names this backend `glfw`, but this crate has no `glfw`
// dependency; `sdl2` is already carried (behind the `sdl` feature) for
// general-purpose window system glue, so it fills the `glfw` role here.
// Grounded on `thundr::display::vkswapchain::sdl::SDL2DisplayBackend` and
// `thundr::display::vkswapchain`'s swapchain (re)creation/present path.
//
// Austin Shafer - 2024

use crate::backend::SurfaceState;
use crate::device::Device;
use crate::error::{DvzError, Result};
use ash::extensions::khr;
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

/// Create an SDL window with the `VULKAN` flag set, the precondition for
/// both `required_instance_extensions` and `Sdl2Backend::new`.
pub fn create_window(
    video: &sdl2::VideoSubsystem,
    title: &str,
    width: u32,
    height: u32,
) -> Result<sdl2::video::Window> {
    video
        .window(title, width, height)
        .vulkan()
        .resizable()
        .build()
        .map_err(|e| DvzError::ResourceCreation(format!("sdl2 window creation: {:?}", e)))
}

/// The Vulkan instance extensions this window's surface will need. Must be
/// folded into `RendererConfig::backend_extensions` *before* `Renderer::new`
/// builds the instance (the window has to exist first to ask SDL what it
/// needs, same ordering as `thundr`'s `WindowInfo` construction).
pub fn required_instance_extensions(window: &sdl2::video::Window) -> Result<Vec<CString>> {
    window
        .vulkan_instance_extensions()
        .map_err(|e| DvzError::ResourceCreation(format!("sdl2 instance extensions: {:?}", e)))?
        .iter()
        .map(|s| {
            CString::new(*s)
                .map_err(|e| DvzError::ResourceCreation(format!("extension name: {:?}", e)))
        })
        .collect()
}

/// Real window-backed swapchain, standing in for the `glfw` named backend.
pub struct Sdl2Backend {
    dev: Arc<Device>,
    window: sdl2::video::Window,
    event_pump: sdl2::EventPump,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
    swapchain_loader: khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    present_queue: vk::Queue,
    /// Acquire is fence-gated rather than semaphore-gated so this backend
    /// doesn't need to thread an extra wait-semaphore through `Canvas::submit`,
    /// whose submit path only waits on the device timeline semaphore.
    acquire_fence: vk::Fence,
    resized: bool,
}

impl Sdl2Backend {
    /// Wrap an already-created SDL window (see `create_window`). `sdl` owns
    /// the SDL context the window and event pump were derived from.
    pub fn new(dev: Arc<Device>, sdl: &sdl2::Sdl, window: sdl2::video::Window) -> Result<Self> {
        let event_pump = sdl
            .event_pump()
            .map_err(|e| DvzError::ResourceCreation(format!("sdl2 event pump: {:?}", e)))?;

        let surface_loader = khr::Surface::new(&dev.inst.loader, &dev.inst.inst);
        let surface = Self::create_surface(&dev, &window)?;
        let swapchain_loader = khr::Swapchain::new(&dev.inst.inst, &dev.dev);
        let acquire_fence = unsafe { dev.dev.create_fence(&vk::FenceCreateInfo::builder(), None) }
            .map_err(|e| DvzError::ResourceCreation(format!("create_fence: {:?}", e)))?;

        Ok(Self {
            dev,
            window,
            event_pump,
            surface_loader,
            surface,
            swapchain_loader,
            swapchain: vk::SwapchainKHR::null(),
            present_queue: vk::Queue::null(),
            acquire_fence,
            resized: false,
        })
    }

    fn create_surface(dev: &Device, window: &sdl2::video::Window) -> Result<vk::SurfaceKHR> {
        use vk::Handle;

        let raw = window
            .vulkan_create_surface(dev.inst.inst.handle().as_raw() as usize)
            .map_err(|e| DvzError::ResourceCreation(format!("vulkan_create_surface: {:?}", e)))?;
        Ok(vk::SurfaceKHR::from_raw(raw))
    }

    fn select_surface_format(&self) -> Result<vk::SurfaceFormatKHR> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.dev.pdev, self.surface)
        }
        .map_err(|e| DvzError::ResourceCreation(format!("surface formats: {:?}", e)))?;

        // Forcing B8G8R8A8_UNORM here keeps color handling uniform with the
        // headless backend (see `device.rs`'s dynamic rendering setup).
        formats
            .iter()
            .find(|fmt| fmt.format == vk::Format::B8G8R8A8_UNORM)
            .copied()
            .ok_or_else(|| DvzError::UnsupportedCapability("no B8G8R8A8_UNORM surface format".to_string()))
    }
}

impl crate::backend::Backend for Sdl2Backend {
    fn probe(&self) -> Result<u32> {
        let families = unsafe {
            self.dev
                .inst
                .inst
                .get_physical_device_queue_family_properties(self.dev.pdev)
        };
        families
            .iter()
            .enumerate()
            .find(|(index, info)| {
                info.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                    && unsafe {
                        self.surface_loader
                            .get_physical_device_surface_support(
                                self.dev.pdev,
                                *index as u32,
                                self.surface,
                            )
                            .unwrap_or(false)
                    }
            })
            .map(|(index, _)| index as u32)
            .ok_or_else(|| {
                DvzError::UnsupportedCapability(
                    "no queue family supports graphics + present on this surface".to_string(),
                )
            })
    }

    fn create(&mut self, state: &mut SurfaceState) -> Result<()> {
        self.destroy(state);

        if self.present_queue.is_null() {
            let family = self.probe()?;
            self.present_queue = self.dev.get_queue(family);
        }

        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.dev.pdev, self.surface)
        }
        .map_err(|e| DvzError::ResourceCreation(format!("surface capabilities: {:?}", e)))?;
        let format = self.select_surface_format()?;

        let (width, height) = self.window.vulkan_drawable_size();
        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D { width, height }
        };

        let mut image_count = 2;
        if image_count < caps.min_image_count {
            image_count = caps.min_image_count;
        }
        if caps.max_image_count > 0 && image_count > caps.max_image_count {
            image_count = caps.max_image_count;
        }

        let transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        self.swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| DvzError::ResourceCreation(format!("create_swapchain: {:?}", e)))?;

        let images = unsafe { self.swapchain_loader.get_swapchain_images(self.swapchain) }
            .map_err(|e| DvzError::ResourceCreation(format!("get_swapchain_images: {:?}", e)))?;

        let mut views = Vec::with_capacity(images.len());
        for image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(*image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { self.dev.dev.create_image_view(&view_info, None) }
                .map_err(|e| DvzError::ResourceCreation(format!("create_image_view: {:?}", e)))?;
            views.push(view);
        }

        state.images = images;
        state.views = views;
        state.resolution = extent;
        state.format = format.format;
        state.current_image = 0;
        self.resized = false;
        Ok(())
    }

    fn destroy(&mut self, state: &mut SurfaceState) {
        unsafe {
            for view in state.views.drain(..) {
                self.dev.dev.destroy_image_view(view, None);
            }
            state.images.clear();
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
    }

    fn poll(&mut self) {
        for event in self.event_pump.poll_iter() {
            if let sdl2::event::Event::Window {
                win_event: sdl2::event::WindowEvent::Resized(..),
                ..
            } = event
            {
                self.resized = true;
            }
        }
    }

    fn request_frame(&mut self, state: &mut SurfaceState) -> Result<()> {
        let (width, height) = self.window.vulkan_drawable_size();
        if width == 0 || height == 0 {
            return Err(DvzError::WaitSurface);
        }

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                vk::Semaphore::null(),
                self.acquire_fence,
            )
        };

        match result {
            Ok((index, suboptimal)) => {
                unsafe {
                    let fences = [self.acquire_fence];
                    self.dev.dev.wait_for_fences(&fences, true, u64::MAX).map_err(|e| {
                        DvzError::ResourceCreation(format!("wait_for_fences: {:?}", e))
                    })?;
                    self.dev.dev.reset_fences(&fences).map_err(|e| {
                        DvzError::ResourceCreation(format!("reset_fences: {:?}", e))
                    })?;
                }
                if suboptimal {
                    self.resized = true;
                }
                state.current_image = index;
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.resized = true;
                Err(DvzError::WaitSurface)
            }
            Err(e) => Err(DvzError::ResourceCreation(format!("acquire_next_image: {:?}", e))),
        }
    }

    fn present(&mut self, state: &SurfaceState) -> Result<()> {
        let swapchains = [self.swapchain];
        let indices = [state.current_image];
        let present_info = vk::PresentInfoKHR::builder()
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
        } {
            Ok(_) => Ok(()),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                self.resized = true;
                Ok(())
            }
            Err(e) => Err(DvzError::ResourceCreation(format!("queue_present: {:?}", e))),
        }
    }

    fn was_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}

impl Drop for Sdl2Backend {
    fn drop(&mut self) {
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.dev.dev.destroy_fence(self.acquire_fence, None);
        }
    }
}
