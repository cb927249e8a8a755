// Canvas / Frame Loop (C6): swapchain state machine, frame pool ring,
// and the per-canvas exportable timeline semaphore (§4.6).
//
// Austin Shafer - 2024

use crate::backend::{Backend, SurfaceState};
use crate::config::CanvasConfig;
use crate::device::Device;
use crate::error::{DvzError, Result};
use crate::frame::{Frame, FrameTiming, TimingHistory};
use crate::input::router::InputRouter;
use crate::recorder::CommandRecorder;
use ash::vk;
use std::sync::Arc;
use std::time::Duration;

const FENCE_TIMEOUT: Duration = Duration::from_millis(100);

/// Swapchain state machine (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    Uninitialized,
    Ready,
    OutOfDate,
    Lost,
}

/// Result of `Canvas::frame`: a "surface not ready" condition (e.g. a
/// minimized window) is distinct from a hard error and does not advance
/// the frame id (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Ready,
    WaitSurface,
}

/// Callback invoked once per `frame()` to record that frame's draw
/// requests. User data is modeled as a closure capture, the idiomatic
/// Rust equivalent of the C API's `(cb, user_data)` pair.
pub type DrawCallback = Box<dyn FnMut(&Device, &mut CommandRecorder, &Frame) + Send>;

/// A drawable surface plus its frame-loop machinery: one per window
/// (or one offscreen canvas for headless rendering).
pub struct Canvas {
    dev: Arc<Device>,
    backend: Box<dyn Backend>,
    surface: SurfaceState,
    state: SwapchainState,
    cmd_pool: vk::CommandPool,
    frames: Vec<Frame>,
    current_frame: usize,
    queue: vk::Queue,
    timeline_sema: vk::Semaphore,
    timeline_value: u64,
    config: CanvasConfig,
    draw_callback: Option<DrawCallback>,
    recorder: CommandRecorder,
    input: InputRouter,
    timings: TimingHistory,
    frame_id: u64,
}

impl Canvas {
    /// Create a Canvas over `backend`, submitting on `queue` (already
    /// registered with the device via `register_graphics_queue_family`).
    pub fn create(dev: Arc<Device>, mut backend: Box<dyn Backend>, queue: vk::Queue, config: CanvasConfig) -> Result<Self> {
        let queue_family = backend.probe()?;
        dev.register_graphics_queue_family(queue_family);
        let cmd_pool = dev.create_command_pool(queue_family);

        let mut surface = SurfaceState {
            images: Vec::new(),
            views: Vec::new(),
            resolution: vk::Extent2D { width: config.width, height: config.height },
            format: vk::Format::UNDEFINED,
            current_image: 0,
        };
        backend.create(&mut surface)?;

        let cbufs = dev.create_command_buffers(cmd_pool, surface.images.len() as u32);
        let frames = cbufs.into_iter().map(Frame::new).collect();

        let timeline_sema = dev.create_exportable_timeline_semaphore()?;

        Ok(Self {
            dev,
            backend,
            surface,
            state: SwapchainState::Ready,
            cmd_pool,
            frames,
            current_frame: 0,
            queue,
            timeline_sema,
            timeline_value: 0,
            timings: TimingHistory::new(config.timing_history),
            config,
            draw_callback: None,
            recorder: CommandRecorder::new(),
            input: InputRouter::new(),
            frame_id: 0,
        })
    }

    pub fn set_draw_callback(&mut self, cb: DrawCallback) {
        self.draw_callback = Some(cb);
    }

    pub fn input(&mut self) -> &mut InputRouter {
        &mut self.input
    }

    pub fn timings(&self) -> Vec<FrameTiming> {
        self.timings.recent()
    }

    pub fn swapchain_state(&self) -> SwapchainState {
        self.state
    }

    pub fn timeline_value(&self) -> u64 {
        self.timeline_value
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        self.backend.create(&mut self.surface)?;
        for frame in &mut self.frames {
            frame.handles_dirty = true;
        }
        self.state = SwapchainState::Ready;
        Ok(())
    }

    /// Acquire the next frame and invoke the draw callback. Returns
    /// `FrameOutcome::WaitSurface` (not an error) if the surface is
    /// transiently unavailable (§4.6).
    pub fn frame(&mut self) -> Result<FrameOutcome> {
        self.backend.poll();

        if self.backend.was_resized() {
            self.state = SwapchainState::OutOfDate;
        }
        if self.state == SwapchainState::OutOfDate {
            self.recreate_swapchain()?;
        }

        match self.backend.request_frame(&mut self.surface) {
            Ok(()) => {}
            Err(DvzError::WaitSurface) => return Ok(FrameOutcome::WaitSurface),
            Err(e) => return Err(e),
        }

        self.current_frame = self.surface.current_image as usize;
        let frame = &mut self.frames[self.current_frame];
        frame.image_index = self.surface.current_image;
        frame.image_view = self.surface.views[self.current_frame];
        frame.extent = self.surface.resolution;

        if let Some(mut cb) = self.draw_callback.take() {
            cb(self.dev.as_ref(), &mut self.recorder, &self.frames[self.current_frame]);
            self.draw_callback = Some(cb);
        }

        self.frame_id += 1;
        Ok(FrameOutcome::Ready)
    }

    /// Submit the current frame's command buffer with a timeline
    /// wait-value `v` and signal-value `v+1` (§4.6).
    pub fn submit(&mut self) -> Result<()> {
        let submit_start = std::time::Instant::now();

        let wait_value = self.timeline_value;
        let signal_value = self.timeline_value + 1;
        let frame = &self.frames[self.current_frame];

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfoKHR::builder()
            .wait_semaphore_values(&[wait_value])
            .signal_semaphore_values(&[signal_value])
            .build();
        let wait_semas = [self.timeline_sema];
        let signal_semas = [self.timeline_sema];
        let cbufs = [frame.command_buffer];
        let wait_stages = [vk::PipelineStageFlags::TOP_OF_PIPE];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semas)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cbufs)
            .signal_semaphores(&signal_semas)
            .push_next(&mut timeline_info)
            .build();

        unsafe {
            self.dev
                .submit_to_queue(self.queue, &[submit_info], vk::Fence::null())?;
        }

        self.timeline_value = signal_value;
        self.frames[self.current_frame].wait_value = wait_value;
        self.frames[self.current_frame].signal_value = signal_value;

        self.backend.present(&self.surface)?;

        self.timings.push(FrameTiming {
            frame_id: self.frame_id,
            cpu_submit_us: submit_start.elapsed().as_micros() as u64,
            gpu_complete_us: 0,
            present_us: 0,
        });

        Ok(())
    }

    /// Quiesce the device and tear down the swapchain, timeline, and
    /// frame pool (§4.6).
    pub fn destroy(mut self) {
        self.dev.wait_for_latest_timeline();
        self.backend.destroy(&mut self.surface);
        unsafe {
            self.dev.destroy_timeline_semaphore(self.timeline_sema);
            self.dev.destroy_command_pool(self.cmd_pool);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_timeout_is_the_spec_mandated_100ms() {
        assert_eq!(FENCE_TIMEOUT, Duration::from_millis(100));
    }
}
