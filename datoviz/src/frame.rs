// Per-frame state for the Canvas/Frame Loop (C6): a rotating record of
// {command buffer, image index, image view, extent, dirty flag, recorded
// wait/signal values} (§3 "Frame").
//
// Austin Shafer - 2024

use ash::vk;

/// One slot in a Canvas's frame ring, sized to the swapchain image count.
pub struct Frame {
    pub command_buffer: vk::CommandBuffer,
    pub image_index: u32,
    pub image_view: vk::ImageView,
    pub extent: vk::Extent2D,
    /// Set when the backing swapchain was just (re)created, so the next
    /// recording pass must treat every handle in this frame as stale
    /// (§4.6 "marks all frames' handles_dirty").
    pub handles_dirty: bool,
    pub wait_value: u64,
    pub signal_value: u64,
}

impl Frame {
    pub fn new(command_buffer: vk::CommandBuffer) -> Self {
        Self {
            command_buffer,
            image_index: 0,
            image_view: vk::ImageView::null(),
            extent: vk::Extent2D { width: 0, height: 0 },
            handles_dirty: true,
            wait_value: 0,
            signal_value: 0,
        }
    }
}

/// One row of the timing ring buffer a Canvas keeps for `timings()`
/// (§4.6 "append a timing sample").
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameTiming {
    pub frame_id: u64,
    pub cpu_submit_us: u64,
    pub gpu_complete_us: u64,
    pub present_us: u64,
}

/// Fixed-capacity ring buffer of the most recent `N` `FrameTiming`
/// samples (§4.6 "timings(Canvas) -> ring-buffer of ... the most recent
/// N samples").
pub struct TimingHistory {
    samples: Vec<FrameTiming>,
    capacity: usize,
    next: usize,
    len: usize,
}

impl TimingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![FrameTiming::default(); capacity.max(1)],
            capacity: capacity.max(1),
            next: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, sample: FrameTiming) {
        self.samples[self.next] = sample;
        self.next = (self.next + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    /// Most recent samples, oldest first.
    pub fn recent(&self) -> Vec<FrameTiming> {
        if self.len < self.capacity {
            self.samples[..self.len].to_vec()
        } else {
            let mut out = Vec::with_capacity(self.capacity);
            out.extend_from_slice(&self.samples[self.next..]);
            out.extend_from_slice(&self.samples[..self.next]);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_frame_starts_dirty() {
        let frame = Frame::new(vk::CommandBuffer::null());
        assert!(frame.handles_dirty);
    }

    #[test]
    fn timing_history_wraps_and_preserves_order() {
        let mut history = TimingHistory::new(3);
        for i in 0..5u64 {
            history.push(FrameTiming { frame_id: i, ..Default::default() });
        }
        let recent = history.recent();
        let ids: Vec<u64> = recent.iter().map(|s| s.frame_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn timing_history_below_capacity_returns_only_pushed_samples() {
        let mut history = TimingHistory::new(5);
        history.push(FrameTiming { frame_id: 1, ..Default::default() });
        history.push(FrameTiming { frame_id: 2, ..Default::default() });
        let recent = history.recent();
        assert_eq!(recent.len(), 2);
    }
}
