//! Single-buffered frame loop
//!
//! Every frame walks `Idle -> Acquiring -> Recording -> Submitted ->
//! Presenting -> Idle`. There is one command buffer, one vertex buffer and one
//! uniform buffer, so the loop drains the device before each frame and waits
//! on the submission fence before presenting. The image-acquired semaphore is
//! created fresh for every frame and destroyed once the frame is presented.
//!
//! The loop talks to the GPU through [`FrameDevice`] and to the window through
//! [`EventSource`], which keeps the ordering testable without a GPU.

use crate::config::FrameLoopConfig;
use crate::render::vulkan::sync::FenceStatus;
use crate::render::vulkan::VulkanResult;

/// Source of OS events and the close request
pub trait EventSource {
    /// Whether the user asked to close
    fn should_close(&self) -> bool;

    /// Process pending window and input events
    fn poll_events(&mut self);
}

/// Result of one bounded acquire call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The image with this index will be available once the semaphore signals
    Acquired(u32),
    /// Timeout or not-ready; the semaphore was not signaled
    NotReady,
}

/// GPU operations the frame loop sequences
pub trait FrameDevice {
    /// Per-frame image-acquired semaphore; dropping it destroys it
    type Semaphore;

    /// Block until the device has no pending work
    fn wait_idle(&mut self) -> VulkanResult<()>;

    /// Create the semaphore the next acquire signals
    fn create_acquire_semaphore(&mut self) -> VulkanResult<Self::Semaphore>;

    /// Request the next presentable image, signaling `semaphore`
    fn acquire_next_image(
        &mut self,
        semaphore: &Self::Semaphore,
        timeout_ns: u64,
    ) -> VulkanResult<AcquireOutcome>;

    /// Record the draw commands targeting `image_index`
    fn record_frame(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Submit the recorded commands, waiting on `semaphore`, with the fence
    fn submit(&mut self, semaphore: &Self::Semaphore) -> VulkanResult<()>;

    /// One bounded wait on the submission fence
    fn wait_for_submission(&mut self, timeout_ns: u64) -> VulkanResult<FenceStatus>;

    /// Present `image_index` without waiting on any semaphore
    fn present(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Return the submission fence to unsignaled
    fn reset_submission_fence(&mut self) -> VulkanResult<()>;
}

/// Where the loop is within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames
    Idle,
    /// Waiting for a swapchain image
    Acquiring,
    /// Recording the command buffer
    Recording,
    /// Submitted; waiting for the fence
    Submitted,
    /// Presenting the image
    Presenting,
}

/// Counters collected while the loop runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that reached present
    pub frames_presented: u64,
    /// Acquire calls that returned without an image
    pub acquire_retries: u64,
    /// Fence waits that timed out and were repeated
    pub fence_timeouts: u64,
}

/// Drives frames on a [`FrameDevice`]
#[derive(Debug)]
pub struct FrameLoop {
    config: FrameLoopConfig,
    state: FrameState,
    stats: FrameStats,
}

impl FrameLoop {
    /// Create an idle loop
    pub fn new(config: FrameLoopConfig) -> Self {
        Self {
            config,
            state: FrameState::Idle,
            stats: FrameStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Counters so far
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    fn enter(&mut self, state: FrameState) {
        log::trace!("Frame {}: {:?} -> {:?}", self.stats.frames_presented, self.state, state);
        self.state = state;
    }

    /// Run one full frame and return to `Idle`
    ///
    /// If any step after the semaphore exists fails, the device is drained
    /// before the semaphore is destroyed and the error is returned.
    pub fn render_frame<D: FrameDevice>(&mut self, device: &mut D) -> VulkanResult<()> {
        device.wait_idle()?;
        let semaphore = device.create_acquire_semaphore()?;

        let result = self.drive_frame(device, &semaphore);
        if result.is_err() {
            drain_after_error(device);
        }
        drop(semaphore);
        result?;

        self.stats.frames_presented += 1;
        self.enter(FrameState::Idle);
        Ok(())
    }

    fn drive_frame<D: FrameDevice>(
        &mut self,
        device: &mut D,
        semaphore: &D::Semaphore,
    ) -> VulkanResult<()> {
        self.enter(FrameState::Acquiring);

        let image_index = loop {
            match device.acquire_next_image(semaphore, self.config.acquire_timeout())? {
                AcquireOutcome::Acquired(index) => break index,
                AcquireOutcome::NotReady => {
                    self.stats.acquire_retries += 1;
                    log::debug!("Swapchain image not ready, retrying acquire");
                }
            }
        };

        self.enter(FrameState::Recording);
        device.record_frame(image_index)?;

        device.submit(semaphore)?;
        self.enter(FrameState::Submitted);
        while device.wait_for_submission(self.config.fence_timeout_ns)? == FenceStatus::TimedOut {
            self.stats.fence_timeouts += 1;
        }

        self.enter(FrameState::Presenting);
        device.present(image_index)?;

        device.reset_submission_fence()
    }

    /// Render until the window closes or the frame budget runs out
    ///
    /// The device is drained before returning, on success and on error, so
    /// the caller can tear everything down.
    pub fn run<D: FrameDevice, E: EventSource>(
        &mut self,
        device: &mut D,
        events: &mut E,
    ) -> VulkanResult<FrameStats> {
        log::info!(
            "Entering frame loop (frame budget: {})",
            self.config
                .max_frames
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
        );

        while !events.should_close() && !self.budget_exhausted() {
            if let Err(e) = self.render_frame(device) {
                log::error!("Frame {} failed in {:?}: {}", self.stats.frames_presented, self.state, e);
                drain_after_error(device);
                return Err(e);
            }
            events.poll_events();
        }

        device.wait_idle()?;
        log::info!(
            "Frame loop finished after {} frames ({} fence timeouts, {} acquire retries)",
            self.stats.frames_presented,
            self.stats.fence_timeouts,
            self.stats.acquire_retries
        );
        Ok(self.stats)
    }

    fn budget_exhausted(&self) -> bool {
        self.config
            .max_frames
            .is_some_and(|max| self.stats.frames_presented >= max)
    }
}

fn drain_after_error<D: FrameDevice>(device: &mut D) {
    if let Err(e) = device.wait_idle() {
        log::error!("Device drain after a failed frame also failed: {}", e);
    }
}
