// SPDX-License-Identifier: CEPL-1.0
//! The per-frame state machine.
//!
//! One tick waits on the current slot's fence, acquires an image, makes sure
//! its command buffer and uniforms are current, submits, presents and moves
//! to the next slot. Stale and suboptimal chains are absorbed here by
//! rebuilding everything that depends on the swap chain; any other device
//! failure ends the loop.

use std::time::Duration;

use ash::vk;
use bitflags::bitflags;
use lumen_math::aspect_ratio;
use lumen_render::{RenderOptions, SurfaceSource};
use tracing::{debug, info, trace, warn};

use crate::error::{FrameError, SurfaceError};
use crate::frames::{FramePool, MAX_FRAMES_IN_FLIGHT};
use crate::geometry::Geometry;
use crate::gpu::{FrameSubmit, Gpu};
use crate::pipeline::DrawPipeline;
use crate::recorder::{CommandRecorder, DrawTarget};
use crate::swapchain::{AcquireOutcome, PresentOutcome, SwapChain};
use crate::uniform::UniformSet;

bitflags! {
    /// Reasons the chain must be rebuilt after the current present.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PendingPresent: u8 {
        const RESIZED = 1 << 0;
        const STALE = 1 << 1;
        const SUBOPTIMAL = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Waiting,
    Acquiring,
    Recording,
    Submitting,
    Presenting,
    Advancing,
    ShuttingDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and handed to the presentation engine. The
    /// present itself may have found the chain stale or suboptimal; the
    /// chain has then already been rebuilt, and the image may never reach
    /// the screen.
    Presented { image_index: u32 },
    /// The chain was stale at acquire and has been rebuilt; nothing was drawn.
    Recreated,
    /// The framebuffer is zero-sized; recreation waits for a later tick.
    Deferred,
}

pub struct FrameScheduler {
    chain: SwapChain,
    pipeline: DrawPipeline,
    uniforms: UniformSet,
    recorder: CommandRecorder,
    frames: FramePool,
    geometry: Geometry,
    /// Fence of the slot that last submitted work for each image.
    images_in_flight: Vec<Option<vk::Fence>>,
    pending: PendingPresent,
    deferred: bool,
    state: FrameState,
    fence_timeout: u64,
}

fn timeout_nanos(timeout: Option<Duration>) -> u64 {
    timeout
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(u64::MAX)
}

impl FrameScheduler {
    /// Builds the chain and everything that hangs off it. Takes ownership of
    /// `geometry`, which is released on failure and at shutdown.
    pub fn new<G: Gpu>(
        gpu: &G,
        surface: &dyn SurfaceSource,
        geometry: Geometry,
        options: &RenderOptions,
    ) -> Result<Self, SurfaceError> {
        let mut chain = match SwapChain::create(gpu, surface.framebuffer_size()) {
            Ok(c) => c,
            Err(e) => {
                geometry.destroy(gpu);
                return Err(e);
            }
        };
        let mut pipeline = match DrawPipeline::new(gpu, chain.format().format) {
            Ok(p) => p,
            Err(e) => {
                chain.destroy(gpu);
                geometry.destroy(gpu);
                return Err(e.into());
            }
        };
        let parts = Self::build_dependents(gpu, &mut chain, &pipeline, options.clear_color);
        let (uniforms, recorder, frames) = match parts {
            Ok(parts) => parts,
            Err(e) => {
                pipeline.destroy(gpu);
                chain.destroy(gpu);
                geometry.destroy(gpu);
                return Err(e);
            }
        };

        let image_count = chain.image_count();
        let mut this = Self {
            chain,
            pipeline,
            uniforms,
            recorder,
            frames,
            geometry,
            images_in_flight: vec![None; image_count],
            pending: PendingPresent::empty(),
            deferred: false,
            state: FrameState::Idle,
            fence_timeout: timeout_nanos(options.fence_timeout),
        };
        if let Err(e) = this.record_all(gpu) {
            this.shutdown(gpu);
            return Err(SurfaceError::DeviceRejected(e));
        }
        info!(
            "frame scheduler ready ({} images, {} frames in flight)",
            image_count,
            this.frames.len()
        );
        Ok(this)
    }

    fn build_dependents<G: Gpu>(
        gpu: &G,
        chain: &mut SwapChain,
        pipeline: &DrawPipeline,
        clear: [f32; 4],
    ) -> Result<(UniformSet, CommandRecorder, FramePool), SurfaceError> {
        chain.attach_framebuffers(gpu, pipeline.render_pass())?;
        let count = chain.image_count();
        let mut uniforms = UniformSet::new(gpu, pipeline.set_layout(), count)?;
        let mut recorder = match CommandRecorder::new(gpu, count, clear) {
            Ok(r) => r,
            Err(e) => {
                uniforms.destroy(gpu);
                return Err(e.into());
            }
        };
        let frames = match FramePool::new(gpu, MAX_FRAMES_IN_FLIGHT) {
            Ok(f) => f,
            Err(e) => {
                recorder.destroy(gpu);
                uniforms.destroy(gpu);
                return Err(e.into());
            }
        };
        Ok((uniforms, recorder, frames))
    }

    fn enter(&mut self, state: FrameState) {
        trace!(from = ?self.state, to = ?state, "frame state");
        self.state = state;
    }

    fn target(&self, index: usize) -> DrawTarget {
        DrawTarget {
            render_pass: self.pipeline.render_pass(),
            framebuffer: self.chain.framebuffer(index),
            extent: self.chain.extent(),
            pipeline: self.pipeline.pipeline(),
            layout: self.pipeline.layout(),
            descriptor_set: self.uniforms.set(index),
            geometry: self.geometry,
        }
    }

    fn record_one<G: Gpu>(&mut self, gpu: &G, index: usize) -> ash::prelude::VkResult<()> {
        let target = self.target(index);
        self.recorder.record(gpu, index, &target)
    }

    fn record_all<G: Gpu>(&mut self, gpu: &G) -> ash::prelude::VkResult<()> {
        for index in 0..self.recorder.len() {
            self.record_one(gpu, index)?;
        }
        Ok(())
    }

    /// Runs one tick of the frame loop.
    pub fn draw_frame<G: Gpu>(
        &mut self,
        gpu: &G,
        surface: &dyn SurfaceSource,
        elapsed: f32,
    ) -> Result<FrameOutcome, FrameError> {
        if surface.take_resized() {
            self.pending |= PendingPresent::RESIZED;
        }
        if self.deferred && !self.recreate(gpu, surface)? {
            return Ok(FrameOutcome::Deferred);
        }

        let slot = self.frames.current();

        self.enter(FrameState::Waiting);
        gpu.wait_for_fence(slot.in_flight, self.fence_timeout)
            .map_err(FrameError::FenceWait)?;

        self.enter(FrameState::Acquiring);
        let image_index = match self
            .chain
            .acquire_next(gpu, u64::MAX, slot.image_available)
            .map_err(FrameError::Acquire)?
        {
            AcquireOutcome::Acquired { index, suboptimal } => {
                if suboptimal {
                    self.pending |= PendingPresent::SUBOPTIMAL;
                }
                index
            }
            AcquireOutcome::Stale => {
                debug!("swapchain stale at acquire");
                self.pending |= PendingPresent::STALE;
                return Ok(if self.recreate(gpu, surface)? {
                    FrameOutcome::Recreated
                } else {
                    FrameOutcome::Deferred
                });
            }
        };
        let image = image_index as usize;

        self.enter(FrameState::Recording);
        if let Some(owner) = self.images_in_flight[image] {
            if owner != slot.in_flight {
                gpu.wait_for_fence(owner, self.fence_timeout)
                    .map_err(FrameError::FenceWait)?;
            }
        }
        self.images_in_flight[image] = Some(slot.in_flight);
        if self.recorder.is_stale(image) {
            self.record_one(gpu, image).map_err(FrameError::Record)?;
        }
        let extent = self.chain.extent();
        self.uniforms
            .update(gpu, image, elapsed, aspect_ratio(extent.width, extent.height));

        self.enter(FrameState::Submitting);
        gpu.reset_fence(slot.in_flight).map_err(FrameError::Device)?;
        gpu.queue_submit(&FrameSubmit {
            command_buffer: self.recorder.buffer(image),
            wait: slot.image_available,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal: slot.render_finished,
            fence: slot.in_flight,
        })
        .map_err(FrameError::Submit)?;

        self.enter(FrameState::Presenting);
        match self
            .chain
            .present(gpu, image_index, slot.render_finished)
            .map_err(FrameError::Present)?
        {
            PresentOutcome::Presented => {}
            PresentOutcome::Suboptimal => self.pending |= PendingPresent::SUBOPTIMAL,
            PresentOutcome::Stale => self.pending |= PendingPresent::STALE,
        }

        self.enter(FrameState::Advancing);
        if !self.pending.is_empty() {
            debug!(pending = ?self.pending, "recreating after present");
            self.recreate(gpu, surface)?;
        }
        self.frames.advance();

        Ok(FrameOutcome::Presented { image_index })
    }

    /// Rebuilds the chain and every swap-dependent resource. Returns
    /// `Ok(false)` without touching anything while the framebuffer is
    /// zero-sized; the next tick tries again.
    pub fn recreate<G: Gpu>(
        &mut self,
        gpu: &G,
        surface: &dyn SurfaceSource,
    ) -> Result<bool, FrameError> {
        let size = surface.framebuffer_size();
        if size.is_zero() {
            if !self.deferred {
                debug!("framebuffer is zero-sized, deferring swapchain recreation");
            }
            self.deferred = true;
            return Ok(false);
        }

        self.chain.recreate(gpu, size)?;
        self.pipeline
            .ensure_format(gpu, self.chain.format().format)
            .map_err(SurfaceError::from)?;
        self.chain
            .attach_framebuffers(gpu, self.pipeline.render_pass())?;

        let count = self.chain.image_count();
        self.uniforms.destroy(gpu);
        self.uniforms =
            UniformSet::new(gpu, self.pipeline.set_layout(), count).map_err(SurfaceError::from)?;
        self.recorder
            .resize(gpu, count)
            .map_err(SurfaceError::from)?;
        self.images_in_flight = vec![None; count];
        self.record_all(gpu).map_err(FrameError::Record)?;

        self.pending = PendingPresent::empty();
        self.deferred = false;
        Ok(true)
    }

    /// Swaps the clear color. Buffers are re-recorded lazily as images are
    /// acquired.
    pub fn set_clear_color<G: Gpu>(&mut self, gpu: &G, rgba: [f32; 4]) -> Result<(), FrameError> {
        gpu.device_wait_idle().map_err(FrameError::Device)?;
        self.recorder.set_clear_color(rgba);
        Ok(())
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn pending(&self) -> PendingPresent {
        self.pending
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn chain(&self) -> &SwapChain {
        &self.chain
    }

    pub fn current_slot(&self) -> usize {
        self.frames.current_index()
    }

    /// Drains the device, then releases everything in reverse creation order.
    pub fn shutdown<G: Gpu>(mut self, gpu: &G) {
        if let Err(e) = gpu.device_wait_idle() {
            warn!("device_wait_idle failed during shutdown: {e}");
        }
        self.enter(FrameState::ShuttingDown);
        self.frames.destroy(gpu);
        self.recorder.destroy(gpu);
        self.uniforms.destroy(gpu);
        self.chain.destroy_framebuffers(gpu);
        self.pipeline.destroy(gpu);
        self.chain.destroy(gpu);
        self.geometry.destroy(gpu);
    }
}
