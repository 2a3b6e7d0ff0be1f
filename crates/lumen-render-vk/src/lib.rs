// SPDX-License-Identifier: CEPL-1.0
//! Vulkan frame presentation: swap chain, frames in flight, pre-recorded
//! command buffers and the scheduler that drives them.

use std::time::Instant;

use anyhow::{Context, Result};
use lumen_render::{RenderOptions, Renderer, SurfaceSource};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{error, trace};

mod backend;
mod context;
mod debug;
mod error;
mod frames;
mod geometry;
mod gpu;
#[cfg(test)]
mod mock;
mod pipeline;
mod recorder;
mod scheduler;
mod swapchain;
mod uniform;

pub use context::{QueueFamilies, VkContext, VALIDATION_LAYER};
pub use debug::{severity_level, TracingSink, ValidationSink};
pub use error::{FrameError, SetupError, SurfaceError};
pub use frames::{FramePool, FrameSlot, MAX_FRAMES_IN_FLIGHT};
pub use geometry::{Geometry, Vertex, QUAD_INDICES, QUAD_VERTICES};
pub use gpu::{FrameSubmit, Gpu, MappedBuffer, SwapchainDesc};
pub use pipeline::DrawPipeline;
pub use recorder::{CommandRecorder, DrawTarget};
pub use scheduler::{FrameOutcome, FrameScheduler, FrameState, PendingPresent};
pub use swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
    AcquireOutcome, PresentOutcome, SwapChain, PREFERRED_FORMAT,
};
pub use uniform::UniformSet;

pub struct VkRenderer {
    // Shut down in Drop before `ctx` goes.
    scheduler: Option<FrameScheduler>,
    start: Instant,
    ctx: VkContext,
    // Holds the window; dropped after the Vulkan surface.
    surface: Box<dyn SurfaceSource>,
}

impl VkRenderer {
    /// Like [`Renderer::new`], with a caller-chosen validation sink.
    pub fn with_sink(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        surface: Box<dyn SurfaceSource>,
        options: RenderOptions,
        sink: Box<dyn ValidationSink>,
    ) -> Result<Self> {
        let ctx = VkContext::new(window, display, &options, sink)?;
        let geometry = ctx
            .upload_geometry(&QUAD_VERTICES, &QUAD_INDICES)
            .context("uploading quad geometry")?;
        let scheduler = FrameScheduler::new(&ctx, surface.as_ref(), geometry, &options)
            .context("building swapchain resources")?;
        Ok(Self {
            scheduler: Some(scheduler),
            start: Instant::now(),
            ctx,
            surface,
        })
    }

    pub fn state(&self) -> Option<FrameState> {
        self.scheduler.as_ref().map(FrameScheduler::state)
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        surface: Box<dyn SurfaceSource>,
        options: RenderOptions,
    ) -> Result<Self> {
        Self::with_sink(window, display, surface, options, Box::new(TracingSink))
    }

    fn render(&mut self) -> Result<()> {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return Ok(());
        };
        let elapsed = self.start.elapsed().as_secs_f32();
        let outcome = scheduler.draw_frame(&self.ctx, self.surface.as_ref(), elapsed)?;
        trace!(?outcome, "frame");
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            if let Err(e) = scheduler.set_clear_color(&self.ctx, rgba) {
                error!("set_clear_color: {e}");
            }
        }
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown(&self.ctx);
        }
    }
}
