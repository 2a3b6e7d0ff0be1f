// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimised window reports a zero-sized framebuffer.
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Startup knobs handed to a backend.
#[derive(Clone, Copy, Debug)]
pub struct RenderOptions {
    pub clear_color: [f32; 4],
    /// Enable API validation and route its messages to the log.
    pub validation: bool,
    /// Upper bound on a frame fence wait; `None` waits forever.
    pub fence_timeout: Option<Duration>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: cfg!(debug_assertions),
            fence_timeout: None,
        }
    }
}

/// What the renderer needs to know about the window it draws into.
pub trait SurfaceSource {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> RenderSize;
    /// Returns true once per resize notification, clearing it.
    fn take_resized(&self) -> bool;
}

/// Resize notification shared between the windowing callback (writer) and
/// the frame loop (reader).
#[derive(Clone, Debug, Default)]
pub struct ResizeSignal(Arc<AtomicBool>);

impl ResizeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        surface: Box<dyn SurfaceSource>,
        options: RenderOptions,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Draws one frame. Errors are terminal for the frame loop.
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}
