// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use lumen_render::{RenderSize, ResizeSignal, SurfaceSource};
use tracing::debug;
pub use winit;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowAttributes};

/// Window attributes for a plain, optionally resizable, titled window.
pub fn window_attributes(title: &str, width: u32, height: u32, resizable: bool) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(width.max(1), height.max(1)))
        .with_resizable(resizable)
}

/// [`SurfaceSource`] backed by a winit window. The event handler raises
/// the shared [`ResizeSignal`] on `WindowEvent::Resized`.
pub struct WindowSurface {
    window: Arc<Window>,
    resized: ResizeSignal,
}

impl WindowSurface {
    pub fn new(window: Arc<Window>, resized: ResizeSignal) -> Self {
        Self { window, resized }
    }
}

impl SurfaceSource for WindowSurface {
    fn framebuffer_size(&self) -> RenderSize {
        let size = self.window.inner_size();
        RenderSize::new(size.width, size.height)
    }

    fn take_resized(&self) -> bool {
        let resized = self.resized.take();
        if resized {
            debug!("resize flag consumed");
        }
        resized
    }
}
