// SPDX-License-Identifier: CEPL-1.0
//! Swap chain ownership: images, views and framebuffers bound to the surface.

use ash::prelude::VkResult;
use ash::vk;
use lumen_render::RenderSize;
use tracing::{debug, info};

use crate::error::SurfaceError;
use crate::gpu::{Gpu, SwapchainDesc};

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// BGRA8/sRGB-nonlinear if offered, else the first advertised format.
/// A lone `UNDEFINED` entry means the surface accepts anything.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    match formats {
        [] => None,
        [only] if only.format == vk::Format::UNDEFINED => Some(PREFERRED_FORMAT),
        _ => Some(
            formats
                .iter()
                .copied()
                .find(|f| *f == PREFERRED_FORMAT)
                .unwrap_or(formats[0]),
        ),
    }
}

/// MAILBOX, then IMMEDIATE, then FIFO (which every surface supports).
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> Option<vk::PresentModeKHR> {
    if modes.is_empty() {
        return None;
    }
    let mut best = vk::PresentModeKHR::FIFO;
    for &mode in modes {
        if mode == vk::PresentModeKHR::MAILBOX {
            return Some(mode);
        }
        if mode == vk::PresentModeKHR::IMMEDIATE {
            best = mode;
        }
    }
    Some(best)
}

/// The surface's current extent, or the framebuffer size clamped to the
/// surface limits when the surface leaves it to us (`u32::MAX` sentinel).
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: framebuffer
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: framebuffer
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum; `max_image_count == 0` means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { index: u32, suboptimal: bool },
    /// The chain no longer matches the surface.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    Stale,
}

pub struct SwapChain {
    handle: vk::SwapchainKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl SwapChain {
    pub fn create<G: Gpu>(gpu: &G, framebuffer: RenderSize) -> Result<Self, SurfaceError> {
        Self::build(gpu, framebuffer, vk::SwapchainKHR::null())
    }

    fn build<G: Gpu>(
        gpu: &G,
        framebuffer: RenderSize,
        old: vk::SwapchainKHR,
    ) -> Result<Self, SurfaceError> {
        let caps = gpu.surface_capabilities()?;
        let formats = gpu.surface_formats()?;
        let modes = gpu.surface_present_modes()?;

        let format = choose_surface_format(&formats).ok_or(SurfaceError::NoCompatibleFormat)?;
        let present_mode =
            choose_present_mode(&modes).ok_or(SurfaceError::NoCompatiblePresentMode)?;
        let desc = SwapchainDesc {
            min_image_count: choose_image_count(&caps),
            format,
            extent: choose_extent(&caps, framebuffer),
            present_mode,
            pre_transform: caps.current_transform,
        };

        let handle = gpu.create_swapchain(&desc, old)?;
        let images = match gpu.swapchain_images(handle) {
            Ok(images) => images,
            Err(e) => {
                gpu.destroy_swapchain(handle);
                return Err(e.into());
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            match gpu.create_image_view(image, format.format) {
                Ok(view) => views.push(view),
                Err(e) => {
                    for view in views {
                        gpu.destroy_image_view(view);
                    }
                    gpu.destroy_swapchain(handle);
                    return Err(e.into());
                }
            }
        }

        info!(
            "swapchain ready ({}x{}, {} images, {:?}/{:?}, {:?})",
            desc.extent.width,
            desc.extent.height,
            images.len(),
            format.format,
            format.color_space,
            present_mode
        );

        Ok(Self {
            handle,
            format,
            present_mode,
            extent: desc.extent,
            images,
            views,
            framebuffers: Vec::new(),
        })
    }

    /// Rebuilds the chain from the current surface state. Waits for the
    /// device to go idle first, so no submission can still reference the
    /// views or framebuffers being destroyed. Framebuffers must be attached
    /// again afterwards.
    pub fn recreate<G: Gpu>(&mut self, gpu: &G, framebuffer: RenderSize) -> Result<(), SurfaceError> {
        gpu.device_wait_idle()?;

        self.destroy_framebuffers(gpu);
        for view in self.views.drain(..) {
            gpu.destroy_image_view(view);
        }
        self.images.clear();

        let old = std::mem::replace(&mut self.handle, vk::SwapchainKHR::null());
        let rebuilt = Self::build(gpu, framebuffer, old);
        // The old chain is retired either way once it has been handed over.
        if old != vk::SwapchainKHR::null() {
            gpu.destroy_swapchain(old);
        }

        *self = rebuilt?;
        debug!(
            "swapchain recreated for framebuffer {}x{}",
            framebuffer.width, framebuffer.height
        );
        Ok(())
    }

    /// (Re)creates one framebuffer per image view against `render_pass`.
    pub fn attach_framebuffers<G: Gpu>(
        &mut self,
        gpu: &G,
        render_pass: vk::RenderPass,
    ) -> Result<(), SurfaceError> {
        self.destroy_framebuffers(gpu);
        let mut framebuffers = Vec::with_capacity(self.views.len());
        for &view in &self.views {
            match gpu.create_framebuffer(render_pass, view, self.extent) {
                Ok(fb) => framebuffers.push(fb),
                Err(e) => {
                    for fb in framebuffers {
                        gpu.destroy_framebuffer(fb);
                    }
                    return Err(e.into());
                }
            }
        }
        self.framebuffers = framebuffers;
        Ok(())
    }

    pub fn acquire_next<G: Gpu>(
        &self,
        gpu: &G,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<AcquireOutcome> {
        match gpu.acquire_next_image(self.handle, timeout, signal) {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
            Err(e) => Err(e),
        }
    }

    pub fn present<G: Gpu>(
        &self,
        gpu: &G,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<PresentOutcome> {
        match gpu.queue_present(self.handle, image_index, wait) {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(e),
        }
    }

    pub fn destroy_framebuffers<G: Gpu>(&mut self, gpu: &G) {
        for fb in self.framebuffers.drain(..) {
            gpu.destroy_framebuffer(fb);
        }
    }

    /// Framebuffers, then views, then the chain. Caller guarantees idle.
    pub fn destroy<G: Gpu>(mut self, gpu: &G) {
        self.destroy_framebuffers(gpu);
        for view in self.views.drain(..) {
            gpu.destroy_image_view(view);
        }
        if self.handle != vk::SwapchainKHR::null() {
            gpu.destroy_swapchain(self.handle);
        }
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer(&self, image_index: usize) -> vk::Framebuffer {
        self.framebuffers[image_index]
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }
}
