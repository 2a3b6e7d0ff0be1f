// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use tracing::debug;

use crate::gpu::Gpu;

/// Render pass, layouts and graphics pipeline for the single draw.
///
/// Layouts do not depend on the swap chain and live as long as the pipeline.
/// The render pass and pipeline are tied to the color format and are rebuilt
/// only when a recreated chain picks a different one.
pub struct DrawPipeline {
    format: vk::Format,
    render_pass: vk::RenderPass,
    set_layout: vk::DescriptorSetLayout,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl DrawPipeline {
    pub fn new<G: Gpu>(gpu: &G, format: vk::Format) -> VkResult<Self> {
        let set_layout = gpu.create_uniform_set_layout()?;
        let layout = match gpu.create_pipeline_layout(set_layout) {
            Ok(layout) => layout,
            Err(e) => {
                gpu.destroy_descriptor_set_layout(set_layout);
                return Err(e);
            }
        };
        let mut this = Self {
            format,
            render_pass: vk::RenderPass::null(),
            set_layout,
            layout,
            pipeline: vk::Pipeline::null(),
        };
        if let Err(e) = this.build_for_format(gpu, format) {
            this.destroy(gpu);
            return Err(e);
        }
        Ok(this)
    }

    fn build_for_format<G: Gpu>(&mut self, gpu: &G, format: vk::Format) -> VkResult<()> {
        let render_pass = gpu.create_render_pass(format)?;
        let pipeline = match gpu.create_graphics_pipeline(render_pass, self.layout) {
            Ok(p) => p,
            Err(e) => {
                gpu.destroy_render_pass(render_pass);
                return Err(e);
            }
        };
        self.release_format_bound(gpu);
        self.format = format;
        self.render_pass = render_pass;
        self.pipeline = pipeline;
        Ok(())
    }

    fn release_format_bound<G: Gpu>(&mut self, gpu: &G) {
        if self.pipeline != vk::Pipeline::null() {
            gpu.destroy_pipeline(self.pipeline);
            self.pipeline = vk::Pipeline::null();
        }
        if self.render_pass != vk::RenderPass::null() {
            gpu.destroy_render_pass(self.render_pass);
            self.render_pass = vk::RenderPass::null();
        }
    }

    /// Rebuilds the render pass and pipeline if `format` differs from the
    /// one they were built for. Returns whether anything was rebuilt.
    pub fn ensure_format<G: Gpu>(&mut self, gpu: &G, format: vk::Format) -> VkResult<bool> {
        if format == self.format && self.pipeline != vk::Pipeline::null() {
            return Ok(false);
        }
        debug!("color format {:?} -> {:?}, rebuilding pipeline", self.format, format);
        self.build_for_format(gpu, format)?;
        Ok(true)
    }

    /// Pipeline, render pass, then layouts. Caller guarantees idle.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        self.release_format_bound(gpu);
        if self.layout != vk::PipelineLayout::null() {
            gpu.destroy_pipeline_layout(self.layout);
            self.layout = vk::PipelineLayout::null();
        }
        if self.set_layout != vk::DescriptorSetLayout::null() {
            gpu.destroy_descriptor_set_layout(self.set_layout);
            self.set_layout = vk::DescriptorSetLayout::null();
        }
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }
}
