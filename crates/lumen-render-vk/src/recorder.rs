// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use tracing::debug;

use crate::geometry::Geometry;
use crate::gpu::Gpu;

/// Everything one pre-recorded draw needs to reference.
#[derive(Clone, Copy, Debug)]
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub geometry: Geometry,
}

/// One command buffer per swap chain image, recorded ahead of time.
///
/// A buffer is stale once anything it references has been recreated or the
/// clear color changed. Stale buffers are never submitted; the scheduler
/// re-records them first.
pub struct CommandRecorder {
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
    stale: Vec<bool>,
    clear: [f32; 4],
}

impl CommandRecorder {
    pub fn new<G: Gpu>(gpu: &G, count: usize, clear: [f32; 4]) -> VkResult<Self> {
        let pool = gpu.create_command_pool()?;
        let buffers = match gpu.allocate_command_buffers(pool, count as u32) {
            Ok(b) => b,
            Err(e) => {
                gpu.destroy_command_pool(pool);
                return Err(e);
            }
        };
        Ok(Self {
            pool,
            stale: vec![true; buffers.len()],
            buffers,
            clear,
        })
    }

    /// Matches the buffer count to a new image count. All buffers end up
    /// stale either way.
    pub fn resize<G: Gpu>(&mut self, gpu: &G, count: usize) -> VkResult<()> {
        if count != self.buffers.len() {
            debug!(from = self.buffers.len(), to = count, "reallocating command buffers");
            if !self.buffers.is_empty() {
                gpu.free_command_buffers(self.pool, &self.buffers);
            }
            self.buffers.clear();
            self.stale.clear();
            self.buffers = gpu.allocate_command_buffers(self.pool, count as u32)?;
            self.stale = vec![true; self.buffers.len()];
        }
        self.invalidate();
        Ok(())
    }

    pub fn invalidate(&mut self) {
        self.stale.iter_mut().for_each(|s| *s = true);
    }

    pub fn is_stale(&self, index: usize) -> bool {
        self.stale.get(index).copied().unwrap_or(true)
    }

    pub fn any_stale(&self) -> bool {
        self.stale.iter().any(|&s| s)
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = rgba;
        self.invalidate();
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffer(&self, index: usize) -> vk::CommandBuffer {
        self.buffers[index]
    }

    /// Records the full draw into buffer `index` and marks it fresh.
    ///
    /// The caller guarantees no pending submission still uses the buffer.
    pub fn record<G: Gpu>(&mut self, gpu: &G, index: usize, target: &DrawTarget) -> VkResult<()> {
        let cmd = self.buffers[index];
        gpu.begin_command_buffer(cmd)?;
        gpu.cmd_begin_render_pass(
            cmd,
            target.render_pass,
            target.framebuffer,
            target.extent,
            self.clear,
        );
        gpu.cmd_bind_pipeline(cmd, target.pipeline);
        gpu.cmd_set_viewport(cmd, target.extent);
        gpu.cmd_bind_descriptor_set(cmd, target.layout, target.descriptor_set);
        gpu.cmd_bind_vertex_buffer(cmd, target.geometry.vertex_buffer);
        gpu.cmd_bind_index_buffer(cmd, target.geometry.index_buffer, target.geometry.index_type);
        gpu.cmd_draw_indexed(cmd, target.geometry.index_count);
        gpu.cmd_end_render_pass(cmd);
        gpu.end_command_buffer(cmd)?;
        self.stale[index] = false;
        Ok(())
    }

    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        if !self.buffers.is_empty() {
            gpu.free_command_buffers(self.pool, &self.buffers);
            self.buffers.clear();
            self.stale.clear();
        }
        if self.pool != vk::CommandPool::null() {
            gpu.destroy_command_pool(self.pool);
            self.pool = vk::CommandPool::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockGpu};
    use ash::vk::Handle;

    fn geometry() -> Geometry {
        Geometry {
            vertex_buffer: vk::Buffer::from_raw(900),
            vertex_memory: vk::DeviceMemory::from_raw(901),
            index_buffer: vk::Buffer::from_raw(902),
            index_memory: vk::DeviceMemory::from_raw(903),
            index_count: 6,
            index_type: vk::IndexType::UINT16,
        }
    }

    fn target(geometry: Geometry) -> DrawTarget {
        DrawTarget {
            render_pass: vk::RenderPass::from_raw(800),
            framebuffer: vk::Framebuffer::from_raw(801),
            extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            pipeline: vk::Pipeline::from_raw(802),
            layout: vk::PipelineLayout::from_raw(803),
            descriptor_set: vk::DescriptorSet::from_raw(804),
            geometry,
        }
    }

    #[test]
    fn records_the_draw_sequence_in_order() {
        let gpu = MockGpu::new();
        let mut rec = CommandRecorder::new(&gpu, 3, [0.1, 0.2, 0.3, 1.0]).unwrap();
        let geo = geometry();
        gpu.clear_calls();

        rec.record(&gpu, 1, &target(geo)).unwrap();

        let cmd = rec.buffer(1);
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        assert_eq!(
            gpu.calls(),
            vec![
                Call::Begin(cmd),
                Call::BeginRenderPass {
                    cmd,
                    framebuffer: vk::Framebuffer::from_raw(801),
                    clear: [0.1f32, 0.2, 0.3, 1.0].map(f32::to_bits),
                },
                Call::BindPipeline(cmd, vk::Pipeline::from_raw(802)),
                Call::SetViewport(cmd, extent),
                Call::BindDescriptorSet(cmd, vk::DescriptorSet::from_raw(804)),
                Call::BindVertexBuffer(cmd, geo.vertex_buffer),
                Call::BindIndexBuffer(cmd, geo.index_buffer),
                Call::DrawIndexed(cmd, 6),
                Call::EndRenderPass(cmd),
                Call::End(cmd),
            ]
        );
        assert!(!rec.is_stale(1));
        assert!(rec.is_stale(0));
    }

    #[test]
    fn clear_color_change_marks_everything_stale() {
        let gpu = MockGpu::new();
        let mut rec = CommandRecorder::new(&gpu, 2, [0.0; 4]).unwrap();
        let geo = geometry();
        for i in 0..2 {
            rec.record(&gpu, i, &target(geo)).unwrap();
        }
        assert!(!rec.any_stale());
        rec.set_clear_color([1.0, 0.0, 0.0, 1.0]);
        assert!(rec.is_stale(0) && rec.is_stale(1));
        assert_eq!(rec.clear_color(), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn resize_reallocates_only_on_count_change() {
        let gpu = MockGpu::new();
        let mut rec = CommandRecorder::new(&gpu, 2, [0.0; 4]).unwrap();
        gpu.clear_calls();

        rec.resize(&gpu, 2).unwrap();
        assert!(gpu.calls().is_empty());
        assert!(rec.any_stale());

        rec.resize(&gpu, 4).unwrap();
        assert_eq!(
            gpu.calls(),
            vec![Call::FreeCommandBuffers(2), Call::AllocateCommandBuffers(4)]
        );
        assert_eq!(rec.len(), 4);
        assert!((0..4).all(|i| rec.is_stale(i)));
    }

    #[test]
    fn destroy_frees_buffers_then_pool() {
        let gpu = MockGpu::new();
        let mut rec = CommandRecorder::new(&gpu, 2, [0.0; 4]).unwrap();
        gpu.clear_calls();
        rec.destroy(&gpu);
        let calls = gpu.calls();
        assert_eq!(calls[0], Call::FreeCommandBuffers(2));
        assert!(matches!(calls[1], Call::DestroyCommandPool(_)));
        assert!(rec.is_empty());
    }
}
