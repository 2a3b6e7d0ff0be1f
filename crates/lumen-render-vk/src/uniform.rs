// SPDX-License-Identifier: CEPL-1.0
use std::mem::size_of;

use ash::prelude::VkResult;
use ash::vk;
use lumen_math::UniformTransforms;

use crate::gpu::{Gpu, MappedBuffer};

/// Per-image uniform buffers and the descriptor sets pointing at them.
///
/// Sized to the swap chain image count and rebuilt alongside it.
pub struct UniformSet {
    buffers: Vec<MappedBuffer>,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl UniformSet {
    pub fn new<G: Gpu>(gpu: &G, layout: vk::DescriptorSetLayout, count: usize) -> VkResult<Self> {
        let size = size_of::<UniformTransforms>() as vk::DeviceSize;
        let mut this = Self {
            buffers: Vec::with_capacity(count),
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
        };
        for _ in 0..count {
            match gpu.create_mapped_buffer(size, vk::BufferUsageFlags::UNIFORM_BUFFER) {
                Ok(b) => this.buffers.push(b),
                Err(e) => {
                    this.destroy(gpu);
                    return Err(e);
                }
            }
        }
        let handles: Vec<vk::Buffer> = this.buffers.iter().map(|b| b.buffer).collect();
        match gpu.create_uniform_sets(layout, &handles, size) {
            Ok((pool, sets)) => {
                this.pool = pool;
                this.sets = sets;
            }
            Err(e) => {
                this.destroy(gpu);
                return Err(e);
            }
        }
        Ok(this)
    }

    /// Writes the transforms for `elapsed` seconds into image `index`'s
    /// buffer. The caller guarantees that image's previous use has retired.
    pub fn update<G: Gpu>(&self, gpu: &G, index: usize, elapsed: f32, aspect: f32) {
        let ubo = UniformTransforms::spinning(elapsed, aspect);
        gpu.write_mapped(&self.buffers[index], bytemuck::bytes_of(&ubo));
    }

    pub fn set(&self, index: usize) -> vk::DescriptorSet {
        self.sets[index]
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        if self.pool != vk::DescriptorPool::null() {
            gpu.destroy_descriptor_pool(self.pool);
            self.pool = vk::DescriptorPool::null();
        }
        self.sets.clear();
        for buffer in self.buffers.drain(..) {
            gpu.destroy_mapped_buffer(buffer);
        }
    }
}
