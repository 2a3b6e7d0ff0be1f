// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;

use crate::gpu::Gpu;

/// Frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Sync objects for one in-flight frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlot {
    /// Signaled by acquire, waited on by the submit.
    pub image_available: vk::Semaphore,
    /// Signaled by the submit, waited on by present.
    pub render_finished: vk::Semaphore,
    /// Signaled when the slot's submission retires. Created signaled.
    pub in_flight: vk::Fence,
}

/// Fixed ring of [`FrameSlot`]s, reused round-robin.
pub struct FramePool {
    slots: Vec<FrameSlot>,
    current: usize,
}

impl FramePool {
    pub fn new<G: Gpu>(gpu: &G, count: usize) -> VkResult<Self> {
        let mut pool = Self {
            slots: Vec::with_capacity(count),
            current: 0,
        };
        for _ in 0..count {
            match Self::create_slot(gpu) {
                Ok(slot) => pool.slots.push(slot),
                Err(e) => {
                    pool.destroy(gpu);
                    return Err(e);
                }
            }
        }
        Ok(pool)
    }

    fn create_slot<G: Gpu>(gpu: &G) -> VkResult<FrameSlot> {
        let image_available = gpu.create_semaphore()?;
        let render_finished = match gpu.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                gpu.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight = match gpu.create_fence(true) {
            Ok(f) => f,
            Err(e) => {
                gpu.destroy_semaphore(render_finished);
                gpu.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        Ok(FrameSlot {
            image_available,
            render_finished,
            in_flight,
        })
    }

    pub fn current(&self) -> FrameSlot {
        self.slots[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn fences(&self) -> impl Iterator<Item = vk::Fence> + '_ {
        self.slots.iter().map(|s| s.in_flight)
    }

    /// Caller guarantees every fence has retired.
    pub fn destroy<G: Gpu>(&mut self, gpu: &G) {
        for slot in self.slots.drain(..) {
            gpu.destroy_fence(slot.in_flight);
            gpu.destroy_semaphore(slot.render_finished);
            gpu.destroy_semaphore(slot.image_available);
        }
        self.current = 0;
    }
}
