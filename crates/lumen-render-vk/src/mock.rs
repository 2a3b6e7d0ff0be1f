// SPDX-License-Identifier: CEPL-1.0
//! Recording [`Gpu`] double for unit tests.
//!
//! Hands out fresh non-null handles, keeps a trace of every call in issue
//! order and lets tests script acquire/present results and failures.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::gpu::{FrameSubmit, Gpu, MappedBuffer, SwapchainDesc};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreateSwapchain {
        handle: vk::SwapchainKHR,
        old: vk::SwapchainKHR,
        desc: SwapchainDesc,
    },
    DestroySwapchain(vk::SwapchainKHR),
    Acquire {
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    },
    Present {
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    },
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateRenderPass(vk::RenderPass, vk::Format),
    DestroyRenderPass(vk::RenderPass),
    CreateFramebuffer(vk::Framebuffer, vk::RenderPass),
    DestroyFramebuffer(vk::Framebuffer),
    CreateSetLayout(vk::DescriptorSetLayout),
    DestroySetLayout(vk::DescriptorSetLayout),
    CreatePipelineLayout(vk::PipelineLayout),
    DestroyPipelineLayout(vk::PipelineLayout),
    CreatePipeline(vk::Pipeline, vk::RenderPass),
    DestroyPipeline(vk::Pipeline),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateFence(vk::Fence, bool),
    DestroyFence(vk::Fence),
    /// Fence and timeout in nanoseconds.
    WaitFence(vk::Fence, u64),
    ResetFence(vk::Fence),
    CreateCommandPool(vk::CommandPool),
    DestroyCommandPool(vk::CommandPool),
    AllocateCommandBuffers(u32),
    FreeCommandBuffers(usize),
    Begin(vk::CommandBuffer),
    End(vk::CommandBuffer),
    BeginRenderPass {
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        clear: [u32; 4],
    },
    EndRenderPass(vk::CommandBuffer),
    BindPipeline(vk::CommandBuffer, vk::Pipeline),
    SetViewport(vk::CommandBuffer, vk::Extent2D),
    BindDescriptorSet(vk::CommandBuffer, vk::DescriptorSet),
    BindVertexBuffer(vk::CommandBuffer, vk::Buffer),
    BindIndexBuffer(vk::CommandBuffer, vk::Buffer),
    DrawIndexed(vk::CommandBuffer, u32),
    Submit(FrameSubmit),
    WaitIdle,
    CreateMappedBuffer(vk::Buffer),
    WriteMapped(vk::Buffer, usize),
    DestroyMappedBuffer(vk::Buffer),
    DestroyBuffer(vk::Buffer),
    CreateUniformSets(vk::DescriptorPool, usize),
    DestroyDescriptorPool(vk::DescriptorPool),
}

impl Call {
    pub fn is_destroy(&self) -> bool {
        matches!(
            self,
            Call::DestroySwapchain(_)
                | Call::DestroyImageView(_)
                | Call::DestroyRenderPass(_)
                | Call::DestroyFramebuffer(_)
                | Call::DestroySetLayout(_)
                | Call::DestroyPipelineLayout(_)
                | Call::DestroyPipeline(_)
                | Call::DestroySemaphore(_)
                | Call::DestroyFence(_)
                | Call::DestroyCommandPool(_)
                | Call::FreeCommandBuffers(_)
                | Call::DestroyMappedBuffer(_)
                | Call::DestroyBuffer(_)
                | Call::DestroyDescriptorPool(_)
        )
    }
}

pub struct MockGpu {
    calls: RefCell<Vec<Call>>,
    next_handle: Cell<u64>,
    caps: RefCell<vk::SurfaceCapabilitiesKHR>,
    formats: RefCell<Vec<vk::SurfaceFormatKHR>>,
    modes: RefCell<Vec<vk::PresentModeKHR>>,
    image_counts: RefCell<HashMap<u64, u32>>,
    acquire_script: RefCell<VecDeque<VkResult<(u32, bool)>>>,
    present_script: RefCell<VecDeque<VkResult<bool>>>,
    fence_script: RefCell<VecDeque<VkResult<()>>>,
    acquired: Cell<u32>,
    fail_submit: Cell<Option<vk::Result>>,
    fail_swapchain: Cell<Option<vk::Result>>,
}

impl Default for MockGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGpu {
    pub fn new() -> Self {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        Self {
            calls: RefCell::new(Vec::new()),
            next_handle: Cell::new(1),
            caps: RefCell::new(caps),
            formats: RefCell::new(vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ]),
            modes: RefCell::new(vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            image_counts: RefCell::new(HashMap::new()),
            acquire_script: RefCell::new(VecDeque::new()),
            present_script: RefCell::new(VecDeque::new()),
            fence_script: RefCell::new(VecDeque::new()),
            acquired: Cell::new(0),
            fail_submit: Cell::new(None),
            fail_swapchain: Cell::new(None),
        }
    }

    pub fn set_caps(&self, f: impl FnOnce(&mut vk::SurfaceCapabilitiesKHR)) {
        f(&mut self.caps.borrow_mut());
    }

    pub fn set_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        *self.formats.borrow_mut() = formats;
    }

    pub fn set_modes(&self, modes: Vec<vk::PresentModeKHR>) {
        *self.modes.borrow_mut() = modes;
    }

    pub fn push_acquire(&self, result: VkResult<(u32, bool)>) {
        self.acquire_script.borrow_mut().push_back(result);
    }

    pub fn push_present(&self, result: VkResult<bool>) {
        self.present_script.borrow_mut().push_back(result);
    }

    pub fn push_fence(&self, result: VkResult<()>) {
        self.fence_script.borrow_mut().push_back(result);
    }

    pub fn fail_next_submit(&self, err: vk::Result) {
        self.fail_submit.set(Some(err));
    }

    pub fn fail_next_swapchain(&self, err: vk::Result) {
        self.fail_swapchain.set(Some(err));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.borrow().iter().position(pred)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn handle<H: Handle>(&self) -> H {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        H::from_raw(raw)
    }
}

fn clear_bits(clear: [f32; 4]) -> [u32; 4] {
    clear.map(f32::to_bits)
}

impl Gpu for MockGpu {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(*self.caps.borrow())
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.formats.borrow().clone())
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.modes.borrow().clone())
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: vk::SwapchainKHR,
    ) -> VkResult<vk::SwapchainKHR> {
        if let Some(err) = self.fail_swapchain.take() {
            return Err(err);
        }
        let handle: vk::SwapchainKHR = self.handle();
        self.image_counts
            .borrow_mut()
            .insert(handle.as_raw(), desc.min_image_count);
        self.record(Call::CreateSwapchain {
            handle,
            old,
            desc: *desc,
        });
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let count = self
            .image_counts
            .borrow()
            .get(&swapchain.as_raw())
            .copied()
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        Ok((0..count).map(|_| self.handle()).collect())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.record(Call::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.record(Call::Acquire { swapchain, signal });
        if let Some(scripted) = self.acquire_script.borrow_mut().pop_front() {
            return scripted;
        }
        let count = self
            .image_counts
            .borrow()
            .get(&swapchain.as_raw())
            .copied()
            .unwrap_or(1);
        let n = self.acquired.get();
        self.acquired.set(n + 1);
        Ok((n % count, false))
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        self.record(Call::Present {
            swapchain,
            image_index,
            wait,
        });
        self.present_script
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(false))
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        let view = self.handle();
        self.record(Call::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.record(Call::DestroyImageView(view));
    }

    fn create_render_pass(&self, format: vk::Format) -> VkResult<vk::RenderPass> {
        let rp = self.handle();
        self.record(Call::CreateRenderPass(rp, format));
        Ok(rp)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.record(Call::DestroyRenderPass(render_pass));
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let fb = self.handle();
        self.record(Call::CreateFramebuffer(fb, render_pass));
        Ok(fb)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.record(Call::DestroyFramebuffer(framebuffer));
    }

    fn create_uniform_set_layout(&self) -> VkResult<vk::DescriptorSetLayout> {
        let layout = self.handle();
        self.record(Call::CreateSetLayout(layout));
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.record(Call::DestroySetLayout(layout));
    }

    fn create_pipeline_layout(
        &self,
        _set_layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::PipelineLayout> {
        let layout = self.handle();
        self.record(Call::CreatePipelineLayout(layout));
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.record(Call::DestroyPipelineLayout(layout));
    }

    fn create_graphics_pipeline(
        &self,
        render_pass: vk::RenderPass,
        _layout: vk::PipelineLayout,
    ) -> VkResult<vk::Pipeline> {
        let pipeline = self.handle();
        self.record(Call::CreatePipeline(pipeline, render_pass));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(Call::DestroyPipeline(pipeline));
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let sem = self.handle();
        self.record(Call::CreateSemaphore(sem));
        Ok(sem)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.record(Call::DestroySemaphore(semaphore));
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let fence = self.handle();
        self.record(Call::CreateFence(fence, signaled));
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.record(Call::DestroyFence(fence));
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        self.record(Call::WaitFence(fence, timeout));
        self.fence_script.borrow_mut().pop_front().unwrap_or(Ok(()))
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.record(Call::ResetFence(fence));
        Ok(())
    }

    fn create_command_pool(&self) -> VkResult<vk::CommandPool> {
        let pool = self.handle();
        self.record(Call::CreateCommandPool(pool));
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.record(Call::DestroyCommandPool(pool));
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        self.record(Call::AllocateCommandBuffers(count));
        Ok((0..count).map(|_| self.handle()).collect())
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        self.record(Call::FreeCommandBuffers(buffers.len()));
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::Begin(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::End(cmd));
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        _extent: vk::Extent2D,
        clear: [f32; 4],
    ) {
        self.record(Call::BeginRenderPass {
            cmd,
            framebuffer,
            clear: clear_bits(clear),
        });
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.record(Call::EndRenderPass(cmd));
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline(cmd, pipeline));
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        self.record(Call::SetViewport(cmd, extent));
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.record(Call::BindDescriptorSet(cmd, set));
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(Call::BindVertexBuffer(cmd, buffer));
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        _index_type: vk::IndexType,
    ) {
        self.record(Call::BindIndexBuffer(cmd, buffer));
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32) {
        self.record(Call::DrawIndexed(cmd, index_count));
    }

    fn queue_submit(&self, submit: &FrameSubmit) -> VkResult<()> {
        self.record(Call::Submit(*submit));
        match self.fail_submit.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        self.record(Call::WaitIdle);
        Ok(())
    }

    fn create_mapped_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
    ) -> VkResult<MappedBuffer> {
        let buffer = self.handle();
        self.record(Call::CreateMappedBuffer(buffer));
        Ok(MappedBuffer {
            buffer,
            memory: self.handle(),
            size,
            mapped: std::ptr::null_mut(),
        })
    }

    fn write_mapped(&self, buffer: &MappedBuffer, bytes: &[u8]) {
        self.record(Call::WriteMapped(buffer.buffer, bytes.len()));
    }

    fn destroy_mapped_buffer(&self, buffer: MappedBuffer) {
        self.record(Call::DestroyMappedBuffer(buffer.buffer));
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, _memory: vk::DeviceMemory) {
        self.record(Call::DestroyBuffer(buffer));
    }

    fn create_uniform_sets(
        &self,
        _layout: vk::DescriptorSetLayout,
        buffers: &[vk::Buffer],
        _range: vk::DeviceSize,
    ) -> VkResult<(vk::DescriptorPool, Vec<vk::DescriptorSet>)> {
        let pool = self.handle();
        self.record(Call::CreateUniformSets(pool, buffers.len()));
        Ok((pool, buffers.iter().map(|_| self.handle()).collect()))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.record(Call::DestroyDescriptorPool(pool));
    }
}
