// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, device and queues.

use std::ffi::CStr;

use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use lumen_render::RenderOptions;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use crate::debug::{messenger_info, SinkBox, ValidationSink};
use crate::error::SetupError;
use crate::geometry::{Geometry, Vertex};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Each family once, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

struct Validation {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    // Must outlive `messenger`; its address is the callback's user data.
    _sink: Box<SinkBox>,
}

/// Owns every Vulkan object that outlives a swap chain. Implements
/// [`crate::Gpu`] for the frame core.
pub struct VkContext {
    _entry: Entry,
    pub(crate) instance: Instance,
    validation: Option<Validation>,
    pub(crate) surface_loader: surface::Instance,
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) phys: vk::PhysicalDevice,
    pub(crate) memory: vk::PhysicalDeviceMemoryProperties,
    pub(crate) device: ash::Device,
    pub(crate) swapchain_loader: swapchain::Device,
    pub(crate) families: QueueFamilies,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
    /// Transient pool for one-shot uploads.
    upload_pool: vk::CommandPool,
}

fn ext_name(props: &vk::ExtensionProperties) -> &CStr {
    // Driver-provided, nul-terminated within the fixed array.
    unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }
}

unsafe fn create_instance(
    entry: &Entry,
    display: raw_window_handle::RawDisplayHandle,
    validation: bool,
) -> Result<Instance> {
    let app = c"lumen";

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let available = unsafe { entry.enumerate_instance_extension_properties(None) }
        .context("enumerate_instance_extension_properties")?;
    debug!("{} instance extensions available:", available.len());
    for ext in &available {
        debug!("  {}", ext_name(ext).to_string_lossy());
    }

    let mut extensions = ash_window::enumerate_required_extensions(display)
        .context("enumerate_required_extensions")?
        .to_vec();
    let mut layers = Vec::new();
    if validation {
        let have_layer = unsafe { entry.enumerate_instance_layer_properties() }
            .context("enumerate_instance_layer_properties")?
            .iter()
            .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER);
        if !have_layer {
            return Err(SetupError::ValidationUnavailable("VK_LAYER_KHRONOS_validation").into());
        }
        layers.push(VALIDATION_LAYER.as_ptr());
        extensions.push(debug_utils::NAME.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    Ok(unsafe { entry.create_instance(&create_info, None) }?)
}

/// First device with a graphics family, a present-capable family, the
/// swapchain extension and a usable surface.
unsafe fn pick_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    for phys in unsafe { instance.enumerate_physical_devices() }? {
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

        let qprops = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        let graphics = qprops
            .iter()
            .position(|q| q.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);
        let present = (0..qprops.len() as u32).find(|&i| unsafe {
            surface_loader
                .get_physical_device_surface_support(phys, i, surface)
                .unwrap_or(false)
        });
        let (Some(graphics), Some(present)) = (graphics, present) else {
            debug!("skipping {name}: missing graphics or present queue");
            continue;
        };

        let has_swapchain = unsafe { instance.enumerate_device_extension_properties(phys) }
            .unwrap_or_default()
            .iter()
            .any(|e| ext_name(e) == swapchain::NAME);
        if !has_swapchain {
            debug!("skipping {name}: no {}", swapchain::NAME.to_string_lossy());
            continue;
        }

        let formats = unsafe { surface_loader.get_physical_device_surface_formats(phys, surface) }
            .unwrap_or_default();
        let modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(phys, surface) }
                .unwrap_or_default();
        if formats.is_empty() || modes.is_empty() {
            debug!("skipping {name}: surface has no formats or present modes");
            continue;
        }

        info!("using GPU {name} (graphics family {graphics}, present family {present})");
        return Ok((phys, QueueFamilies { graphics, present }));
    }
    Err(SetupError::NoSuitableGpu.into())
}

unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<_> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let device_exts = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    unsafe { instance.create_device(phys, &dinfo, None) }.context("create_device")
}

impl VkContext {
    /// Instance (plus validation when requested), surface, device, queues.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        options: &RenderOptions,
        sink: Box<dyn ValidationSink>,
    ) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow::anyhow!("{e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow::anyhow!("{e}"))?
            .as_raw();

        let entry = Entry::linked();
        let instance = unsafe { create_instance(&entry, dh, options.validation) }
            .context("create_instance")?;

        let validation = if options.validation {
            let loader = debug_utils::Instance::new(&entry, &instance);
            let sink = Box::new(sink);
            let info = messenger_info(&sink);
            match unsafe { loader.create_debug_utils_messenger(&info, None) } {
                Ok(messenger) => Some(Validation {
                    loader,
                    messenger,
                    _sink: sink,
                }),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e).context("create_debug_utils_messenger");
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = match unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) }
        {
            Ok(s) => s,
            Err(e) => {
                unsafe { destroy_instance_level(&instance, validation.as_ref()) };
                return Err(e).context("ash_window::create_surface");
            }
        };

        let picked = unsafe { pick_device(&instance, &surface_loader, surface) }
            .and_then(|(phys, families)| {
                let device = unsafe { create_device(&instance, phys, families) }?;
                Ok((phys, families, device))
            });
        let (phys, families, device) = match picked {
            Ok(p) => p,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    destroy_instance_level(&instance, validation.as_ref());
                }
                return Err(e);
            }
        };

        let memory = unsafe { instance.get_physical_device_memory_properties(phys) };
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        let mut ctx = Self {
            _entry: entry,
            instance,
            validation,
            surface_loader,
            surface,
            phys,
            memory,
            device,
            swapchain_loader,
            families,
            graphics_queue,
            present_queue,
            upload_pool: vk::CommandPool::null(),
        };
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: families.graphics,
            flags: vk::CommandPoolCreateFlags::TRANSIENT,
            ..Default::default()
        };
        ctx.upload_pool = unsafe { ctx.device.create_command_pool(&pool_info, None) }
            .context("create_command_pool(upload)")?;
        Ok(ctx)
    }

    pub(crate) fn memory_type(
        &self,
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<u32, SetupError> {
        (0..self.memory.memory_type_count)
            .find(|&i| {
                type_bits & (1 << i) != 0
                    && self.memory.memory_types[i as usize]
                        .property_flags
                        .contains(flags)
            })
            .ok_or(SetupError::NoMemoryType { type_bits, flags })
    }

    pub(crate) unsafe fn create_buffer_and_memory(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let d = &self.device;
        let buf = unsafe { d.create_buffer(&bci, None) }?;
        let req = unsafe { d.get_buffer_memory_requirements(buf) };
        let allocated = self
            .memory_type(req.memory_type_bits, props)
            .map_err(anyhow::Error::from)
            .and_then(|memory_type_index| {
                let mai = vk::MemoryAllocateInfo {
                    s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                    allocation_size: req.size,
                    memory_type_index,
                    ..Default::default()
                };
                Ok(unsafe { d.allocate_memory(&mai, None) }?)
            });
        let mem = match allocated {
            Ok(mem) => mem,
            Err(e) => {
                unsafe { d.destroy_buffer(buf, None) };
                return Err(e);
            }
        };
        if let Err(e) = unsafe { d.bind_buffer_memory(buf, mem, 0) } {
            unsafe {
                d.destroy_buffer(buf, None);
                d.free_memory(mem, None);
            }
            return Err(e.into());
        }
        Ok((buf, mem))
    }

    /// Copies `data` into `dst` through a host-visible staging buffer and
    /// waits for the copy to finish.
    unsafe fn upload_via_staging(&self, dst: vk::Buffer, data: &[u8]) -> Result<()> {
        let d = &self.device;
        let size = data.len() as vk::DeviceSize;
        let (staging, staging_mem) = unsafe {
            self.create_buffer_and_memory(
                size,
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )
        }?;

        let result = (|| -> Result<()> {
            let ptr = unsafe { d.map_memory(staging_mem, 0, size, vk::MemoryMapFlags::empty()) }?;
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
                d.unmap_memory(staging_mem);
            }

            let ai = vk::CommandBufferAllocateInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
                command_pool: self.upload_pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: 1,
                ..Default::default()
            };
            let cmd = unsafe { d.allocate_command_buffers(&ai) }?[0];
            let bi = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            let si = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                command_buffer_count: 1,
                p_command_buffers: &cmd,
                ..Default::default()
            };
            let submitted = unsafe {
                d.begin_command_buffer(cmd, &bi)
                    .and_then(|()| {
                        d.cmd_copy_buffer(cmd, staging, dst, std::slice::from_ref(&region));
                        d.end_command_buffer(cmd)
                    })
                    .and_then(|()| {
                        d.queue_submit(
                            self.graphics_queue,
                            std::slice::from_ref(&si),
                            vk::Fence::null(),
                        )
                    })
                    .and_then(|()| d.queue_wait_idle(self.graphics_queue))
            };
            unsafe { d.free_command_buffers(self.upload_pool, std::slice::from_ref(&cmd)) };
            Ok(submitted?)
        })();

        unsafe {
            d.destroy_buffer(staging, None);
            d.free_memory(staging_mem, None);
        }
        result
    }

    unsafe fn device_local_buffer(
        &self,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let (buf, mem) = unsafe {
            self.create_buffer_and_memory(
                data.len() as vk::DeviceSize,
                usage | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
        }?;
        if let Err(e) = unsafe { self.upload_via_staging(buf, data) } {
            unsafe {
                self.device.destroy_buffer(buf, None);
                self.device.free_memory(mem, None);
            }
            return Err(e);
        }
        Ok((buf, mem))
    }

    /// Uploads indexed triangle geometry into device-local buffers.
    pub fn upload_geometry(&self, vertices: &[Vertex], indices: &[u16]) -> Result<Geometry> {
        let (vertex_buffer, vertex_memory) = unsafe {
            self.device_local_buffer(
                bytemuck::cast_slice(vertices),
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )
        }
        .context("vertex buffer")?;
        let index = unsafe {
            self.device_local_buffer(bytemuck::cast_slice(indices), vk::BufferUsageFlags::INDEX_BUFFER)
        };
        let (index_buffer, index_memory) = match index {
            Ok(b) => b,
            Err(e) => {
                unsafe {
                    self.device.destroy_buffer(vertex_buffer, None);
                    self.device.free_memory(vertex_memory, None);
                }
                return Err(e.context("index buffer"));
            }
        };
        debug!(
            "uploaded {} vertices, {} indices",
            vertices.len(),
            indices.len()
        );
        Ok(Geometry {
            vertex_buffer,
            vertex_memory,
            index_buffer,
            index_memory,
            index_count: indices.len() as u32,
            index_type: vk::IndexType::UINT16,
        })
    }

    pub fn queue_families(&self) -> QueueFamilies {
        self.families
    }
}

unsafe fn destroy_instance_level(instance: &Instance, validation: Option<&Validation>) {
    if let Some(v) = validation {
        unsafe { v.loader.destroy_debug_utils_messenger(v.messenger, None) };
    }
    unsafe { instance.destroy_instance(None) };
}

// Swap-chain-level objects are gone by now; the renderer shuts its frame
// core down before the context drops.
impl Drop for VkContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.upload_pool, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            destroy_instance_level(&self.instance, self.validation.as_ref());
        }
    }
}
