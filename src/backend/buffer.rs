// Buffers and images backed by gpu-allocator
//
// Vertex, index and uniform buffers live in host-visible memory so they can
// be written directly; the depth image lives in device-local memory.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::VulkanDevice;

/// GPU buffer with its own allocation
pub struct Buffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl Buffer {
    /// Helper to create a GPU buffer with specified usage and memory location
    pub fn new(
        device: Arc<VulkanDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create buffer '{}'", name))?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e).with_context(|| format!("Failed to allocate buffer '{}'", name));
            }
        };

        let memory = unsafe { allocation.memory() };
        let offset = allocation.offset();
        let this = Self {
            buffer,
            allocation: Some(allocation),
            device,
        };

        // From here on Drop cleans up if binding fails
        unsafe { this.device.device.bind_buffer_memory(buffer, memory, offset) }
            .with_context(|| format!("Failed to bind buffer memory '{}'", name))?;
        Ok(this)
    }

    /// Create a host-visible buffer and fill it with data
    pub fn with_data<T: Pod>(
        device: Arc<VulkanDevice>,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut buffer = Self::new(
            device,
            name,
            bytes.len() as vk::DeviceSize,
            usage,
            MemoryLocation::CpuToGpu,
        )?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// Copy `data` to the start of the buffer
    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|a| a.mapped_slice_mut())
            .context("Buffer is not host visible")?;

        if bytes.len() > mapped.len() {
            anyhow::bail!(
                "Write of {} bytes overflows buffer of {} bytes",
                bytes.len(),
                mapped.len()
            );
        }
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
    }
}

/// Depth attachment: image, memory and view
pub struct DepthImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl DepthImage {
    pub fn new(device: Arc<VulkanDevice>, extent: vk::Extent2D) -> Result<Self> {
        let format = device.depth_format;

        // Create depth image
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .context("Failed to create depth image")?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
            name: "depth",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e).context("Failed to allocate depth image memory");
            }
        };

        let mut this = Self {
            image,
            view: vk::ImageView::null(),
            format,
            allocation: None,
            device: device.clone(),
        };
        let memory = unsafe { allocation.memory() };
        let offset = allocation.offset();
        this.allocation = Some(allocation);

        unsafe { device.device.bind_image_memory(image, memory, offset) }
            .context("Failed to bind depth image memory")?;

        // Create image view
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        this.view = unsafe { device.device.create_image_view(&view_info, None) }
            .context("Failed to create depth image view")?;

        Ok(this)
    }
}

impl Drop for DepthImage {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.device.destroy_image_view(self.view, None);
            }
            self.device.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::error!("Failed to free depth image memory: {}", e);
            }
        }
    }
}
