// Command pool for the graphics queue
//
// Buffers are pre-recorded once per swapchain image and replayed every
// frame; RESET_COMMAND_BUFFER lets us re-record one without touching the rest.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

pub struct CommandPool {
    pub pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        Ok(Self { pool, device })
    }

    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;
        Ok(buffers)
    }

    /// Caller guarantees none of `buffers` is still executing
    pub fn free(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe {
            self.device.device.free_command_buffers(self.pool, buffers);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}
