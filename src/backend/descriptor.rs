// Descriptor sets for the per-image uniform buffers
//
// One set per swapchain image; each points at that image's uniform buffer
// so recorded command buffers never share a buffer the CPU is writing.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::buffer::Buffer;
use super::VulkanDevice;
use crate::scene::UniformData;

/// Layout with a single uniform buffer at binding 0, read by the vertex stage
pub struct UniformLayout {
    pub layout: vk::DescriptorSetLayout,
    device: Arc<VulkanDevice>,
}

impl UniformLayout {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)];

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
            .context("Failed to create descriptor set layout")?;
        Ok(Self { layout, device })
    }
}

impl Drop for UniformLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

pub struct Descriptors {
    pub pool: vk::DescriptorPool,
    pub sets: Vec<vk::DescriptorSet>,
    device: Arc<VulkanDevice>,
}

impl Descriptors {
    /// Allocate one set per uniform buffer and point each set at its buffer
    pub fn new(
        device: Arc<VulkanDevice>,
        layout: vk::DescriptorSetLayout,
        uniform_buffers: &[Buffer],
    ) -> Result<Self> {
        let count = uniform_buffers.len() as u32;
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: count,
        }];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(count);

        let pool = unsafe { device.device.create_descriptor_pool(&pool_info, None) }
            .context("Failed to create descriptor pool")?;

        let mut this = Self {
            pool,
            sets: Vec::new(),
            device,
        };

        let layouts = vec![layout; uniform_buffers.len()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        this.sets = unsafe { this.device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")?;

        for (&set, buffer) in this.sets.iter().zip(uniform_buffers) {
            this.write_uniform(set, buffer);
        }

        Ok(this)
    }

    fn write_uniform(&self, set: vk::DescriptorSet, buffer: &Buffer) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: buffer.buffer,
            offset: 0,
            range: std::mem::size_of::<UniformData>() as vk::DeviceSize,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);

        unsafe { self.device.device.update_descriptor_sets(&[write], &[]) };
    }
}

impl Drop for Descriptors {
    fn drop(&mut self) {
        // Sets are freed with the pool
        unsafe {
            self.device.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}
