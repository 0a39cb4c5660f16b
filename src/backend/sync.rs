// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync.
// One FrameSync per slot of the frame ring.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::frame::FrameError;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    /// Signaled by acquire, waited on by submit
    pub image_available: vk::Semaphore,
    /// Signaled by submit, waited on by present
    pub render_finished: vk::Semaphore,
    /// Signaled when the slot's submission retires
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Start signaled so the first wait on every slot returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                image_available: device.device.create_semaphore(&semaphore_info, None)?,
                render_finished: device.device.create_semaphore(&semaphore_info, None)?,
                in_flight_fence: device.device.create_fence(&fence_info, None)?,
                device: device.clone(),
            })
        }
    }

    pub fn wait(&self) -> Result<(), FrameError> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.in_flight_fence], true, u64::MAX)?;
        }
        Ok(())
    }

    pub fn reset(&self) -> Result<(), FrameError> {
        unsafe {
            self.device.device.reset_fences(&[self.in_flight_fence])?;
        }
        Ok(())
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
