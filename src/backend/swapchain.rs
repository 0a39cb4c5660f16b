// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Acquire/present report "out of date" as an outcome, not an error, so the
// renderer can rebuild instead of bailing out.

use anyhow::{Context, Result};
use ash::khr::swapchain;
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::frame::{Acquired, FrameError, Presented};

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        width: u32,
        height: u32,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let surface_loader = &device.surface_loader;
        let surface = device.surface;

        // Query surface capabilities
        let surface_caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(device.physical_device, surface)
        }?;

        // Query supported formats
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(device.physical_device, surface)
        }?;

        // Query supported present modes
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device.physical_device, surface)
        }?;

        let surface_format = choose_surface_format(&formats).context("No suitable surface format")?;
        let present_mode = choose_present_mode(&present_modes, preferred_present_mode);
        let extent = choose_extent(&surface_caps, width, height);
        let image_count = choose_image_count(&surface_caps);

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images requested",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count
        );

        // Create swapchain
        let swapchain_loader = swapchain::Device::new(&device.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // Owned from here on, so Drop cleans up whatever was created
        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
            present_mode,
            device,
        };

        // Get swapchain images
        this.images = unsafe { this.swapchain_loader.get_swapchain_images(swapchain) }?;

        log::info!("Created swapchain with {} images", this.images.len());

        // Create image views
        for &image in &this.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { this.device.device.create_image_view(&create_info, None) }
                .context("Failed to create image view")?;
            this.image_views.push(view);
        }

        Ok(this)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire next image for rendering
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> Result<Acquired, FrameError> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<Presented, FrameError> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(Presented::Done { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Prefer 8-bit sRGB, otherwise take whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    // A single UNDEFINED entry means "anything goes"
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            });
        }
    }

    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Use the configured mode when the surface has it; FIFO is always available
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        log::warn!("Present mode {:?} unsupported, using FIFO", preferred);
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum so we never wait on the driver to release an image
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        image_count = caps.max_image_count;
    }
    image_count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 16,
                height: 16,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn srgb_format_is_preferred() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn first_format_is_the_fallback() {
        let formats = [format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn undefined_format_means_free_choice() {
        let formats = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_SRGB)
        );
    }

    #[test]
    fn unsupported_present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_is_clamped_when_surface_leaves_it_open() {
        let caps = caps(2, 3);
        let extent = choose_extent(&caps, 8000, 4);
        assert_eq!((extent.width, extent.height), (4096, 16));
    }

    #[test]
    fn current_extent_wins() {
        let mut caps = caps(2, 3);
        caps.current_extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn image_count_respects_limits() {
        assert_eq!(choose_image_count(&caps(2, 3)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
        // max == 0 means unbounded
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
    }
}
