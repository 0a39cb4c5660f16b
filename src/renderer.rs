// =============================================================================
// RENDERER - owns every GPU resource and drives the frame ring
// =============================================================================
//
// RESOURCE TREE:
// ┌─────────────────────────────────────────────────────────────────┐
// │  VulkanDevice (Arc, outlives everything below)                  │
// │    ├── CommandPool, UniformLayout, cube vertex/index buffers    │
// │    ├── FrameSync x N          (one per ring slot, never rebuilt)│
// │    └── SwapchainResources     (rebuilt on resize/out-of-date)   │
// │          swapchain, depth, render pass, pipeline, framebuffers, │
// │          command buffers, uniform buffers, descriptor sets      │
// └─────────────────────────────────────────────────────────────────┘
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::buffer::{Buffer, DepthImage};
use crate::backend::command::CommandPool;
use crate::backend::descriptor::{Descriptors, UniformLayout};
use crate::backend::pipeline::{create_framebuffers, create_render_pass, CubePipeline};
use crate::backend::sync::FrameSync;
use crate::backend::{Swapchain, VulkanDevice};
use crate::config::Config;
use crate::frame::{Acquired, FrameDriver, FrameError, FrameRing, FrameStatus, Presented};
use crate::scene::{CubeMesh, UniformData};

/// Everything whose lifetime is tied to one swapchain.
///
/// Field order is drop order: GPU objects that reference the swapchain
/// images go first, the swapchain itself last.
struct SwapchainResources {
    /// One pre-recorded command buffer per swapchain image
    command_buffers: Vec<vk::CommandBuffer>,
    descriptors: Descriptors,
    /// One uniform buffer per swapchain image
    uniform_buffers: Vec<Buffer>,
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: CubePipeline,
    render_pass: vk::RenderPass,
    /// Only held so the framebuffers' depth attachment stays alive
    _depth: DepthImage,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,
}

/// Settings needed to (re)build swapchain resources
struct BuildParams<'a> {
    width: u32,
    height: u32,
    present_mode: vk::PresentModeKHR,
    shader_dir: &'a Path,
    layout: &'a UniformLayout,
    pool: &'a CommandPool,
    uniforms: &'a UniformData,
}

impl SwapchainResources {
    fn new(device: &Arc<VulkanDevice>, params: &BuildParams) -> Result<Self> {
        let swapchain = Swapchain::new(
            device.clone(),
            params.width,
            params.height,
            params.present_mode,
        )?;
        let depth = DepthImage::new(device.clone(), swapchain.extent)?;

        let render_pass = create_render_pass(device, swapchain.format, depth.format)?;
        // From here on a failure must not leak the render pass
        let rest = Self::build_rest(device, params, &swapchain, &depth, render_pass);
        let (pipeline, framebuffers, uniform_buffers, descriptors, command_buffers) = match rest {
            Ok(rest) => rest,
            Err(e) => {
                unsafe { device.device.destroy_render_pass(render_pass, None) };
                return Err(e);
            }
        };

        Ok(Self {
            command_buffers,
            descriptors,
            uniform_buffers,
            framebuffers,
            pipeline,
            render_pass,
            _depth: depth,
            swapchain,
            device: device.clone(),
        })
    }

    #[allow(clippy::type_complexity)]
    fn build_rest(
        device: &Arc<VulkanDevice>,
        params: &BuildParams,
        swapchain: &Swapchain,
        depth: &DepthImage,
        render_pass: vk::RenderPass,
    ) -> Result<(
        CubePipeline,
        Vec<vk::Framebuffer>,
        Vec<Buffer>,
        Descriptors,
        Vec<vk::CommandBuffer>,
    )> {
        let pipeline = CubePipeline::new(
            device.clone(),
            render_pass,
            params.layout.layout,
            params.shader_dir,
        )?;

        let framebuffers = create_framebuffers(
            device,
            &swapchain.image_views,
            depth.view,
            render_pass,
            swapchain.extent,
        )?;

        let built = (|| -> Result<_> {
            let uniform_buffers = (0..swapchain.image_count())
                .map(|i| {
                    let mut buffer = Buffer::new(
                        device.clone(),
                        &format!("uniforms[{}]", i),
                        size_of::<UniformData>() as vk::DeviceSize,
                        vk::BufferUsageFlags::UNIFORM_BUFFER,
                        gpu_allocator::MemoryLocation::CpuToGpu,
                    )?;
                    buffer.write(std::slice::from_ref(params.uniforms))?;
                    Ok(buffer)
                })
                .collect::<Result<Vec<_>>>()?;

            let descriptors =
                Descriptors::new(device.clone(), params.layout.layout, &uniform_buffers)?;
            let command_buffers = params.pool.allocate(swapchain.image_count() as u32)?;
            Ok((uniform_buffers, descriptors, command_buffers))
        })();

        match built {
            Ok((uniform_buffers, descriptors, command_buffers)) => Ok((
                pipeline,
                framebuffers,
                uniform_buffers,
                descriptors,
                command_buffers,
            )),
            Err(e) => {
                unsafe {
                    for &framebuffer in &framebuffers {
                        device.device.destroy_framebuffer(framebuffer, None);
                    }
                }
                Err(e)
            }
        }
    }
}

impl Drop for SwapchainResources {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

// =============================================================================
// FRAME DRIVER - the Vulkan half of the submission cycle
// =============================================================================

struct VulkanFrameDriver<'a> {
    device: &'a VulkanDevice,
    frames: &'a [FrameSync],
    resources: &'a mut SwapchainResources,
    uniforms: &'a UniformData,
}

impl FrameDriver for VulkanFrameDriver<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> Result<(), FrameError> {
        self.frames[slot].wait()
    }

    fn acquire_image(&mut self, slot: usize) -> Result<Acquired, FrameError> {
        self.resources
            .swapchain
            .acquire_next_image(u64::MAX, self.frames[slot].image_available)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<(), FrameError> {
        self.frames[slot].reset()
    }

    fn prepare_image(&mut self, image_index: u32) -> Result<(), FrameError> {
        self.resources.uniform_buffers[image_index as usize]
            .write(std::slice::from_ref(self.uniforms))
            .map_err(|e| FrameError::Upload(e.to_string()))
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<(), FrameError> {
        let sync = &self.frames[slot];

        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.resources.command_buffers[image_index as usize]];
        let signal_semaphores = [sync.render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                sync.in_flight_fence,
            )?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<Presented, FrameError> {
        self.resources.swapchain.present(
            self.device.graphics_queue,
            image_index,
            &[self.frames[slot].render_finished],
        )
    }
}

// =============================================================================
// RENDERER
// =============================================================================

/// Field order matters for Drop: per-slot sync and swapchain resources go
/// before the buffers, layout and pool they reference.
pub struct Renderer {
    frames: Vec<FrameSync>,
    resources: Option<SwapchainResources>,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    layout: UniformLayout,
    command_pool: CommandPool,
    ring: FrameRing,
    uniforms: UniformData,
    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,
    shader_dir: PathBuf,
    device: Arc<VulkanDevice>,
}

impl Renderer {
    pub fn new(device: Arc<VulkanDevice>, config: &Config, width: u32, height: u32) -> Result<Self> {
        let command_pool = CommandPool::new(device.clone())?;
        let layout = UniformLayout::new(device.clone())?;

        let mesh = CubeMesh::new(0.5);
        let vertex_buffer = Buffer::with_data(
            device.clone(),
            "cube vertices",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &mesh.vertices,
        )?;
        let index_buffer = Buffer::with_data(
            device.clone(),
            "cube indices",
            vk::BufferUsageFlags::INDEX_BUFFER,
            &mesh.indices,
        )?;

        let uniforms = UniformData::default();
        let present_mode = config.present_mode();
        let shader_dir = PathBuf::from(&config.graphics.shader_dir);

        let resources = SwapchainResources::new(
            &device,
            &BuildParams {
                width,
                height,
                present_mode,
                shader_dir: &shader_dir,
                layout: &layout,
                pool: &command_pool,
                uniforms: &uniforms,
            },
        )?;

        let images = resources.swapchain.image_count();
        let slots = config.frames_in_flight(images);
        let frames = (0..slots)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()
            .context("Failed to create frame sync objects")?;
        log::info!("{} frames in flight over {} swapchain images", slots, images);

        let mut renderer = Self {
            frames,
            resources: None,
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
            layout,
            command_pool,
            ring: FrameRing::new(slots, images),
            uniforms,
            clear_color: config.graphics.clear_color,
            present_mode,
            shader_dir,
            device,
        };
        renderer.record_command_buffers(&resources)?;
        renderer.resources = Some(resources);

        log::info!("Renderer initialized");
        Ok(renderer)
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Run one iteration of the frame cycle.
    ///
    /// Reports [`FrameStatus::OutOfDate`] while no swapchain exists (e.g.
    /// after a failed rebuild) so the caller retries the rebuild.
    pub fn draw(&mut self) -> Result<FrameStatus, FrameError> {
        let Some(resources) = self.resources.as_mut() else {
            return Ok(FrameStatus::OutOfDate);
        };

        let mut driver = VulkanFrameDriver {
            device: &self.device,
            frames: &self.frames,
            resources,
            uniforms: &self.uniforms,
        };
        self.ring.draw(&mut driver)
    }

    /// Matrices written into the acquired image's uniform buffer on the next draw
    pub fn set_uniforms(&mut self, uniforms: UniformData) {
        self.uniforms = uniforms;
    }

    /// Rebuild the swapchain and everything that depends on it
    pub fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        // No submission may still reference the old images
        self.device.wait_idle()?;

        if let Some(old) = self.resources.take() {
            self.command_pool.free(&old.command_buffers);
            // Only one swapchain per surface: drop the old one first
            drop(old);
        }

        let resources = SwapchainResources::new(
            &self.device,
            &BuildParams {
                width,
                height,
                present_mode: self.present_mode,
                shader_dir: &self.shader_dir,
                layout: &self.layout,
                pool: &self.command_pool,
                uniforms: &self.uniforms,
            },
        )?;

        log::info!(
            "Swapchain rebuilt: {}x{}, {:?}, {} images",
            resources.swapchain.extent.width,
            resources.swapchain.extent.height,
            resources.swapchain.present_mode,
            resources.swapchain.image_count()
        );
        self.ring.reset_images(resources.swapchain.image_count());
        self.record_command_buffers(&resources)?;
        self.resources = Some(resources);
        Ok(())
    }

    /// Change the clear color, re-recording the per-image command buffers
    pub fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        if self.clear_color == color {
            return Ok(());
        }
        self.clear_color = color;

        if let Some(resources) = self.resources.as_ref() {
            // Recording over a pending buffer is invalid
            self.device.wait_idle()?;
            self.record_command_buffers(resources)?;
        }
        Ok(())
    }

    pub fn frames_in_flight(&self) -> usize {
        self.ring.slots()
    }

    pub fn image_count(&self) -> usize {
        self.resources
            .as_ref()
            .map_or(0, |r| r.swapchain.image_count())
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.resources.as_ref().map(|r| r.swapchain.extent)
    }

    /// Slot the next frame will be recorded on
    pub fn current_slot(&self) -> usize {
        self.ring.current_slot()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.ring.frames_submitted()
    }

    // =========================================================================
    // COMMAND RECORDING
    // =========================================================================

    /// Pre-record one command buffer per swapchain image.
    ///
    /// Only the uniform buffer contents change per frame, so the recorded
    /// commands stay valid until the swapchain or the clear color changes.
    fn record_command_buffers(&self, resources: &SwapchainResources) -> Result<()> {
        let device = &self.device.device;
        let extent = resources.swapchain.extent;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        for (i, &cmd) in resources.command_buffers.iter().enumerate() {
            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(resources.render_pass)
                .framebuffer(resources.framebuffers[i])
                .render_area(scissor)
                .clear_values(&clear_values);

            unsafe {
                // Begin implicitly resets; the pool allows per-buffer reset
                let begin_info = vk::CommandBufferBeginInfo::default();
                device
                    .begin_command_buffer(cmd, &begin_info)
                    .context("Failed to begin command buffer")?;

                device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
                device.cmd_bind_pipeline(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    resources.pipeline.pipeline,
                );
                device.cmd_set_viewport(cmd, 0, &[viewport]);
                device.cmd_set_scissor(cmd, 0, &[scissor]);

                device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
                device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    resources.pipeline.layout,
                    0,
                    &[resources.descriptors.sets[i]],
                    &[],
                );
                device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);

                device.cmd_end_render_pass(cmd);
                device
                    .end_command_buffer(cmd)
                    .context("Failed to end command buffer")?;
            }
        }

        log::debug!(
            "Recorded {} command buffers",
            resources.command_buffers.len()
        );
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer resources...");
        // Wait for GPU to finish before destroying anything
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle failed during shutdown: {:?}", e);
        }
    }
}
