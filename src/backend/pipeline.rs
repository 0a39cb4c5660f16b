// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: vertex input, shaders, rasterization, depth/stencil, blending.
// Viewport and scissor are dynamic; the pipeline is still rebuilt with the
// render pass whenever the swapchain changes format.

use anyhow::{Context, Result};
use ash::vk;
use std::mem::{offset_of, size_of};
use std::path::Path;
use std::sync::Arc;

use super::shader::{create_shader_module, load_spirv};
use super::VulkanDevice;
use crate::scene::Vertex;

pub const VERTEX_SHADER: &str = "cube.vert.spv";
pub const FRAGMENT_SHADER: &str = "cube.frag.spv";

/// Create a render pass for basic color attachment rendering with depth
pub fn create_render_pass(
    device: &VulkanDevice,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::RenderPass> {
    // Color attachment (the swapchain image)
    let color_attachment = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    // Depth attachment, discarded after the pass
    let depth_attachment = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    // Single subpass with color and depth
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];

    // Wait for the acquire semaphore's stage and for the previous user of
    // the shared depth image before writing attachments
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let attachments = [color_attachment, depth_attachment];
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe {
        device
            .device
            .create_render_pass(&render_pass_info, None)
            .context("Failed to create render pass")
    }
}

/// Create framebuffers for each swapchain image (with depth attachment)
pub fn create_framebuffers(
    device: &VulkanDevice,
    image_views: &[vk::ImageView],
    depth_image_view: vk::ImageView,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    image_views
        .iter()
        .map(|&image_view| {
            let attachments = [image_view, depth_image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            unsafe {
                device
                    .device
                    .create_framebuffer(&framebuffer_info, None)
                    .context("Failed to create framebuffer")
            }
        })
        .collect()
}

/// Vertex input description matching `scene::Vertex`
pub fn vertex_input_info() -> (
    [vk::VertexInputBindingDescription; 1],
    [vk::VertexInputAttributeDescription; 3],
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };

    let attribute = |location: u32, offset: usize| vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: offset as u32,
    };

    (
        [binding],
        [
            attribute(0, offset_of!(Vertex, position)),
            attribute(1, offset_of!(Vertex, normal)),
            attribute(2, offset_of!(Vertex, color)),
        ],
    )
}

/// The cube's graphics pipeline and its layout
pub struct CubePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    device: Arc<VulkanDevice>,
}

impl CubePipeline {
    /// Build the pipeline from `cube.vert.spv` / `cube.frag.spv` in `shader_dir`
    pub fn new(
        device: Arc<VulkanDevice>,
        render_pass: vk::RenderPass,
        descriptor_layout: vk::DescriptorSetLayout,
        shader_dir: &Path,
    ) -> Result<Self> {
        let vert_code = load_spirv(shader_dir.join(VERTEX_SHADER))?;
        let frag_code = load_spirv(shader_dir.join(FRAGMENT_SHADER))?;

        let vert_shader = create_shader_module(&device, &vert_code)?;
        let frag_shader = match create_shader_module(&device, &frag_code) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.device.destroy_shader_module(vert_shader, None) };
                return Err(e);
            }
        };

        let result = Self::build(&device, render_pass, descriptor_layout, vert_shader, frag_shader);

        // Modules are baked into the pipeline and can go right away
        unsafe {
            device.device.destroy_shader_module(vert_shader, None);
            device.device.destroy_shader_module(frag_shader, None);
        }

        let (pipeline, layout) = result?;
        Ok(Self {
            pipeline,
            layout,
            device,
        })
    }

    fn build(
        device: &VulkanDevice,
        render_pass: vk::RenderPass,
        descriptor_layout: vk::DescriptorSetLayout,
        vert_shader: vk::ShaderModule,
        frag_shader: vk::ShaderModule,
    ) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
        let entry_point = c"main";

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_shader)
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_shader)
                .name(entry_point),
        ];

        // Vertex input
        let (bindings, attributes) = vertex_input_info();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        // Input assembly
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Set per command buffer
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Rasterization
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        // Multisampling (disabled)
        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // Depth testing, closer fragments win
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        // Color blending (no blending, opaque)
        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        // Matrices come from the uniform buffer at set 0
        let set_layouts = [descriptor_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);

        let pipeline_layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .context("Failed to create pipeline layout")?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(pipeline_layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        match pipelines {
            Ok(pipelines) => Ok((pipelines[0], pipeline_layout)),
            Err((_, e)) => {
                unsafe { device.device.destroy_pipeline_layout(pipeline_layout, None) };
                Err(e).context("Failed to create graphics pipeline")
            }
        }
    }
}

impl Drop for CubePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_scene_vertex() {
        let (bindings, attributes) = vertex_input_info();
        assert_eq!(bindings[0].stride, 36);

        let locations: Vec<_> = attributes.iter().map(|a| (a.location, a.offset)).collect();
        assert_eq!(locations, vec![(0, 0), (1, 12), (2, 24)]);
        assert!(attributes
            .iter()
            .all(|a| a.format == vk::Format::R32G32B32_SFLOAT && a.binding == 0));
    }
}
