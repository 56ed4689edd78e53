//! Minimal forward graphics pipeline
//!
//! No vertex input (positions come from the vertex shader), no depth, dynamic
//! viewport and scissor so the pipeline survives swapchain resizes.

use ash::vk;

use super::device::Device;
use super::error::{VulkanError, VulkanResult};
use super::handles::HandleKind;
use super::shader::{create_shader_module, SHADER_ENTRY_POINT};
use crate::assets::ShaderResource;
use crate::foundation::TeardownStack;

/// Pipeline and its layout, destroyed pipeline first
pub struct GraphicsPipeline {
    teardown: TeardownStack,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create graphics pipeline
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        vertex: &ShaderResource,
        fragment: &ShaderResource,
    ) -> VulkanResult<Self> {
        // Modules are only needed until the pipeline exists
        let vertex_module = create_shader_module(device, vertex)?;
        let fragment_module = create_shader_module(device, fragment)?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vertex.stage().into())
                .module(*vertex_module)
                .name(SHADER_ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(fragment.stage().into())
                .module(*fragment_module)
                .name(SHADER_ENTRY_POINT)
                .build(),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.raw().create_pipeline_layout(&layout_info, None) }
            .map_err(|result| VulkanError::creation(HandleKind::PipelineLayout, result))?;
        let mut teardown = TeardownStack::new();
        let layout = teardown.adopt(device.own(layout));

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .raw()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, result)| VulkanError::creation(HandleKind::Pipeline, result))?;
        let pipeline = pipelines
            .first()
            .copied()
            .ok_or_else(|| VulkanError::creation(HandleKind::Pipeline, vk::Result::ERROR_UNKNOWN))?;
        let pipeline = teardown.adopt(device.own(pipeline));

        log::debug!("Created graphics pipeline");
        Ok(Self {
            teardown,
            pipeline,
            layout,
        })
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        self.teardown.teardown_all();
    }
}
