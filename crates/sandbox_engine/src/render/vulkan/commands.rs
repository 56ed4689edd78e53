//! Command pool and per-frame command recording

use ash::vk;

use super::device::Device;
use super::error::{VulkanError, VulkanResult};
use super::handles::{HandleKind, OwnedCommandPool};

/// Command pool plus primary buffers allocated from it
///
/// Buffers are freed with the pool.
pub struct CommandPool {
    pool: OwnedCommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandPool {
    /// Create a resettable pool on `queue_family` with `count` primary buffers
    pub fn new(device: &Device, queue_family: u32, count: u32) -> VulkanResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        let pool = unsafe { device.raw().create_command_pool(&pool_info, None) }
            .map_err(|result| VulkanError::creation(HandleKind::CommandPool, result))?;
        let pool = device.own(pool);

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let buffers =
            unsafe { device.raw().allocate_command_buffers(&alloc_info) }.map_err(VulkanError::Api)?;

        Ok(Self { pool, buffers })
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        *self.pool
    }

    /// Buffer for frame slot `index`
    pub fn buffer(&self, index: usize) -> Option<vk::CommandBuffer> {
        self.buffers.get(index).copied()
    }
}

/// Everything needed to record the default pass for one image
#[derive(Debug, Clone, Copy)]
pub struct PassTargets {
    /// Render pass to begin
    pub render_pass: vk::RenderPass,
    /// Framebuffer of the acquired image
    pub framebuffer: vk::Framebuffer,
    /// Render area
    pub extent: vk::Extent2D,
    /// Pipeline to bind, if any
    pub pipeline: Option<vk::Pipeline>,
    /// Clear colour (RGBA)
    pub clear_color: [f32; 4],
}

/// Reset `buffer` and record one pass: clear, then draw a triangle if a
/// pipeline is bound
pub fn record_pass(device: &ash::Device, buffer: vk::CommandBuffer, targets: &PassTargets) -> VulkanResult<()> {
    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: targets.clear_color,
        },
    }];
    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: targets.extent,
    };

    unsafe {
        device
            .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())
            .map_err(VulkanError::Api)?;
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device
            .begin_command_buffer(buffer, &begin_info)
            .map_err(VulkanError::Api)?;

        let pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(targets.render_pass)
            .framebuffer(targets.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);
        device.cmd_begin_render_pass(buffer, &pass_info, vk::SubpassContents::INLINE);

        if let Some(pipeline) = targets.pipeline {
            #[allow(clippy::cast_precision_loss)]
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: targets.extent.width as f32,
                height: targets.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_bind_pipeline(buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
            device.cmd_set_viewport(buffer, 0, &[viewport]);
            device.cmd_set_scissor(buffer, 0, &[render_area]);
            device.cmd_draw(buffer, 3, 1, 0, 0);
        }

        device.cmd_end_render_pass(buffer);
        device.end_command_buffer(buffer).map_err(VulkanError::Api)?;
    }
    Ok(())
}
