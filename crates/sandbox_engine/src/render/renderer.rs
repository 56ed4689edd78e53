//! Per-surface rendering objects and the frame entry point

use ash::vk;

use super::vulkan::{
    create_forward_pass, record_pass, CommandPool, Device, FrameOutcome, FrameSync, Framebuffers,
    GraphicsPipeline, Instance, PassTargets, PhysicalDevice, Swapchain, VulkanError, VulkanResult,
};
use super::vulkan::handles::{OwnedRenderPass, OwnedSurface};
use crate::assets::ShaderResource;
use crate::core::config::VulkanConfig;

/// Default clear colour (dark slate)
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.08, 1.0];

/// Swapchain and everything built from it or for it
///
/// Owned parts are released by [`Drop`] children first: sync objects, command
/// pool, framebuffers, pipeline, render pass, swapchain, surface. The device
/// must be idle and still alive when a `Renderer` is dropped.
pub struct Renderer {
    frame_sync: Option<FrameSync>,
    commands: Option<CommandPool>,
    framebuffers: Option<Framebuffers>,
    pipeline: Option<GraphicsPipeline>,
    render_pass: Option<OwnedRenderPass>,
    swapchain: Option<Swapchain>,
    surface: Option<OwnedSurface>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    color_format: vk::Format,
    clear_color: [f32; 4],
    desired_extent: vk::Extent2D,
    needs_recreate: bool,
}

impl Renderer {
    /// Build swapchain, render pass, framebuffers, pipeline, commands and
    /// frame sync for `surface`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: &Instance,
        device: &Device,
        physical: &PhysicalDevice,
        surface: OwnedSurface,
        extent: vk::Extent2D,
        vertex: &ShaderResource,
        fragment: &ShaderResource,
        config: &VulkanConfig,
    ) -> VulkanResult<Self> {
        let graphics_queue = device.queue(physical.graphics_family, 0).ok_or(
            VulkanError::MissingField("graphics queue"),
        )?;
        let present_family = physical.present_family.unwrap_or(physical.graphics_family);
        let present_queue = device
            .queue(present_family, 0)
            .ok_or(VulkanError::MissingField("present queue"))?;

        let swapchain = Swapchain::new(
            device,
            instance.surface_loader(),
            physical,
            *surface,
            extent,
            vk::SwapchainKHR::null(),
        )?;
        let color_format = swapchain.format().format;
        let render_pass = create_forward_pass(device, color_format)?;
        let framebuffers = Framebuffers::new(device, *render_pass, &swapchain)?;
        let pipeline = GraphicsPipeline::new(device, *render_pass, vertex, fragment)?;

        let frames = config.max_frames_in_flight;
        let buffer_count = u32::try_from(frames).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("{frames} frames in flight is too many"),
        })?;
        let commands = CommandPool::new(device, physical.graphics_family, buffer_count)?;
        let frame_sync = FrameSync::new(device, frames, config.frame_timeout_ns())?;

        Ok(Self {
            frame_sync: Some(frame_sync),
            commands: Some(commands),
            framebuffers: Some(framebuffers),
            pipeline: Some(pipeline),
            render_pass: Some(render_pass),
            swapchain: Some(swapchain),
            surface: Some(surface),
            graphics_queue,
            present_queue,
            color_format,
            clear_color: DEFAULT_CLEAR_COLOR,
            desired_extent: extent,
            needs_recreate: false,
        })
    }

    /// Record a new framebuffer size; the swapchain is rebuilt on the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        self.desired_extent = vk::Extent2D { width, height };
        self.needs_recreate = true;
    }

    /// Set the clear colour used by following frames
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Current swapchain extent
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(Swapchain::extent)
    }

    /// Draw one frame
    ///
    /// A zero-sized framebuffer (minimised window) skips the frame. An
    /// out-of-date or suboptimal swapchain is rebuilt before the next frame.
    pub fn draw_frame(
        &mut self,
        instance: &Instance,
        device: &Device,
        physical: &PhysicalDevice,
    ) -> VulkanResult<FrameOutcome> {
        if self.desired_extent.width == 0 || self.desired_extent.height == 0 {
            return Ok(FrameOutcome::Skipped);
        }
        if self.needs_recreate {
            self.recreate_swapchain(instance, device, physical)?;
        }

        let (Some(frame_sync), Some(commands), Some(framebuffers), Some(render_pass), Some(swapchain)) = (
            self.frame_sync.as_mut(),
            self.commands.as_ref(),
            self.framebuffers.as_ref(),
            self.render_pass.as_ref(),
            self.swapchain.as_ref(),
        ) else {
            return Err(VulkanError::InvalidOperation {
                reason: "renderer used after teardown".to_string(),
            });
        };

        let pipeline = self.pipeline.as_ref().map(GraphicsPipeline::handle);
        let clear_color = self.clear_color;
        let extent = swapchain.extent();
        let outcome = frame_sync.draw_frame(
            device,
            swapchain,
            self.graphics_queue,
            self.present_queue,
            |image_index, slot| {
                let buffer = commands.buffer(slot).ok_or(VulkanError::MissingField("command buffer"))?;
                let framebuffer = framebuffers
                    .get(image_index)
                    .ok_or(VulkanError::MissingField("framebuffer"))?;
                let targets = PassTargets {
                    render_pass: **render_pass,
                    framebuffer,
                    extent,
                    pipeline,
                    clear_color,
                };
                record_pass(device.raw(), buffer, &targets)?;
                Ok(buffer)
            },
        )?;

        match outcome {
            FrameOutcome::OutOfDate | FrameOutcome::Presented { suboptimal: true, .. } => {
                self.needs_recreate = true;
            }
            _ => {}
        }
        Ok(outcome)
    }

    fn recreate_swapchain(
        &mut self,
        instance: &Instance,
        device: &Device,
        physical: &PhysicalDevice,
    ) -> VulkanResult<()> {
        let (Some(surface), Some(render_pass)) = (self.surface.as_ref(), self.render_pass.as_ref())
        else {
            return Err(VulkanError::InvalidOperation {
                reason: "renderer used after teardown".to_string(),
            });
        };

        device.wait_idle()?;
        self.framebuffers = None;

        let old = self.swapchain.take();
        let old_handle = old.as_ref().map_or(vk::SwapchainKHR::null(), Swapchain::handle);
        let swapchain = Swapchain::new(
            device,
            instance.surface_loader(),
            physical,
            **surface,
            self.desired_extent,
            old_handle,
        )?;
        drop(old);

        if swapchain.format().format != self.color_format {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "surface format changed from {:?} to {:?} during resize",
                    self.color_format,
                    swapchain.format().format
                ),
            });
        }

        self.framebuffers = Some(Framebuffers::new(device, **render_pass, &swapchain)?);
        log::info!(
            "Recreated swapchain at {}x{}",
            swapchain.extent().width,
            swapchain.extent().height
        );
        self.swapchain = Some(swapchain);
        self.needs_recreate = false;
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.frame_sync = None;
        self.commands = None;
        self.framebuffers = None;
        self.pipeline = None;
        self.render_pass = None;
        self.swapchain = None;
        self.surface = None;
        log::debug!("Renderer torn down");
    }
}
