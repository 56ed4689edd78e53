//! Framebuffer management

use ash::vk;

use super::device::Device;
use super::error::{VulkanError, VulkanResult};
use super::handles::{HandleKind, OwnedFramebuffer};
use super::swapchain::Swapchain;

/// One framebuffer per swapchain image
///
/// Must be dropped before the swapchain and render pass it was built from.
pub struct Framebuffers {
    framebuffers: Vec<OwnedFramebuffer>,
}

impl Framebuffers {
    /// Create framebuffers for every image view of `swapchain`
    pub fn new(device: &Device, render_pass: vk::RenderPass, swapchain: &Swapchain) -> VulkanResult<Self> {
        let extent = swapchain.extent();
        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                let attachments = [view];
                let create_info = vk::FramebufferCreateInfo::builder()
                    .render_pass(render_pass)
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);
                unsafe { device.raw().create_framebuffer(&create_info, None) }
                    .map(|framebuffer| device.own(framebuffer))
                    .map_err(|result| VulkanError::creation(HandleKind::Framebuffer, result))
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self { framebuffers })
    }

    /// Framebuffer for swapchain image `index`
    pub fn get(&self, index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers
            .get(index as usize)
            .map(|framebuffer| *framebuffer.get())
    }

    /// Number of framebuffers
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    /// Whether there are none
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}
