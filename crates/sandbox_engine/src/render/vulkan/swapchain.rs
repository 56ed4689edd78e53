//! Vulkan swapchain management
//!
//! Handles swapchain creation and recreation. The swapchain handle and its
//! image views live in one [`TeardownStack`], so views are always destroyed
//! before the swapchain that owns their images.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::prelude::VkResult;
use ash::vk;

use super::device::{Device, PhysicalDevice};
use super::error::{VulkanError, VulkanResult};
use super::handles::{self, HandleKind};
use crate::foundation::TeardownStack;

/// Surface capabilities, formats and present modes for one GPU
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Extent and image count limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query what `physical` offers for `surface`
    pub fn query(
        loader: &Surface,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical, surface)
                    .map_err(VulkanError::Api)?,
                formats: loader
                    .get_physical_device_surface_formats(physical, surface)
                    .map_err(VulkanError::Api)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical, surface)
                    .map_err(VulkanError::Api)?,
            })
        }
    }

    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// `R8G8B8A8_SRGB` with sRGB non-linear colour space, else the first format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| {
            sf.format == vk::Format::R8G8B8A8_SRGB
                && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Mailbox if offered, else FIFO (always available)
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's fixed extent, or `desired` clamped to its limits
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: desired.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: desired.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Swapchain plus its image views
pub struct Swapchain {
    teardown: TeardownStack,
    loader: SwapchainLoader,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for `surface`
    ///
    /// Pass the previous swapchain's handle as `old` when recreating after a
    /// resize, and drop the previous swapchain afterwards.
    pub fn new(
        device: &Device,
        surface_loader: &Surface,
        physical: &PhysicalDevice,
        surface: vk::SurfaceKHR,
        desired_extent: vk::Extent2D,
        old: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let loader = device.swapchain_loader()?.clone();
        let support = SurfaceSupport::query(surface_loader, physical.handle, surface)?;

        let format = choose_surface_format(&support.formats).ok_or_else(|| VulkanError::InvalidOperation {
            reason: "surface has no formats".to_string(),
        })?;
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, desired_extent);
        let image_count = choose_image_count(&support.capabilities);

        let families = physical.required_families();
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old);
        let create_info = if families.len() > 1 {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|result| VulkanError::creation(HandleKind::Swapchain, result))?;

        let mut teardown = TeardownStack::new();
        teardown.push(handles::owned(handle, loader.clone()));

        let images = unsafe { loader.get_swapchain_images(handle) }.map_err(VulkanError::Api)?;
        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { device.raw().create_image_view(&view_info, None) }
                .map_err(|result| VulkanError::creation(HandleKind::ImageView, result))?;
            image_views.push(teardown.adopt(device.own(view)));
        }

        log::info!(
            "Created swapchain {}x{} with {} images ({:?}, {:?})",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            teardown,
            loader,
            handle,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Acquire the next image, signalling `signal` when it is ready
    ///
    /// Returns the image index and whether the swapchain is suboptimal.
    pub fn acquire_next_image(&self, signal: vk::Semaphore, timeout_ns: u64) -> VkResult<(u32, bool)> {
        unsafe {
            self.loader
                .acquire_next_image(self.handle, timeout_ns, signal, vk::Fence::null())
        }
    }

    /// Present `image_index` on `queue` after `wait` signals
    ///
    /// Returns whether the swapchain is suboptimal.
    pub fn present(&self, queue: vk::Queue, wait: vk::Semaphore, image_index: u32) -> VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.loader.queue_present(queue, &present_info) }
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.teardown.teardown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn capabilities(current: u32, min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current,
                height: current,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_surface_format_preference() {
        let formats = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(
            choose_surface_format(&formats).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_SRGB)
        );
        assert_eq!(
            choose_surface_format(&formats[..1]).map(|f| f.format),
            Some(vk::Format::B8G8R8A8_UNORM)
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_present_mode_preference() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_follows_surface_or_clamps() {
        let desired = vk::Extent2D {
            width: 4000,
            height: 50,
        };
        assert_eq!(choose_extent(&capabilities(640, 2, 3), desired).width, 640);

        let clamped = choose_extent(&capabilities(u32::MAX, 2, 3), desired);
        assert_eq!((clamped.width, clamped.height), (1920, 100));
    }

    #[test]
    fn test_image_count() {
        assert_eq!(choose_image_count(&capabilities(0, 2, 3)), 3);
        assert_eq!(choose_image_count(&capabilities(0, 3, 3)), 3);
        assert_eq!(choose_image_count(&capabilities(0, 2, 0)), 3);
    }
}
