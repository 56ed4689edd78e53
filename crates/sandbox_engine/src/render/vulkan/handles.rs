//! Handle registry: every native handle kind the engine owns
//!
//! Each `ash::vk` handle type implements [`DestroyWith`] for the one parent
//! object its destroy call needs (`ash::Device`, `ash::Instance`, or an
//! extension loader). [`ParentRef`] captures that parent at construction and
//! is the single teardown strategy for parent-scoped handles, so an owned
//! handle is just `RaiiWrapper<H, ParentRef<P>>`:
//!
//! ```ignore
//! let fence: OwnedFence = device.own(raw_fence);
//! // destroyed with `device.destroy_fence` when dropped
//! ```
//!
//! Lifecycle of an owned handle:
//!
//! ```text
//! Unconstructed --create--> Live(value) --drop/destroy--> Destroyed(null)
//!                           Live(value) --take--> source Destroyed(null)
//! ```
//!
//! A parent must outlive every child it destroys. [`HandleKind::depth`]
//! gives the destruction partial order: deeper kinds go first.

use std::fmt;

use ash::extensions::{ext::DebugUtils, khr};
use ash::vk;

use crate::foundation::{RaiiWrapper, Teardown};

/// Every handle kind with an owning wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// `VkInstance`
    Instance,
    /// `VkDebugUtilsMessengerEXT`
    DebugMessenger,
    /// `VkSurfaceKHR`
    Surface,
    /// `VkDevice`
    Device,
    /// `VkSwapchainKHR`
    Swapchain,
    /// `VkImageView`
    ImageView,
    /// `VkRenderPass`
    RenderPass,
    /// `VkPipelineLayout`
    PipelineLayout,
    /// `VkPipeline`
    Pipeline,
    /// `VkFramebuffer`
    Framebuffer,
    /// `VkCommandPool`
    CommandPool,
    /// `VkShaderModule`
    ShaderModule,
    /// `VkSemaphore`
    Semaphore,
    /// `VkFence`
    Fence,
}

impl HandleKind {
    /// All kinds, parents before children
    pub const ALL: [Self; 14] = [
        Self::Instance,
        Self::DebugMessenger,
        Self::Surface,
        Self::Device,
        Self::Swapchain,
        Self::RenderPass,
        Self::PipelineLayout,
        Self::ShaderModule,
        Self::CommandPool,
        Self::Semaphore,
        Self::Fence,
        Self::ImageView,
        Self::Pipeline,
        Self::Framebuffer,
    ];

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::DebugMessenger => "debug messenger",
            Self::Surface => "surface",
            Self::Device => "device",
            Self::Swapchain => "swapchain",
            Self::ImageView => "image view",
            Self::RenderPass => "render pass",
            Self::PipelineLayout => "pipeline layout",
            Self::Pipeline => "pipeline",
            Self::Framebuffer => "framebuffer",
            Self::CommandPool => "command pool",
            Self::ShaderModule => "shader module",
            Self::Semaphore => "semaphore",
            Self::Fence => "fence",
        }
    }

    /// Kind whose object performs the destroy call
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Instance => None,
            Self::DebugMessenger | Self::Surface | Self::Device => Some(Self::Instance),
            _ => Some(Self::Device),
        }
    }

    /// Position in the destruction order; higher depths are destroyed first
    ///
    /// Beyond the parent relation this covers usage: image views of swapchain
    /// images go before the swapchain, framebuffers before the views and
    /// render pass they reference, pipelines before their layout and pass.
    pub fn depth(self) -> u8 {
        match self {
            Self::Instance => 0,
            Self::DebugMessenger | Self::Surface | Self::Device => 1,
            Self::Swapchain
            | Self::RenderPass
            | Self::PipelineLayout
            | Self::ShaderModule
            | Self::CommandPool
            | Self::Semaphore
            | Self::Fence => 2,
            Self::ImageView | Self::Pipeline => 3,
            Self::Framebuffer => 4,
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A handle destroyed through a parent object of type `P`
pub trait DestroyWith<P>: Copy + Default + PartialEq + fmt::Debug {
    /// Registry kind of this handle
    const KIND: HandleKind;

    /// Call the native destroy function
    ///
    /// # Safety
    /// `self` must be a live handle created from `parent`, not in use by the
    /// GPU, and not destroyed before.
    unsafe fn destroy_with(self, parent: &P);
}

impl DestroyWith<ash::Instance> for vk::Instance {
    const KIND: HandleKind = HandleKind::Instance;

    unsafe fn destroy_with(self, instance: &ash::Instance) {
        instance.destroy_instance(None);
    }
}

impl DestroyWith<DebugUtils> for vk::DebugUtilsMessengerEXT {
    const KIND: HandleKind = HandleKind::DebugMessenger;

    unsafe fn destroy_with(self, debug_utils: &DebugUtils) {
        debug_utils.destroy_debug_utils_messenger(self, None);
    }
}

impl DestroyWith<khr::Surface> for vk::SurfaceKHR {
    const KIND: HandleKind = HandleKind::Surface;

    unsafe fn destroy_with(self, surface_loader: &khr::Surface) {
        surface_loader.destroy_surface(self, None);
    }
}

impl DestroyWith<ash::Device> for vk::Device {
    const KIND: HandleKind = HandleKind::Device;

    unsafe fn destroy_with(self, device: &ash::Device) {
        device.destroy_device(None);
    }
}

impl DestroyWith<khr::Swapchain> for vk::SwapchainKHR {
    const KIND: HandleKind = HandleKind::Swapchain;

    unsafe fn destroy_with(self, swapchain_loader: &khr::Swapchain) {
        swapchain_loader.destroy_swapchain(self, None);
    }
}

macro_rules! device_children {
    ($($handle:ty => $kind:ident, $destroy:ident;)*) => {
        $(
            impl DestroyWith<ash::Device> for $handle {
                const KIND: HandleKind = HandleKind::$kind;

                unsafe fn destroy_with(self, device: &ash::Device) {
                    device.$destroy(self, None);
                }
            }
        )*
    };
}

device_children! {
    vk::ImageView => ImageView, destroy_image_view;
    vk::RenderPass => RenderPass, destroy_render_pass;
    vk::PipelineLayout => PipelineLayout, destroy_pipeline_layout;
    vk::Pipeline => Pipeline, destroy_pipeline;
    vk::Framebuffer => Framebuffer, destroy_framebuffer;
    vk::CommandPool => CommandPool, destroy_command_pool;
    vk::ShaderModule => ShaderModule, destroy_shader_module;
    vk::Semaphore => Semaphore, destroy_semaphore;
    vk::Fence => Fence, destroy_fence;
}

/// Teardown strategy holding the parent a handle is destroyed with
///
/// For `ash::Device`, `ash::Instance` and the extension loaders the parent is
/// a cheap clone of the function table, not an owner of the native object.
#[derive(Clone)]
pub struct ParentRef<P>(P);

impl<P> ParentRef<P> {
    /// Capture `parent`
    pub fn new(parent: P) -> Self {
        Self(parent)
    }

    /// The captured parent
    pub fn parent(&self) -> &P {
        &self.0
    }
}

impl<H, P> Teardown<H> for ParentRef<P>
where
    H: DestroyWith<P>,
{
    fn teardown(&mut self, handle: H) {
        log::debug!("Destroying {} {:?}", H::KIND, handle);
        // Owners are torn down children-first (`TeardownStack`, `Engine`),
        // so the parent is still alive here
        unsafe { handle.destroy_with(&self.0) }
    }
}

impl<P> fmt::Debug for ParentRef<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ParentRef")
    }
}

/// Owned handle destroyed through its parent `P`
pub type Owned<H, P> = RaiiWrapper<H, ParentRef<P>>;

/// Wrap `handle` so it is destroyed with `parent` when dropped
pub fn owned<H, P>(handle: H, parent: P) -> Owned<H, P>
where
    H: DestroyWith<P>,
{
    RaiiWrapper::with_teardown(handle, ParentRef::new(parent))
}

/// Owned `VkInstance`
pub type OwnedInstance = Owned<vk::Instance, ash::Instance>;
/// Owned `VkDebugUtilsMessengerEXT`
pub type OwnedDebugMessenger = Owned<vk::DebugUtilsMessengerEXT, DebugUtils>;
/// Owned `VkSurfaceKHR`
pub type OwnedSurface = Owned<vk::SurfaceKHR, khr::Surface>;
/// Owned `VkDevice`
pub type OwnedDevice = Owned<vk::Device, ash::Device>;
/// Owned `VkSwapchainKHR`
pub type OwnedSwapchain = Owned<vk::SwapchainKHR, khr::Swapchain>;
/// Owned `VkImageView`
pub type OwnedImageView = Owned<vk::ImageView, ash::Device>;
/// Owned `VkRenderPass`
pub type OwnedRenderPass = Owned<vk::RenderPass, ash::Device>;
/// Owned `VkPipelineLayout`
pub type OwnedPipelineLayout = Owned<vk::PipelineLayout, ash::Device>;
/// Owned `VkPipeline`
pub type OwnedPipeline = Owned<vk::Pipeline, ash::Device>;
/// Owned `VkFramebuffer`
pub type OwnedFramebuffer = Owned<vk::Framebuffer, ash::Device>;
/// Owned `VkCommandPool`
pub type OwnedCommandPool = Owned<vk::CommandPool, ash::Device>;
/// Owned `VkShaderModule`
pub type OwnedShaderModule = Owned<vk::ShaderModule, ash::Device>;
/// Owned `VkSemaphore`
pub type OwnedSemaphore = Owned<vk::Semaphore, ash::Device>;
/// Owned `VkFence`
pub type OwnedFence = Owned<vk::Fence, ash::Device>;
