//! Vulkan backend
//!
//! Every native handle created here is owned by an [`Owned`] wrapper or by an
//! owner's [`TeardownStack`](crate::foundation::TeardownStack), so it is
//! destroyed once, through the parent that created it, children first.

pub mod commands;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod handles;
pub mod instance;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use commands::{record_pass, CommandPool, PassTargets};
pub use device::{Device, DeviceBuilder, DevicePlan, DeviceSupport, PhysicalDevice, QueueFamilyInfo};
pub use error::{VulkanError, VulkanResult};
pub use framebuffer::Framebuffers;
pub use handles::{owned, DestroyWith, HandleKind, Owned, ParentRef};
pub use instance::{Instance, InstanceBuilder, InstancePlan, InstanceSupport, VALIDATION_LAYER};
pub use pipeline::GraphicsPipeline;
pub use render_pass::create_forward_pass;
pub use shader::{create_shader_module, SHADER_ENTRY_POINT};
pub use swapchain::{Swapchain, SurfaceSupport};
pub use sync::{create_fence, create_semaphore, FrameOutcome, FrameSync};
