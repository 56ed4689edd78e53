//! Rendering
//!
//! Only a Vulkan backend exists. [`Renderer`] groups the per-surface objects
//! needed to clear the screen and draw the default triangle.

pub mod renderer;
pub mod vulkan;

pub use renderer::Renderer;
