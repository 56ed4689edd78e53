//! Asset registries and loaders

pub mod resource_manager;
pub mod shader_resource;

pub use resource_manager::{
    AnyResourceManager, ReloadPolicy, Resource, ResourceError, TypedResourceManager,
};
pub use shader_resource::{ShaderResource, ShaderStage};
