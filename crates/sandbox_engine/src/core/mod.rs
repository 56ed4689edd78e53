//! Core engine settings

pub mod config;

pub use config::{
    ApplicationConfig, LoggingConfig, ResourceConfig, SandboxConfig, ShaderConfig, VulkanConfig,
};
