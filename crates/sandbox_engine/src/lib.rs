//! # Sandbox Engine
//!
//! A small Vulkan rendering core built around deterministic ownership of
//! native handles.
//!
//! ## Features
//!
//! - **Ownership**: [`RaiiWrapper`](foundation::RaiiWrapper) and
//!   [`TeardownStack`](foundation::TeardownStack) release every handle once,
//!   children before parents
//! - **Vulkan contexts**: builder-style instance and device setup validated
//!   against what the driver reports
//! - **Registries**: typed and type-erased resource managers
//! - **Events**: a synchronous, channel-keyed event bus fed from an input
//!   thread
//! - **Logging**: a filter / formatter / handler pipeline behind the `log`
//!   facade
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sandbox_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SandboxConfig::default();
//!     logging::init(&config.logging)?;
//!
//!     let mut engine = Engine::new(config)?;
//!     engine.init_headless()?;
//!     engine.frame()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Core engine modules
pub mod config;
pub mod core;

pub mod assets;
pub mod events;
pub mod foundation;
pub mod render;

mod engine;

pub use engine::{Engine, EngineError, DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{AnyResourceManager, ReloadPolicy, Resource, ResourceError, ShaderResource, ShaderStage, TypedResourceManager},
        config::{Config, ConfigError},
        core::config::{ApplicationConfig, LoggingConfig, SandboxConfig, ShaderConfig, VulkanConfig},
        events::{event_channel, EventBus, EventPump, EventSender, SubscriptionId, WindowEvent},
        foundation::{fatal, logging, RaiiWrapper, TeardownStack, Timer},
        render::vulkan::{FrameOutcome, VulkanError, VulkanResult},
        Engine, EngineError,
    };
}
