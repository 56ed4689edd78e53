//! # Sandbox Configuration
//!
//! Typed settings for every subsystem, loaded through the [`Config`] trait.
//! Every section uses `#[serde(default)]`, so a file only needs the keys it
//! changes:
//!
//! ```toml
//! [application]
//! name = "Sandbox"
//!
//! [vulkan]
//! enable_validation = true
//! frame_timeout_ms = 500
//!
//! [logging]
//! level = "debug"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::assets::ReloadPolicy;
pub use crate::config::{Config, ConfigError};

/// Application metadata reported to the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name for instance creation
    pub name: String,
    /// Application version (major, minor, patch)
    pub version: (u32, u32, u32),
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Sandbox".to_string(),
            version: (0, 1, 0),
        }
    }
}

/// # Vulkan Configuration
///
/// Instance and device requests plus frame pacing limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulkanConfig {
    /// Requested API version (major, minor)
    pub api_version: (u32, u32),
    /// Validation layers; `None` enables them in debug builds only
    pub enable_validation: Option<bool>,
    /// Extra instance layers
    pub layers: Vec<String>,
    /// Extra instance extensions
    pub instance_extensions: Vec<String>,
    /// Extra device extensions (swapchain is always requested)
    pub device_extensions: Vec<String>,
    /// Upper bound for fence waits and image acquisition
    pub frame_timeout_ms: u64,
    /// Frames recorded ahead of presentation
    pub max_frames_in_flight: usize,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            api_version: (1, 0),
            enable_validation: None,
            layers: Vec::new(),
            instance_extensions: Vec::new(),
            device_extensions: Vec::new(),
            frame_timeout_ms: 1000,
            max_frames_in_flight: 2,
        }
    }
}

impl VulkanConfig {
    /// Whether validation should be on for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Enable or disable validation layers
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the frame wait timeout
    #[must_use]
    pub fn with_frame_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.frame_timeout_ms = timeout_ms;
        self
    }

    /// Set maximum frames in flight
    #[must_use]
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Frame timeout in nanoseconds, as Vulkan wait calls expect
    pub fn frame_timeout_ns(&self) -> u64 {
        self.frame_timeout_ms.saturating_mul(1_000_000)
    }
}

/// Logging pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: String,
    /// env_logger style directives; overrides `level` when set
    pub filter: Option<String>,
    /// Write to stdout
    pub console: bool,
    /// Colour console output
    pub colored: bool,
    /// Also append to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            filter: None,
            console: true,
            colored: true,
            file: None,
        }
    }
}

/// # Shader Configuration
///
/// SPIR-V binaries for the default pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex: PathBuf,
    /// Path to the fragment shader SPIR-V file
    pub fragment: PathBuf,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex: impl Into<PathBuf>, fragment: impl Into<PathBuf>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::new("shaders/triangle.vert.spv", "shaders/triangle.frag.spv")
    }
}

/// Resource registry behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// What `load` does when the identifier is taken
    pub reload_policy: ReloadPolicy,
}

/// Top-level settings file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Application metadata
    pub application: ApplicationConfig,
    /// Vulkan requests
    pub vulkan: VulkanConfig,
    /// Logging pipeline
    pub logging: LoggingConfig,
    /// Default shaders
    pub shaders: ShaderConfig,
    /// Resource registries
    pub resources: ResourceConfig,
}

impl Config for SandboxConfig {}

impl SandboxConfig {
    /// Check values serde cannot enforce
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application.name.is_empty() {
            return Err(ConfigError::Invalid(
                "application name cannot be empty".to_string(),
            ));
        }
        if self.application.name.contains('\0') {
            return Err(ConfigError::Invalid(
                "application name cannot contain NUL".to_string(),
            ));
        }
        if self.vulkan.max_frames_in_flight == 0 || self.vulkan.max_frames_in_flight > 8 {
            return Err(ConfigError::Invalid(format!(
                "max frames in flight must be within 1..=8, got {}",
                self.vulkan.max_frames_in_flight
            )));
        }
        if self.vulkan.frame_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "frame timeout must be at least 1 ms".to_string(),
            ));
        }
        if self.vulkan.api_version.0 != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported API version {}.{}",
                self.vulkan.api_version.0, self.vulkan.api_version.1
            )));
        }
        if self.logging.level.parse::<log::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SandboxConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vulkan.frame_timeout_ns(), 1_000_000_000);
        assert_eq!(config.resources.reload_policy, ReloadPolicy::Replace);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SandboxConfig::from_toml_str(
            r#"
            [application]
            name = "Demo"

            [vulkan]
            enable_validation = false
            device_extensions = ["VK_KHR_maintenance1"]

            [resources]
            reload_policy = "reject"
            "#,
        )
        .unwrap();

        assert_eq!(config.application.name, "Demo");
        assert_eq!(config.application.version, (0, 1, 0));
        assert!(!config.vulkan.validation_enabled());
        assert_eq!(config.vulkan.device_extensions, vec!["VK_KHR_maintenance1"]);
        assert_eq!(config.vulkan.max_frames_in_flight, 2);
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.resources.reload_policy, ReloadPolicy::Reject);
    }

    #[test]
    fn test_ron_text() {
        let config = SandboxConfig::from_ron_str(
            r#"(logging: (level: "debug", colored: false), vulkan: (frame_timeout_ms: 250))"#,
        )
        .unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.colored);
        assert_eq!(config.vulkan.frame_timeout_ms, 250);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = SandboxConfig::default();
        config.vulkan = config.vulkan.with_max_frames_in_flight(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SandboxConfig::default();
        config.logging.level = "chatty".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SandboxConfig::default();
        config.application.name.clear();
        assert!(config.validate().is_err());
    }
}
