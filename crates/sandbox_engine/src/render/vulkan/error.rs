//! Vulkan layer errors

use ash::vk;
use thiserror::Error;

use super::handles::HandleKind;
use crate::foundation::fatal::Reported;

/// Vulkan-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The Vulkan loader library could not be loaded
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// A create call for a specific handle kind failed
    #[error("Failed to create {kind}: {result:?}")]
    Creation {
        /// Kind of handle that was being created
        kind: HandleKind,
        /// Driver result code
        result: vk::Result,
    },

    /// Requested instance layer not offered by the loader
    #[error("Unsupported instance layer: {0}")]
    UnsupportedLayer(String),

    /// Requested extension not offered by the instance or device
    #[error("Unsupported extension: {0}")]
    UnsupportedExtension(String),

    /// Queue request for a family the device does not have
    #[error("Queue family {family} out of range ({available} families available)")]
    QueueFamilyOutOfRange {
        /// Requested family index
        family: u32,
        /// Number of families on the device
        available: u32,
    },

    /// More queues requested from a family than it exposes
    #[error("Queue family {family} oversubscribed: {requested} requested, {available} available")]
    QueueOversubscribed {
        /// Family index
        family: u32,
        /// Queues requested so far
        requested: u32,
        /// Queues the family exposes
        available: u32,
    },

    /// A builder was finished without a required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// No physical device satisfies the requirements
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// A resource needed for creation was not loaded completely
    #[error("Incomplete resource: {0}")]
    Incomplete(String),
}

impl VulkanError {
    /// Build a [`VulkanError::Creation`] and log it at Error
    pub fn creation(kind: HandleKind, result: vk::Result) -> Self {
        let error = Self::Creation { kind, result };
        log::error!("{error}");
        error
    }
}

impl Reported for VulkanError {
    /// Capability misses, failed create calls and unloaded resources are
    /// logged where they are detected
    fn already_logged(&self) -> bool {
        matches!(
            self,
            Self::Loading(_)
                | Self::Creation { .. }
                | Self::UnsupportedLayer(_)
                | Self::UnsupportedExtension(_)
                | Self::QueueFamilyOutOfRange { .. }
                | Self::QueueOversubscribed { .. }
                | Self::NoSuitableDevice
                | Self::Incomplete(_)
        )
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
