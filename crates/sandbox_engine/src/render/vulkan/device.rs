//! Physical device selection and logical device construction

use std::collections::HashMap;
use std::ffi::{c_char, CString};

use ash::extensions::khr::{self, Surface};
use ash::vk;

use super::error::{VulkanError, VulkanResult};
use super::handles::{self, DestroyWith, HandleKind, Owned};
use super::instance::{accept_name, name_from_raw, to_cstrings, Instance};
use super::swapchain::SurfaceSupport;
use crate::core::config::VulkanConfig;
use crate::foundation::TeardownStack;

/// One queue family and how many of its queues are spoken for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    /// Family index
    pub index: u32,
    /// Queues the family exposes
    pub queue_count: u32,
    /// Capabilities
    pub flags: vk::QueueFlags,
    /// Can present to the surface used for selection
    pub present: bool,
    occupied: u32,
}

impl QueueFamilyInfo {
    /// Describe a family from its driver properties
    pub fn new(index: u32, properties: &vk::QueueFamilyProperties, present: bool) -> Self {
        Self {
            index,
            queue_count: properties.queue_count,
            flags: properties.queue_flags,
            present,
            occupied: 0,
        }
    }

    /// Whether the family can run graphics work
    pub fn supports_graphics(&self) -> bool {
        self.flags.contains(vk::QueueFlags::GRAPHICS)
    }

    /// Queues not yet requested
    pub fn remaining(&self) -> u32 {
        self.queue_count.saturating_sub(self.occupied)
    }

    /// Whether `count` more queues fit
    pub fn is_allow_occupation(&self, count: u32) -> bool {
        count <= self.remaining()
    }

    /// Reserve `count` queues; `false` (and nothing reserved) if they don't fit
    pub fn occupy(&mut self, count: u32) -> bool {
        if !self.is_allow_occupation(count) {
            return false;
        }
        self.occupied += count;
        true
    }

    /// Queues reserved so far
    pub fn occupied(&self) -> u32 {
        self.occupied
    }
}

/// Device extensions and queue families of one physical device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSupport {
    /// Available device extension names
    pub extensions: Vec<String>,
    /// Queue families in index order
    pub queue_families: Vec<QueueFamilyInfo>,
}

impl DeviceSupport {
    /// Query `physical`; present support is checked against `surface` when given
    pub fn query(
        instance: &ash::Instance,
        physical: vk::PhysicalDevice,
        surface: Option<(&Surface, vk::SurfaceKHR)>,
    ) -> VulkanResult<Self> {
        let extensions = unsafe { instance.enumerate_device_extension_properties(physical) }
            .map_err(VulkanError::Api)?
            .iter()
            .map(|extension| name_from_raw(&extension.extension_name))
            .collect();

        let properties = unsafe { instance.get_physical_device_queue_family_properties(physical) };
        let mut queue_families = Vec::with_capacity(properties.len());
        for (index, family) in (0_u32..).zip(properties.iter()) {
            let present = match surface {
                Some((loader, surface)) => {
                    let supported = unsafe {
                        loader.get_physical_device_surface_support(physical, index, surface)
                    };
                    supported.map_err(VulkanError::Api)?
                }
                None => false,
            };
            queue_families.push(QueueFamilyInfo::new(index, family, present));
        }

        Ok(Self {
            extensions,
            queue_families,
        })
    }

    /// Whether `name` is an available device extension
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|extension| extension == name)
    }

    /// First graphics family, and a present family preferring the same one
    ///
    /// Returns `None` if a required family is missing.
    pub fn find_families(&self, need_present: bool) -> Option<(u32, Option<u32>)> {
        let graphics = self
            .queue_families
            .iter()
            .find(|family| family.supports_graphics() && family.queue_count > 0)?;
        if !need_present {
            return Some((graphics.index, None));
        }
        let present = if graphics.present {
            graphics
        } else {
            self.queue_families.iter().find(|family| family.present)?
        };
        Some((graphics.index, Some(present.index)))
    }
}

/// A selected GPU and the facts selection was based on
#[derive(Debug, Clone)]
pub struct PhysicalDevice {
    /// Physical device handle
    pub handle: vk::PhysicalDevice,
    /// Device name from the driver
    pub name: String,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Extensions and queue families
    pub support: DeviceSupport,
    /// Family used for graphics
    pub graphics_family: u32,
    /// Family used for presentation, if a surface was given
    pub present_family: Option<u32>,
}

impl PhysicalDevice {
    /// Pick the first GPU with the families and extensions required
    ///
    /// With a surface, the GPU must also be able to present to it and offer at
    /// least one surface format and present mode.
    pub fn pick(
        instance: &Instance,
        surface: Option<vk::SurfaceKHR>,
        required_extensions: &[String],
    ) -> VulkanResult<Self> {
        let devices =
            unsafe { instance.raw().enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        for handle in devices {
            let properties = unsafe { instance.raw().get_physical_device_properties(handle) };
            let name = name_from_raw(&properties.device_name);
            let support = DeviceSupport::query(
                instance.raw(),
                handle,
                surface.map(|surface| (instance.surface_loader(), surface)),
            )?;

            if let Some(missing) = required_extensions
                .iter()
                .find(|extension| !support.has_extension(extension))
            {
                log::debug!("Skipping GPU {name}: missing {missing}");
                continue;
            }
            let Some((graphics_family, present_family)) = support.find_families(surface.is_some())
            else {
                log::debug!("Skipping GPU {name}: no suitable queue families");
                continue;
            };
            if let Some(surface) = surface {
                let surface_support =
                    SurfaceSupport::query(instance.surface_loader(), handle, surface)?;
                if !surface_support.is_adequate() {
                    log::debug!("Skipping GPU {name}: no surface formats or present modes");
                    continue;
                }
            }

            log::info!("Selected GPU: {name}");
            return Ok(Self {
                handle,
                name,
                properties,
                features: unsafe { instance.raw().get_physical_device_features(handle) },
                support,
                graphics_family,
                present_family,
            });
        }

        log::error!("No GPU satisfies the requirements");
        Err(VulkanError::NoSuitableDevice)
    }

    /// Distinct families needed for graphics and presentation
    pub fn required_families(&self) -> Vec<u32> {
        let mut families = vec![self.graphics_family];
        if let Some(present) = self.present_family {
            if present != self.graphics_family {
                families.push(present);
            }
        }
        families
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct QueueRequest {
    family: u32,
    priority: f32,
}

/// Validated parameters for device creation
#[derive(Debug, Clone)]
pub struct DevicePlan {
    queue_families: Vec<(u32, Vec<f32>)>,
    extensions: Vec<CString>,
    features: vk::PhysicalDeviceFeatures,
    swapchain: bool,
}

impl DevicePlan {
    /// `(family, priorities)` in first-request order
    pub fn queue_families(&self) -> &[(u32, Vec<f32>)] {
        &self.queue_families
    }

    /// Extensions that will be enabled
    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }
}

/// Step-by-step device configuration
///
/// Each queue request asks for one queue of a family at a priority in
/// `[0, 1]`. Requests outside that range, and malformed extension names, are
/// logged at Warn and ignored.
#[derive(Debug, Clone, Default)]
pub struct DeviceBuilder {
    extensions: Vec<String>,
    queue_requests: Vec<QueueRequest>,
    features: vk::PhysicalDeviceFeatures,
}

impl DeviceBuilder {
    /// Empty builder: no queues, no extensions, no features
    pub fn new() -> Self {
        Self::default()
    }

    /// Swapchain plus the configured extensions
    pub fn from_config(config: &VulkanConfig) -> Self {
        Self::new()
            .enable_swapchain()
            .append_extensions(config.device_extensions.iter().map(String::as_str))
    }

    /// Add a device extension
    #[must_use]
    pub fn append_extension(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if accept_name("device extension", &name) {
            self.extensions.push(name);
        }
        self
    }

    /// Add several device extensions
    #[must_use]
    pub fn append_extensions<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .fold(self, |builder, name| builder.append_extension(name))
    }

    /// Request one queue from `family`
    #[must_use]
    pub fn append_queue_request(mut self, family: u32, priority: f32) -> Self {
        if (0.0..=1.0).contains(&priority) {
            self.queue_requests.push(QueueRequest { family, priority });
        } else {
            log::warn!("Ignoring queue request for family {family}: priority {priority} outside [0, 1]");
        }
        self
    }

    /// Request one queue per family needed by `physical`
    #[must_use]
    pub fn append_required_queues(self, physical: &PhysicalDevice) -> Self {
        physical
            .required_families()
            .into_iter()
            .fold(self, |builder, family| builder.append_queue_request(family, 1.0))
    }

    /// Features to enable
    #[must_use]
    pub fn features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.features = features;
        self
    }

    /// Add `VK_KHR_swapchain`
    #[must_use]
    pub fn enable_swapchain(self) -> Self {
        self.append_extension(khr::Swapchain::name().to_string_lossy().into_owned())
    }

    /// Check extensions and queue requests against `support`
    pub fn resolve(self, support: &DeviceSupport) -> VulkanResult<DevicePlan> {
        if self.queue_requests.is_empty() {
            return Err(VulkanError::MissingField("queue request"));
        }
        if let Some(missing) = self
            .extensions
            .iter()
            .find(|extension| !support.has_extension(extension))
        {
            log::error!("Device extension {missing} is not available");
            return Err(VulkanError::UnsupportedExtension(missing.clone()));
        }

        let mut families = support.queue_families.clone();
        let mut grouped: Vec<(u32, Vec<f32>)> = Vec::new();
        for request in &self.queue_requests {
            let available = u32::try_from(families.len()).unwrap_or(u32::MAX);
            let Some(family) = families.get_mut(request.family as usize) else {
                log::error!(
                    "Queue family {} requested but the device has {available}",
                    request.family
                );
                return Err(VulkanError::QueueFamilyOutOfRange {
                    family: request.family,
                    available,
                });
            };
            if !family.occupy(1) {
                log::error!(
                    "Queue family {} has only {} queues",
                    request.family,
                    family.queue_count
                );
                return Err(VulkanError::QueueOversubscribed {
                    family: request.family,
                    requested: family.occupied() + 1,
                    available: family.queue_count,
                });
            }

            match grouped.iter_mut().find(|(index, _)| *index == request.family) {
                Some((_, priorities)) => priorities.push(request.priority),
                None => grouped.push((request.family, vec![request.priority])),
            }
        }

        let swapchain_name = khr::Swapchain::name().to_string_lossy();
        let swapchain = self.extensions.iter().any(|name| *name == swapchain_name);

        Ok(DevicePlan {
            queue_families: grouped,
            extensions: to_cstrings(&self.extensions)?,
            features: self.features,
            swapchain,
        })
    }

    /// Resolve against `physical` and create the device
    pub fn build(self, instance: &Instance, physical: &PhysicalDevice) -> VulkanResult<Device> {
        let plan = self.resolve(&physical.support)?;
        Device::create(instance, physical, &plan)
    }
}

/// Logical device, its queues, and device-level objects it owns
pub struct Device {
    teardown: TeardownStack,
    raw: ash::Device,
    physical: vk::PhysicalDevice,
    swapchain_loader: Option<khr::Swapchain>,
    queues: HashMap<u32, Vec<vk::Queue>>,
}

impl Device {
    fn create(instance: &Instance, physical: &PhysicalDevice, plan: &DevicePlan) -> VulkanResult<Self> {
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = plan
            .queue_families
            .iter()
            .map(|(family, priorities)| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(*family)
                    .queue_priorities(priorities)
                    .build()
            })
            .collect();
        let extensions: Vec<*const c_char> =
            plan.extensions.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&plan.features);

        let raw = unsafe { instance.raw().create_device(physical.handle, &create_info, None) }
            .map_err(|result| VulkanError::creation(HandleKind::Device, result))?;

        let mut teardown = TeardownStack::new();
        teardown.push(handles::owned(raw.handle(), raw.clone()));

        let queues = plan
            .queue_families
            .iter()
            .map(|(family, priorities)| {
                let count = u32::try_from(priorities.len()).unwrap_or(u32::MAX);
                let family_queues = (0..count)
                    .map(|index| unsafe { raw.get_device_queue(*family, index) })
                    .collect();
                (*family, family_queues)
            })
            .collect();

        let swapchain_loader = plan
            .swapchain
            .then(|| khr::Swapchain::new(instance.raw(), &raw));

        log::info!(
            "Created logical device on {} ({} queue families)",
            physical.name,
            plan.queue_families.len()
        );

        Ok(Self {
            teardown,
            raw,
            physical: physical.handle,
            swapchain_loader,
            queues,
        })
    }

    /// Wrap `handle` so it is destroyed with this device
    ///
    /// The wrapper must be dropped before the device.
    pub fn own<H>(&self, handle: H) -> Owned<H, ash::Device>
    where
        H: DestroyWith<ash::Device>,
    {
        handles::owned(handle, self.raw.clone())
    }

    /// Device function table
    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    /// Physical device this was created on
    pub fn physical(&self) -> vk::PhysicalDevice {
        self.physical
    }

    /// Queue `index` of `family`, if it was requested
    pub fn queue(&self, family: u32, index: usize) -> Option<vk::Queue> {
        self.queues.get(&family)?.get(index).copied()
    }

    /// `VK_KHR_swapchain` functions
    pub fn swapchain_loader(&self) -> VulkanResult<&khr::Swapchain> {
        self.swapchain_loader
            .as_ref()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "device was created without VK_KHR_swapchain".to_string(),
            })
    }

    /// Block until the GPU is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.raw.device_wait_idle() }.map_err(VulkanError::Api)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::warn!("device_wait_idle failed during teardown: {e}");
        }
        self.teardown.teardown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::logging::{capture, Level};

    fn family(index: u32, count: u32, flags: vk::QueueFlags, present: bool) -> QueueFamilyInfo {
        let properties = vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        };
        QueueFamilyInfo::new(index, &properties, present)
    }

    fn support() -> DeviceSupport {
        DeviceSupport {
            extensions: vec!["VK_KHR_swapchain".to_string()],
            queue_families: vec![
                family(0, 2, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
                family(1, 1, vk::QueueFlags::TRANSFER, true),
            ],
        }
    }

    #[test]
    fn test_queue_occupancy() {
        let mut info = family(0, 2, vk::QueueFlags::GRAPHICS, true);
        assert!(info.is_allow_occupation(2));
        assert!(info.occupy(1));
        assert_eq!(info.remaining(), 1);
        assert!(!info.is_allow_occupation(2));
        assert!(!info.occupy(2));
        assert_eq!(info.occupied(), 1);
        assert!(info.occupy(1));
        assert_eq!(info.remaining(), 0);
    }

    #[test]
    fn test_resolve_groups_requests_by_family() {
        let plan = DeviceBuilder::new()
            .enable_swapchain()
            .append_queue_request(0, 1.0)
            .append_queue_request(1, 0.5)
            .append_queue_request(0, 0.25)
            .resolve(&support())
            .unwrap();

        assert_eq!(
            plan.queue_families().to_vec(),
            vec![(0_u32, vec![1.0_f32, 0.25]), (1, vec![0.5])]
        );
        assert_eq!(plan.extensions()[0].to_str().unwrap(), "VK_KHR_swapchain");
        assert!(plan.swapchain);
    }

    #[test]
    fn test_family_out_of_range_logs_one_error() {
        capture::start();
        let result = DeviceBuilder::new()
            .append_queue_request(5, 1.0)
            .resolve(&support());

        assert_eq!(
            result.unwrap_err(),
            VulkanError::QueueFamilyOutOfRange {
                family: 5,
                available: 2
            }
        );
        let records = capture::take();
        assert_eq!(capture::count_at_least(&records, Level::Error, "family 5"), 1);
    }

    #[test]
    fn test_oversubscribed_family() {
        let result = DeviceBuilder::new()
            .append_queue_request(1, 1.0)
            .append_queue_request(1, 1.0)
            .resolve(&support());
        assert_eq!(
            result.unwrap_err(),
            VulkanError::QueueOversubscribed {
                family: 1,
                requested: 2,
                available: 1
            }
        );
    }

    #[test]
    fn test_missing_queue_request() {
        assert_eq!(
            DeviceBuilder::new().resolve(&support()).unwrap_err(),
            VulkanError::MissingField("queue request")
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let result = DeviceBuilder::new()
            .append_extension("VK_KHR_ray_tracing_pipeline")
            .append_queue_request(0, 1.0)
            .resolve(&support());
        assert_eq!(
            result.unwrap_err(),
            VulkanError::UnsupportedExtension("VK_KHR_ray_tracing_pipeline".to_string())
        );
    }

    #[test]
    fn test_bad_priority_warns_and_is_ignored() {
        capture::start();
        let plan = DeviceBuilder::new()
            .append_queue_request(0, 1.5)
            .append_queue_request(0, f32::NAN)
            .append_queue_request(0, 0.0)
            .resolve(&support())
            .unwrap();

        assert_eq!(plan.queue_families().to_vec(), vec![(0_u32, vec![0.0_f32])]);
        let records = capture::take();
        assert_eq!(capture::count_at_least(&records, Level::Warn, "priority"), 2);
    }

    #[test]
    fn test_find_families_prefers_shared_present() {
        let mut support = support();
        assert_eq!(support.find_families(false), Some((0, None)));
        assert_eq!(support.find_families(true), Some((0, Some(1))));

        support.queue_families[0].present = true;
        assert_eq!(support.find_families(true), Some((0, Some(0))));

        support.queue_families.remove(0);
        assert_eq!(support.find_families(false), None);
    }

    #[test]
    fn test_from_config_requests_swapchain() {
        let config = VulkanConfig {
            device_extensions: vec!["VK_KHR_maintenance1".to_string()],
            ..VulkanConfig::default()
        };
        let builder = DeviceBuilder::from_config(&config);
        assert_eq!(builder.extensions, vec!["VK_KHR_swapchain", "VK_KHR_maintenance1"]);
    }
}
