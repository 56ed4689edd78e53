//! Instance construction
//!
//! [`InstanceBuilder`] collects layers, extensions and application info,
//! [`InstanceBuilder::resolve`] validates them against what the loader offers
//! ([`InstanceSupport`]), and [`InstanceBuilder::build`] creates the instance
//! plus, with validation on, a debug messenger.

use std::ffi::{c_char, c_void, CStr, CString};

use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use super::error::{VulkanError, VulkanResult};
use super::handles::{self, HandleKind, OwnedSurface};
use crate::core::config::SandboxConfig;
use crate::foundation::TeardownStack;

/// Khronos validation layer name
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Layers and extensions the loader reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceSupport {
    /// Available layer names
    pub layers: Vec<String>,
    /// Available instance extension names
    pub extensions: Vec<String>,
}

impl InstanceSupport {
    /// Ask the loader what it offers
    pub fn query(entry: &Entry) -> VulkanResult<Self> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::Api)?
            .iter()
            .map(|layer| name_from_raw(&layer.layer_name))
            .collect();
        let extensions = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?
            .iter()
            .map(|extension| name_from_raw(&extension.extension_name))
            .collect();
        Ok(Self { layers, extensions })
    }

    /// Whether `name` is an available layer
    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|layer| layer == name)
    }

    /// Whether `name` is an available instance extension
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|extension| extension == name)
    }
}

pub(crate) fn name_from_raw(raw: &[c_char]) -> String {
    // Driver strings are fixed-size, NUL terminated arrays
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// `true` if `name` can be passed to the driver; otherwise logs a warning
pub(crate) fn accept_name(what: &str, name: &str) -> bool {
    if name.is_empty() {
        log::warn!("Ignoring empty {what} name");
        false
    } else if name.contains('\0') {
        log::warn!("Ignoring {what} name with interior NUL: {name:?}");
        false
    } else {
        true
    }
}

/// Convert for the driver, keeping the first of repeated names
pub(crate) fn to_cstrings(names: &[String]) -> VulkanResult<Vec<CString>> {
    let mut unique: Vec<&String> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
        .into_iter()
        .map(|name| {
            CString::new(name.as_str()).map_err(|_| VulkanError::InvalidOperation {
                reason: format!("name contains NUL: {name:?}"),
            })
        })
        .collect()
}

/// Validated parameters for instance creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePlan {
    app_name: CString,
    app_version: u32,
    engine_name: CString,
    api_version: u32,
    layers: Vec<CString>,
    extensions: Vec<CString>,
    debug_messenger: bool,
}

impl InstancePlan {
    /// Layers that will be enabled
    pub fn layers(&self) -> &[CString] {
        &self.layers
    }

    /// Extensions that will be enabled
    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }

    /// Whether a debug messenger is registered after creation
    pub fn debug_messenger(&self) -> bool {
        self.debug_messenger
    }
}

/// Step-by-step instance configuration
///
/// Malformed optional input (an empty name, a name with an interior NUL) is
/// logged at Warn and ignored. Repeated names are enabled once.
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    app_name: String,
    app_version: u32,
    engine_name: String,
    api_version: u32,
    layers: Vec<String>,
    extensions: Vec<String>,
    validation: bool,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self {
            app_name: "Sandbox".to_string(),
            app_version: vk::make_api_version(0, 0, 1, 0),
            engine_name: "sandbox_engine".to_string(),
            api_version: vk::API_VERSION_1_0,
            layers: Vec::new(),
            extensions: Vec::new(),
            validation: false,
        }
    }
}

impl InstanceBuilder {
    /// Start from defaults: API 1.0, no layers or extensions, no validation
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the builder from the application's settings
    pub fn from_config(config: &SandboxConfig) -> Self {
        let (major, minor, patch) = config.application.version;
        let (api_major, api_minor) = config.vulkan.api_version;
        config
            .vulkan
            .layers
            .iter()
            .fold(Self::new(), |builder, layer| builder.append_layer(layer.as_str()))
            .append_extensions(config.vulkan.instance_extensions.iter().map(String::as_str))
            .app_name(&config.application.name)
            .app_version(vk::make_api_version(0, major, minor, patch))
            .api_version(vk::make_api_version(0, api_major, api_minor, 0))
            .enable_validation(config.vulkan.validation_enabled())
    }

    /// Application name reported to the driver
    #[must_use]
    pub fn app_name(mut self, name: &str) -> Self {
        if accept_name("application", name) {
            self.app_name = name.to_string();
        }
        self
    }

    /// Application version (`vk::make_api_version`)
    #[must_use]
    pub fn app_version(mut self, version: u32) -> Self {
        self.app_version = version;
        self
    }

    /// Engine name reported to the driver
    #[must_use]
    pub fn engine_name(mut self, name: &str) -> Self {
        if accept_name("engine", name) {
            self.engine_name = name.to_string();
        }
        self
    }

    /// Requested API version (`vk::API_VERSION_1_*`)
    #[must_use]
    pub fn api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }

    /// Add an instance layer
    #[must_use]
    pub fn append_layer(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if accept_name("layer", &name) {
            self.layers.push(name);
        }
        self
    }

    /// Add an instance extension
    #[must_use]
    pub fn append_extension(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if accept_name("instance extension", &name) {
            self.extensions.push(name);
        }
        self
    }

    /// Add several instance extensions
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

    /// Add the extensions the window system needs to create a surface
    pub fn append_surface_extensions(self, display: RawDisplayHandle) -> VulkanResult<Self> {
        let required = ash_window::enumerate_required_extensions(display).map_err(|result| {
            VulkanError::InvalidOperation {
                reason: format!("window system reports no surface support: {result:?}"),
            }
        })?;
        let names: Vec<String> = required
            .iter()
            // Pointers come from ash's static extension name table
            .map(|&name| unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
            .collect();
        Ok(self.append_extensions(names))
    }

    /// Request the Khronos validation layer and a debug messenger
    #[must_use]
    pub fn enable_validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }

    /// Check every requested name against `support`
    ///
    /// The first missing layer or extension is logged at Error and returned.
    pub fn resolve(mut self, support: &InstanceSupport) -> VulkanResult<InstancePlan> {
        if self.validation {
            if !self.layers.iter().any(|layer| layer == VALIDATION_LAYER) {
                self.layers.push(VALIDATION_LAYER.to_string());
            }
            let debug_utils = DebugUtils::name().to_string_lossy().into_owned();
            if !self.extensions.contains(&debug_utils) {
                self.extensions.push(debug_utils);
            }
        }

        if let Some(missing) = self.layers.iter().find(|layer| !support.has_layer(layer)) {
            log::error!("Instance layer {missing} is not available");
            return Err(VulkanError::UnsupportedLayer(missing.clone()));
        }
        if let Some(missing) = self
            .extensions
            .iter()
            .find(|extension| !support.has_extension(extension))
        {
            log::error!("Instance extension {missing} is not available");
            return Err(VulkanError::UnsupportedExtension(missing.clone()));
        }

        Ok(InstancePlan {
            app_name: CString::new(self.app_name).map_err(|_| VulkanError::MissingField("app_name"))?,
            app_version: self.app_version,
            engine_name: CString::new(self.engine_name)
                .map_err(|_| VulkanError::MissingField("engine_name"))?,
            api_version: self.api_version,
            layers: to_cstrings(&self.layers)?,
            extensions: to_cstrings(&self.extensions)?,
            debug_messenger: self.validation,
        })
    }

    /// Query the loader, resolve, and create the instance
    pub fn build(self, entry: Entry) -> VulkanResult<Instance> {
        let support = InstanceSupport::query(&entry)?;
        let plan = self.resolve(&support)?;
        Instance::create(entry, &plan)
    }
}

/// Owner of the Vulkan instance and instance-level objects
///
/// Torn down in reverse creation order: debug messenger, then instance. The
/// loader library (`Entry`) is released only after both.
pub struct Instance {
    teardown: TeardownStack,
    raw: ash::Instance,
    surface_loader: Surface,
    entry: Entry,
    validation: bool,
}

impl Instance {
    /// Load the system Vulkan library
    pub fn load_entry() -> VulkanResult<Entry> {
        unsafe { Entry::load() }.map_err(|e| {
            log::error!("Failed to load Vulkan: {e}");
            VulkanError::Loading(e.to_string())
        })
    }

    fn create(entry: Entry, plan: &InstancePlan) -> VulkanResult<Self> {
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&plan.app_name)
            .application_version(plan.app_version)
            .engine_name(&plan.engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(plan.api_version);

        let layers: Vec<*const c_char> = plan.layers.iter().map(|name| name.as_ptr()).collect();
        let extensions: Vec<*const c_char> =
            plan.extensions.iter().map(|name| name.as_ptr()).collect();

        // Chained so instance creation and destruction are validated too
        let mut messenger_info = messenger_create_info();
        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions);
        if plan.debug_messenger {
            create_info = create_info.push_next(&mut messenger_info);
        }

        let raw = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|result| VulkanError::creation(HandleKind::Instance, result))?;

        let mut teardown = TeardownStack::new();
        teardown.push(handles::owned(raw.handle(), raw.clone()));

        if plan.debug_messenger {
            let debug_utils = DebugUtils::new(&entry, &raw);
            let messenger =
                unsafe { debug_utils.create_debug_utils_messenger(&messenger_create_info(), None) }
                    .map_err(|result| VulkanError::creation(HandleKind::DebugMessenger, result))?;
            teardown.push(handles::owned(messenger, debug_utils));
        }

        log::info!(
            "Created Vulkan instance ({} layers, {} extensions)",
            plan.layers.len(),
            plan.extensions.len()
        );

        Ok(Self {
            teardown,
            surface_loader: Surface::new(&entry, &raw),
            raw,
            entry,
            validation: plan.debug_messenger,
        })
    }

    /// Create a surface for a native window
    ///
    /// The returned surface must be dropped before this instance.
    pub fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VulkanResult<OwnedSurface> {
        let surface =
            unsafe { ash_window::create_surface(&self.entry, &self.raw, display, window, None) }
                .map_err(|result| VulkanError::creation(HandleKind::Surface, result))?;
        Ok(handles::owned(surface, self.surface_loader.clone()))
    }

    /// Loader entry points
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance function table
    pub fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    /// Raw instance handle
    pub fn handle(&self) -> vk::Instance {
        self.raw.handle()
    }

    /// `VK_KHR_surface` functions
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Whether a debug messenger is active
    pub fn validation_enabled(&self) -> bool {
        self.validation
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.teardown.teardown_all();
    }
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::info!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}
