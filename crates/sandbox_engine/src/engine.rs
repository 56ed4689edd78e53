//! Core engine implementation
//!
//! `Engine` is the single owner of everything with a lifetime: resource
//! registries, the event bus, and the Vulkan contexts. It is created after the
//! logger is installed and tears down in a fixed order in [`Drop`]:
//! bus and registries, renderer, device, instance.

use std::cell::Cell;
use std::rc::Rc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use thiserror::Error;

use crate::assets::{AnyResourceManager, ResourceError, ShaderResource, ShaderStage, TypedResourceManager};
use crate::config::ConfigError;
use crate::core::config::SandboxConfig;
use crate::events::{EventBus, EventPump, FrameSizeEvent, PumpStatus, FRAME_SIZE_CHANNEL};
use crate::foundation::fatal::Reported;
use crate::foundation::logging::LoggingError;
use crate::foundation::time::Timer;
use crate::render::vulkan::{
    Device, DeviceBuilder, FrameOutcome, Instance, InstanceBuilder, PhysicalDevice, VulkanError,
};
use crate::render::Renderer;

/// Identifier of the configured vertex shader in the shader registry
pub const DEFAULT_VERTEX_SHADER: &str = "shader.vert.default";
/// Identifier of the configured fragment shader in the shader registry
pub const DEFAULT_FRAGMENT_SHADER: &str = "shader.frag.default";

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Vulkan setup or frame failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource registry failure
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Logging setup failure
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    /// Called in the wrong state
    #[error("Engine not ready: {0}")]
    NotReady(&'static str),
}

impl Reported for EngineError {
    fn already_logged(&self) -> bool {
        match self {
            Self::Vulkan(error) => error.already_logged(),
            Self::Resource(error) => error.already_logged(),
            Self::Config(_) | Self::Logging(_) | Self::NotReady(_) => false,
        }
    }
}

/// Main engine struct
pub struct Engine {
    config: SandboxConfig,
    shaders: TypedResourceManager<ShaderResource>,
    resources: AnyResourceManager,
    events: EventBus,
    timer: Timer,
    pending_resize: Rc<Cell<Option<FrameSizeEvent>>>,
    renderer: Option<Renderer>,
    device: Option<Device>,
    physical: Option<PhysicalDevice>,
    instance: Option<Instance>,
    running: bool,
}

impl Engine {
    /// Create an engine with registries and the event bus, without Vulkan
    ///
    /// The configured shaders are loaded into the shader registry; missing
    /// files are logged and stored as incomplete resources.
    pub fn new(config: SandboxConfig) -> Result<Self, EngineError> {
        config.validate()?;
        log::info!("Initializing {}", config.application.name);

        let policy = config.resources.reload_policy;
        let mut shaders = TypedResourceManager::with_policy(policy);
        shaders.load(
            DEFAULT_VERTEX_SHADER,
            ShaderResource::load(&config.shaders.vertex, ShaderStage::Vertex),
        )?;
        shaders.load(
            DEFAULT_FRAGMENT_SHADER,
            ShaderResource::load(&config.shaders.fragment, ShaderStage::Fragment),
        )?;

        let mut events = EventBus::new();
        let pending_resize = Rc::new(Cell::new(None));
        let sink = Rc::clone(&pending_resize);
        events.subscribe(FRAME_SIZE_CHANNEL, move |size: &mut FrameSizeEvent| {
            sink.set(Some(*size));
        });

        Ok(Self {
            config,
            shaders,
            resources: AnyResourceManager::with_policy(policy),
            events,
            timer: Timer::new(),
            pending_resize,
            renderer: None,
            device: None,
            physical: None,
            instance: None,
            running: true,
        })
    }

    /// Create the instance and a device without a surface
    pub fn init_headless(&mut self) -> Result<(), EngineError> {
        self.ensure_uninitialized()?;
        let instance = InstanceBuilder::from_config(&self.config).build(Instance::load_entry()?)?;
        let physical = PhysicalDevice::pick(&instance, None, &self.config.vulkan.device_extensions)?;
        let device = DeviceBuilder::new()
            .append_extensions(self.config.vulkan.device_extensions.iter().map(String::as_str))
            .append_required_queues(&physical)
            .build(&instance, &physical)?;

        self.instance = Some(instance);
        self.physical = Some(physical);
        self.device = Some(device);
        Ok(())
    }

    /// Create the instance, a surface for `window`, a device able to present
    /// to it, and the renderer
    pub fn init_window(
        &mut self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        width: u32,
        height: u32,
    ) -> Result<(), EngineError> {
        self.ensure_uninitialized()?;
        let instance = InstanceBuilder::from_config(&self.config)
            .append_surface_extensions(display)?
            .build(Instance::load_entry()?)?;
        let surface = instance.create_surface(display, window)?;

        let mut required = self.config.vulkan.device_extensions.clone();
        required.push(ash::extensions::khr::Swapchain::name().to_string_lossy().into_owned());
        let physical = PhysicalDevice::pick(&instance, Some(*surface), &required)?;
        let device = DeviceBuilder::from_config(&self.config.vulkan)
            .append_required_queues(&physical)
            .build(&instance, &physical)?;

        let vertex = self.shaders.find(DEFAULT_VERTEX_SHADER)?;
        let fragment = self.shaders.find(DEFAULT_FRAGMENT_SHADER)?;
        let renderer = Renderer::new(
            &instance,
            &device,
            &physical,
            surface,
            vk::Extent2D { width, height },
            vertex,
            fragment,
            &self.config.vulkan,
        )?;

        self.instance = Some(instance);
        self.physical = Some(physical);
        self.device = Some(device);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn ensure_uninitialized(&self) -> Result<(), EngineError> {
        if self.instance.is_some() {
            return Err(EngineError::NotReady("Vulkan is already initialized"));
        }
        Ok(())
    }

    /// Drain window events into the bus; stops the engine on close or
    /// disconnect
    pub fn pump_events(&mut self, pump: &mut EventPump) -> PumpStatus {
        let status = pump.pump(&mut self.events);
        if status.should_stop() {
            self.quit();
        }
        status
    }

    /// Advance the timer, apply a pending resize, and draw if a renderer exists
    pub fn frame(&mut self) -> Result<Option<FrameOutcome>, EngineError> {
        self.timer.tick();

        let resize = self.pending_resize.take();
        let (Some(renderer), Some(instance), Some(device), Some(physical)) = (
            self.renderer.as_mut(),
            self.instance.as_ref(),
            self.device.as_ref(),
            self.physical.as_ref(),
        ) else {
            return Ok(None);
        };

        if let Some(size) = resize {
            log::debug!("Framebuffer resized to {}x{}", size.width, size.height);
            renderer.resize(size.width, size.height);
        }
        Ok(Some(renderer.draw_frame(instance, device, physical)?))
    }

    /// Request engine shutdown
    pub fn quit(&mut self) {
        if self.running {
            log::info!("Engine shutdown requested");
        }
        self.running = false;
    }

    /// Whether the main loop should keep going
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Active configuration
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Shader registry
    pub fn shaders(&self) -> &TypedResourceManager<ShaderResource> {
        &self.shaders
    }

    /// Mutable shader registry
    pub fn shaders_mut(&mut self) -> &mut TypedResourceManager<ShaderResource> {
        &mut self.shaders
    }

    /// Registry for any other resource type
    pub fn resources(&self) -> &AnyResourceManager {
        &self.resources
    }

    /// Mutable registry for any other resource type
    pub fn resources_mut(&mut self) -> &mut AnyResourceManager {
        &mut self.resources
    }

    /// Event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Mutable event bus, for subscribing and publishing
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Frame timer
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Vulkan instance, once initialized
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    /// Logical device, once initialized
    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    /// Selected GPU, once initialized
    pub fn physical_device(&self) -> Option<&PhysicalDevice> {
        self.physical.as_ref()
    }

    /// Renderer, when created with a window
    pub fn renderer_mut(&mut self) -> Option<&mut Renderer> {
        self.renderer.as_mut()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        log::info!(
            "Shutting down after {} frames ({:.1} fps average)",
            self.timer.frame_count(),
            self.timer.average_fps()
        );

        self.events.clear();
        self.resources.clear();
        self.shaders.clear();

        if let Some(device) = &self.device {
            if let Err(e) = device.wait_idle() {
                log::warn!("device_wait_idle failed during shutdown: {e}");
            }
        }
        self.renderer = None;
        self.device = None;
        self.physical = None;
        self.instance = None;
        log::info!("Engine shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{ReloadPolicy, Resource};
    use crate::events::{event_channel, KeyAction, KeyboardEvent, WindowEvent, KEYBOARD_CHANNEL};
    use crate::foundation::logging::{capture, Level};
    use std::path::PathBuf;

    fn missing_shader_config() -> SandboxConfig {
        let mut config = SandboxConfig::default();
        config.shaders.vertex = PathBuf::from("does/not/exist.vert.spv");
        config.shaders.fragment = PathBuf::from("does/not/exist.frag.spv");
        config
    }

    #[derive(Debug, PartialEq)]
    struct Score(u32);

    impl Resource for Score {}

    #[test]
    fn test_missing_shaders_load_incomplete() {
        capture::start();
        let engine = Engine::new(missing_shader_config()).unwrap();
        let records = capture::take();

        let vertex = engine.shaders().find(DEFAULT_VERTEX_SHADER).unwrap();
        assert!(!vertex.is_complete());
        assert!(!engine.shaders().find(DEFAULT_FRAGMENT_SHADER).unwrap().is_complete());
        assert_eq!(capture::count_at_least(&records, Level::Warn, "exist.vert.spv"), 1);
        assert_eq!(capture::count_at_least(&records, Level::Warn, "exist.frag.spv"), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = missing_shader_config();
        config.vulkan.max_frames_in_flight = 0;
        assert!(matches!(Engine::new(config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_reload_policy_comes_from_config() {
        let mut config = missing_shader_config();
        config.resources.reload_policy = ReloadPolicy::Reject;
        let mut engine = Engine::new(config).unwrap();

        engine.resources_mut().load("score", Score(1)).unwrap();
        let err = engine.resources_mut().load("score", Score(2)).unwrap_err();
        assert!(matches!(err, ResourceError::AlreadyLoaded { .. }));
        assert_eq!(engine.resources().find::<Score>("score").unwrap(), &Score(1));
    }

    #[test]
    fn test_pump_routes_events_and_stops_on_close() {
        let mut engine = Engine::new(missing_shader_config()).unwrap();
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        engine
            .events_mut()
            .subscribe(KEYBOARD_CHANNEL, move |event: &mut KeyboardEvent| {
                counter.set(event.key);
            });

        let (sender, mut pump) = event_channel();
        sender.send(WindowEvent::Keyboard(KeyboardEvent {
            key: 65,
            scancode: 30,
            action: KeyAction::Press,
            modifiers: 0,
        }));
        let status = engine.pump_events(&mut pump);
        assert_eq!(status.delivered, 1);
        assert_eq!(seen.get(), 65);
        assert!(engine.is_running());

        sender.send(WindowEvent::CloseRequested);
        engine.pump_events(&mut pump);
        assert!(!engine.is_running());
    }

    #[test]
    fn test_frame_without_renderer_only_ticks() {
        let mut engine = Engine::new(missing_shader_config()).unwrap();
        let (sender, mut pump) = event_channel();
        sender.send(WindowEvent::FrameSize(FrameSizeEvent {
            width: 800,
            height: 600,
        }));
        engine.pump_events(&mut pump);

        assert_eq!(engine.frame().unwrap(), None);
        assert_eq!(engine.frame().unwrap(), None);
        assert_eq!(engine.timer().frame_count(), 2);
    }

    /// Logs when dropped, to observe release order
    struct ReleaseMarker(&'static str);

    impl Drop for ReleaseMarker {
        fn drop(&mut self) {
            log::info!("released {}", self.0);
        }
    }

    impl Resource for ReleaseMarker {}

    #[test]
    fn test_shutdown_releases_handlers_then_resources_before_completing() {
        let mut engine = Engine::new(missing_shader_config()).unwrap();
        engine
            .resources_mut()
            .load("marker", ReleaseMarker("resource"))
            .unwrap();
        let handler_marker = ReleaseMarker("handler");
        engine
            .events_mut()
            .subscribe(KEYBOARD_CHANNEL, move |_: &mut KeyboardEvent| {
                let _held = &handler_marker;
            });

        capture::start();
        drop(engine);
        let records = capture::take();

        let position = |needle: &str| {
            records
                .iter()
                .position(|record| record.message.contains(needle))
                .unwrap()
        };
        assert!(position("Shutting down") < position("released handler"));
        assert!(position("released handler") < position("released resource"));
        assert!(position("released resource") < position("Engine shutdown complete"));
    }
}
