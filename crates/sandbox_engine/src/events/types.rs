//! Window and input event payloads and the channels they travel on

/// Channel for [`FrameSizeEvent`]
pub const FRAME_SIZE_CHANNEL: &str = "frame-size-callback";
/// Channel for [`MouseMoveEvent`]
pub const MOUSE_MOVE_CHANNEL: &str = "mouse-move-callback";
/// Channel for [`KeyboardEvent`]
pub const KEYBOARD_CHANNEL: &str = "keyboard-callback";
/// Channel for [`MouseButtonEvent`]
pub const MOUSE_BUTTON_CHANNEL: &str = "mouse-button-callback";
/// Channel for [`MouseScrollEvent`]
pub const MOUSE_SCROLL_CHANNEL: &str = "mouse-scroll-callback";

/// Framebuffer resized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSizeEvent {
    /// New width in pixels
    pub width: u32,
    /// New height in pixels
    pub height: u32,
}

impl FrameSizeEvent {
    /// Whether the window is minimised (zero area)
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Press, release or auto-repeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Key or button went down
    Press,
    /// Key or button went up
    Release,
    /// Key held down
    Repeat,
}

/// Keyboard key state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardEvent {
    /// Window-system key code
    pub key: i32,
    /// Platform scancode
    pub scancode: i32,
    /// What happened
    pub action: KeyAction,
    /// Modifier bitmask as reported by the window system
    pub modifiers: u32,
}

/// Cursor moved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseMoveEvent {
    /// Cursor x in window coordinates
    pub x: f64,
    /// Cursor y in window coordinates
    pub y: f64,
}

/// Mouse button state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseButtonEvent {
    /// Button index (0 = left)
    pub button: u32,
    /// What happened
    pub action: KeyAction,
    /// Modifier bitmask
    pub modifiers: u32,
}

/// Scroll wheel or trackpad scroll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseScrollEvent {
    /// Horizontal offset
    pub x_offset: f64,
    /// Vertical offset
    pub y_offset: f64,
}
