//! Handoff of window events from the input thread to the render thread
//!
//! The input thread owns an [`EventSender`]; the render thread owns the
//! [`EventPump`] and drains it into its [`EventBus`] once per frame. Nothing
//! else is shared between the two threads.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::bus::EventBus;
use super::types::{
    FrameSizeEvent, KeyboardEvent, MouseButtonEvent, MouseMoveEvent, MouseScrollEvent,
    FRAME_SIZE_CHANNEL, KEYBOARD_CHANNEL, MOUSE_BUTTON_CHANNEL, MOUSE_MOVE_CHANNEL,
    MOUSE_SCROLL_CHANNEL,
};

/// Everything the window system can tell the render thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    /// Framebuffer resized
    FrameSize(FrameSizeEvent),
    /// Key state changed
    Keyboard(KeyboardEvent),
    /// Cursor moved
    MouseMove(MouseMoveEvent),
    /// Mouse button state changed
    MouseButton(MouseButtonEvent),
    /// Scroll input
    MouseScroll(MouseScrollEvent),
    /// User asked to close the window
    CloseRequested,
}

/// Create a connected sender/pump pair
pub fn event_channel() -> (EventSender, EventPump) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (EventSender { sender }, EventPump { receiver })
}

/// Input-thread end of the channel
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: Sender<WindowEvent>,
}

impl EventSender {
    /// Queue `event` for the render thread; `false` once the pump is gone
    pub fn send(&self, event: WindowEvent) -> bool {
        if self.sender.send(event).is_err() {
            log::debug!("Render thread gone, dropping {event:?}");
            return false;
        }
        true
    }
}

/// Result of one [`EventPump::pump`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStatus {
    /// Events taken off the channel
    pub received: usize,
    /// Subscriber callbacks that ran
    pub delivered: usize,
    /// A close request was seen
    pub close_requested: bool,
    /// Every sender has been dropped
    pub disconnected: bool,
}

impl PumpStatus {
    /// Whether the render loop should stop after this pass
    pub fn should_stop(&self) -> bool {
        self.close_requested || self.disconnected
    }
}

/// Render-thread end of the channel
#[derive(Debug)]
pub struct EventPump {
    receiver: Receiver<WindowEvent>,
}

impl EventPump {
    /// Publish every queued event on its channel, without blocking
    pub fn pump(&mut self, bus: &mut EventBus) -> PumpStatus {
        let mut status = PumpStatus::default();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    status.received += 1;
                    match event {
                        WindowEvent::CloseRequested => status.close_requested = true,
                        other => status.delivered += dispatch(bus, other),
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    status.disconnected = true;
                    break;
                }
            }
        }
        status
    }
}

fn dispatch(bus: &mut EventBus, event: WindowEvent) -> usize {
    match event {
        WindowEvent::FrameSize(mut e) => bus.publish(FRAME_SIZE_CHANNEL, &mut e),
        WindowEvent::Keyboard(mut e) => bus.publish(KEYBOARD_CHANNEL, &mut e),
        WindowEvent::MouseMove(mut e) => bus.publish(MOUSE_MOVE_CHANNEL, &mut e),
        WindowEvent::MouseButton(mut e) => bus.publish(MOUSE_BUTTON_CHANNEL, &mut e),
        WindowEvent::MouseScroll(mut e) => bus.publish(MOUSE_SCROLL_CHANNEL, &mut e),
        WindowEvent::CloseRequested => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::KeyAction;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_events_cross_threads_in_order() {
        let (sender, mut pump) = event_channel();
        let producer = std::thread::spawn(move || {
            for width in [640, 800, 1024] {
                sender.send(WindowEvent::FrameSize(FrameSizeEvent { width, height: 480 }));
            }
            sender.send(WindowEvent::CloseRequested);
        });
        producer.join().unwrap();

        let mut bus = EventBus::new();
        let widths = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&widths);
        bus.subscribe(FRAME_SIZE_CHANNEL, move |e: &mut FrameSizeEvent| {
            sink.borrow_mut().push(e.width);
        });

        let status = pump.pump(&mut bus);
        assert_eq!(status.received, 4);
        assert_eq!(status.delivered, 3);
        assert!(status.close_requested);
        assert!(status.disconnected);
        assert!(status.should_stop());
        assert_eq!(*widths.borrow(), vec![640, 800, 1024]);
    }

    #[test]
    fn test_events_routed_to_their_channels() {
        let (sender, mut pump) = event_channel();
        let mut bus = EventBus::new();
        let keys = Rc::new(RefCell::new(0));
        let keys_sink = Rc::clone(&keys);
        bus.subscribe(KEYBOARD_CHANNEL, move |_: &mut KeyboardEvent| {
            *keys_sink.borrow_mut() += 1;
        });

        sender.send(WindowEvent::Keyboard(KeyboardEvent {
            key: 32,
            scancode: 57,
            action: KeyAction::Press,
            modifiers: 0,
        }));
        sender.send(WindowEvent::MouseMove(MouseMoveEvent { x: 1.0, y: 2.0 }));

        let status = pump.pump(&mut bus);
        assert_eq!(status.received, 2);
        assert_eq!(status.delivered, 1);
        assert!(!status.should_stop());
        assert_eq!(*keys.borrow(), 1);
    }

    #[test]
    fn test_send_after_pump_dropped() {
        let (sender, pump) = event_channel();
        drop(pump);
        assert!(!sender.send(WindowEvent::CloseRequested));
    }
}
