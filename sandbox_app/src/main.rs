//! Headless sandbox driver
//!
//! The main thread owns the [`Engine`] and renders; an input thread reads
//! commands from stdin and forwards them as window events:
//!
//! ```text
//! resize <width> <height>
//! key <code>
//! move <x> <y>
//! click <button>
//! scroll <dx> <dy>
//! quit
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{value_parser, Arg, Command};
use sandbox_engine::events::{
    FrameSizeEvent, KeyAction, KeyboardEvent, MouseButtonEvent, MouseMoveEvent, MouseScrollEvent,
    FRAME_SIZE_CHANNEL, KEYBOARD_CHANNEL,
};
use sandbox_engine::prelude::*;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn main() {
    let matches = Command::new("sandbox_app")
        .about("Runs the sandbox engine headless, driven by commands on stdin")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (.toml or .ron)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("frames")
                .short('n')
                .long("frames")
                .value_name("COUNT")
                .help("Stop after this many frames")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("no-gpu")
                .long("no-gpu")
                .help("Skip Vulkan initialization")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => fatal::or_terminate(SandboxConfig::load_from_file(path), "Loading configuration"),
        None => SandboxConfig::default(),
    };
    fatal::or_terminate(config.validate(), "Validating configuration");
    fatal::or_terminate(logging::init(&config.logging), "Initializing logging");

    let frame_limit = matches.get_one::<u64>("frames").copied();
    let use_gpu = !matches.get_flag("no-gpu");

    let (sender, pump) = event_channel();
    let input_thread = thread::Builder::new()
        .name("input".to_string())
        .spawn(move || read_commands(&sender));
    let _input = fatal::or_terminate(input_thread, "Spawning input thread");

    // The input thread is left blocked on stdin when rendering stops
    run_render_loop(config, pump, frame_limit, use_gpu);
}

fn run_render_loop(config: SandboxConfig, mut pump: EventPump, frame_limit: Option<u64>, use_gpu: bool) {
    let mut engine = fatal::or_terminate(Engine::new(config), "Creating engine");
    if use_gpu {
        fatal::or_terminate(engine.init_headless(), "Initializing Vulkan");
    }

    engine
        .events_mut()
        .subscribe(FRAME_SIZE_CHANNEL, |size: &mut FrameSizeEvent| {
            if size.is_minimized() {
                log::info!("Window minimized");
            } else {
                log::info!("Window resized to {}x{}", size.width, size.height);
            }
        });
    engine
        .events_mut()
        .subscribe(KEYBOARD_CHANNEL, |key: &mut KeyboardEvent| {
            log::info!("Key {} {:?}", key.key, key.action);
        });

    while engine.is_running() {
        engine.pump_events(&mut pump);
        match engine.frame() {
            Ok(Some(FrameOutcome::Skipped)) => log::debug!("Frame skipped"),
            Ok(_) => {}
            Err(e) => fatal::terminate("Rendering frame", &e),
        }
        if frame_limit.is_some_and(|limit| engine.timer().frame_count() >= limit) {
            engine.quit();
        }
        thread::sleep(FRAME_INTERVAL);
    }
}

fn read_commands(sender: &EventSender) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        match parse_command(&line) {
            Some(WindowEvent::CloseRequested) => {
                sender.send(WindowEvent::CloseRequested);
                break;
            }
            Some(event) => {
                if !sender.send(event) {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => log::warn!("Unrecognized command: {line}"),
        }
    }
}

fn parse_command(line: &str) -> Option<WindowEvent> {
    let mut words = line.split_whitespace();
    let command = words.next()?;
    let mut next_number = || words.next().and_then(|word| word.parse::<f64>().ok());

    let event = match command {
        "resize" => WindowEvent::FrameSize(FrameSizeEvent {
            width: to_u32(next_number()?)?,
            height: to_u32(next_number()?)?,
        }),
        "key" => WindowEvent::Keyboard(KeyboardEvent {
            key: to_i32(next_number()?)?,
            scancode: 0,
            action: KeyAction::Press,
            modifiers: 0,
        }),
        "move" => WindowEvent::MouseMove(MouseMoveEvent {
            x: next_number()?,
            y: next_number()?,
        }),
        "click" => WindowEvent::MouseButton(MouseButtonEvent {
            button: to_u32(next_number()?)?,
            action: KeyAction::Press,
            modifiers: 0,
        }),
        "scroll" => WindowEvent::MouseScroll(MouseScrollEvent {
            x_offset: next_number()?,
            y_offset: next_number()?,
        }),
        "quit" | "exit" => WindowEvent::CloseRequested,
        _ => return None,
    };
    Some(event)
}

fn to_u32(value: f64) -> Option<u32> {
    (value >= 0.0 && value <= f64::from(u32::MAX) && value.fract() == 0.0).then(|| value as u32)
}

fn to_i32(value: f64) -> Option<i32> {
    (value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) && value.fract() == 0.0)
        .then(|| value as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resize_and_quit() {
        assert_eq!(
            parse_command("resize 800 600"),
            Some(WindowEvent::FrameSize(FrameSizeEvent {
                width: 800,
                height: 600
            }))
        );
        assert_eq!(parse_command("quit"), Some(WindowEvent::CloseRequested));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert_eq!(parse_command("resize 800"), None);
        assert_eq!(parse_command("resize -1 600"), None);
        assert_eq!(parse_command("jump 1"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_parse_key_requires_integer_code() {
        assert_eq!(
            parse_command("key -65"),
            Some(WindowEvent::Keyboard(KeyboardEvent {
                key: -65,
                scancode: 0,
                action: KeyAction::Press,
                modifiers: 0,
            }))
        );
        assert_eq!(parse_command("key 1.7"), None);
        assert_eq!(parse_command("key 1e20"), None);
        assert_eq!(parse_command("key NaN"), None);
    }

    #[test]
    fn test_parse_mouse_move() {
        assert_eq!(
            parse_command("move 1.5 -2"),
            Some(WindowEvent::MouseMove(MouseMoveEvent { x: 1.5, y: -2.0 }))
        );
    }
}
