//! Conversion of unrecoverable errors into process exit
//!
//! Library code logs some failures at Error where it detects them. Those
//! errors report [`Reported::already_logged`], and [`terminate`] then only
//! writes the message to stderr, so each failure leaves one Error record.

use std::fmt::Display;

/// Exit status used for fatal startup errors
pub const FATAL_EXIT_CODE: i32 = 1;

/// An error that may already have an Error record in the log
pub trait Reported: Display {
    /// `true` if the code that produced this error already logged it at Error
    fn already_logged(&self) -> bool {
        false
    }
}

impl Reported for std::io::Error {}

impl Reported for String {}

/// Unwrap `result` or log the error and terminate the process
///
/// Only the application entry point should call this; library code returns
/// its errors.
pub fn or_terminate<T, E>(result: Result<T, E>, context: &str) -> T
where
    E: Reported,
{
    match result {
        Ok(value) => value,
        Err(error) => terminate(context, &error),
    }
}

/// Log `error` with `context` unless it was logged already, then exit with
/// [`FATAL_EXIT_CODE`]
pub fn terminate<E: Reported>(context: &str, error: &E) -> ! {
    let message = report(context, error);
    // The logger may not be installed yet when setup itself fails
    eprintln!("{message}");
    std::process::exit(FATAL_EXIT_CODE)
}

fn report<E: Reported>(context: &str, error: &E) -> String {
    let message = describe(context, error);
    if !error.already_logged() {
        log::error!("{message}");
    }
    log::logger().flush();
    message
}

fn describe(context: &str, error: &dyn Display) -> String {
    if context.is_empty() {
        format!("Fatal: {error}")
    } else {
        format!("Fatal: {context}: {error}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::logging::{capture, Level};
    use crate::render::vulkan::{InstanceBuilder, InstanceSupport, VulkanError};
    use crate::EngineError;

    #[test]
    fn test_or_terminate_passes_ok_through() {
        let value = or_terminate(Ok::<_, String>(5), "startup");
        assert_eq!(value, 5);
    }

    #[test]
    fn test_describe_includes_context() {
        assert_eq!(describe("device", &"lost"), "Fatal: device: lost");
        assert_eq!(describe("", &"lost"), "Fatal: lost");
    }

    #[test]
    fn test_missing_extension_is_logged_once() {
        capture::start();
        let error = InstanceBuilder::new()
            .append_extension("VK_EXT_sandbox_missing")
            .resolve(&InstanceSupport::default())
            .map(|_| ())
            .map_err(EngineError::from)
            .unwrap_err();
        let message = report("Initializing Vulkan", &error);
        let records = capture::take();

        assert!(message.contains("VK_EXT_sandbox_missing"));
        assert_eq!(capture::count_at_least(&records, Level::Error, "VK_EXT_sandbox_missing"), 1);
    }

    #[test]
    fn test_unlogged_error_is_logged_by_report() {
        capture::start();
        let error = EngineError::from(VulkanError::Api(ash::vk::Result::ERROR_DEVICE_LOST));
        report("Rendering frame", &error);
        let records = capture::take();

        assert!(!error.already_logged());
        assert_eq!(capture::count_at_least(&records, Level::Error, "ERROR_DEVICE_LOST"), 1);
    }
}
