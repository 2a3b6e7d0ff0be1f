// SPDX-License-Identifier: CEPL-1.0
//! Validation-layer message routing.

use std::ffi::{c_void, CStr};

use ash::vk;
use tracing::{error, info, trace, warn, Level};

/// Receives validation messages. Called synchronously from the driver's
/// callback, possibly on a driver thread.
pub trait ValidationSink: Send + Sync {
    fn report(
        &self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        kind: vk::DebugUtilsMessageTypeFlagsEXT,
        message: &str,
    );
}

/// Log level for a validation message; `VERBOSE` and anything unknown go to
/// `TRACE`.
pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if severity.contains(S::ERROR) {
        Level::ERROR
    } else if severity.contains(S::WARNING) {
        Level::WARN
    } else if severity.contains(S::INFO) {
        Level::INFO
    } else {
        Level::TRACE
    }
}

/// Forwards messages to `tracing` at a level matching their severity.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ValidationSink for TracingSink {
    fn report(
        &self,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        kind: vk::DebugUtilsMessageTypeFlagsEXT,
        message: &str,
    ) {
        let level = severity_level(severity);
        if level == Level::ERROR {
            error!("[vulkan {kind:?}] {message}");
        } else if level == Level::WARN {
            warn!("[vulkan {kind:?}] {message}");
        } else if level == Level::INFO {
            info!("[vulkan {kind:?}] {message}");
        } else {
            trace!("[vulkan {kind:?}] {message}");
        }
    }
}

/// Boxed sink whose address is handed to the messenger as user data.
pub(crate) type SinkBox = Box<dyn ValidationSink>;

/// `user` must point at a live [`SinkBox`] for as long as the messenger
/// exists.
pub(crate) unsafe extern "system" fn validation_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user.is_null() {
        return vk::FALSE;
    }
    let (sink, p_message) = unsafe { (&*(user as *const SinkBox), (*data).p_message) };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let message = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();
    sink.report(severity, kind, &message);
    vk::FALSE
}

pub(crate) fn messenger_info(sink: &SinkBox) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(validation_callback),
        p_user_data: sink as *const SinkBox as *mut c_void,
        ..Default::default()
    }
}
