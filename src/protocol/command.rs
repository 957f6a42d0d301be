//! # Device Commands
//!
//! Plain ASCII command strings sent to the device. No framing is added: the
//! literal is written to the transport as-is.

/// Enables periodic telemetry on the device
pub const AUTO_UPDATE_ON: &str = "TOGGLE ON AUTOUPDATE";

/// Disables periodic telemetry on the device
pub const AUTO_UPDATE_OFF: &str = "TOGGLE OFF AUTOUPDATE";

/// Check that a command can go on the wire unchanged.
///
/// Commands must be non-empty ASCII without line terminators.
#[must_use]
pub fn is_valid_command(command: &str) -> bool {
    !command.is_empty() && command.is_ascii() && !command.contains(['\n', '\r'])
}
