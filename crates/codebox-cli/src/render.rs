use codebox_core::{CodeboxError, ExecutionResult};
use std::process::ExitCode;

pub const EXIT_OK: u8 = 0;
/// The submitted program failed or ran out of time.
pub const EXIT_PROGRAM_FAILED: u8 = 1;
/// The request never ran properly: bad input or a broken platform.
pub const EXIT_PLATFORM: u8 = 2;

pub fn exit_status(result: &ExecutionResult) -> u8 {
    if result.is_success() {
        EXIT_OK
    } else if result.is_user_fault() {
        EXIT_PROGRAM_FAILED
    } else {
        EXIT_PLATFORM
    }
}

pub fn exit_code(result: &ExecutionResult) -> ExitCode {
    ExitCode::from(exit_status(result))
}

/// Text for the terminal. Success goes to stdout, everything else to stderr.
pub fn render_text(result: &ExecutionResult) -> (bool, String) {
    (result.is_success(), result.to_string())
}

pub fn render_error(err: &CodeboxError) -> String {
    match err {
        CodeboxError::Validation(msg) => msg.clone(),
        other => format!("Could not run code: {}", other),
    }
}
