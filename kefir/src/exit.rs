//! Exit-code and structured-error-reporting contract: 0 on success, non-zero
//! with the error written to stderr in the configured format otherwise. The
//! embedding front-end owns `main`/argument parsing; this module gives it a
//! single place to turn a `kefir_ir::Error` into the bytes it writes and the
//! code it exits with.

use crate::config::ErrorFormat;
use kefir_ir::Error;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

pub fn exit_code(result: &kefir_ir::Result<String>) -> i32 {
    match result {
        Ok(_) => EXIT_SUCCESS,
        Err(_) => EXIT_FAILURE,
    }
}

/// Render `error` the way it should be written to stderr, per
/// `config.error_format`.
pub fn render_error(error: &Error, format: ErrorFormat) -> String {
    match format {
        ErrorFormat::PlainText => error.to_string(),
        ErrorFormat::Json => {
            let location = match &error.location {
                Some(loc) => format!("\"{}\"", loc.to_string().replace('"', "\\\"")),
                None => "null".to_string(),
            };
            format!(
                "{{\"kind\":\"{}\",\"message\":\"{}\",\"location\":{}}}",
                error.kind,
                error.message.replace('"', "\\\""),
                location
            )
        }
    }
}
