use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::protocol::{FinishReason, LanguageModelUsage};

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// `json` switches to one JSON object per line. Installing twice is a no-op.
pub fn init_tracing(log_level: &str, json: bool) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Log a finalized message at INFO level.
pub fn log_message_complete(
    message_id: &str,
    part_count: usize,
    finish_reason: FinishReason,
    usage: &LanguageModelUsage,
    start_time: Instant,
) {
    info!(
        message_id = message_id,
        parts = part_count,
        finish_reason = %finish_reason,
        input_tokens = usage.input_tokens.unwrap_or(0),
        output_tokens = usage.output_tokens.unwrap_or(0),
        total_tokens = usage.total_tokens.unwrap_or(0),
        duration_seconds = start_time.elapsed().as_secs_f64(),
        "message completed"
    );
}
