use std::convert::Infallible;
use std::io::ErrorKind;

use bytes::Bytes;
use chatstream::config::{load_config, AppConfig, ConfigError};
use chatstream::error::StreamError;
use chatstream::message::{process_chat_response, ChatFinish, ChatResponseOptions};
use chatstream::observability::init_tracing;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const REPLAY_CHUNK_SIZE: usize = 4096;

fn main() {
    let mut args = std::env::args().skip(1);
    let Some(recording) = args.next() else {
        eprintln!("Usage: chatstream <recording> [config.yaml]");
        std::process::exit(1);
    };
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(ConfigError::Io(err)) if err.kind() == ErrorKind::NotFound => AppConfig::default(),
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.features.log_level, config.features.log_json);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    match runtime.block_on(replay(&recording, &config)) {
        Ok(finish) => match serde_json::to_string_pretty(&finish) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to encode result: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Replay failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Feed a recorded stream through the reducer in fixed-size chunks.
async fn replay(recording: &str, config: &AppConfig) -> Result<ChatFinish, StreamError> {
    let contents = std::fs::read(recording)
        .map_err(|e| StreamError::Config(format!("failed to read {recording}: {e}")))?;
    let chunks: Vec<Result<Bytes, Infallible>> = contents
        .chunks(REPLAY_CHUNK_SIZE)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();

    let options = ChatResponseOptions::new(|update| {
        tracing::debug!(
            revision_id = %update.revision_id,
            parts = update.message.parts.len(),
            "message updated"
        );
    })
    .with_id_generator(config.ids.id_generator())
    .with_framing(config.stream.framing);

    process_chat_response(futures_util::stream::iter(chunks), options).await
}
