use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

const ID_ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
pub const DEFAULT_ID_SIZE: usize = 16;

/// Source of message and revision ids, injected into each pipeline.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// Random alphanumeric ids, optionally prefixed (`msg-AbC123...`).
#[derive(Debug, Clone)]
pub struct RandomIdGenerator {
    prefix: Option<String>,
    size: usize,
}

impl RandomIdGenerator {
    #[must_use]
    pub fn new(prefix: Option<String>, size: usize) -> Self {
        Self { prefix, size }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new(None, DEFAULT_ID_SIZE)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> String {
        let prefix_len = self.prefix.as_ref().map_or(0, |p| p.len() + 1);
        let mut out = String::with_capacity(prefix_len + self.size);
        if let Some(prefix) = self.prefix.as_deref() {
            out.push_str(prefix);
            out.push('-');
        }
        for _ in 0..self.size {
            out.push(char::from(ID_ALPHABET[fastrand::usize(..ID_ALPHABET.len())]));
        }
        out
    }
}

/// Deterministic `prefix-N` ids. Mostly useful for tests and replays.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{id}", self.prefix)
    }
}

/// Wall clock in unix milliseconds, injected so tests can pin timestamps.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

#[must_use]
pub fn system_clock() -> Clock {
    Arc::new(unix_now_millis)
}

#[inline]
#[must_use]
pub fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Deep-merge `overlay` into `base`.
///
/// Objects merge key by key; any other overlay value replaces the base value.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
