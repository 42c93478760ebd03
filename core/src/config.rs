//! Transport-wide knobs.

use serde::Deserialize;
use std::env;

/// Limits and defaults shared by the codec and transformer managers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Cap when collecting a streaming request body.
    pub max_body_size: usize,
    /// Cap when buffering a multipart body.
    pub multipart_max_memory: usize,
    /// Moves the encoded query of outbound `GET` requests into a form body.
    pub query_in_body: bool,
    /// Tag that supplies parameter display names.
    pub named_tag_key: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
            multipart_max_memory: 32 * 1024 * 1024,
            query_in_body: false,
            named_tag_key: "name".to_string(),
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `COURIER_MAX_BODY_SIZE`, `COURIER_MULTIPART_MAX_MEMORY`,
    /// `COURIER_QUERY_IN_BODY` and `COURIER_NAMED_TAG_KEY`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = parsed(&lookup, "COURIER_MAX_BODY_SIZE") {
            config.max_body_size = v;
        }
        if let Some(v) = parsed(&lookup, "COURIER_MULTIPART_MAX_MEMORY") {
            config.multipart_max_memory = v;
        }
        if let Some(v) = parsed(&lookup, "COURIER_QUERY_IN_BODY") {
            config.query_in_body = v;
        }
        if let Some(v) = lookup("COURIER_NAMED_TAG_KEY").filter(|v| !v.trim().is_empty()) {
            config.named_tag_key = v.trim().to_string();
        }
        config
    }

    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    pub fn with_multipart_max_memory(mut self, bytes: usize) -> Self {
        self.multipart_max_memory = bytes;
        self
    }

    pub fn with_query_in_body(mut self, enabled: bool) -> Self {
        self.query_in_body = enabled;
        self
    }

    pub fn with_named_tag_key(mut self, key: impl Into<String>) -> Self {
        self.named_tag_key = key.into();
        self
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}
