//! Stream and server configuration.
use std::{num::NonZeroU32, time::Duration};

use crate::{Error, payload::PAYLOAD};

const DEFAULT_CHUNKS: NonZeroU32 = NonZeroU32::new(10).unwrap();
const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_LOCATION: &str = "/hello";

/// Shape of one streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    chunks: NonZeroU32,
    interval: Duration,
    payload: &'static [u8],
    content_type: &'static str,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunks: DEFAULT_CHUNKS,
            interval: DEFAULT_INTERVAL,
            payload: PAYLOAD,
            content_type: "text/plain",
        }
    }
}

impl StreamConfig {
    /// Set how many times the payload is written.
    #[inline]
    pub fn with_chunks(mut self, chunks: NonZeroU32) -> Self {
        self.chunks = chunks;
        self
    }

    /// Set the delay before each chunk, including the first.
    #[inline]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the payload written on every tick.
    #[inline]
    pub fn with_payload(mut self, payload: &'static [u8]) -> Self {
        self.payload = payload;
        self
    }

    #[inline]
    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }

    #[inline]
    pub fn chunks(&self) -> NonZeroU32 {
        self.chunks
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[inline]
    pub fn payload(&self) -> &'static [u8] {
        self.payload
    }

    #[inline]
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// Total body length declared up front, `payload length * chunks`.
    #[inline]
    pub fn content_length(&self) -> u64 {
        self.payload.len() as u64 * u64::from(self.chunks.get())
    }
}

/// Host configuration, where to listen and which location streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    addr: String,
    location: String,
    stream: StreamConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.into(),
            location: DEFAULT_LOCATION.into(),
            stream: StreamConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    ///
    /// | variable                 | default          |
    /// | ------------------------ | ---------------- |
    /// | `TICKSTREAM_ADDR`        | `127.0.0.1:3000` |
    /// | `TICKSTREAM_LOCATION`    | `/hello`         |
    /// | `TICKSTREAM_CHUNKS`      | `10`             |
    /// | `TICKSTREAM_INTERVAL_MS` | `1000`           |
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, missing keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(addr) = lookup("TICKSTREAM_ADDR") {
            config.addr = addr;
        }

        if let Some(location) = lookup("TICKSTREAM_LOCATION") {
            if !location.starts_with('/') {
                return Err(Error::InvalidConfig("TICKSTREAM_LOCATION"));
            }
            config.location = location;
        }

        if let Some(chunks) = lookup("TICKSTREAM_CHUNKS") {
            let chunks = chunks
                .trim()
                .parse::<u32>()
                .map_err(|_| Error::InvalidConfig("TICKSTREAM_CHUNKS"))?;
            let chunks = NonZeroU32::new(chunks).ok_or(Error::ZeroChunks)?;
            config.stream = config.stream.with_chunks(chunks);
        }

        if let Some(interval) = lookup("TICKSTREAM_INTERVAL_MS") {
            let millis = interval
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::InvalidConfig("TICKSTREAM_INTERVAL_MS"))?;
            config.stream = config.stream.with_interval(Duration::from_millis(millis));
        }

        Ok(config)
    }

    #[inline]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    #[inline]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[inline]
    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.stream().chunks().get(), 10);
        assert_eq!(config.stream().interval(), Duration::from_secs(1));
        assert_eq!(config.stream().content_length(), 120);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TICKSTREAM_ADDR", "0.0.0.0:8080"),
            ("TICKSTREAM_LOCATION", "/stream"),
            ("TICKSTREAM_CHUNKS", "3"),
            ("TICKSTREAM_INTERVAL_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.location(), "/stream");
        assert_eq!(config.stream().chunks().get(), 3);
        assert_eq!(config.stream().interval(), Duration::from_millis(250));
        assert_eq!(config.stream().content_length(), 36);
    }

    #[test]
    fn test_zero_chunks_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("TICKSTREAM_CHUNKS", "0")])).unwrap_err();
        assert!(matches!(err, Error::ZeroChunks));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("TICKSTREAM_CHUNKS", "-1")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig("TICKSTREAM_CHUNKS")));

        let err = ServerConfig::from_lookup(lookup(&[("TICKSTREAM_LOCATION", "hello")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig("TICKSTREAM_LOCATION")));

        let err = ServerConfig::from_lookup(lookup(&[("TICKSTREAM_INTERVAL_MS", "soon")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig("TICKSTREAM_INTERVAL_MS")));
    }
}
