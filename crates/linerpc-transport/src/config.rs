//! Configuration types for linerpc transports

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default ceiling for a single undelimited frame (16 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// TCP client transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpClientConfig {
    /// Remote endpoint, `host:port`
    pub address: String,

    /// Per-request deadline; `None` waits forever
    #[serde(with = "duration_serde::option")]
    pub timeout: Option<Duration>,

    /// Fail new requests immediately once disconnected for longer than this
    #[serde(with = "duration_serde::option")]
    pub stop_buffering_after: Option<Duration>,

    /// Maximum consecutive connection attempts before giving up
    pub retries: u32,

    /// Delay between connection attempts
    #[serde(with = "duration_serde")]
    pub retry_interval: Duration,

    /// After retries are exhausted, wait this long and start a fresh round
    #[serde(with = "duration_serde::option")]
    pub reconnect_clear_interval: Option<Duration>,

    pub max_frame_bytes: Option<usize>,
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self {
            address: format!("{}:{}", Ipv4Addr::LOCALHOST, 3000),
            timeout: Some(Duration::from_secs(30)),
            stop_buffering_after: None,
            retries: 10,
            retry_interval: Duration::from_millis(250),
            reconnect_clear_interval: None,
            max_frame_bytes: Some(DEFAULT_MAX_FRAME_BYTES),
        }
    }
}

impl TcpClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stop_buffering_after(mut self, cutoff: Option<Duration>) -> Self {
        self.stop_buffering_after = cutoff;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_reconnect_clear_interval(mut self, interval: Option<Duration>) -> Self {
        self.reconnect_clear_interval = interval;
        self
    }

    pub fn with_max_frame_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_frame_bytes = limit;
        self
    }
}

/// TCP server transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpServerConfig {
    /// Address to bind; port 0 picks an ephemeral port
    pub bind_address: SocketAddr,

    /// Bind attempts to repeat while the address is in use
    pub retries: u32,

    #[serde(with = "duration_serde")]
    pub retry_interval: Duration,

    pub max_frame_bytes: Option<usize>,
}

impl Default for TcpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            retries: 0,
            retry_interval: Duration::from_millis(250),
            max_frame_bytes: Some(DEFAULT_MAX_FRAME_BYTES),
        }
    }
}

impl TcpServerConfig {
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_frame_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_frame_bytes = limit;
        self
    }
}

/// Message compression envelope settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Only messages whose JSON text is longer than this are compressed
    pub threshold_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_bytes: 1024,
        }
    }
}

impl CompressionConfig {
    pub fn enabled(threshold_bytes: usize) -> Self {
        Self {
            enabled: true,
            threshold_bytes,
        }
    }
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let millis = Option::<u64>::deserialize(deserializer)?;
            Ok(millis.map(Duration::from_millis))
        }
    }
}
