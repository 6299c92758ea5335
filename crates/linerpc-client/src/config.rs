//! Configuration types for the client core

use serde::{Deserialize, Serialize};

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Call `rpc.methodList` on connect and create proxies for every method
    pub auto_register: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auto_register: true,
        }
    }
}
