use anyhow::Result;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

pub const SERVICE_NAME: &str = "model-server";

/// Process settings, read once at startup. Artifact location is not here:
/// the locator re-reads it on every load.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub service_name: String,
    pub bind_addr: String,
    pub port: u16,
    pub watch_artifact: bool,
    pub watch_debounce_ms: u64,
}

impl ServerSettings {
    pub fn load() -> Result<Self> {
        recsys_core::load_config(SERVICE_NAME, &[
            ("bind_addr", "0.0.0.0"),
            ("port", "8000"),
            ("watch_artifact", "false"),
            ("watch_debounce_ms", "500"),
        ])
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.bind_addr, self.port).parse()?)
    }

    pub fn watch_debounce(&self) -> Duration { Duration::from_millis(self.watch_debounce_ms) }
}
