use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::error::ClientError;

const CONFIG_PATH: &str = "bitfetch.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client identifier prepended to the random peer-id tail.
    pub peer_id_prefix: String,
    /// Port reported to the tracker. Nothing listens on it; this client
    /// only leeches.
    pub listen_port: u16,
    /// Seconds to wait for a TCP connect before giving up on a peer.
    pub connect_timeout: u64,
    /// Seconds any single read from a peer may block.
    pub read_timeout: u64,
    /// How many times a piece may fail before the download aborts.
    pub max_retries: u32,
    /// Directory for outputs resolved from the torrent's own name.
    pub download_directory: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            peer_id_prefix: "-BF0001-".to_string(),
            listen_port: 6881,
            connect_timeout: 10, // seconds
            read_timeout: 30,    // seconds
            max_retries: 3,
            download_directory: ".".to_string(),
        }
    }
}

impl Config {
    /// Reads `bitfetch.toml` from the working directory when present,
    /// otherwise falls back to the defaults.
    pub fn load() -> Result<Self, ClientError> {
        if !Path::new(CONFIG_PATH).exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(CONFIG_PATH).map_err(ClientError::FileIo)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| ClientError::Usage(format!("invalid {CONFIG_PATH}: {e}")))?;
        debug!("loaded configuration from {CONFIG_PATH}");
        Ok(config)
    }
}
