//! TOML host configuration, loaded once at startup and split into the
//! consensus [`obscura_core::config::Config`] and the transport
//! [`obscura_network::config::NetConfig`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use obscura_core::config::{Config, ConfigBuilder};
use obscura_network::config::NetConfig;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub network: String,
    pub difficulty: u32,
    pub block_reward: u64,
    pub listen_endpoint: String,
    pub bootstrap_endpoints: Vec<String>,
    pub max_peers: usize,
    pub ping_frequency_seconds: u64,
    pub genesis_path: Option<PathBuf>,
}

impl Default for FileConfig {
    fn default() -> Self {
        let net = NetConfig::default();
        let core = Config::default();
        Self {
            network: core.network,
            difficulty: core.difficulty,
            block_reward: core.block_reward,
            listen_endpoint: net.listen_endpoint.to_string(),
            bootstrap_endpoints: Vec::new(),
            max_peers: net.max_peers,
            ping_frequency_seconds: net.ping_frequency_seconds,
            genesis_path: None,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn core_config(&self) -> Config {
        ConfigBuilder::new()
            .difficulty(self.difficulty)
            .block_reward(self.block_reward)
            .network(self.network.clone())
            .finish()
    }

    pub fn net_config(&self) -> anyhow::Result<NetConfig> {
        let listen_endpoint: SocketAddr = self.listen_endpoint.parse()?;
        let bootstrap_endpoints = self
            .bootstrap_endpoints
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<SocketAddr>, _>>()?;
        Ok(NetConfig {
            listen_endpoint,
            bootstrap_endpoints,
            max_peers: self.max_peers,
            ping_frequency_seconds: self.ping_frequency_seconds,
            initial_peer_rating: obscura_network::config::NET_INITIAL_PEER_RATING,
        })
    }
}
