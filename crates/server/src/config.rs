use std::net::SocketAddr;

use opsdeck_gate::config::GateConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Cap on buffered request bodies in the idempotency layer.
    pub max_body_bytes: usize,
    pub gate: GateConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
            max_body_bytes: 1024 * 1024,
            gate: GateConfig::default(),
        }
    }
}
