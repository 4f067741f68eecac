//! Server configuration
//!
//! Parsed from command line flags with environment variable fallbacks.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

/// Default listening port
pub const DEFAULT_PORT: u16 = 5000;

/// Runtime configuration for the chat server
#[derive(Debug, Clone, Parser)]
#[command(name = "multiroom_chat", version, about = "Multi-client TCP chat server")]
pub struct ServerConfig {
    /// Address to bind the listener to
    #[arg(long, env = "CHAT_BIND", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "CHAT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum number of simultaneous connections
    #[arg(long, env = "CHAT_MAX_CONNECTIONS", default_value_t = 1024)]
    pub max_connections: usize,

    /// Seconds to wait for open sessions to wind down on shutdown
    #[arg(long, env = "CHAT_DRAIN_TIMEOUT_SECS", default_value_t = 5)]
    pub drain_timeout_secs: u64,

    /// Outbound messages queued per client before it counts as stalled
    #[arg(long, env = "CHAT_CLIENT_BUFFER", default_value_t = 256)]
    pub client_buffer: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            max_connections: 1024,
            drain_timeout_secs: 5,
            client_buffer: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["multiroom_chat"]).unwrap();
        assert_eq!(config.socket_addr(), "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.drain_timeout(), Duration::from_secs(5));
        assert_eq!(config.client_buffer, 256);
        assert_eq!(config.client_buffer, ServerConfig::default().client_buffer);
    }

    #[test]
    fn test_flags() {
        let config = ServerConfig::try_parse_from([
            "multiroom_chat",
            "--bind",
            "0.0.0.0",
            "--port",
            "7000",
            "--max-connections",
            "8",
        ])
        .unwrap();
        assert_eq!(config.socket_addr(), "0.0.0.0:7000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.max_connections, 8);
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(ServerConfig::try_parse_from(["multiroom_chat", "--port", "70000"]).is_err());
    }
}
