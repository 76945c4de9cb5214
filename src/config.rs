use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    /// Fixed seed for the selection engine. Unset means a fresh random
    /// source per request.
    pub selection_seed: Option<u64>,
    pub seed_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let selection_seed = std::env::var("SELECTION_SEED")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok());

        let seed_file = std::env::var("SEED_FILE")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Self {
            host,
            port,
            log_level,
            selection_seed,
            seed_file,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
