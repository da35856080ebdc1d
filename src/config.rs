//! Configuration utilities (ports, secrets, env vars)

use std::env;
use std::net::{Ipv4Addr, SocketAddr};

/// Runtime configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Shared secret for session-token verification. `None` means no
    /// `JWT_SECRET` was set and a random key should be generated.
    pub jwt_secret: Option<String>,
    /// Suppresses the network listener (set via MODE=test or NODE_ENV=test).
    pub test_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);
        let jwt_secret = env::var("JWT_SECRET").ok().filter(|s| !s.is_empty());
        let test_mode = ["MODE", "NODE_ENV"]
            .iter()
            .any(|k| env::var(k).map(|v| v == "test").unwrap_or(false));
        Self { port, jwt_secret, test_mode }
    }

    /// Socket address to bind the server to: `PORT` or 8080, on 0.0.0.0.
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_8080() {
        let cfg = Config { port: 8080, jwt_secret: None, test_mode: false };
        assert_eq!(cfg.server_addr().port(), 8080);
        assert!(cfg.server_addr().ip().is_unspecified());
    }
}
