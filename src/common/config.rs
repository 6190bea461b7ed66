use super::errors::{DuelError, Result};
use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 46337;

/// Static map text used for word navigation. Optional content.
pub const MAP_TEXT_PATH: &str = "data/map.txt";

#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        }
    }
}

#[derive(Parser, Clone, Debug, PartialEq)]
#[command(about = "Typing duel client. Without a target it runs a local practice match.")]
pub struct ClientConfig {
    /// Server to connect to, as `host` or `host:port`.
    pub connect: Option<String>,

    /// Map text for word jumps. Defaults to `data/map.txt` when present.
    #[arg(long, value_name = "FILE")]
    pub map: Option<PathBuf>,
}

impl ClientConfig {
    /// The map text to load, if any. An explicit path is returned even if
    /// missing so loading reports the error.
    pub fn map_path(&self) -> Option<PathBuf> {
        self.map.clone().or_else(|| {
            let default = Path::new(MAP_TEXT_PATH);
            default.exists().then(|| default.to_path_buf())
        })
    }
}

/// Resolves a connect target. A bare host gets the default port.
pub fn resolve_target(target: &str) -> Result<SocketAddr> {
    let target = target.trim();
    if target.is_empty() {
        return Err(DuelError::AddressError("empty connect target".into()));
    }
    let with_port = if target.parse::<SocketAddr>().is_ok() || has_port(target) {
        target.to_string()
    } else if target.contains(':') {
        format!("[{target}]:{DEFAULT_PORT}")
    } else {
        format!("{target}:{DEFAULT_PORT}")
    };
    with_port
        .to_socket_addrs()
        .map_err(|e| DuelError::AddressError(format!("{with_port}: {e}")))?
        .next()
        .ok_or_else(|| DuelError::AddressError(format!("{with_port}: no addresses")))
}

fn has_port(target: &str) -> bool {
    // `[v6]:port` or `host:port`; a bare v6 literal has several colons.
    match target.rsplit_once(':') {
        Some((host, port)) => {
            port.parse::<u16>().is_ok() && (host.ends_with(']') || !host.contains(':'))
        }
        None => false,
    }
}
