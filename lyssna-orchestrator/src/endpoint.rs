//! Endpoint descriptors and transport addresses.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use lyssna_config::EndpointConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Missing scheme in '{0}'")]
    MissingScheme(String),
    #[error("Unsupported scheme '{scheme}' in '{address}'")]
    UnsupportedScheme { scheme: String, address: String },
    #[error("Missing host or port in '{0}'")]
    MissingHostPort(String),
    #[error("Invalid port in '{0}'")]
    InvalidPort(String),
    #[error("Unix socket path must be absolute in '{0}'")]
    RelativePath(String),
}

/// Where an endpoint can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddress {
    Tcp { host: String, port: u16 },
    /// Probed at the TCP level; the path is informational.
    Http { host: String, port: u16, path: String },
    Unix(PathBuf),
}

impl EndpointAddress {
    /// `host:port` for socket based addresses.
    pub fn socket_addr(&self) -> Option<String> {
        match self {
            EndpointAddress::Tcp { host, port } | EndpointAddress::Http { host, port, .. } => {
                Some(format!("{host}:{port}"))
            }
            EndpointAddress::Unix(_) => None,
        }
    }
}

fn host_port(authority: &str, address: &str) -> Result<(String, u16), AddressError> {
    let (host, port) = authority
        .rsplit_once(':')
        .filter(|(host, port)| !host.is_empty() && !port.is_empty())
        .ok_or_else(|| AddressError::MissingHostPort(address.to_owned()))?;
    let port = port
        .parse()
        .map_err(|_| AddressError::InvalidPort(address.to_owned()))?;
    Ok((host.to_owned(), port))
}

impl FromStr for EndpointAddress {
    type Err = AddressError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = address
            .split_once("://")
            .ok_or_else(|| AddressError::MissingScheme(address.to_owned()))?;
        match scheme.to_ascii_lowercase().as_str() {
            "tcp" => {
                let (host, port) = host_port(rest.trim_end_matches('/'), address)?;
                Ok(EndpointAddress::Tcp { host, port })
            }
            "http" => {
                let (authority, path) = match rest.find('/') {
                    Some(index) => rest.split_at(index),
                    None => (rest, "/"),
                };
                let (host, port) = host_port(authority, address)?;
                Ok(EndpointAddress::Http {
                    host,
                    port,
                    path: path.to_owned(),
                })
            }
            "unix" if rest.starts_with('/') => Ok(EndpointAddress::Unix(PathBuf::from(rest))),
            "unix" => Err(AddressError::RelativePath(address.to_owned())),
            other => Err(AddressError::UnsupportedScheme {
                scheme: other.to_owned(),
                address: address.to_owned(),
            }),
        }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointAddress::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            EndpointAddress::Http { host, port, path } => write!(f, "http://{host}:{port}{path}"),
            EndpointAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Static description of one auxiliary endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub name: String,
    pub address: EndpointAddress,
    pub enabled: bool,
}

impl EndpointDescriptor {
    pub fn new(name: impl Into<String>, address: EndpointAddress) -> Self {
        Self {
            name: name.into(),
            address,
            enabled: true,
        }
    }
}

impl TryFrom<&EndpointConfig> for EndpointDescriptor {
    type Error = AddressError;

    fn try_from(config: &EndpointConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            name: config.name.clone(),
            address: config.address.parse()?,
            enabled: config.enabled,
        })
    }
}
