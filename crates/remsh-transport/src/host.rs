//! Host identity, credentials and terminal parameters

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Connection parameters for one remote host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    /// Network address or host name
    pub address: String,
    pub port: u16,
    pub username: String,
}

impl Host {
    pub fn new(address: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_PORT,
            username: username.into(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Parse `user@address[:port]`
    pub fn parse(target: &str) -> Option<Self> {
        let (username, rest) = target.split_once('@')?;
        if username.is_empty() || rest.is_empty() {
            return None;
        }
        let (address, port) = match rest.rsplit_once(':') {
            Some((address, port)) if !address.contains(':') => (address, port.parse().ok()?),
            _ => (rest, DEFAULT_PORT),
        };
        if address.is_empty() {
            return None;
        }
        Some(Self::new(address, username).with_port(port))
    }

    /// `address:port`, the key used for host key pinning
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Stable identifier used to key stored credentials
    pub fn id(&self) -> String {
        format!("{}@{}", self.username, self.endpoint())
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == DEFAULT_PORT {
            write!(f, "{}@{}", self.username, self.address)
        } else {
            write!(f, "{}@{}:{}", self.username, self.address, self.port)
        }
    }
}

/// Authentication material for one connection attempt
#[derive(Clone)]
pub enum Credentials {
    Password(String),
    PrivateKey {
        /// PEM-encoded private key
        key_pem: String,
        passphrase: Option<String>,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(_) => f.write_str("Credentials::Password(<redacted>)"),
            Credentials::PrivateKey { passphrase, .. } => f
                .debug_struct("Credentials::PrivateKey")
                .field("key_pem", &"<redacted>")
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Pseudo-terminal requested for shells and interactive execs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtyRequest {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
        }
    }
}
