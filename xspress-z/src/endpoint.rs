//! Control server endpoint and client identity.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::{Error, Result};

/// Address and port of the detector control server.
///
/// Formats as a zenoh TCP locator, e.g. `tcp/127.0.0.1:12000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// The single connection string handed to the transport.
    pub fn locator(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp/{}:{}", self.address, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Parse `address:port`, tolerating a leading `tcp/` or `tcp://`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix("tcp://")
            .or_else(|| s.strip_prefix("tcp/"))
            .unwrap_or(s);

        let (address, port) = s.rsplit_once(':').ok_or_else(|| {
            Error::configuration(format!("endpoint '{s}' is not of the form address:port"))
        })?;
        if address.is_empty() {
            return Err(Error::configuration(format!(
                "endpoint '{s}' has an empty address"
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::configuration(format!("endpoint '{s}' has a bad port: {e}")))?;

        Ok(Self::new(address, port))
    }
}

/// Identity a client presents to the control server, `xxxx-xxxx` in hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let hi: u16 = rng.r#gen();
        let lo: u16 = rng.r#gen();
        Self(format!("{hi:04x}-{lo:04x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClientIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
