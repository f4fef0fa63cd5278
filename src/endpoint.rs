//! `ws://` endpoint addresses.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{Error, Result};

/// A parsed `ws://host[:port][/path][?query]` address.
///
/// The static resource check talks plain HTTP to the same host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// As it appears in a URL, so IPv6 hosts keep their brackets.
    pub host: String,
    pub port: u16,
    /// Request target for the upgrade: path plus any query string.
    pub path: String,
}

impl Endpoint {
    /// `host:port`, used both to dial and as the Host header.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| Error::InvalidEndpoint(format!("{s}: {why}"));
        let url = Url::parse(s).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "ws" {
            return Err(invalid("only ws:// is supported"));
        }
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("no port"))?;

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws://{}:{}{}", self.host, self.port, self.path)
    }
}
