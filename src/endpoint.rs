//! Target of a client connection.

use std::fmt;

use url::{Host, Url};

use crate::error::{Error, Result};

/// Default port for the `ws` scheme.
pub const DEFAULT_PORT: u16 = 80;

/// Host, request path and port a [`ClientConnection`](crate::ClientConnection) connects to.
///
/// The path is normalized to start with `/`; an empty path becomes `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    path: String,
    port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, path: impl Into<String>, port: u16) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            host: host.into(),
            path,
            port,
        }
    }

    /// Parse a `ws://host[:port][/path][?query]` URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the input is not a URL, uses a scheme
    /// other than `ws`, or has no host.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidUrl {
            url: input.to_string(),
            reason,
        };

        let url = Url::parse(input).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "ws" {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(invalid("missing host".into())),
        };

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self::new(host, path, url.port().unwrap_or(DEFAULT_PORT)))
    }

    /// Host name or address literal, without brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Value for the HTTP `Host` header.
    #[must_use]
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == DEFAULT_PORT {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws://{}{}", self.host_header(), self.path)
    }
}
