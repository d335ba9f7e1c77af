//! The `<address>:<port>` value naming the remote peer.
//!
//! Anything malformed or missing falls back to [`Endpoint::default`] with a
//! warning; a bad endpoint never stops the client from starting.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Address used when nothing valid is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when nothing valid is configured.
pub const DEFAULT_PORT: u16 = 5000;

/// Why an endpoint string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// No `:` separating address and port.
    #[error("expected <address>:<port>, got {0:?}")]
    MissingPort(String),
    /// Nothing before the `:`.
    #[error("empty address in {0:?}")]
    EmptyHost(String),
    /// The port is not a number in 1..=65535.
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

/// Remote peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates an endpoint from parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Parses `text`, falling back to the default on failure.
    ///
    /// `origin` names where the text came from, for the warning.
    #[must_use]
    pub fn parse_or_default(text: &str, origin: &str) -> Self {
        match text.parse() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::warn!(origin, error = %e, "malformed endpoint; using default");
                Self::default()
            }
        }
    }

    /// Reads the first non-blank line of the file at `path`.
    ///
    /// A missing or unreadable file yields the default.
    #[must_use]
    pub fn load_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let line = contents
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty() && !l.starts_with('#'))
                    .unwrap_or_default();
                Self::parse_or_default(line, &path.display().to_string())
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read endpoint file; using default");
                Self::default()
            }
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (host, port) = text
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::MissingPort(text.to_string()))?;
        let host = host.trim();
        if host.is_empty() {
            return Err(EndpointError::EmptyHost(text.to_string()));
        }
        let port = port
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| EndpointError::InvalidPort(port.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let ep: Endpoint = " 192.168.1.20:6000 ".parse().unwrap();
        assert_eq!(ep.host(), "192.168.1.20");
        assert_eq!(ep.port(), 6000);
        assert_eq!(ep.to_string(), "192.168.1.20:6000");
    }

    #[test]
    fn bracketed_ipv6_keeps_brackets() {
        let ep: Endpoint = "[::1]:7000".parse().unwrap();
        assert_eq!(ep.host(), "[::1]");
        assert_eq!(ep.to_string(), "[::1]:7000");
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            "localhost".parse::<Endpoint>(),
            Err(EndpointError::MissingPort(_))
        ));
        assert!(matches!(
            ":5000".parse::<Endpoint>(),
            Err(EndpointError::EmptyHost(_))
        ));
        assert!(matches!(
            "host:http".parse::<Endpoint>(),
            Err(EndpointError::InvalidPort(_))
        ));
        assert!(matches!(
            "host:0".parse::<Endpoint>(),
            Err(EndpointError::InvalidPort(_))
        ));
        assert!(matches!(
            "host:70000".parse::<Endpoint>(),
            Err(EndpointError::InvalidPort(_))
        ));
    }

    #[test]
    fn malformed_falls_back_to_default() {
        let ep = Endpoint::parse_or_default("not an endpoint", "test");
        assert_eq!(ep, Endpoint::default());
        assert_eq!(ep.to_string(), "127.0.0.1:5000");
    }

    #[test]
    fn load_file_reads_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.txt");
        std::fs::write(&path, "# peer\n\n10.0.0.5:5050\nignored\n").unwrap();
        assert_eq!(Endpoint::load_file(&path), Endpoint::new("10.0.0.5", 5050));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let ep = Endpoint::load_file(Path::new("/nonexistent/taskline/server.txt"));
        assert_eq!(ep, Endpoint::default());
    }
}
