//! Minimal request abstraction handed to the resolver.
//!
//! Only the path is required; scheme, host and port default to a plain
//! `http://localhost:80` request so mapping entries can be consulted.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    path: String,
    scheme: String,
    host: String,
    port: u16,
}

impl ResolveRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 80,
        }
    }

    /// Overrides the scheme and picks its default port.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self.port = if self.scheme == "https" { 443 } else { 80 };
        self
    }

    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
