//! Client configuration.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::TransportError;

/// Where and how a client reaches the rendezvous server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hostname or IP of the tranx server.
    pub tranx_address: String,
    /// Port of the tranx server.
    pub tranx_port: u16,
    /// Skip the direct-connection probe and always go through the relay.
    pub force_relay: bool,
}

impl ClientConfig {
    /// Configuration for a server at `address:port`.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            tranx_address: address.into(),
            tranx_port: port,
            force_relay: false,
        }
    }

    /// Disables the direct-connection probe.
    pub fn with_force_relay(mut self) -> Self {
        self.force_relay = true;
        self
    }

    /// Checks that the configured address resolves before any connection
    /// attempt, so a typo fails fast with a clear error.
    pub fn resolve(&self) -> Result<SocketAddr, TransportError> {
        (self.tranx_address.as_str(), self.tranx_port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| TransportError::AddressResolution(self.tranx_address.clone()))
    }

    pub(crate) fn endpoint_url(&self, path: &str) -> String {
        format!("ws://{}:{}{}", self.tranx_address, self.tranx_port, path)
    }
}
