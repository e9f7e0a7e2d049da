// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The Caller Channel: resolve a service's endpoint in the coordination
//! store, open a TCP connection, write one framed request, and read the
//! reply by reading the stream to EOF.
//!
//! Grounded directly on `rpc_protocol::client::do_rpc_call`'s shape (build
//! message -> single write -> read reply), except the reply here carries no
//! framing of its own (spec's asymmetric envelope) so the channel simply
//! reads until the peer closes the connection.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use log::{debug, trace};

use rpc_controller::Controller;
use rpc_registry::{CoordinationStore, RegistryError};
use rpc_wire::{encode_frame, Endianness, WireError};

#[derive(Debug)]
pub enum CallerError {
    /// No provider was found for a service, or its advertised address
    /// could not be parsed.
    DiscoveryMiss(String),
    Io(io::Error),
    Wire(WireError),
    Registry(RegistryError),
}

impl fmt::Display for CallerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiscoveryMiss(service) => write!(f, "no provider found for service: {service}"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Registry(e) => write!(f, "coordination store error: {e}"),
        }
    }
}

impl std::error::Error for CallerError {}

impl From<io::Error> for CallerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<WireError> for CallerError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

impl From<RegistryError> for CallerError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

/// A provider's advertised listening address, as stored in a coordination
/// store node's data (spec's data-model addition: a typed `host:port` pair
/// rather than a raw string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(data: &[u8]) -> Result<Self, CallerError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| CallerError::DiscoveryMiss("endpoint data is not utf-8".into()))?;
        let (host, port) = text
            .rsplit_once(':')
            .ok_or_else(|| CallerError::DiscoveryMiss(format!("malformed endpoint: {text}")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| CallerError::DiscoveryMiss(format!("malformed port: {port}")))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// Send one framed request to `endpoint` and return the reply bytes
/// (everything the peer writes before closing its side of the connection).
pub fn perform_call(
    endpoint: &Endpoint,
    service_name: &str,
    method_name: &str,
    arg_bytes: &[u8],
    endianness: Endianness,
) -> Result<Vec<u8>, CallerError> {
    let mut stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))?;
    let frame = encode_frame(service_name, method_name, arg_bytes, endianness)?;
    stream.write_all(&frame)?;
    stream.shutdown(std::net::Shutdown::Write)?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    trace!(
        "{service_name}.{method_name} -> {} reply bytes",
        response.len()
    );
    Ok(response)
}

/// The Caller Channel: resolves a service name against a coordination store
/// and performs calls against whatever provider it finds.
#[derive(Clone)]
pub struct CallerChannel {
    registry: Arc<CoordinationStore>,
    endianness: Endianness,
}

impl CallerChannel {
    pub fn new(registry: Arc<CoordinationStore>) -> Self {
        Self {
            registry,
            endianness: Endianness::default(),
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Find a provider for `(service_name, method_name)`: list
    /// `/service_name/method_name`'s children (each an ephemeral sequential
    /// node created by a provider) and pick the lexicographically first
    /// one, the deterministic default mandated when more than one provider
    /// is registered.
    pub fn resolve(&self, service_name: &str, method_name: &str) -> Result<Endpoint, CallerError> {
        let parent = format!("/{service_name}/{method_name}");
        let mut children = self.registry.children(&parent)?;
        if children.is_empty() {
            return Err(CallerError::DiscoveryMiss(format!(
                "{service_name}.{method_name}"
            )));
        }
        children.sort();
        let chosen = &children[0];
        let data = self.registry.get_data(&format!("{parent}/{chosen}"), false)?;
        Endpoint::parse(&data)
    }

    fn call_inner(
        &self,
        service_name: &str,
        method_name: &str,
        arg_bytes: &[u8],
    ) -> Result<Vec<u8>, CallerError> {
        let endpoint = self.resolve(service_name, method_name)?;
        perform_call(&endpoint, service_name, method_name, arg_bytes, self.endianness)
    }

    /// Perform a call synchronously. Per the controller's propagation
    /// policy, this never panics and never returns `Err`: any failure is
    /// recorded on `controller` and an empty byte vector is returned.
    pub fn call(
        &self,
        controller: &mut Controller,
        service_name: &str,
        method_name: &str,
        arg_bytes: &[u8],
    ) -> Vec<u8> {
        match self.call_inner(service_name, method_name, arg_bytes) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("call to {service_name}.{method_name} failed: {e}");
                controller.set_failed(e.to_string());
                Vec::new()
            }
        }
    }

    /// Perform a call on a background thread. `completion` receives a fresh
    /// [`Controller`] (the background thread is its single writer) together
    /// with the reply bytes once the call finishes.
    pub fn call_async(
        &self,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        arg_bytes: Vec<u8>,
        completion: impl FnOnce(Controller, Vec<u8>) + Send + 'static,
    ) {
        let channel = self.clone();
        let service_name = service_name.into();
        let method_name = method_name.into();
        thread::spawn(move || {
            let mut controller = Controller::new();
            let bytes = match channel.call_inner(&service_name, &method_name, &arg_bytes) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("async call to {service_name}.{method_name} failed: {e}");
                    controller.set_failed(e.to_string());
                    Vec::new()
                }
            };
            completion(controller, bytes);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use std::net::TcpListener;

    #[test]
    fn endpoint_parses_host_and_port() {
        let endpoint = Endpoint::parse(b"10.0.0.5:7000").unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, 7000);
    }

    #[test]
    fn endpoint_rejects_malformed_data() {
        assert!(Endpoint::parse(b"not-an-endpoint").is_err());
        assert!(Endpoint::parse(b"host:not-a-port").is_err());
    }

    #[test]
    fn perform_call_round_trips_against_a_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            let frame = rpc_wire::decode_frame(&buf, Endianness::Little).unwrap();
            let rpc_wire::DecodeOutcome::Frame { arg_bytes, .. } = frame else {
                panic!("expected a complete frame");
            };
            stream.write_all(arg_bytes).unwrap();
        });

        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
        };
        let response =
            perform_call(&endpoint, "Echo", "Say", b"hello", Endianness::Little).unwrap();
        assert_eq!(response, b"hello");

        server.join().unwrap();
    }

    #[test]
    fn call_records_connect_failure_on_controller() {
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port: 1, // nothing listens here
        };
        let mut controller = Controller::new();
        let result = perform_call(&endpoint, "Echo", "Say", b"hi", Endianness::Little);
        assert!(result.is_err());
        controller.set_failed(result.unwrap_err().to_string());
        assert!(controller.failed());
    }
}
