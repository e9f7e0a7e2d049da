// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Service Registry + Provider Server: accept connections, dispatch each
//! frame to the named service/method, and optionally advertise the
//! listening address in a coordination store.
//!
//! Grounded on `rpc_protocol::server::RpcProgram`'s accept-loop/dispatch
//! shape, generalized from a single homogeneous procedure table to a map of
//! heterogeneous [`ServiceObject`]s.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, trace, warn};

use rpc_registry::{CoordinationStore, NodeFlags, RegistryError};
use rpc_service::{Completion, DispatchError, ServiceObject};
use rpc_wire::{decode_frame, DecodeOutcome, Endianness, WireError};

pub const DEFAULT_WORKER_COUNT: usize = 4;

#[derive(Debug)]
pub enum ProviderError {
    /// `notify_service` was called twice for the same service name.
    DuplicateService(String),
    Io(io::Error),
    Wire(WireError),
    Registry(RegistryError),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateService(name) => write!(f, "service already registered: {name}"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Wire(e) => write!(f, "wire error: {e}"),
            Self::Registry(e) => write!(f, "coordination store error: {e}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<io::Error> for ProviderError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<WireError> for ProviderError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

impl From<RegistryError> for ProviderError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

/// The Service Registry + Provider Server. Services are added with
/// [`notify_service`](Self::notify_service) and the resulting map is frozen
/// the moment [`run`](Self::run) starts the accept loop, mirroring the
/// teacher's `RpcProgram::procedures` being built once in `main()`.
pub struct ProviderServer {
    endianness: Endianness,
    worker_count: usize,
    services: HashMap<String, Arc<dyn ServiceObject>>,
    registry: Option<Arc<CoordinationStore>>,
}

impl Default for ProviderServer {
    fn default() -> Self {
        Self {
            endianness: Endianness::default(),
            worker_count: DEFAULT_WORKER_COUNT,
            services: HashMap::new(),
            registry: None,
        }
    }
}

impl ProviderServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    /// Advertise this provider's listening address under the given
    /// coordination store once `run` binds its socket.
    pub fn with_registry(mut self, registry: Arc<CoordinationStore>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a service implementation. Each service name may only be
    /// registered once (spec's Service Info uniqueness invariant).
    pub fn notify_service(&mut self, service: Arc<dyn ServiceObject>) -> Result<(), ProviderError> {
        let name = service.descriptor().name().to_string();
        if self.services.contains_key(&name) {
            return Err(ProviderError::DuplicateService(name));
        }
        self.services.insert(name, service);
        Ok(())
    }

    /// Bind `host:port`, optionally advertise every registered service in
    /// the coordination store, then run the accept loop forever: one
    /// accept thread handing connections off to a fixed pool of worker
    /// threads (default [`DEFAULT_WORKER_COUNT`]).
    pub fn run(self, host: &str, port: u16) -> Result<(), ProviderError> {
        let listener = TcpListener::bind((host, port))?;
        let local_addr = listener.local_addr()?;
        debug!("provider server listening on {local_addr}");

        if let Some(registry) = &self.registry {
            for service in self.services.values() {
                for method_name in service.descriptor().methods() {
                    advertise(
                        registry,
                        service.descriptor().name(),
                        method_name,
                        local_addr.ip().to_string(),
                        local_addr.port(),
                    )?;
                }
            }
        }

        let services = Arc::new(self.services);
        let (tx, rx) = mpsc::channel::<TcpStream>();
        let rx = Arc::new(Mutex::new(rx));

        let worker_count = self.worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let rx = Arc::clone(&rx);
            let services = Arc::clone(&services);
            let endianness = self.endianness;
            workers.push(thread::spawn(move || worker_loop(id, &rx, &services, endianness)));
        }
        drop(rx);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if tx.send(stream).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("error accepting connection: {e}"),
            }
        }

        drop(tx);
        for worker in workers {
            let _ = worker.join();
        }
        Ok(())
    }
}

/// Ensure the persistent `/service_name/method_name` coordination node
/// exists and register an ephemeral-sequential child under it carrying
/// this provider's `host:port` (spec §4.2, §6.3: one such node per
/// registered (service, method) pair).
fn advertise(
    registry: &CoordinationStore,
    service_name: &str,
    method_name: &str,
    host: String,
    port: u16,
) -> Result<(), ProviderError> {
    registry.create(&format!("/{service_name}"), Vec::new(), NodeFlags::Persistent)?;

    let parent = format!("/{service_name}/{method_name}");
    registry.create(&parent, Vec::new(), NodeFlags::Persistent)?;

    let data = format!("{host}:{port}").into_bytes();
    let child_prefix = format!("{parent}/provider-");
    registry.create(&child_prefix, data, NodeFlags::EphemeralSequential)?;
    Ok(())
}

fn worker_loop(
    id: usize,
    rx: &Mutex<mpsc::Receiver<TcpStream>>,
    services: &HashMap<String, Arc<dyn ServiceObject>>,
    endianness: Endianness,
) {
    loop {
        let stream = {
            let rx = rx.lock().unwrap();
            rx.recv()
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(_) => return,
        };
        if let Err(e) = handle_connection(stream, services, endianness) {
            debug!("worker {id}: connection ended with: {e}");
        }
    }
}

/// Per-connection state machine: read until a full frame is buffered,
/// decode it, dispatch to the named service/method, and write the response
/// with no framing of its own (spec's asymmetric envelope).
fn handle_connection<S: Read + Write>(
    mut stream: S,
    services: &HashMap<String, Arc<dyn ServiceObject>>,
    endianness: Endianness,
) -> Result<(), ProviderError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let (service_name, method_name, arg_bytes) = loop {
        match decode_frame(&buf, endianness)? {
            DecodeOutcome::Frame {
                service_name,
                method_name,
                arg_bytes,
                ..
            } => break (service_name, method_name, arg_bytes.to_vec()),
            DecodeOutcome::NeedMore => {
                let n = stream.read(&mut chunk)?;
                if n == 0 {
                    return Err(ProviderError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed before sending a complete frame",
                    )));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    };

    trace!("dispatching {service_name}.{method_name} ({} arg bytes)", arg_bytes.len());

    let (result_tx, result_rx) = mpsc::channel();
    let completion = Completion::new(move |result| {
        let _ = result_tx.send(result);
    });

    match services.get(&service_name) {
        None => {
            debug!("CALL for unknown service {service_name}");
            completion.complete(Err(DispatchError::UnknownMethod(format!(
                "{service_name}.{method_name}"
            ))));
        }
        Some(service) => {
            if !service.descriptor().has_method(&method_name) {
                debug!("CALL for unknown method {service_name}.{method_name}");
                completion.complete(Err(DispatchError::UnknownMethod(method_name.clone())));
            } else {
                service.call(&method_name, &arg_bytes, completion);
            }
        }
    }

    let result = result_rx.recv().map_err(|_| {
        ProviderError::Io(io::Error::new(
            io::ErrorKind::Other,
            "service dropped the completion handle without calling it",
        ))
    })?;

    match result {
        Ok(response_bytes) => {
            stream.write_all(&response_bytes)?;
        }
        Err(e) => {
            // No error-reply framing is defined for this channel (asymmetric
            // envelope, spec §9); the connection is simply dropped and the
            // caller observes an empty/short read.
            warn!("dispatch error for {service_name}.{method_name}: {e}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_service::ServiceDescriptor;
    use rpc_wire::encode_frame;
    use std::io::Cursor;

    struct EchoService {
        descriptor: ServiceDescriptor,
    }

    impl ServiceObject for EchoService {
        fn descriptor(&self) -> &ServiceDescriptor {
            &self.descriptor
        }

        fn call(&self, _method: &str, request: &[u8], complete: Completion) {
            complete.complete(Ok(request.to_vec()));
        }
    }

    struct DuplexBuf {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for DuplexBuf {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for DuplexBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn dispatches_known_service_and_method() {
        let services: HashMap<String, Arc<dyn ServiceObject>> = {
            let mut m: HashMap<String, Arc<dyn ServiceObject>> = HashMap::new();
            m.insert(
                "Echo".to_string(),
                Arc::new(EchoService {
                    descriptor: ServiceDescriptor::new("Echo", vec!["Say".to_string()]),
                }),
            );
            m
        };

        let frame = encode_frame("Echo", "Say", b"hello", Endianness::Little).unwrap();
        let mut stream = DuplexBuf {
            input: Cursor::new(frame),
            output: Vec::new(),
        };

        handle_connection(&mut stream, &services, Endianness::Little).unwrap();
        assert_eq!(stream.output, b"hello");
    }

    #[test]
    fn unknown_service_closes_without_reply() {
        let services: HashMap<String, Arc<dyn ServiceObject>> = HashMap::new();
        let frame = encode_frame("Nope", "Say", b"hi", Endianness::Little).unwrap();
        let mut stream = DuplexBuf {
            input: Cursor::new(frame),
            output: Vec::new(),
        };

        handle_connection(&mut stream, &services, Endianness::Little).unwrap();
        assert!(stream.output.is_empty());
    }

    #[test]
    fn notify_service_rejects_duplicate_names() {
        let descriptor = ServiceDescriptor::new("Echo", vec!["Say".to_string()]);
        let mut server = ProviderServer::new();
        server
            .notify_service(Arc::new(EchoService {
                descriptor: descriptor.clone(),
            }))
            .unwrap();
        let err = server
            .notify_service(Arc::new(EchoService { descriptor }))
            .unwrap_err();
        assert!(matches!(err, ProviderError::DuplicateService(name) if name == "Echo"));
    }
}
