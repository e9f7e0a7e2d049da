// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use zookeeper::{Acl, CreateMode, WatchedEvent, Watcher, ZkError, ZooKeeper};

use crate::session::{SessionEvent, SessionState, SessionWatcher};
use crate::RegistryError;

/// Node-creation flags (spec §3, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFlags {
    Persistent,
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
}

impl NodeFlags {
    fn is_ephemeral(self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }

    fn is_sequential(self) -> bool {
        matches!(self, Self::PersistentSequential | Self::EphemeralSequential)
    }

    fn to_create_mode(self) -> CreateMode {
        match self {
            Self::Persistent => CreateMode::Persistent,
            Self::Ephemeral => CreateMode::Ephemeral,
            Self::PersistentSequential => CreateMode::PersistentSequential,
            Self::EphemeralSequential => CreateMode::EphemeralSequential,
        }
    }
}

/// A one-shot watch notification, delivered in place of the underlying
/// crate's closure-style callback (REDESIGN FLAGS §9: watches are adapted
/// to a message-passing interface for consumers that prefer to poll).
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Changed(String),
    Deleted(String),
    ChildrenChanged(String),
    Other(String),
}

struct ChannelWatcher {
    tx: mpsc::Sender<NodeEvent>,
}

impl Watcher for ChannelWatcher {
    fn handle(&self, event: WatchedEvent) {
        let path = event.path.unwrap_or_default();
        let node_event = match event.event_type {
            zookeeper::WatchedEventType::NodeDataChanged => NodeEvent::Changed(path),
            zookeeper::WatchedEventType::NodeDeleted => NodeEvent::Deleted(path),
            zookeeper::WatchedEventType::NodeChildrenChanged => NodeEvent::ChildrenChanged(path),
            _ => NodeEvent::Other(path),
        };
        let _ = self.tx.send(node_event);
    }
}

struct OwnedEphemeral {
    path: String,
    data: Vec<u8>,
    sequential: bool,
}

/// A session-bound client of the coordination store.
///
/// Holds a single shared `ZooKeeper` session handle; every call is
/// serialized through that handle's own internal I/O task (spec §5's
/// "coordination-store session: single shared handle").
pub struct CoordinationStore {
    connect_string: String,
    session_timeout: Duration,
    state: Arc<Mutex<SessionState>>,
    client: Mutex<Option<ZooKeeper>>,
    owned_ephemeral: Mutex<Vec<OwnedEphemeral>>,
}

impl CoordinationStore {
    pub fn new(connect_string: impl Into<String>, session_timeout: Duration) -> Self {
        Self {
            connect_string: connect_string.into(),
            session_timeout,
            state: Arc::new(Mutex::new(SessionState::Init)),
            client: Mutex::new(None),
            owned_ephemeral: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Open a session, blocking until it reaches `Connected` or the session
    /// timeout elapses. Spawns the background liveness task that detects
    /// `Expired` and restores this process's ephemeral nodes.
    pub fn start(self: &Arc<Self>) -> Result<(), RegistryError> {
        *self.state.lock().unwrap() = SessionState::Connecting;

        let (tx, rx) = mpsc::channel();
        let zk = self.connect(tx)?;
        wait_for_connected(&rx, self.session_timeout)?;
        *self.client.lock().unwrap() = Some(zk);

        let this = Arc::clone(self);
        std::thread::spawn(move || this.drive_liveness(rx));

        Ok(())
    }

    fn connect(&self, tx: mpsc::Sender<SessionEvent>) -> Result<ZooKeeper, RegistryError> {
        let watcher = SessionWatcher {
            state: Arc::clone(&self.state),
            events: Mutex::new(tx),
        };
        ZooKeeper::connect(&self.connect_string, self.session_timeout, watcher)
            .map_err(|e| RegistryError::SessionFailure(e.to_string()))
    }

    /// Background task: reacts to session events at least as fast as they
    /// arrive from the underlying client's own I/O thread (spec §4.4's
    /// "drives the session's I/O at >= 1 Hz to detect liveness").
    fn drive_liveness(self: Arc<Self>, rx: Receiver<SessionEvent>) {
        loop {
            match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(SessionEvent::Expired) => {
                    if let Err(e) = self.reestablish() {
                        warn!("failed to re-establish coordination store session: {e}");
                    }
                }
                Ok(SessionEvent::Connected) | Ok(SessionEvent::Disconnected) => {}
                Err(RecvTimeoutError::Timeout) => {
                    if self.state() == SessionState::Closed {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Re-open the session after `Expired` and recreate every ephemeral
    /// node this process owned. Persistent nodes survive expiry and are
    /// not touched.
    fn reestablish(self: &Arc<Self>) -> Result<(), RegistryError> {
        let (tx, rx) = mpsc::channel();
        let zk = self.connect(tx)?;
        wait_for_connected(&rx, self.session_timeout)?;
        *self.client.lock().unwrap() = Some(zk);

        let owned = self.owned_ephemeral.lock().unwrap();
        for entry in owned.iter() {
            let flags = if entry.sequential {
                NodeFlags::EphemeralSequential
            } else {
                NodeFlags::Ephemeral
            };
            if let Err(e) = self.create_on_client(&entry.path, entry.data.clone(), flags) {
                warn!("failed to restore ephemeral node {}: {e}", entry.path);
            } else {
                info!("restored ephemeral node {}", entry.path);
            }
        }

        Ok(())
    }

    fn with_client<R>(
        &self,
        f: impl FnOnce(&ZooKeeper) -> zookeeper::ZkResult<R>,
    ) -> Result<R, RegistryError> {
        let guard = self.client.lock().unwrap();
        let zk = guard
            .as_ref()
            .ok_or_else(|| RegistryError::SessionFailure("session not started".into()))?;
        f(zk).map_err(map_zk_error)
    }

    /// Create a node. Creating an already-existing *persistent* node is
    /// treated as an idempotent ensure-exists; creating a duplicate
    /// ephemeral node is an error (spec §4.4).
    pub fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        flags: NodeFlags,
    ) -> Result<String, RegistryError> {
        let created = self.create_on_client(path, data.clone(), flags);

        let created = match created {
            Err(RegistryError::NodeExists(_)) if !flags.is_ephemeral() => {
                debug!("node {path} already exists, treating as ensure-exists");
                return Ok(path.to_string());
            }
            other => other?,
        };

        if flags.is_ephemeral() {
            self.owned_ephemeral.lock().unwrap().push(OwnedEphemeral {
                path: created.clone(),
                data,
                sequential: flags.is_sequential(),
            });
        }

        Ok(created)
    }

    fn create_on_client(
        &self,
        path: &str,
        data: Vec<u8>,
        flags: NodeFlags,
    ) -> Result<String, RegistryError> {
        self.with_client(|zk| {
            zk.create(
                path,
                data,
                Acl::open_unsafe().clone(),
                flags.to_create_mode(),
            )
        })
    }

    pub fn get_data(&self, path: &str, watch: bool) -> Result<Vec<u8>, RegistryError> {
        self.with_client(|zk| zk.get_data(path, watch).map(|(data, _stat)| data))
    }

    /// Like [`Self::get_data`] but returns a channel that receives exactly
    /// one [`NodeEvent`] when the node next changes or is deleted.
    pub fn get_data_watched(
        &self,
        path: &str,
    ) -> Result<(Vec<u8>, Receiver<NodeEvent>), RegistryError> {
        let (tx, rx) = mpsc::channel();
        let watcher = ChannelWatcher { tx };
        let data = self.with_client(|zk| zk.get_data_w(path, watcher).map(|(data, _stat)| data))?;
        Ok((data, rx))
    }

    pub fn set_data(&self, path: &str, data: Vec<u8>, version: i32) -> Result<(), RegistryError> {
        self.with_client(|zk| zk.set_data(path, data, version).map(|_stat| ()))
    }

    pub fn delete_node(&self, path: &str, version: i32) -> Result<(), RegistryError> {
        self.with_client(|zk| zk.delete(path, version))
    }

    pub fn exists(&self, path: &str, watch: bool) -> Result<bool, RegistryError> {
        self.with_client(|zk| zk.exists(path, watch).map(|stat| stat.is_some()))
    }

    /// List the immediate children of `path`, for resolving which of a
    /// method's sequential nodes to use (spec §9: "lexicographically first
    /// child" is the mandated deterministic default).
    pub fn children(&self, path: &str) -> Result<Vec<String>, RegistryError> {
        self.with_client(|zk| zk.get_children(path, false))
    }

    /// Close the session. Ephemeral nodes this process created vanish
    /// server-side as a consequence (spec §6.5).
    pub fn close(&self) -> Result<(), RegistryError> {
        *self.state.lock().unwrap() = SessionState::Closed;
        let mut guard = self.client.lock().unwrap();
        if let Some(zk) = guard.take() {
            zk.close().map_err(map_zk_error)?;
        }
        Ok(())
    }
}

fn wait_for_connected(
    rx: &Receiver<SessionEvent>,
    timeout: Duration,
) -> Result<(), RegistryError> {
    match rx.recv_timeout(timeout) {
        Ok(SessionEvent::Connected) => Ok(()),
        Ok(_) => Err(RegistryError::SessionFailure(
            "session reported an event other than Connected before timing out".into(),
        )),
        Err(_) => Err(RegistryError::SessionFailure(format!(
            "session did not reach Connected within {timeout:?}"
        ))),
    }
}

fn map_zk_error(e: ZkError) -> RegistryError {
    match e {
        ZkError::NodeExists => RegistryError::NodeExists(String::new()),
        ZkError::NoNode => RegistryError::NoNode(String::new()),
        other => RegistryError::Store(other.to_string()),
    }
}
