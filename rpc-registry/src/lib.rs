// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The Coordination Store Client: session lifecycle, node create/read/write/
//! delete, and watches, backed by a real ZooKeeper ensemble via the
//! `zookeeper` crate.
//!
//! This plays the same role in this system that `rpcbind` plays for an
//! ONC-RPC deployment (a well-known place services register themselves so
//! callers can find them) but the underlying store here is a general
//! tree-structured coordination service rather than a purpose-built
//! program/version registrar.

mod session;
mod store;

pub use session::SessionState;
pub use store::{CoordinationStore, NodeEvent, NodeFlags};

use std::fmt;
use std::time::Duration;

/// Default session timeout for a new [`CoordinationStore`] when the
/// application has no more specific value of its own (spec §4.4).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum RegistryError {
    /// The session could not be established, or is no longer usable.
    SessionFailure(String),
    /// `create` was asked to make an ephemeral node that already exists, or
    /// any other create-time conflict the store reports.
    NodeExists(String),
    /// The requested node does not exist.
    NoNode(String),
    /// The coordination store rejected the operation for some other reason.
    Store(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionFailure(msg) => write!(f, "coordination store session failure: {msg}"),
            Self::NodeExists(path) => write!(f, "node already exists: {path}"),
            Self::NoNode(path) => write!(f, "no such node: {path}"),
            Self::Store(msg) => write!(f, "coordination store error: {msg}"),
        }
    }
}

impl std::error::Error for RegistryError {}
