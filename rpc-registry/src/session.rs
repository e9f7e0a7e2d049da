// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The session-lifecycle state machine (spec §4.4's state table), driven by
//! the events ZooKeeper itself reports through its session watcher.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use zookeeper::{KeeperState, WatchedEvent, Watcher};

/// Session state, exactly spec §4.4's table: `Init -> Connecting ->
/// Connected`, `Connected -> Reconnecting -> Connected` on expiry (plus
/// ephemeral-node restoration), `any -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Internal notifications fed to the background liveness task.
pub(crate) enum SessionEvent {
    Connected,
    Expired,
    Disconnected,
}

/// A `zookeeper::Watcher` that updates shared [`SessionState`] and forwards
/// session-level events to the background liveness task over a channel.
pub(crate) struct SessionWatcher {
    pub(crate) state: Arc<Mutex<SessionState>>,
    pub(crate) events: Mutex<Sender<SessionEvent>>,
}

impl Watcher for SessionWatcher {
    fn handle(&self, event: WatchedEvent) {
        let mut state = self.state.lock().unwrap();
        match event.keeper_state {
            KeeperState::SyncConnected => {
                debug!("coordination store session connected");
                *state = SessionState::Connected;
                let _ = self.events.lock().unwrap().send(SessionEvent::Connected);
            }
            KeeperState::Expired => {
                warn!("coordination store session expired");
                *state = SessionState::Reconnecting;
                let _ = self.events.lock().unwrap().send(SessionEvent::Expired);
            }
            KeeperState::Disconnected => {
                debug!("coordination store session disconnected (may reconnect)");
                let _ = self
                    .events
                    .lock()
                    .unwrap()
                    .send(SessionEvent::Disconnected);
            }
            other => {
                debug!("coordination store session event: {other:?}");
            }
        }
    }
}
