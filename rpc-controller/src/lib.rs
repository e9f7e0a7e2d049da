// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The per-call [`Controller`]: a small value the Caller Channel writes to
//! and the caller reads from after `call_method` returns. Single-writer,
//! single-reader-after-return, so it needs no internal synchronization.

/// Per-call status. Created by the caller, mutated by the Caller Channel
/// while a call is in flight, read by the caller once the call returns.
#[derive(Debug, Default, Clone)]
pub struct Controller {
    failed: bool,
    error_text: String,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear any prior failure, for reuse across calls.
    pub fn reset(&mut self) {
        self.failed = false;
        self.error_text.clear();
    }

    pub fn set_failed(&mut self, text: impl Into<String>) {
        self.failed = true;
        self.error_text = text.into();
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn error_text(&self) -> &str {
        &self.error_text
    }

    /// Cancellation is out of scope for this RPC runtime; these exist only
    /// so generated stubs that call them compile against the abstract
    /// controller contract.
    pub fn start_cancel(&mut self) {}

    pub fn is_cancelled(&self) -> bool {
        false
    }

    pub fn notify_on_cancel(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unfailed() {
        let c = Controller::new();
        assert!(!c.failed());
        assert_eq!(c.error_text(), "");
    }

    #[test]
    fn set_failed_then_reset() {
        let mut c = Controller::new();
        c.set_failed("service not found");
        assert!(c.failed());
        assert_eq!(c.error_text(), "service not found");

        c.reset();
        assert!(!c.failed());
        assert_eq!(c.error_text(), "");
    }

    #[test]
    fn cancellation_is_inert() {
        let mut c = Controller::new();
        c.start_cancel();
        c.notify_on_cancel();
        assert!(!c.is_cancelled());
    }
}
