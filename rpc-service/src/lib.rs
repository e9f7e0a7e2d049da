// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Service/method metadata and the provider-side dispatch capability.
//!
//! In a real deployment these types are produced by a schema compiler
//! (out of scope here, per spec §1) that emits typed stubs conforming to
//! the contract in spec §6.2. This crate defines that contract by hand so
//! the rest of the workspace can be exercised without an actual code
//! generator.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use rpc_wire::RpcPayload;

/// Metadata about one method of a service: its name and (by way of the
/// type parameters) its request/response prototypes.
pub struct MethodDescriptor<Req, Res> {
    service_name: &'static str,
    method_name: &'static str,
    _marker: PhantomData<fn() -> (Req, Res)>,
}

impl<Req, Res> MethodDescriptor<Req, Res>
where
    Req: RpcPayload,
    Res: RpcPayload,
{
    pub const fn new(service_name: &'static str, method_name: &'static str) -> Self {
        Self {
            service_name,
            method_name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.method_name
    }

    pub fn service_name(&self) -> &'static str {
        self.service_name
    }

    pub fn request_prototype(&self) -> Req {
        Req::default()
    }

    pub fn response_prototype(&self) -> Res {
        Res::default()
    }
}

/// Metadata about a service: its name and the names of the methods it
/// offers. Built once (by the code generator, in a real deployment) and
/// never mutated at runtime.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    name: String,
    methods: Vec<String>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, methods: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            methods: methods.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

#[derive(Debug)]
pub enum DispatchError {
    UnknownMethod(String),
    Serialization(String),
    Internal(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMethod(m) => write!(f, "unknown method: {m}"),
            Self::Serialization(msg) => write!(f, "serialization error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for DispatchError {}

type CompletionFn = dyn FnOnce(Result<Vec<u8>, DispatchError>) + Send;

/// A single-shot completion handle passed to [`ServiceObject::call`].
///
/// The `Option` wrapped in the `Mutex` is the at-most-once guard named in
/// spec §4.2 ("dispatch callback called twice must be a no-op"): the inner
/// closure can only ever be taken and invoked once, from whichever thread
/// gets there first.
pub struct Completion {
    inner: Arc<Mutex<Option<Box<CompletionFn>>>>,
}

impl Completion {
    pub fn new(f: impl FnOnce(Result<Vec<u8>, DispatchError>) + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(f)))),
        }
    }

    /// Complete the call. A second call (from any thread) is a no-op.
    pub fn complete(&self, result: Result<Vec<u8>, DispatchError>) {
        if let Some(f) = self.inner.lock().unwrap().take() {
            f(result);
        }
    }
}

impl Clone for Completion {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// The capability set a concrete service implements (REDESIGN FLAGS §9):
/// given a method name and the raw request bytes, either hand the encoded
/// response to `complete`, or fail.
pub trait ServiceObject: Send + Sync {
    fn descriptor(&self) -> &ServiceDescriptor;
    fn call(&self, method: &str, request: &[u8], complete: Completion);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Req {
        n: u32,
    }
    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Res {
        n: u32,
    }

    #[test]
    fn descriptor_round_trips_names() {
        let d: MethodDescriptor<Req, Res> = MethodDescriptor::new("Svc", "Double");
        assert_eq!(d.service_name(), "Svc");
        assert_eq!(d.name(), "Double");
        assert_eq!(d.request_prototype().n, 0);
    }

    #[test]
    fn completion_fires_once() {
        let calls = Arc::new(Mutex::new(0));
        let calls2 = Arc::clone(&calls);
        let completion = Completion::new(move |_| {
            *calls2.lock().unwrap() += 1;
        });

        completion.complete(Ok(vec![]));
        completion.complete(Ok(vec![])); // no-op

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
