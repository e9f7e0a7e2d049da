// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A small `UserService` used to exercise the Provider Server and Caller
//! Channel end-to-end (spec §8's worked scenarios: a successful login and a
//! bad-credentials rejection).

use serde::{Deserialize, Serialize};

use rpc_service::{Completion, DispatchError, ServiceDescriptor, ServiceObject};
use rpc_wire::RpcPayload;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub pwd: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
}

pub struct UserService {
    descriptor: ServiceDescriptor,
}

impl Default for UserService {
    fn default() -> Self {
        Self {
            descriptor: ServiceDescriptor::new("UserService", vec!["Login".to_string()]),
        }
    }
}

impl ServiceObject for UserService {
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    fn call(&self, method: &str, request: &[u8], complete: Completion) {
        match method {
            "Login" => complete.complete(handle_login(request)),
            other => complete.complete(Err(DispatchError::UnknownMethod(other.to_string()))),
        }
    }
}

fn handle_login(request: &[u8]) -> Result<Vec<u8>, DispatchError> {
    let mut login = LoginRequest::default();
    login
        .parse_from_bytes(request)
        .map_err(|e| DispatchError::Serialization(e.to_string()))?;

    let response = if login.name == "zhangsan" && login.pwd == "123456" {
        LoginResponse {
            success: true,
            message: "welcome".to_string(),
        }
    } else {
        LoginResponse {
            success: false,
            message: "bad credentials".to_string(),
        }
    };

    response
        .serialize_to_bytes()
        .map_err(|e| DispatchError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn call_and_collect(service: &UserService, method: &str, request: &[u8]) -> Result<Vec<u8>, DispatchError> {
        let result = Arc::new(Mutex::new(None));
        let result2 = Arc::clone(&result);
        let completion = Completion::new(move |r| *result2.lock().unwrap() = Some(r));
        service.call(method, request, completion);
        result.lock().unwrap().take().expect("completion should fire synchronously")
    }

    #[test]
    fn accepts_correct_credentials() {
        let service = UserService::default();
        let request = LoginRequest {
            name: "zhangsan".to_string(),
            pwd: "123456".to_string(),
        };
        let bytes = call_and_collect(&service, "Login", &request.serialize_to_bytes().unwrap()).unwrap();
        let mut response = LoginResponse::default();
        response.parse_from_bytes(&bytes).unwrap();
        assert!(response.success);
    }

    #[test]
    fn rejects_bad_credentials() {
        let service = UserService::default();
        let request = LoginRequest {
            name: "zhangsan".to_string(),
            pwd: "wrong".to_string(),
        };
        let bytes = call_and_collect(&service, "Login", &request.serialize_to_bytes().unwrap()).unwrap();
        let mut response = LoginResponse::default();
        response.parse_from_bytes(&bytes).unwrap();
        assert!(!response.success);
    }

    #[test]
    fn unknown_method_is_an_error() {
        let service = UserService::default();
        let err = call_and_collect(&service, "Logout", b"").unwrap_err();
        assert!(matches!(err, DispatchError::UnknownMethod(m) if m == "Logout"));
    }
}
