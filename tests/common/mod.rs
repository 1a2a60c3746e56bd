#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cfbypass_integrations::{ServiceRequest, ServiceResponse, ServiceTransport, TransportError};
use serde_json::Value;

type Responder =
    Box<dyn Fn(&ServiceRequest) -> Result<ServiceResponse, TransportError> + Send + Sync>;

/// Transport answering from a closure and recording every request.
pub struct ScriptedTransport {
    responder: Responder,
    calls: Mutex<Vec<ServiceRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&ServiceRequest) -> Result<ServiceResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every call fails as if nothing listened on the port.
    pub fn unreachable() -> Arc<Self> {
        Self::new(|_| Err(refused()))
    }

    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.path() == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|request| request.path() == path)
            .and_then(|request| request.body.clone())
    }
}

#[async_trait]
impl ServiceTransport for ScriptedTransport {
    async fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        (self.responder)(&request)
    }
}

pub fn ok(value: Value) -> Result<ServiceResponse, TransportError> {
    Ok(ServiceResponse::json(200, &value))
}

pub fn status(code: u16, body: &str) -> Result<ServiceResponse, TransportError> {
    Ok(ServiceResponse::new(code, body.to_string()))
}

pub fn refused() -> TransportError {
    TransportError::Connect("connection refused".into())
}
