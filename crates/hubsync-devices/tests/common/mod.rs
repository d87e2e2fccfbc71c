//! Scripted in-memory device transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hubsync_devices::{
    ClientRequest, DeviceResponse, DeviceState, DeviceTransport, ReauthHandler, TransportError,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

pub fn obj(value: Value) -> DeviceState {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn response(value: Value) -> DeviceResponse {
    DeviceResponse::new(obj(value))
}

/// Report time `secs_ago` seconds in the past, in the API's format.
pub fn report_time(secs_ago: i64) -> String {
    (chrono::Utc::now() - chrono::TimeDelta::seconds(secs_ago))
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

pub struct MockTransport {
    device_id: String,
    fetch_results: Mutex<VecDeque<Result<DeviceResponse, TransportError>>>,
    fallback: Mutex<DeviceResponse>,
    call_results: Mutex<VecDeque<Result<DeviceResponse, TransportError>>>,
    calls: Mutex<Vec<ClientRequest>>,
    fetch_count: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockTransport {
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            fetch_results: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(DeviceResponse::default()),
            call_results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            fetch_count: AtomicUsize::new(0),
            delay: Mutex::new(None),
            gate: Mutex::new(None),
        }
    }

    /// Response returned once the scripted queue is empty.
    pub fn with_state(self, value: Value) -> Self {
        *self.fallback.lock() = response(value);
        self
    }

    pub fn push_fetch(&self, result: Result<DeviceResponse, TransportError>) {
        self.fetch_results.lock().push_back(result);
    }

    pub fn push_call(&self, result: Result<DeviceResponse, TransportError>) {
        self.call_results.lock().push_back(result);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Block fetches until the returned notifier fires.
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(notify.clone());
        notify
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ClientRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn fetch_state(&self) -> Result<DeviceResponse, TransportError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.fetch_results.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(self.fallback.lock().clone()),
        }
    }

    async fn call_device(&self, request: ClientRequest) -> Result<DeviceResponse, TransportError> {
        self.calls.lock().push(request);
        let scripted = self.call_results.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(DeviceResponse::default()))
    }
}

/// Re-authentication handler that records which devices asked for it.
#[derive(Default)]
pub struct RecordingReauth {
    pub requests: Mutex<Vec<String>>,
}

impl RecordingReauth {
    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl ReauthHandler for RecordingReauth {
    fn start_reauth(&self, device_id: &str) {
        self.requests.lock().push(device_id.to_string());
    }
}
