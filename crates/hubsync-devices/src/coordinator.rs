//! Device state coordinator.
//!
//! One coordinator owns the authoritative state of one device. Two writers
//! feed it:
//! - [`DeviceStateCoordinator::refresh`], a scheduled pull from the device
//!   API (optionally merged with a paired device),
//! - [`DeviceStateCoordinator::accept_push_update`], state delivered out of
//!   band by a live event channel.
//!
//! Both normalize the state and swap in a new immutable [`StateSnapshot`]
//! under a single write lock, so readers and listeners only ever see a
//! complete snapshot. The last writer wins.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use hubsync_core::{CoordinatorConfig, EventBus, HubEvent, UpdateSource};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::{CoordinatorError, FailureCause};
use crate::push::PushMessage;
use crate::state::{
    ATTR_DEVICE_STATE, ATTR_LORA_INFO, ATTR_NET_TYPE, ATTR_REPORT_AT, DeviceState, StateSnapshot,
    normalize_state,
};
use crate::status::DeviceStatus;
use crate::transport::{
    ClientRequest, DeviceTransport, LoggingReauthHandler, ReauthHandler, TransportError,
};

/// Callback invoked synchronously with every new snapshot.
///
/// Listeners see snapshots in strictly increasing `version` order, even with
/// concurrent writers. A listener must not write back to the coordinator it
/// is registered on.
pub type StateListener = Arc<dyn Fn(&Arc<StateSnapshot>) + Send + Sync>;

/// Handle returned by [`DeviceStateCoordinator::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Result of the network part of a refresh.
struct Fetched {
    device_state: Option<DeviceState>,
    report_at: Option<Value>,
}

/// Keeps one normalized device state snapshot current.
pub struct DeviceStateCoordinator {
    device: Arc<dyn DeviceTransport>,
    paired_device: Option<Arc<dyn DeviceTransport>>,
    config: CoordinatorConfig,
    snapshot: RwLock<Arc<StateSnapshot>>,
    listeners: Mutex<Vec<(ListenerId, StateListener)>>,
    /// Held from the swap until fan-out completes
    commit_order: Mutex<()>,
    next_listener_id: AtomicU64,
    reauth_handler: Arc<dyn ReauthHandler>,
    event_bus: Option<EventBus>,
}

impl DeviceStateCoordinator {
    /// Create a coordinator for `device` holding an empty snapshot.
    pub fn new(device: Arc<dyn DeviceTransport>, config: CoordinatorConfig) -> Self {
        Self {
            device,
            paired_device: None,
            config,
            snapshot: RwLock::new(Arc::new(StateSnapshot::initial())),
            listeners: Mutex::new(Vec::new()),
            commit_order: Mutex::new(()),
            next_listener_id: AtomicU64::new(1),
            reauth_handler: Arc::new(LoggingReauthHandler),
            event_bus: None,
        }
    }

    /// Set the paired device whose nested `state` overrides the primary's.
    pub fn with_paired_device(mut self, paired: Arc<dyn DeviceTransport>) -> Self {
        self.paired_device = Some(paired);
        self
    }

    pub fn with_reauth_handler(mut self, handler: Arc<dyn ReauthHandler>) -> Self {
        self.reauth_handler = handler;
        self
    }

    /// Also publish [`HubEvent`]s on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn device_id(&self) -> &str {
        self.device.device_id()
    }

    pub fn paired_device_id(&self) -> Option<&str> {
        self.paired_device.as_ref().map(|p| p.device_id())
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.snapshot.read().clone()
    }

    /// Current derived status.
    pub fn status(&self) -> DeviceStatus {
        self.snapshot.read().status.clone()
    }

    /// Register a listener. Listeners run in registration order.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Arc<StateSnapshot>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Pull fresh state from the device API.
    ///
    /// Bounded by the configured refresh timeout, which also covers the
    /// paired device fetch. Never retries; the caller's scheduler owns the
    /// next attempt.
    pub async fn refresh(&self) -> Result<Arc<StateSnapshot>, CoordinatorError> {
        let timeout = self.config.refresh_timeout();

        let fetched = match tokio::time::timeout(timeout, self.fetch_merged()).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(TransportError::AuthFailure(msg))) => {
                warn!(device_id = %self.device_id(), error = %msg, "Device API rejected credentials");
                return Err(CoordinatorError::ReauthRequired {
                    device_id: self.device_id().to_string(),
                    source: TransportError::AuthFailure(msg),
                });
            }
            Ok(Err(e)) => return Err(self.update_failed(e.into())),
            Err(_) => return Err(self.update_failed(FailureCause::Timeout(timeout))),
        };

        let Fetched {
            device_state,
            report_at,
        } = fetched;

        // Outer: LoRa block present. Inner: its network type.
        let lora_net_type = device_state
            .as_ref()
            .and_then(|state| state.get(ATTR_LORA_INFO))
            .filter(|lora| !lora.is_null())
            .map(|lora| {
                lora.get(ATTR_NET_TYPE)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });

        let now = Utc::now().naive_utc();
        let threshold = self.config.offline_threshold();
        let state = normalize_state(device_state);

        Ok(self.commit(state, UpdateSource::Refresh, |previous| {
            previous.derive(
                report_at.as_ref(),
                lora_net_type.as_ref().map(Option::as_deref),
                now,
                threshold,
            )
        }))
    }

    async fn fetch_merged(&self) -> Result<Fetched, TransportError> {
        let mut data = self.device.fetch_state().await?.data;

        let mut device_state = match data.remove(ATTR_DEVICE_STATE) {
            Some(Value::Object(state)) => Some(state),
            Some(Value::Null) | None => None,
            Some(other) => {
                debug!(device_id = %self.device_id(), state = %other, "Ignoring non-object device state");
                None
            }
        };

        let report_at = data.remove(ATTR_REPORT_AT).or_else(|| {
            device_state
                .as_ref()
                .and_then(|state| state.get(ATTR_REPORT_AT))
                .cloned()
        });

        if let (Some(paired), Some(state)) = (&self.paired_device, device_state.as_mut()) {
            let paired_data = paired.fetch_state().await?.data;
            let paired_nested = paired_data
                .get(ATTR_DEVICE_STATE)
                .and_then(Value::as_object)
                .and_then(|paired_state| paired_state.get(ATTR_DEVICE_STATE));
            if let Some(nested) = paired_nested {
                debug!(
                    device_id = %self.device_id(),
                    paired_device_id = %paired.device_id(),
                    "Using paired device state"
                );
                state.insert(ATTR_DEVICE_STATE.to_string(), nested.clone());
            }
        }

        Ok(Fetched {
            device_state,
            report_at,
        })
    }

    fn update_failed(&self, cause: FailureCause) -> CoordinatorError {
        error!(
            device_id = %self.device_id(),
            error = %cause,
            "Failed to obtain device status"
        );
        self.emit(HubEvent::UpdateFailed {
            device_id: self.device_id().to_string(),
            error: cause.to_string(),
            timestamp: Utc::now().timestamp(),
        });
        CoordinatorError::UpdateFailed {
            device_id: self.device_id().to_string(),
            cause,
        }
    }

    /// Replace the snapshot with pushed state and notify listeners.
    ///
    /// Status is carried over unchanged. Listeners have run by the time this
    /// returns.
    pub fn accept_push_update(&self, raw_state: impl Into<Option<DeviceState>>) -> Arc<StateSnapshot> {
        let state = normalize_state(raw_state.into());
        self.commit(state, UpdateSource::Push, DeviceStatus::clone)
    }

    /// Apply a live event message addressed to this device.
    ///
    /// Returns `false` and leaves the snapshot alone when the message is for
    /// another device.
    pub fn accept_push_message(&self, message: &PushMessage) -> bool {
        if message.device_id != self.device_id() {
            debug!(
                device_id = %self.device_id(),
                message_device_id = %message.device_id,
                "Ignoring push message for another device"
            );
            return false;
        }
        self.accept_push_update(message.state());
        true
    }

    /// Forward a command to the device and return the response data.
    ///
    /// A credential failure starts the host's re-authentication flow before
    /// the error is returned.
    pub async fn call_device(
        &self,
        request: ClientRequest,
    ) -> Result<Map<String, Value>, CoordinatorError> {
        let timeout = self.config.refresh_timeout();
        let method = request.method.clone();

        let cause = match tokio::time::timeout(timeout, self.device.call_device(request)).await {
            Ok(Ok(response)) => return Ok(response.data),
            Ok(Err(e)) => {
                if e.is_auth_failure() {
                    self.request_reauth();
                }
                FailureCause::Transport(e)
            }
            Err(_) => FailureCause::Timeout(timeout),
        };

        warn!(device_id = %self.device_id(), method = %method, error = %cause, "Device call failed");
        Err(CoordinatorError::CallFailed {
            device_id: self.device_id().to_string(),
            cause,
        })
    }

    /// Start the host's re-authentication flow for this device.
    pub fn request_reauth(&self) {
        self.reauth_handler.start_reauth(self.device_id());
        self.emit(HubEvent::ReauthRequired {
            device_id: self.device_id().to_string(),
            timestamp: Utc::now().timestamp(),
        });
    }

    /// Swap in a new snapshot and fan it out.
    ///
    /// The version and status are computed under the write lock so that
    /// concurrent writers produce strictly increasing versions. Listeners
    /// run after the write lock is released but under `commit_order`, so
    /// readers are never blocked by a listener and fan-out follows version
    /// order.
    fn commit<F>(&self, state: DeviceState, source: UpdateSource, next_status: F) -> Arc<StateSnapshot>
    where
        F: FnOnce(&DeviceStatus) -> DeviceStatus,
    {
        let _order = self.commit_order.lock();
        let (snapshot, previous_status) = {
            let mut current = self.snapshot.write();
            let snapshot = Arc::new(StateSnapshot {
                version: current.version + 1,
                source,
                state,
                status: next_status(&current.status),
                updated_at: Utc::now(),
            });
            let previous = std::mem::replace(&mut *current, snapshot.clone());
            (snapshot, previous.status.clone())
        };

        debug!(
            device_id = %self.device_id(),
            version = snapshot.version,
            source = %source,
            "Device state updated"
        );

        if snapshot.status.differs_from(&previous_status) {
            info!(
                device_id = %self.device_id(),
                online = snapshot.status.online,
                net_type = ?snapshot.status.net_type,
                "Device status changed"
            );
            self.emit(HubEvent::StatusChanged {
                device_id: self.device_id().to_string(),
                online: snapshot.status.online,
                net_type: snapshot.status.net_type.clone(),
                timestamp: Utc::now().timestamp(),
            });
        }

        let listeners: Vec<StateListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }

        self.emit(HubEvent::StateUpdated {
            device_id: self.device_id().to_string(),
            version: snapshot.version,
            source,
            timestamp: snapshot.updated_at.timestamp(),
        });

        snapshot
    }

    fn emit(&self, event: HubEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_with_source(event, "coordinator");
        }
    }
}
