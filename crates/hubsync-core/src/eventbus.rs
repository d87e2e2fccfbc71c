//! Event bus for hub events.
//!
//! Coordinators publish [`HubEvent`]s here so that asynchronous consumers
//! (dashboards, automations, the CLI) can observe state changes without
//! registering synchronous listeners on each coordinator.

use crate::event::{EventMetadata, HubEvent};
use tokio::sync::broadcast;

/// Events buffered for slow subscribers.
const CHANNEL_CAPACITY: usize = 256;

/// Broadcast event bus.
///
/// Publishing never blocks and never waits for subscribers, so it is safe
/// to call from synchronous code paths.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<(HubEvent, EventMetadata)>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event with default metadata.
    ///
    /// Returns `true` if there was at least one subscriber.
    pub fn publish(&self, event: HubEvent) -> bool {
        self.publish_with_source(event, "hub")
    }

    /// Publish an event with a custom source.
    pub fn publish_with_source(&self, event: HubEvent, source: impl Into<String>) -> bool {
        self.tx.send((event, EventMetadata::new(source))).is_ok()
    }

    /// Subscribe to all events.
    ///
    /// If the subscriber falls behind, older events are dropped.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to events matching a filter.
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&HubEvent) -> bool + Send + 'static,
    {
        FilteredReceiver {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    /// Subscribe to events for one device.
    pub fn subscribe_device(
        &self,
        device_id: impl Into<String>,
    ) -> FilteredReceiver<impl Fn(&HubEvent) -> bool + Send + 'static> {
        let device_id = device_id.into();
        self.subscribe_filtered(move |event| event.device_id() == device_id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all events from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(HubEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<(HubEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event bus receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<(HubEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }
}

/// Receiver for filtered events from the event bus.
pub struct FilteredReceiver<F>
where
    F: Fn(&HubEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(HubEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&HubEvent) -> bool + Send,
{
    /// Receive the next event matching the filter.
    pub async fn recv(&mut self) -> Option<(HubEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching event without blocking.
    pub fn try_recv(&mut self) -> Option<(HubEvent, EventMetadata)> {
        while let Ok((event, meta)) = self.rx.try_recv() {
            if (self.filter)(&event) {
                return Some((event, meta));
            }
        }
        None
    }
}
