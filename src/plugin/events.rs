//! Plugin event publishing
//!
//! Active plugins push named events toward the presentation side. Every
//! event travels on the channel `plugin:event:<pluginId>:<event>`;
//! subscribers filter on plugin id and, optionally, event name.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber before it starts lagging
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Channel name for a plugin event
pub fn event_channel(plugin_id: &str, event: &str) -> String {
    format!("plugin:event:{plugin_id}:{event}")
}

/// An event emitted by a plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PluginEvent {
    pub plugin_id: String,
    pub event: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl PluginEvent {
    pub fn new(plugin_id: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            event: event.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn channel(&self) -> String {
        event_channel(&self.plugin_id, &self.event)
    }
}

/// Which events a subscriber wants to see
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub plugin_id: Option<String>,
    pub event: Option<String>,
}

impl EventFilter {
    /// Every event of every plugin
    pub fn all() -> Self {
        Self::default()
    }

    pub fn plugin(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: Some(plugin_id.into()),
            event: None,
        }
    }

    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn matches(&self, event: &PluginEvent) -> bool {
        self.plugin_id
            .as_deref()
            .map_or(true, |plugin_id| plugin_id == event.plugin_id)
            && self.event.as_deref().map_or(true, |name| name == event.event)
    }
}

/// Fan-out bus shared by all plugins of one host
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PluginEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emitter scoped to one plugin
    pub fn emitter(&self, plugin_id: impl Into<String>) -> EventEmitter {
        EventEmitter {
            plugin_id: plugin_id.into(),
            sender: self.sender.clone(),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: PluginEvent) -> usize {
        log::trace!("Publishing {}", event.channel());
        // No subscribers is not an error
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Handle given to a plugin so it can emit its own events
#[derive(Debug, Clone)]
pub struct EventEmitter {
    plugin_id: String,
    sender: broadcast::Sender<PluginEvent>,
}

impl EventEmitter {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn emit(&self, event: impl Into<String>, payload: Value) -> usize {
        let event = PluginEvent::new(self.plugin_id.clone(), event, payload);
        log::trace!("Publishing {}", event.channel());
        self.sender.send(event).unwrap_or(0)
    }
}

/// Receiving end of a filtered subscription; dropping it unsubscribes
#[derive(Debug)]
pub struct EventSubscription {
    receiver: broadcast::Receiver<PluginEvent>,
    filter: EventFilter,
}

impl EventSubscription {
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Next matching event, or `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<PluginEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Event subscriber lagged behind, {skipped} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event that is already buffered, without waiting
    pub fn try_recv(&mut self) -> Option<PluginEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    log::warn!("Event subscriber lagged behind, {skipped} events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
