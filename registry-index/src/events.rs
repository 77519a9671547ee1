//! Repository change notifications.
//!
//! The merger raises a [`RepositoryEvent`] after every successful push. Sinks
//! are registered on an [`EventBus`] at startup; delivery is fire-and-forget
//! and never affects the outcome of the push.

use crate::platform::PlatformTag;
use crate::types::Repository;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "repository_created",
            EventKind::Updated => "repository_updated",
        }
    }
}

/// A push landed in a repository's index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryEvent {
    pub kind: EventKind,
    pub namespace: String,
    pub repository: String,
    /// The raw pushed list for `Created`, the merged list for `Updated`.
    pub value: Value,
    pub arch: String,
    pub os: String,
}

impl RepositoryEvent {
    pub fn new(kind: EventKind, repo: &Repository, value: Value, platform: &PlatformTag) -> Self {
        Self {
            kind,
            namespace: repo.namespace.clone(),
            repository: repo.name.clone(),
            value,
            arch: platform.arch.clone(),
            os: platform.os.clone(),
        }
    }

    pub fn platform(&self) -> PlatformTag {
        PlatformTag::new(self.arch.clone(), self.os.clone())
    }

    /// `namespace/repository`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.namespace, self.repository)
    }
}

/// Receiver of repository events.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: &RepositoryEvent);
}

/// Fan-out to every registered sink.
#[derive(Default, Clone)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for EventBus {
    fn notify(&self, event: &RepositoryEvent) {
        info!(
            event = event.kind.as_str(),
            repository = %event.full_name(),
            arch = %event.arch,
            os = %event.os,
            subscribers = self.sinks.len(),
            "Raising repository event"
        );
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}

/// Forwards events into a broadcast channel for independent subscribers.
pub struct BroadcastSink {
    sender: broadcast::Sender<RepositoryEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn notify(&self, event: &RepositoryEvent) {
        // No receivers is not an error for a fire-and-forget sink.
        if self.sender.send(event.clone()).is_err() {
            debug!(repository = %event.full_name(), "No event subscribers listening");
        }
    }
}
