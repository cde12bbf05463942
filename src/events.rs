//! In-process status/event bus.
//!
//! Pipeline stages publish status transitions and log lines here; SSE
//! subscribers and internal listeners receive them through a tokio
//! broadcast channel. The bus has no replay: subscribers see only events
//! published after they subscribe, so API handlers snapshot current state
//! from the database before subscribing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Resource kinds that emit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Registration,
    Generation,
    Build,
    Deployment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Registration => "registration",
            ResourceKind::Generation => "generation",
            ResourceKind::Build => "build",
            ResourceKind::Deployment => "deployment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "registration" => Some(ResourceKind::Registration),
            "generation" => Some(ResourceKind::Generation),
            "build" => Some(ResourceKind::Build),
            "deployment" => Some(ResourceKind::Deployment),
            _ => None,
        }
    }
}

/// A single event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    /// A resource changed status (and possibly health, for deployments).
    StatusUpdate {
        resource_kind: ResourceKind,
        resource_id: Uuid,
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        health: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A log line produced by a running stage.
    Log {
        resource_kind: ResourceKind,
        resource_id: Uuid,
        line: String,
        timestamp: DateTime<Utc>,
    },
}

impl BusEvent {
    pub fn status(
        resource_kind: ResourceKind,
        resource_id: Uuid,
        status: impl Into<String>,
    ) -> Self {
        BusEvent::StatusUpdate {
            resource_kind,
            resource_id,
            status: status.into(),
            health: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn status_with_health(
        resource_kind: ResourceKind,
        resource_id: Uuid,
        status: impl Into<String>,
        health: impl Into<String>,
    ) -> Self {
        BusEvent::StatusUpdate {
            resource_kind,
            resource_id,
            status: status.into(),
            health: Some(health.into()),
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn status_with_message(
        resource_kind: ResourceKind,
        resource_id: Uuid,
        status: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        BusEvent::StatusUpdate {
            resource_kind,
            resource_id,
            status: status.into(),
            health: None,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn log(resource_kind: ResourceKind, resource_id: Uuid, line: impl Into<String>) -> Self {
        BusEvent::Log {
            resource_kind,
            resource_id,
            line: line.into(),
            timestamp: Utc::now(),
        }
    }

    /// The (kind, id) pair used for subscription filtering.
    pub fn resource(&self) -> (ResourceKind, Uuid) {
        match self {
            BusEvent::StatusUpdate {
                resource_kind,
                resource_id,
                ..
            }
            | BusEvent::Log {
                resource_kind,
                resource_id,
                ..
            } => (*resource_kind, *resource_id),
        }
    }
}

/// Broadcast-backed event bus shared across pipeline stages.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event. Events published with no live subscribers are
    /// dropped, which is fine: the database is the source of truth.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribes to all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
