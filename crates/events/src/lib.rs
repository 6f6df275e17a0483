//! `events` crate — the fire-and-forget run event bus.
//!
//! The engine publishes progress events here; WebSocket bridges, log
//! sinks, or nothing at all may be subscribed. Delivery is at-most-once
//! with no acknowledgement: `emit` never blocks and never fails, even
//! with zero subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default ring-buffer capacity for subscribers. Slow subscribers that
/// fall further behind lose the oldest events (`RecvError::Lagged`).
const DEFAULT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// RunEvent
// ---------------------------------------------------------------------------

/// One progress event emitted during an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    DeviceStarted {
        execution_id: Uuid,
        device_id: String,
    },
    DeviceCompleted {
        execution_id: Uuid,
        device_id: String,
        status: String,
    },
    ScenarioStarted {
        execution_id: Uuid,
        device_id: String,
        scenario_id: String,
        repeat_index: u32,
    },
    ScenarioCompleted {
        execution_id: Uuid,
        device_id: String,
        scenario_id: String,
        repeat_index: u32,
        passed: bool,
    },
    NodeRunning {
        execution_id: Uuid,
        device_id: String,
        node_id: String,
    },
    /// A polling action has started waiting; a terminal NodeFinished
    /// for the same node id follows once it resolves.
    NodeWaiting {
        execution_id: Uuid,
        device_id: String,
        node_id: String,
    },
    NodeFinished {
        execution_id: Uuid,
        device_id: String,
        node_id: String,
        status: String,
    },
    /// The device session died; the device's remaining queue was
    /// abandoned.
    SessionCrashed {
        execution_id: Uuid,
        device_id: String,
        scenario_id: String,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Cheap-to-clone publish handle. One bus per process is typical, but
/// nothing prevents per-execution buses in tests.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. A `SendError` only means nobody is listening,
    /// which is a valid state — it is ignored.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers (diagnostics only).
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_event() -> RunEvent {
        RunEvent::NodeRunning {
            execution_id: Uuid::new_v4(),
            device_id: "emu-1".into(),
            node_id: "n1".into(),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_fail() {
        let bus = EventBus::new();
        bus.emit(node_event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let first = node_event();
        bus.emit(first.clone());
        bus.emit(RunEvent::DeviceStarted {
            execution_id: Uuid::new_v4(),
            device_id: "emu-1".into(),
        });

        assert_eq!(rx.recv().await.unwrap(), first);
        assert!(matches!(
            rx.recv().await.unwrap(),
            RunEvent::DeviceStarted { .. }
        ));
    }
}
