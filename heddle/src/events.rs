//! Pipeline events and the synchronous event bus.
//!
//! The engine emits a [`PipelineEvent`] at every lifecycle boundary. The bus
//! fans out in-process and synchronously: global (on-all) listeners first in
//! registration order, then listeners subscribed to the event's kind. A
//! panicking listener never aborts delivery to the rest.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::RwLock;
use serde::Serialize;

use crate::outcome::Outcome;

/// One pipeline lifecycle event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStarted {
        graph_name: String,
    },
    StageStarted {
        node_id: String,
    },
    StageRetrying {
        node_id: String,
        attempt: u32,
        delay_ms: u64,
    },
    StageCompleted {
        node_id: String,
        outcome: Outcome,
    },
    CheckpointSaved {
        node_id: String,
        path: String,
    },
    PipelineCompleted {
        graph_name: String,
        outcome: Outcome,
    },
    PipelineFailed {
        graph_name: String,
        error: String,
    },
}

/// Discriminant used for typed subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PipelineStarted,
    StageStarted,
    StageRetrying,
    StageCompleted,
    CheckpointSaved,
    PipelineCompleted,
    PipelineFailed,
}

impl PipelineEvent {
    /// The kind tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            PipelineEvent::PipelineStarted { .. } => EventKind::PipelineStarted,
            PipelineEvent::StageStarted { .. } => EventKind::StageStarted,
            PipelineEvent::StageRetrying { .. } => EventKind::StageRetrying,
            PipelineEvent::StageCompleted { .. } => EventKind::StageCompleted,
            PipelineEvent::CheckpointSaved { .. } => EventKind::CheckpointSaved,
            PipelineEvent::PipelineCompleted { .. } => EventKind::PipelineCompleted,
            PipelineEvent::PipelineFailed { .. } => EventKind::PipelineFailed,
        }
    }
}

type Listener = Box<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Synchronous in-process fan-out bus.
///
/// No backpressure and no async: `emit` returns after every listener ran.
#[derive(Default)]
pub struct EventBus {
    all: RwLock<Vec<Listener>>,
    typed: RwLock<HashMap<EventKind, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for every event.
    pub fn on_all(&self, listener: impl Fn(&PipelineEvent) + Send + Sync + 'static) {
        self.all.write().push(Box::new(listener));
    }

    /// Registers a listener for one event kind.
    pub fn subscribe(&self, kind: EventKind, listener: impl Fn(&PipelineEvent) + Send + Sync + 'static) {
        self.typed.write().entry(kind).or_default().push(Box::new(listener));
    }

    /// Delivers `event` to global listeners, then typed listeners, in
    /// registration order. Listener panics are contained.
    pub fn emit(&self, event: &PipelineEvent) {
        for listener in self.all.read().iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(kind = ?event.kind(), "event listener panicked");
            }
        }
        if let Some(listeners) = self.typed.read().get(&event.kind()) {
            for listener in listeners {
                if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                    tracing::warn!(kind = ?event.kind(), "event listener panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn started() -> PipelineEvent {
        PipelineEvent::PipelineStarted {
            graph_name: "g".to_string(),
        }
    }

    #[test]
    fn on_all_receives_every_event() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.on_all(move |e| sink.lock().unwrap().push(e.kind()));

        bus.emit(&started());
        bus.emit(&PipelineEvent::StageStarted {
            node_id: "a".to_string(),
        });
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::PipelineStarted, EventKind::StageStarted]
        );
    }

    #[test]
    fn typed_subscription_filters_by_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        bus.subscribe(EventKind::StageStarted, move |_| {
            *sink.lock().unwrap() += 1;
        });

        bus.emit(&started());
        bus.emit(&PipelineEvent::StageStarted {
            node_id: "a".to_string(),
        });
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    /// **Scenario**: global listeners always see an event before typed ones.
    #[test]
    fn global_listeners_run_before_typed() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let a = order.clone();
        bus.subscribe(EventKind::PipelineStarted, move |_| {
            a.lock().unwrap().push("typed");
        });
        let b = order.clone();
        bus.on_all(move |_| b.lock().unwrap().push("global"));

        bus.emit(&started());
        assert_eq!(*order.lock().unwrap(), vec!["global", "typed"]);
    }

    #[test]
    fn panicking_listener_does_not_abort_delivery() {
        let bus = EventBus::new();
        bus.on_all(|_| panic!("listener bug"));
        let seen = Arc::new(Mutex::new(false));
        let sink = seen.clone();
        bus.on_all(move |_| *sink.lock().unwrap() = true);

        bus.emit(&started());
        assert!(*seen.lock().unwrap());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&PipelineEvent::StageRetrying {
            node_id: "a".to_string(),
            attempt: 2,
            delay_ms: 150,
        })
        .expect("serialize");
        assert!(json.contains("\"type\":\"stage_retrying\""));
        assert!(json.contains("\"attempt\":2"));
    }
}
