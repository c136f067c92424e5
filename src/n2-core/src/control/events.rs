// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Structured process events.
//!
//! The control loop emits an event for every safety-relevant transition.
//! Sinks receive them synchronously and must return promptly; persistence
//! and fan-out to slow consumers belong behind a sink, not in the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Unique identifier for a registered sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

impl SinkId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ModeChange,
    FailsafeTriggered,
    FailsafeCleared,
    Reconnected,
    ConnectionLost,
    AuthorizationDenied,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ModeChange => "mode_change",
            EventType::FailsafeTriggered => "failsafe_triggered",
            EventType::FailsafeCleared => "failsafe_cleared",
            EventType::Reconnected => "reconnected",
            EventType::ConnectionLost => "connection_lost",
            EventType::AuthorizationDenied => "authorization_denied",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub event_type: EventType,
    pub description: String,
    /// Role that caused the event, `None` for events raised by the controller itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl ProcessEvent {
    pub fn new(severity: Severity, event_type: EventType, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            event_type,
            description: description.into(),
            actor: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Receiver of process events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &ProcessEvent);
}

/// Dispatches events to registered sinks.
pub struct EventEmitter {
    sinks: Vec<(SinkId, Arc<dyn EventSink>)>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn register(&mut self, sink: Arc<dyn EventSink>) -> SinkId {
        let id = SinkId::new();
        self.sinks.push((id, sink));
        id
    }

    pub fn unregister(&mut self, id: SinkId) {
        self.sinks.retain(|(sid, _)| *sid != id);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn emit(&self, event: ProcessEvent) {
        for (_, sink) in &self.sinks {
            sink.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventType>>);

    impl EventSink for Collect {
        fn on_event(&self, event: &ProcessEvent) {
            if let Ok(mut seen) = self.0.lock() {
                seen.push(event.event_type);
            }
        }
    }

    #[test]
    fn test_register_and_emit() {
        let mut emitter = EventEmitter::new();
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        let id = emitter.register(a.clone());
        emitter.register(b.clone());
        assert_eq!(emitter.sink_count(), 2);

        emitter.emit(ProcessEvent::new(
            Severity::Critical,
            EventType::FailsafeTriggered,
            "zinc alarm",
        ));
        emitter.unregister(id);
        emitter.emit(ProcessEvent::new(
            Severity::Info,
            EventType::Reconnected,
            "plc reachable",
        ));

        assert_eq!(*a.0.lock().unwrap(), vec![EventType::FailsafeTriggered]);
        assert_eq!(
            *b.0.lock().unwrap(),
            vec![EventType::FailsafeTriggered, EventType::Reconnected]
        );
    }

    #[test]
    fn test_event_json_shape() {
        let ev = ProcessEvent::new(Severity::Warning, EventType::AuthorizationDenied, "nope")
            .with_actor("viewer");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["severity"], "warning");
        assert_eq!(v["event_type"], "authorization_denied");
        assert_eq!(v["actor"], "viewer");
        assert!(v["id"].is_string());
    }
}
