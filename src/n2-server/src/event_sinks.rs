// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Event sinks wired into the control loop at startup.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use n2_core::control::{EventSink, ProcessEvent, Severity};

/// Writes every event to the log at a level matching its severity.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&self, event: &ProcessEvent) {
        let actor = event.actor.as_deref().unwrap_or("system");
        match event.severity {
            Severity::Critical => error!(
                "[{}] {} (by {})",
                event.event_type.as_str(),
                event.description,
                actor
            ),
            Severity::Warning => warn!(
                "[{}] {} (by {})",
                event.event_type.as_str(),
                event.description,
                actor
            ),
            Severity::Info => info!(
                "[{}] {} (by {})",
                event.event_type.as_str(),
                event.description,
                actor
            ),
        }
    }
}

/// Bounded in-memory log of recent events, served to clients.
#[derive(Clone)]
pub struct RecentEvents {
    inner: Arc<Mutex<VecDeque<ProcessEvent>>>,
    capacity: usize,
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Up to `limit` most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ProcessEvent> {
        match self.inner.lock() {
            Ok(events) => {
                let skip = events.len().saturating_sub(limit);
                events.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }
}

impl EventSink for RecentEvents {
    fn on_event(&self, event: &ProcessEvent) {
        if let Ok(mut events) = self.inner.lock() {
            if events.len() == self.capacity {
                events.pop_front();
            }
            events.push_back(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n2_core::control::EventType;

    fn event(desc: &str) -> ProcessEvent {
        ProcessEvent::new(Severity::Info, EventType::ModeChange, desc)
    }

    #[test]
    fn test_recent_events_are_capped() {
        let sink = RecentEvents::new(3);
        for i in 0..5 {
            sink.on_event(&event(&format!("e{i}")));
        }
        assert_eq!(sink.recent(usize::MAX).len(), 3);
        let descs: Vec<_> = sink
            .recent(10)
            .into_iter()
            .map(|e| e.description)
            .collect();
        assert_eq!(descs, vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn test_recent_limit_keeps_newest() {
        let sink = RecentEvents::new(10);
        for i in 0..4 {
            sink.on_event(&event(&format!("e{i}")));
        }
        let last: Vec<_> = sink.recent(2).into_iter().map(|e| e.description).collect();
        assert_eq!(last, vec!["e2", "e3"]);
        assert!(sink.recent(0).is_empty());
    }

    #[test]
    fn test_clones_share_storage() {
        let sink = RecentEvents::new(4);
        let reader = sink.clone();
        sink.on_event(&event("shared"));
        assert_eq!(reader.recent(10).len(), 1);
    }
}
