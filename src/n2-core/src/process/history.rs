// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::VecDeque;

use crate::process::state::ProcessSnapshot;

/// Fixed-capacity snapshot buffer; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<ProcessSnapshot>,
    capacity: usize,
}

impl HistoryRing {
    /// A zero capacity is bumped to one so the latest snapshot is always kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: ProcessSnapshot) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn latest(&self) -> Option<&ProcessSnapshot> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessSnapshot> {
        self.entries.iter()
    }

    /// Copy out in chronological order.
    pub fn to_vec(&self) -> Vec<ProcessSnapshot> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::state::{ControlMode, Measurements};
    use chrono::Utc;

    fn snap(aperture: f64) -> ProcessSnapshot {
        ProcessSnapshot {
            timestamp: Utc::now(),
            measurements: Measurements::default(),
            aperture,
            aperture_target: aperture,
            mode: ControlMode::Manual,
            reason: "nominal".to_string(),
            warnings: Vec::new(),
            connected: true,
        }
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut ring = HistoryRing::new(3);
        for i in 0..5 {
            ring.push(snap(f64::from(i)));
        }
        assert_eq!(ring.len(), 3);
        let apertures: Vec<f64> = ring.iter().map(|s| s.aperture).collect();
        assert_eq!(apertures, vec![2.0, 3.0, 4.0]);
        assert_eq!(ring.latest().map(|s| s.aperture), Some(4.0));
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut ring = HistoryRing::new(0);
        assert_eq!(ring.capacity(), 1);
        assert!(ring.is_empty());
        ring.push(snap(1.0));
        ring.push(snap(2.0));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.latest().map(|s| s.aperture), Some(2.0));
    }
}
