// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Control-mode state machine.
//!
//! Failsafe can be entered from any mode. The only way out is an explicit
//! clear, which always lands in `Manual`.

use crate::process::state::{ControlMode, RequestedMode};

/// Events that can move the controller between modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    /// Authorized request for a normal operating mode.
    Request(RequestedMode),
    /// A safety condition latched failsafe.
    Trip,
    /// Authorized acknowledgement of the failsafe condition.
    Clear,
}

#[derive(Debug, Clone)]
pub struct ModeMachine {
    mode: ControlMode,
    transition_count: u64,
}

impl Default for ModeMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeMachine {
    /// Start in `Manual`.
    pub fn new() -> Self {
        Self {
            mode: ControlMode::Manual,
            transition_count: 0,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Apply an event. Returns the previous mode if a transition occurred.
    pub fn process_event(&mut self, event: ModeEvent) -> Option<ControlMode> {
        let next = self.next_mode(event)?;
        if next == self.mode {
            return None;
        }
        let old = self.mode;
        self.mode = next;
        self.transition_count += 1;
        Some(old)
    }

    fn next_mode(&self, event: ModeEvent) -> Option<ControlMode> {
        match (self.mode, event) {
            (_, ModeEvent::Trip) => Some(ControlMode::Failsafe),
            (ControlMode::Failsafe, ModeEvent::Clear) => Some(ControlMode::Manual),
            // Requests cannot leave failsafe.
            (ControlMode::Failsafe, ModeEvent::Request(_)) => None,
            (_, ModeEvent::Request(mode)) => Some(mode.into()),
            (_, ModeEvent::Clear) => None,
        }
    }
}
