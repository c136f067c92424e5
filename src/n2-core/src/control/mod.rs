// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Controller components.
//!
//! Decision logic, liveness supervision, authorization, mode transitions,
//! event dispatch and reconnect policies used by the control task.

pub mod events;
pub mod gate;
pub mod logic;
pub mod machine;
pub mod policies;
pub mod watchdog;

pub use events::{EventEmitter, EventSink, EventType, ProcessEvent, Severity, SinkId};
pub use gate::{
    can_clear_failsafe, can_enable_auto, can_request_mode, can_trigger_failsafe, GateDecision,
    Permission, PermissionSet, RoleTable,
};
pub use logic::{apply_ramp, evaluate, Alarm, Decision, Reason, Thresholds, Warning};
pub use machine::{ModeEvent, ModeMachine};
pub use policies::{ExponentialBackoff, FixedBackoff, ReconnectPolicy};
pub use watchdog::{Watchdog, WatchdogReport, WatchdogState};
