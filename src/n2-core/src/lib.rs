// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod control;
pub mod process;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use control::gate::{GateDecision, Permission, PermissionSet, RoleTable};
pub use control::logic::{Alarm, Decision, Reason, Thresholds};
pub use process::command::{Actor, ControlCommand};
pub use process::request::ControlRequest;
pub use process::response::{ControlError, ControlResult, FieldError, FieldResult};
pub use process::state::{
    ControlMode, CostRates, FailsafeState, Measurements, ProcessSnapshot, ProcessState,
    ProcessView, ProjectPhase, RequestedMode, Totals,
};
pub use process::{DeviceInfo, FieldAccessMethod, FieldDevice, FieldFuture};
