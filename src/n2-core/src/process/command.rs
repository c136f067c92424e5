// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::Serialize;

use crate::control::gate::PermissionSet;
use crate::process::state::RequestedMode;

/// Command handled by the control task between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    GetState,
    SetMode(RequestedMode),
    ClearFailsafe,
    TriggerFailsafe { reason: String },
}

impl ControlCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::GetState => "get_state",
            ControlCommand::SetMode(_) => "set_mode",
            ControlCommand::ClearFailsafe => "clear_failsafe",
            ControlCommand::TriggerFailsafe { .. } => "trigger_failsafe",
        }
    }
}

/// Who is asking: the session's role and the permissions it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub role: String,
    pub permissions: PermissionSet,
}

impl Actor {
    pub fn new(role: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            role: role.into(),
            permissions,
        }
    }

    /// Actor used for actions the controller takes on its own.
    pub fn system() -> Self {
        Self::new("system", PermissionSet::all())
    }
}
