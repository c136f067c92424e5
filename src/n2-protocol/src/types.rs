// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport DTOs for the JSON line protocol.

use serde::{Deserialize, Serialize};

use n2_core::control::events::ProcessEvent;
use n2_core::{Actor, ProcessSnapshot, ProcessView, RequestedMode};

/// Command received from network clients (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientCommand {
    GetState,
    GetHistory {
        #[serde(default)]
        limit: Option<usize>,
    },
    GetEvents {
        #[serde(default)]
        limit: Option<usize>,
    },
    SetMode {
        mode: RequestedMode,
    },
    ClearFailsafe,
    TriggerFailsafe {
        #[serde(default)]
        reason: Option<String>,
    },
    Whoami,
}

/// Envelope for client commands with optional authentication token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    pub token: Option<String>,
    #[serde(flatten)]
    pub cmd: ClientCommand,
}

/// Response sent to network clients over TCP.
#[derive(Debug, Default, Serialize)]
pub struct ClientResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ProcessView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<ProcessSnapshot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<ProcessEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Actor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientResponse {
    pub fn state(view: ProcessView) -> Self {
        Self {
            success: true,
            state: Some(view),
            ..Self::default()
        }
    }

    pub fn history(history: Vec<ProcessSnapshot>) -> Self {
        Self {
            success: true,
            history: Some(history),
            ..Self::default()
        }
    }

    pub fn events(events: Vec<ProcessEvent>) -> Self {
        Self {
            success: true,
            events: Some(events),
            ..Self::default()
        }
    }

    pub fn role(actor: Actor) -> Self {
        Self {
            success: true,
            role: Some(actor),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}
