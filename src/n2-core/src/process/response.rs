// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::Serialize;
use thiserror::Error;

/// Failure of a field-bus operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    /// Transport-level failure; the session is dropped and reconnect backoff applies.
    #[error("connection error: {0}")]
    Connection(String),
    /// The call did not complete within the per-call I/O timeout.
    #[error("I/O timeout after {0} ms")]
    Timeout(u64),
    /// Write refused locally, nothing was sent to the device.
    #[error("out-of-range write to {register}: {value}")]
    OutOfRangeWrite { register: &'static str, value: f64 },
    #[error("not connected")]
    NotConnected,
    /// The device answered with a Modbus exception.
    #[error("device exception: {0}")]
    Exception(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl FieldError {
    /// Whether the error means the link itself is gone.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::NotConnected
        )
    }
}

pub type FieldResult<T> = Result<T, FieldError>;

/// Error type returned by control requests.
#[derive(Debug, Clone, Serialize)]
pub struct ControlError {
    pub message: String,
    pub kind: ControlErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlErrorKind {
    AuthorizationDenied,
    InvalidState,
    Unavailable,
}

impl ControlError {
    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ControlErrorKind::AuthorizationDenied,
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ControlErrorKind::InvalidState,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ControlErrorKind::Unavailable,
        }
    }
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ControlError {}

pub type ControlResult<T> = Result<T, ControlError>;
