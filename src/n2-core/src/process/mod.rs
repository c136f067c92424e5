// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::process::response::FieldResult;
use crate::process::state::{ControlMode, Measurements};

/// Alias to reduce type complexity in FieldDevice.
pub type FieldFuture<'a, T> = Pin<Box<dyn Future<Output = FieldResult<T>> + Send + 'a>>;

pub mod command;
pub mod history;
pub mod registers;
pub mod request;
pub mod response;
pub mod state;

/// How this backend reaches the field device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldAccessMethod {
    ModbusTcp { addr: String, unit_id: u8 },
    Simulated,
}

/// Static info describing a field-device backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub vendor: String,
    pub model: String,
    pub access: FieldAccessMethod,
}

/// Operations the control loop needs from the line PLC.
///
/// Implementations never retry on their own. A transport failure marks the
/// device disconnected and the caller decides when to call `connect` again.
pub trait FieldDevice: Send {
    fn info(&self) -> &DeviceInfo;

    fn connect<'a>(&'a mut self) -> FieldFuture<'a, ()>;

    /// Read every measurement register and status coil in one poll.
    fn read_all<'a>(&'a mut self) -> FieldFuture<'a, Measurements>;

    /// Write the N₂ valve aperture in percent. Values outside [0,100] are
    /// rejected without touching the bus.
    fn write_aperture<'a>(&'a mut self, percent: f64) -> FieldFuture<'a, ()>;

    fn write_heartbeat<'a>(&'a mut self, counter: u16) -> FieldFuture<'a, ()>;

    fn write_mode<'a>(&'a mut self, mode: ControlMode) -> FieldFuture<'a, ()>;

    /// Drop the session. Safe to call when already disconnected.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}
