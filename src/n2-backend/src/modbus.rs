// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Modbus TCP backend for the line PLC.
//!
//! One holding-register block and one coil block are read per poll.
//! Transport errors drop the session; device exceptions do not.

use std::net::SocketAddr;

use tokio_modbus::client::{self, tcp, Reader, Writer};
use tokio_modbus::{ExceptionCode, Slave};
use tracing::{debug, info, warn};

use n2_core::process::registers::{mode_code, RawRegisters, RegisterMap, RegisterSpec};
use n2_core::{
    ControlMode, DeviceInfo, FieldAccessMethod, FieldDevice, FieldError, FieldFuture,
    FieldResult, Measurements,
};

async fn resolve(addr: &str) -> FieldResult<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| FieldError::Config(format!("cannot resolve {}: {}", addr, e)))?;
    addrs
        .next()
        .ok_or_else(|| FieldError::Config(format!("no address for {}", addr)))
}

pub struct ModbusPlc {
    info: DeviceInfo,
    addr: String,
    unit_id: u8,
    map: RegisterMap,
    ctx: Option<client::Context>,
}

impl ModbusPlc {
    pub fn new(addr: String, unit_id: u8) -> Self {
        Self::with_map(addr, unit_id, RegisterMap::standard())
    }

    pub fn with_map(addr: String, unit_id: u8, map: RegisterMap) -> Self {
        Self {
            info: DeviceInfo {
                vendor: "generic".to_string(),
                model: "modbus tcp plc".to_string(),
                access: FieldAccessMethod::ModbusTcp {
                    addr: addr.clone(),
                    unit_id,
                },
            },
            addr,
            unit_id,
            map,
            ctx: None,
        }
    }

    /// Unpack a tokio-modbus result. Transport failures drop the session.
    fn absorb<T>(
        &mut self,
        what: &str,
        result: Result<Result<T, ExceptionCode>, tokio_modbus::Error>,
    ) -> FieldResult<T> {
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(code)) => {
                warn!("PLC exception on {}: {:?}", what, code);
                Err(FieldError::Exception(format!("{}: {:?}", what, code)))
            }
            Err(e) => {
                warn!("Modbus transport error on {}: {}", what, e);
                self.ctx = None;
                Err(FieldError::Connection(e.to_string()))
            }
        }
    }

    async fn write_word(&mut self, spec: RegisterSpec, word: u16) -> FieldResult<()> {
        let ctx = self.ctx.as_mut().ok_or(FieldError::NotConnected)?;
        let result = ctx.write_single_register(spec.offset(), word).await;
        self.absorb(spec.name, result)
    }

    async fn read_raw(&mut self) -> FieldResult<RawRegisters> {
        let hb = self.map.holding_block();
        let cb = self.map.coil_block();

        let ctx = self.ctx.as_mut().ok_or(FieldError::NotConnected)?;
        let result = ctx.read_holding_registers(hb.offset, hb.count).await;
        let holding = self.absorb("holding registers", result)?;

        let ctx = self.ctx.as_mut().ok_or(FieldError::NotConnected)?;
        let result = ctx.read_coils(cb.offset, cb.count).await;
        let coils = self.absorb("coils", result)?;

        Ok(RawRegisters {
            holding_offset: hb.offset,
            holding,
            coil_offset: cb.offset,
            coils,
        })
    }
}

impl FieldDevice for ModbusPlc {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn connect<'a>(&'a mut self) -> FieldFuture<'a, ()> {
        Box::pin(async move {
            if self.ctx.is_some() {
                return Ok(());
            }
            let addr = self.addr.clone();
            let socket = resolve(&addr).await?;
            let ctx = tcp::connect_slave(socket, Slave(self.unit_id))
                .await
                .map_err(|e| FieldError::Connection(e.to_string()))?;
            info!("Connected to PLC at {} (unit {})", socket, self.unit_id);
            self.ctx = Some(ctx);
            Ok(())
        })
    }

    fn read_all<'a>(&'a mut self) -> FieldFuture<'a, Measurements> {
        Box::pin(async move {
            let raw = self.read_raw().await?;
            let m = self.map.decode(&raw)?;
            debug!(
                "PLC poll: v={:.1} purity={:.2} p={:.2}",
                m.velocity, m.n2_purity_pct, m.n2_pressure_bar
            );
            Ok(m)
        })
    }

    fn write_aperture<'a>(&'a mut self, percent: f64) -> FieldFuture<'a, ()> {
        Box::pin(async move {
            let word = self.map.encode_aperture(percent)?;
            let spec = self.map.n2_valve;
            self.write_word(spec, word).await
        })
    }

    fn write_heartbeat<'a>(&'a mut self, counter: u16) -> FieldFuture<'a, ()> {
        Box::pin(async move {
            let spec = self.map.heartbeat;
            self.write_word(spec, counter).await
        })
    }

    fn write_mode<'a>(&'a mut self, mode: ControlMode) -> FieldFuture<'a, ()> {
        Box::pin(async move {
            let spec = self.map.control_mode;
            self.write_word(spec, mode_code(mode)).await
        })
    }

    fn disconnect(&mut self) {
        if self.ctx.take().is_some() {
            info!("Dropped PLC session to {}", self.addr);
        }
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_out_of_range_rejected_before_io() {
        let mut plc = ModbusPlc::new("127.0.0.1:502".into(), 1);
        let err = plc.write_aperture(120.0).await.unwrap_err();
        assert!(matches!(err, FieldError::OutOfRangeWrite { .. }));
    }

    #[tokio::test]
    async fn test_calls_without_session_fail() {
        let mut plc = ModbusPlc::new("127.0.0.1:502".into(), 1);
        assert_eq!(plc.read_all().await.unwrap_err(), FieldError::NotConnected);
        assert_eq!(
            plc.write_aperture(50.0).await.unwrap_err(),
            FieldError::NotConnected
        );
        assert_eq!(
            plc.write_heartbeat(1).await.unwrap_err(),
            FieldError::NotConnected
        );
        plc.disconnect();
        assert!(!plc.is_connected());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_bad_address_is_config_error() {
        let mut plc = ModbusPlc::new("no-port-here".into(), 1);
        let fut = plc.connect();
        assert_send(&fut);
        let err = fut.await.unwrap_err();
        assert!(matches!(err, FieldError::Config(_)));
        assert!(!err.is_connection_loss());
        assert!(!plc.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a local port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut plc = ModbusPlc::new(addr.to_string(), 1);
        let err = plc.connect().await.unwrap_err();
        assert!(err.is_connection_loss());
        assert!(!plc.is_connected());
    }
}
