// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated line PLC for demos and development.
//!
//! Produces slowly varying, deterministic readings around a healthy operating
//! point. Values go through the register map so they carry the same
//! quantization as a real poll. The N₂ flow follows the last valve write.

use tracing::{debug, info};

use n2_core::process::registers::{mode_code, RegisterMap};
use n2_core::{
    ControlMode, DeviceInfo, FieldAccessMethod, FieldDevice, FieldError, FieldFuture,
    FieldResult, Measurements,
};

pub struct SimulatedPlc {
    info: DeviceInfo,
    map: RegisterMap,
    connected: bool,
    offline: bool,
    tick: u64,
    metres: f64,
    aperture: f64,
    heartbeat: u16,
    mode_code: u16,
    forced: Option<Measurements>,
}

impl SimulatedPlc {
    /// `seed` shifts the phase of the generated waveforms.
    pub fn new(seed: u64) -> Self {
        Self {
            info: DeviceInfo {
                vendor: "n2ctl".to_string(),
                model: "simulated line plc".to_string(),
                access: FieldAccessMethod::Simulated,
            },
            map: RegisterMap::standard(),
            connected: false,
            offline: false,
            tick: seed,
            metres: 0.0,
            aperture: 0.0,
            heartbeat: 0,
            mode_code: 0,
            forced: None,
        }
    }

    /// Make the PLC unreachable; the current session is dropped.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
        if offline {
            self.connected = false;
        }
    }

    /// Replace generated readings with fixed ones, `None` to resume.
    pub fn force_measurements(&mut self, m: Option<Measurements>) {
        self.forced = m;
    }

    pub fn aperture(&self) -> f64 {
        self.aperture
    }

    pub fn heartbeat(&self) -> u16 {
        self.heartbeat
    }

    pub fn mode_code(&self) -> u16 {
        self.mode_code
    }

    fn generate(&mut self) -> Measurements {
        self.tick = self.tick.wrapping_add(1);
        let t = self.tick as f64;
        let velocity = 150.0 + 15.0 * (t / 12.0).sin();
        // 5 s poll period.
        self.metres += velocity * 5.0 / 60.0;
        let n2_flow = 12.0 + 0.8 * self.aperture;

        Measurements {
            velocity,
            velocity_setpoint: 150.0,
            zinc_temp_c: 450.0 + 5.0 * (t / 20.0).sin(),
            furnace_temp_c: 680.0 + 10.0 * (t / 30.0).cos(),
            jet_wipe_pressure_bar: 0.45,
            jet_wipe_flow_nm3h: 320.0,
            zinc_level_pct: 82.0,
            metres_total: self.metres % 65_535.0,
            product_type: 1,
            n2_flow_nm3h: n2_flow,
            n2_pressure_bar: 1.2 + 0.05 * (t / 9.0).sin(),
            n2_purity_pct: 99.2 + 0.3 * (t / 7.0).sin(),
            n2_dew_point_c: -45.0,
            fg_flow_nm3h: 30.0,
            fg_n2_pct: 95.0,
            fg_h2_pct: 5.0 + 0.4 * (t / 11.0).sin(),
            fg_pressure_bar: 1.0,
            fg_mixer_temp_c: 28.0,
            fg_n2_flow_nm3h: 28.5,
            fg_h2_flow_nm3h: 1.5,
            line_running: true,
            ..Measurements::default()
        }
    }

    fn ensure_online(&self) -> FieldResult<()> {
        if self.offline {
            return Err(FieldError::Connection("simulated link down".into()));
        }
        if !self.connected {
            return Err(FieldError::NotConnected);
        }
        Ok(())
    }
}

impl FieldDevice for SimulatedPlc {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn connect<'a>(&'a mut self) -> FieldFuture<'a, ()> {
        Box::pin(async move {
            if self.offline {
                return Err(FieldError::Connection("simulated link down".into()));
            }
            if !self.connected {
                info!("Simulated PLC connected");
            }
            self.connected = true;
            Ok(())
        })
    }

    fn read_all<'a>(&'a mut self) -> FieldFuture<'a, Measurements> {
        Box::pin(async move {
            self.ensure_online()?;
            let m = match self.forced {
                Some(m) => m,
                None => self.generate(),
            };
            // Quantize exactly like a register read.
            let raw = self.map.encode(&m);
            self.map.decode(&raw)
        })
    }

    fn write_aperture<'a>(&'a mut self, percent: f64) -> FieldFuture<'a, ()> {
        Box::pin(async move {
            let word = self.map.encode_aperture(percent)?;
            self.ensure_online()?;
            self.aperture = f64::from(word);
            debug!("Simulated valve -> {}%", word);
            Ok(())
        })
    }

    fn write_heartbeat<'a>(&'a mut self, counter: u16) -> FieldFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_online()?;
            self.heartbeat = counter;
            Ok(())
        })
    }

    fn write_mode<'a>(&'a mut self, mode: ControlMode) -> FieldFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_online()?;
            self.mode_code = mode_code(mode);
            Ok(())
        })
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
