// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Static register table of the line PLC.
//!
//! Addresses use the 1-based reference numbers from the PLC documentation
//! (`4xxxx` for holding registers, `0xxxx` for coils). The protocol offset is
//! derived at the boundary, so `40001` is holding offset 0 and coil `1` is
//! coil offset 0.

use serde::Serialize;

use crate::process::response::{FieldError, FieldResult};
use crate::process::state::{ControlMode, Measurements};

const HOLDING_BASE: u32 = 40001;
const COIL_BASE: u32 = 1;

/// Wire representation of a holding register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataType {
    U16,
    I16,
}

/// One holding register with its engineering-unit scale.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegisterSpec {
    pub name: &'static str,
    pub reference: u32,
    pub scale: f64,
    pub data_type: DataType,
    pub unit: &'static str,
}

impl RegisterSpec {
    const fn unsigned(name: &'static str, reference: u32, scale: f64, unit: &'static str) -> Self {
        Self {
            name,
            reference,
            scale,
            data_type: DataType::U16,
            unit,
        }
    }

    const fn signed(name: &'static str, reference: u32, scale: f64, unit: &'static str) -> Self {
        Self {
            name,
            reference,
            scale,
            data_type: DataType::I16,
            unit,
        }
    }

    /// Zero-based protocol offset.
    pub fn offset(&self) -> u16 {
        (self.reference - HOLDING_BASE) as u16
    }

    /// Raw register word to engineering units.
    pub fn decode(&self, raw: u16) -> f64 {
        match self.data_type {
            DataType::U16 => f64::from(raw) * self.scale,
            DataType::I16 => f64::from(raw as i16) * self.scale,
        }
    }

    /// Engineering units to a raw register word, `None` if it does not fit.
    pub fn encode(&self, value: f64) -> Option<u16> {
        if !value.is_finite() {
            return None;
        }
        let raw = (value / self.scale).round();
        match self.data_type {
            DataType::U16 if (0.0..=f64::from(u16::MAX)).contains(&raw) => Some(raw as u16),
            DataType::I16 if (f64::from(i16::MIN)..=f64::from(i16::MAX)).contains(&raw) => {
                Some(raw as i16 as u16)
            }
            _ => None,
        }
    }
}

/// One discrete coil.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CoilSpec {
    pub name: &'static str,
    pub reference: u32,
}

impl CoilSpec {
    const fn new(name: &'static str, reference: u32) -> Self {
        Self { name, reference }
    }

    pub fn offset(&self) -> u16 {
        (self.reference - COIL_BASE) as u16
    }
}

/// Contiguous span of registers or coils read in one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub offset: u16,
    pub count: u16,
}

/// Raw words and bits as returned by one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRegisters {
    pub holding_offset: u16,
    pub holding: Vec<u16>,
    pub coil_offset: u16,
    pub coils: Vec<bool>,
}

/// Address, scale and type of every point the controller touches.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterMap {
    pub line_speed: RegisterSpec,
    pub line_speed_setpoint: RegisterSpec,
    pub zinc_temp: RegisterSpec,
    pub furnace_temp: RegisterSpec,
    pub jet_wipe_pressure: RegisterSpec,
    pub jet_wipe_flow: RegisterSpec,
    pub zinc_level: RegisterSpec,
    pub metre_totaliser: RegisterSpec,
    pub product_type: RegisterSpec,
    pub n2_flow: RegisterSpec,
    pub n2_pressure: RegisterSpec,
    pub n2_purity: RegisterSpec,
    pub n2_dew_point: RegisterSpec,
    pub fg_total_flow: RegisterSpec,
    pub fg_n2_percent: RegisterSpec,
    pub fg_h2_percent: RegisterSpec,
    pub fg_pressure: RegisterSpec,
    pub fg_mixer_temp: RegisterSpec,
    pub fg_n2_flow: RegisterSpec,
    pub fg_h2_flow: RegisterSpec,

    pub line_running: CoilSpec,
    pub furnace_alarm: CoilSpec,
    pub zinc_alarm: CoilSpec,
    pub psa_alarm: CoilSpec,
    pub fg_h2_high_alarm: CoilSpec,
    pub fg_h2_low_alarm: CoilSpec,
    pub fg_pressure_alarm: CoilSpec,

    pub n2_valve: RegisterSpec,
    pub fg_n2_valve: RegisterSpec,
    pub fg_h2_valve: RegisterSpec,
    pub heartbeat: RegisterSpec,
    pub control_mode: RegisterSpec,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::standard()
    }
}

impl RegisterMap {
    /// Register table of the galvanizing line PLC.
    pub const fn standard() -> Self {
        Self {
            line_speed: RegisterSpec::unsigned("line speed", 40001, 0.1, "m/min"),
            line_speed_setpoint: RegisterSpec::unsigned("line speed setpoint", 40002, 0.1, "m/min"),
            zinc_temp: RegisterSpec::unsigned("zinc temperature", 40003, 0.1, "°C"),
            furnace_temp: RegisterSpec::unsigned("furnace temperature", 40004, 0.1, "°C"),
            jet_wipe_pressure: RegisterSpec::unsigned("jet wipe pressure", 40005, 0.01, "bar"),
            jet_wipe_flow: RegisterSpec::unsigned("jet wipe flow", 40006, 0.1, "Nm³/h"),
            zinc_level: RegisterSpec::unsigned("zinc level", 40007, 0.1, "%"),
            metre_totaliser: RegisterSpec::unsigned("metre totaliser", 40008, 1.0, "m"),
            product_type: RegisterSpec::unsigned("product type", 40009, 1.0, ""),
            n2_flow: RegisterSpec::unsigned("n2 flow", 40010, 0.1, "Nm³/h"),
            n2_pressure: RegisterSpec::unsigned("n2 pressure", 40011, 0.01, "bar"),
            n2_purity: RegisterSpec::unsigned("n2 purity", 40012, 0.01, "%"),
            n2_dew_point: RegisterSpec::signed("n2 dew point", 40013, 0.1, "°C"),
            fg_total_flow: RegisterSpec::unsigned("forming gas flow", 40014, 0.1, "Nm³/h"),
            fg_n2_percent: RegisterSpec::unsigned("forming gas n2", 40015, 0.01, "%"),
            fg_h2_percent: RegisterSpec::unsigned("forming gas h2", 40016, 0.01, "%"),
            fg_pressure: RegisterSpec::unsigned("forming gas pressure", 40017, 0.01, "bar"),
            fg_mixer_temp: RegisterSpec::unsigned("mixer temperature", 40018, 0.1, "°C"),
            fg_n2_flow: RegisterSpec::unsigned("mixer n2 flow", 40019, 0.1, "Nm³/h"),
            fg_h2_flow: RegisterSpec::unsigned("mixer h2 flow", 40020, 0.1, "Nm³/h"),

            line_running: CoilSpec::new("line running", 1),
            furnace_alarm: CoilSpec::new("furnace alarm", 2),
            zinc_alarm: CoilSpec::new("zinc alarm", 3),
            psa_alarm: CoilSpec::new("psa alarm", 4),
            fg_h2_high_alarm: CoilSpec::new("forming gas h2 high", 5),
            fg_h2_low_alarm: CoilSpec::new("forming gas h2 low", 6),
            fg_pressure_alarm: CoilSpec::new("forming gas pressure", 7),

            n2_valve: RegisterSpec::unsigned("n2 valve", 40030, 1.0, "%"),
            fg_n2_valve: RegisterSpec::unsigned("forming gas n2 valve", 40031, 1.0, "%"),
            fg_h2_valve: RegisterSpec::unsigned("forming gas h2 valve", 40032, 1.0, "%"),
            heartbeat: RegisterSpec::unsigned("heartbeat", 40033, 1.0, ""),
            control_mode: RegisterSpec::unsigned("control mode", 40034, 1.0, ""),
        }
    }

    fn measurement_registers(&self) -> [&RegisterSpec; 20] {
        [
            &self.line_speed,
            &self.line_speed_setpoint,
            &self.zinc_temp,
            &self.furnace_temp,
            &self.jet_wipe_pressure,
            &self.jet_wipe_flow,
            &self.zinc_level,
            &self.metre_totaliser,
            &self.product_type,
            &self.n2_flow,
            &self.n2_pressure,
            &self.n2_purity,
            &self.n2_dew_point,
            &self.fg_total_flow,
            &self.fg_n2_percent,
            &self.fg_h2_percent,
            &self.fg_pressure,
            &self.fg_mixer_temp,
            &self.fg_n2_flow,
            &self.fg_h2_flow,
        ]
    }

    fn coil_points(&self) -> [&CoilSpec; 7] {
        [
            &self.line_running,
            &self.furnace_alarm,
            &self.zinc_alarm,
            &self.psa_alarm,
            &self.fg_h2_high_alarm,
            &self.fg_h2_low_alarm,
            &self.fg_pressure_alarm,
        ]
    }

    /// Holding-register span covering every measurement.
    pub fn holding_block(&self) -> Block {
        span(self.measurement_registers().iter().map(|r| r.offset()))
    }

    /// Coil span covering every status bit.
    pub fn coil_block(&self) -> Block {
        span(self.coil_points().iter().map(|c| c.offset()))
    }

    /// Scale one poll worth of raw data into engineering units.
    pub fn decode(&self, raw: &RawRegisters) -> FieldResult<Measurements> {
        let word = |spec: &RegisterSpec| -> FieldResult<f64> {
            spec.offset()
                .checked_sub(raw.holding_offset)
                .and_then(|idx| raw.holding.get(usize::from(idx)))
                .map(|w| spec.decode(*w))
                .ok_or_else(|| {
                    FieldError::Exception(format!("short read: missing {}", spec.name))
                })
        };
        let bit = |spec: &CoilSpec| -> FieldResult<bool> {
            spec.offset()
                .checked_sub(raw.coil_offset)
                .and_then(|idx| raw.coils.get(usize::from(idx)))
                .copied()
                .ok_or_else(|| {
                    FieldError::Exception(format!("short read: missing {}", spec.name))
                })
        };

        Ok(Measurements {
            velocity: word(&self.line_speed)?,
            velocity_setpoint: word(&self.line_speed_setpoint)?,
            zinc_temp_c: word(&self.zinc_temp)?,
            furnace_temp_c: word(&self.furnace_temp)?,
            jet_wipe_pressure_bar: word(&self.jet_wipe_pressure)?,
            jet_wipe_flow_nm3h: word(&self.jet_wipe_flow)?,
            zinc_level_pct: word(&self.zinc_level)?,
            metres_total: word(&self.metre_totaliser)?,
            product_type: word(&self.product_type)? as u16,
            n2_flow_nm3h: word(&self.n2_flow)?,
            n2_pressure_bar: word(&self.n2_pressure)?,
            n2_purity_pct: word(&self.n2_purity)?,
            n2_dew_point_c: word(&self.n2_dew_point)?,
            fg_flow_nm3h: word(&self.fg_total_flow)?,
            fg_n2_pct: word(&self.fg_n2_percent)?,
            fg_h2_pct: word(&self.fg_h2_percent)?,
            fg_pressure_bar: word(&self.fg_pressure)?,
            fg_mixer_temp_c: word(&self.fg_mixer_temp)?,
            fg_n2_flow_nm3h: word(&self.fg_n2_flow)?,
            fg_h2_flow_nm3h: word(&self.fg_h2_flow)?,
            line_running: bit(&self.line_running)?,
            furnace_alarm: bit(&self.furnace_alarm)?,
            zinc_alarm: bit(&self.zinc_alarm)?,
            psa_alarm: bit(&self.psa_alarm)?,
            fg_h2_high_alarm: bit(&self.fg_h2_high_alarm)?,
            fg_h2_low_alarm: bit(&self.fg_h2_low_alarm)?,
            fg_pressure_alarm: bit(&self.fg_pressure_alarm)?,
        })
    }

    /// Inverse of [`RegisterMap::decode`], used by the simulated PLC.
    /// Values that do not fit their register saturate at zero.
    pub fn encode(&self, m: &Measurements) -> RawRegisters {
        let hb = self.holding_block();
        let cb = self.coil_block();
        let mut holding = vec![0u16; usize::from(hb.count)];
        let mut coils = vec![false; usize::from(cb.count)];

        let values = [
            m.velocity,
            m.velocity_setpoint,
            m.zinc_temp_c,
            m.furnace_temp_c,
            m.jet_wipe_pressure_bar,
            m.jet_wipe_flow_nm3h,
            m.zinc_level_pct,
            m.metres_total,
            f64::from(m.product_type),
            m.n2_flow_nm3h,
            m.n2_pressure_bar,
            m.n2_purity_pct,
            m.n2_dew_point_c,
            m.fg_flow_nm3h,
            m.fg_n2_pct,
            m.fg_h2_pct,
            m.fg_pressure_bar,
            m.fg_mixer_temp_c,
            m.fg_n2_flow_nm3h,
            m.fg_h2_flow_nm3h,
        ];
        for (spec, value) in self.measurement_registers().iter().zip(values) {
            holding[usize::from(spec.offset() - hb.offset)] = spec.encode(value).unwrap_or(0);
        }

        let bits = [
            m.line_running,
            m.furnace_alarm,
            m.zinc_alarm,
            m.psa_alarm,
            m.fg_h2_high_alarm,
            m.fg_h2_low_alarm,
            m.fg_pressure_alarm,
        ];
        for (spec, value) in self.coil_points().iter().zip(bits) {
            coils[usize::from(spec.offset() - cb.offset)] = value;
        }

        RawRegisters {
            holding_offset: hb.offset,
            holding,
            coil_offset: cb.offset,
            coils,
        }
    }

    /// Validate and scale a valve aperture for writing.
    pub fn encode_aperture(&self, percent: f64) -> FieldResult<u16> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(FieldError::OutOfRangeWrite {
                register: self.n2_valve.name,
                value: percent,
            });
        }
        self.n2_valve
            .encode(percent)
            .ok_or(FieldError::OutOfRangeWrite {
                register: self.n2_valve.name,
                value: percent,
            })
    }
}

/// Numeric code published in the PLC mode register.
pub fn mode_code(mode: ControlMode) -> u16 {
    match mode {
        ControlMode::Manual => 0,
        ControlMode::Advisory => 1,
        ControlMode::Auto => 2,
        ControlMode::Failsafe => 3,
    }
}

fn span(offsets: impl Iterator<Item = u16>) -> Block {
    let (min, max) = offsets.fold((u16::MAX, 0u16), |(lo, hi), o| (lo.min(o), hi.max(o)));
    if min > max {
        return Block {
            offset: 0,
            count: 0,
        };
    }
    Block {
        offset: min,
        count: max - min + 1,
    }
}
