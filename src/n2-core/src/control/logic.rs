// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Injection control law.
//!
//! [`evaluate`] is an ordered decision table: the first matching row wins and
//! every row carries a stable reason tag. [`apply_ramp`] limits how far the
//! valve may move in a single tick. Both are total over all `f64` inputs.

use serde::{Deserialize, Serialize, Serializer};

use crate::process::state::{Measurements, ProjectPhase};

/// Hard alarm that latches failsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alarm {
    SensorAnomaly,
    FurnaceAlarm,
    ZincAlarm,
    PsaAlarm,
    PurityCritical,
    PressureOutOfBand,
    H2OutOfBand,
    FormingGasAlarm,
    FormingGasPressureOutOfBand,
    MixerOvertemperature,
}

impl Alarm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alarm::SensorAnomaly => "sensor anomaly",
            Alarm::FurnaceAlarm => "furnace alarm",
            Alarm::ZincAlarm => "zinc alarm",
            Alarm::PsaAlarm => "psa alarm",
            Alarm::PurityCritical => "purity critical",
            Alarm::PressureOutOfBand => "pressure out of band",
            Alarm::H2OutOfBand => "h2 out of band",
            Alarm::FormingGasAlarm => "forming gas alarm",
            Alarm::FormingGasPressureOutOfBand => "forming gas pressure out of band",
            Alarm::MixerOvertemperature => "mixer overtemperature",
        }
    }
}

/// Why the controller chose its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Alarm(Alarm),
    LineStopped,
    LowSpeed,
    PurityDegraded,
    Nominal,
    WatchdogTimeout,
    ManualEmergencyStop,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Alarm(alarm) => alarm.as_str(),
            Reason::LineStopped => "line stopped",
            Reason::LowSpeed => "low speed",
            Reason::PurityDegraded => "purity degraded",
            Reason::Nominal => "nominal",
            Reason::WatchdogTimeout => "watchdog timeout",
            Reason::ManualEmergencyStop => "manual emergency stop",
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Alarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl Serialize for Alarm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Non-fatal condition reported alongside a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    Overspeed,
    ZincTemperatureOutOfBand,
}

impl Warning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Warning::Overspeed => "overspeed",
            Warning::ZincTemperatureOutOfBand => "zinc temperature out of band",
        }
    }
}

impl Serialize for Warning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Operating limits and aperture tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Below this speed the line is treated as stopped, m/min.
    pub min_production_speed: f64,
    /// Below this speed the low-speed tier applies, m/min.
    pub low_speed: f64,
    pub nominal_speed: f64,
    pub max_speed: f64,
    pub zinc_temp_min_c: f64,
    pub zinc_temp_max_c: f64,
    pub purity_operative_pct: f64,
    pub purity_critical_pct: f64,
    pub n2_pressure_min_bar: f64,
    pub n2_pressure_max_bar: f64,
    pub forming_gas_enabled: bool,
    pub h2_min_pct: f64,
    pub h2_max_pct: f64,
    pub fg_pressure_min_bar: f64,
    pub fg_pressure_max_bar: f64,
    pub mixer_temp_max_c: f64,
    pub aperture_low_speed: f64,
    pub aperture_nominal: f64,
    pub aperture_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_production_speed: 30.0,
            low_speed: 80.0,
            nominal_speed: 165.0,
            max_speed: 220.0,
            zinc_temp_min_c: 430.0,
            zinc_temp_max_c: 470.0,
            purity_operative_pct: 98.0,
            purity_critical_pct: 95.0,
            n2_pressure_min_bar: 0.5,
            n2_pressure_max_bar: 8.0,
            forming_gas_enabled: true,
            h2_min_pct: 3.0,
            h2_max_pct: 10.0,
            fg_pressure_min_bar: 0.3,
            fg_pressure_max_bar: 2.0,
            mixer_temp_max_c: 50.0,
            aperture_low_speed: 40.0,
            aperture_nominal: 75.0,
            aperture_max: 95.0,
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Recommended aperture, always in [0,100].
    pub target: f64,
    pub reason: Reason,
    pub failsafe_trigger: Option<Alarm>,
    pub warnings: Vec<Warning>,
    pub phase: ProjectPhase,
}

impl Decision {
    fn new(target: f64, reason: Reason, phase: ProjectPhase, warnings: Vec<Warning>) -> Self {
        Self {
            target: clamp_percent(target),
            reason,
            failsafe_trigger: None,
            warnings,
            phase,
        }
    }

    fn alarm(alarm: Alarm, phase: ProjectPhase, warnings: Vec<Warning>) -> Self {
        Self {
            target: 0.0,
            reason: Reason::Alarm(alarm),
            failsafe_trigger: Some(alarm),
            warnings,
            phase,
        }
    }
}

/// Decide the valve target for one set of measurements.
///
/// `phase` does not change the outcome; it is recorded on the decision so
/// the caller can log what it did with it.
pub fn evaluate(inputs: &Measurements, phase: ProjectPhase, t: &Thresholds) -> Decision {
    let warnings = warnings(inputs, t);

    if let Some(alarm) = first_alarm(inputs, t) {
        return Decision::alarm(alarm, phase, warnings);
    }

    let v = inputs.velocity;
    if !inputs.line_running || v < t.min_production_speed {
        return Decision::new(0.0, Reason::LineStopped, phase, warnings);
    }
    if v < t.low_speed {
        return Decision::new(t.aperture_low_speed, Reason::LowSpeed, phase, warnings);
    }

    let curve = interpolate(v, t);
    if inputs.n2_purity_pct < t.purity_operative_pct {
        return Decision::new(
            curve.min(t.aperture_low_speed),
            Reason::PurityDegraded,
            phase,
            warnings,
        );
    }
    Decision::new(curve, Reason::Nominal, phase, warnings)
}

fn first_alarm(m: &Measurements, t: &Thresholds) -> Option<Alarm> {
    if sensor_anomaly(m, t) {
        return Some(Alarm::SensorAnomaly);
    }
    if m.furnace_alarm {
        return Some(Alarm::FurnaceAlarm);
    }
    if m.zinc_alarm {
        return Some(Alarm::ZincAlarm);
    }
    if m.psa_alarm {
        return Some(Alarm::PsaAlarm);
    }
    if m.n2_purity_pct < t.purity_critical_pct {
        return Some(Alarm::PurityCritical);
    }
    if !(t.n2_pressure_min_bar..=t.n2_pressure_max_bar).contains(&m.n2_pressure_bar) {
        return Some(Alarm::PressureOutOfBand);
    }
    if !t.forming_gas_enabled {
        return None;
    }
    if !(t.h2_min_pct..=t.h2_max_pct).contains(&m.fg_h2_pct) {
        return Some(Alarm::H2OutOfBand);
    }
    if m.fg_h2_high_alarm || m.fg_h2_low_alarm || m.fg_pressure_alarm {
        return Some(Alarm::FormingGasAlarm);
    }
    if !(t.fg_pressure_min_bar..=t.fg_pressure_max_bar).contains(&m.fg_pressure_bar) {
        return Some(Alarm::FormingGasPressureOutOfBand);
    }
    if m.fg_mixer_temp_c > t.mixer_temp_max_c {
        return Some(Alarm::MixerOvertemperature);
    }
    None
}

fn sensor_anomaly(m: &Measurements, t: &Thresholds) -> bool {
    let mut values = vec![
        m.velocity,
        m.zinc_temp_c,
        m.furnace_temp_c,
        m.n2_purity_pct,
        m.n2_pressure_bar,
        m.fg_h2_pct,
    ];
    if t.forming_gas_enabled {
        values.extend([m.fg_pressure_bar, m.fg_mixer_temp_c]);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return true;
    }
    let percent = 0.0..=100.0;
    m.velocity < 0.0
        || m.n2_pressure_bar < 0.0
        || (t.forming_gas_enabled && m.fg_pressure_bar < 0.0)
        || !percent.contains(&m.n2_purity_pct)
        || !percent.contains(&m.fg_h2_pct)
}

fn warnings(m: &Measurements, t: &Thresholds) -> Vec<Warning> {
    let mut out = Vec::new();
    if m.velocity > t.max_speed {
        out.push(Warning::Overspeed);
    }
    if m.zinc_temp_c.is_finite() && !(t.zinc_temp_min_c..=t.zinc_temp_max_c).contains(&m.zinc_temp_c)
    {
        out.push(Warning::ZincTemperatureOutOfBand);
    }
    out
}

/// Piecewise-linear speed curve through the low, nominal and max tiers,
/// capped at the ceiling aperture.
fn interpolate(v: f64, t: &Thresholds) -> f64 {
    let aperture = if v <= t.nominal_speed {
        lerp(v, t.low_speed, t.nominal_speed, t.aperture_low_speed, t.aperture_nominal)
    } else {
        lerp(v, t.nominal_speed, t.max_speed, t.aperture_nominal, t.aperture_max)
    };
    aperture.min(t.aperture_max)
}

fn lerp(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    let span = x1 - x0;
    if span <= 0.0 || !span.is_finite() {
        return y1;
    }
    y0 + (x - x0) * (y1 - y0) / span
}

fn clamp_percent(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

/// Move `current` toward `target` by at most `max_delta`, clamped to [0,100].
///
/// A non-finite target leaves `current` unchanged; a negative or NaN
/// `max_delta` is treated as zero.
pub fn apply_ramp(target: f64, current: f64, max_delta: f64) -> f64 {
    let current = clamp_percent(current);
    if !target.is_finite() {
        return current;
    }
    let target = target.clamp(0.0, 100.0);
    let max_delta = if max_delta.is_nan() || max_delta < 0.0 {
        0.0
    } else {
        max_delta
    };
    let diff = target - current;
    if diff.abs() <= max_delta {
        target
    } else {
        current + max_delta.copysign(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> Measurements {
        Measurements {
            velocity: 165.0,
            zinc_temp_c: 450.0,
            furnace_temp_c: 680.0,
            n2_purity_pct: 99.0,
            n2_pressure_bar: 1.0,
            fg_h2_pct: 5.0,
            fg_pressure_bar: 1.0,
            fg_mixer_temp_c: 25.0,
            line_running: true,
            ..Measurements::default()
        }
    }

    fn eval(m: &Measurements) -> Decision {
        evaluate(m, ProjectPhase::ClosedLoop, &Thresholds::default())
    }

    #[test]
    fn test_line_stopped_below_min_speed() {
        let m = Measurements {
            velocity: 10.0,
            ..healthy()
        };
        let d = eval(&m);
        assert_eq!(d.target, 0.0);
        assert_eq!(d.reason.as_str(), "line stopped");
        assert!(d.failsafe_trigger.is_none());
    }

    #[test]
    fn test_line_not_running() {
        let m = Measurements {
            line_running: false,
            ..healthy()
        };
        assert_eq!(eval(&m).reason, Reason::LineStopped);
    }

    #[test]
    fn test_nominal_speed_gives_nominal_aperture() {
        let d = eval(&healthy());
        assert!((d.target - 75.0).abs() < 1e-9);
        assert_eq!(d.reason, Reason::Nominal);
        assert!(d.failsafe_trigger.is_none());
        assert!(d.warnings.is_empty());
    }

    #[test]
    fn test_purity_critical_trips_failsafe() {
        let m = Measurements {
            n2_purity_pct: 94.0,
            ..healthy()
        };
        let d = eval(&m);
        assert_eq!(d.failsafe_trigger, Some(Alarm::PurityCritical));
        assert_eq!(d.reason.as_str(), "purity critical");
        assert_eq!(d.target, 0.0);
    }

    #[test]
    fn test_low_speed_tier() {
        let m = Measurements {
            velocity: 50.0,
            ..healthy()
        };
        let d = eval(&m);
        assert_eq!(d.reason, Reason::LowSpeed);
        assert_eq!(d.target, 40.0);
    }

    #[test]
    fn test_purity_degraded_caps_at_low_tier() {
        let m = Measurements {
            n2_purity_pct: 97.0,
            ..healthy()
        };
        let d = eval(&m);
        assert_eq!(d.reason, Reason::PurityDegraded);
        assert_eq!(d.target, 40.0);
    }

    #[test]
    fn test_curve_is_piecewise_linear() {
        let at = |v: f64| {
            eval(&Measurements {
                velocity: v,
                ..healthy()
            })
            .target
        };
        assert!((at(80.0) - 40.0).abs() < 1e-9);
        assert!((at(122.5) - 57.5).abs() < 1e-9);
        assert!((at(220.0) - 95.0).abs() < 1e-9);
        assert!((at(300.0) - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_overspeed_is_only_a_warning() {
        let d = eval(&Measurements {
            velocity: 240.0,
            ..healthy()
        });
        assert_eq!(d.warnings, vec![Warning::Overspeed]);
        assert!(d.failsafe_trigger.is_none());
        assert_eq!(d.target, 95.0);
    }

    #[test]
    fn test_zinc_temperature_warning() {
        let d = eval(&Measurements {
            zinc_temp_c: 480.0,
            ..healthy()
        });
        assert_eq!(d.warnings, vec![Warning::ZincTemperatureOutOfBand]);
        assert_eq!(d.reason, Reason::Nominal);
    }

    #[test]
    fn test_alarm_order() {
        let d = eval(&Measurements {
            furnace_alarm: true,
            zinc_alarm: true,
            n2_purity_pct: 90.0,
            ..healthy()
        });
        assert_eq!(d.failsafe_trigger, Some(Alarm::FurnaceAlarm));

        let d = eval(&Measurements {
            velocity: f64::NAN,
            furnace_alarm: true,
            ..healthy()
        });
        assert_eq!(d.failsafe_trigger, Some(Alarm::SensorAnomaly));
    }

    #[test]
    fn test_sensor_anomalies() {
        for m in [
            Measurements {
                n2_purity_pct: 101.0,
                ..healthy()
            },
            Measurements {
                fg_h2_pct: -1.0,
                ..healthy()
            },
            Measurements {
                velocity: -3.0,
                ..healthy()
            },
            Measurements {
                n2_pressure_bar: f64::INFINITY,
                ..healthy()
            },
        ] {
            assert_eq!(eval(&m).failsafe_trigger, Some(Alarm::SensorAnomaly));
        }
    }

    #[test]
    fn test_forming_gas_checks() {
        let cases = [
            (
                Measurements {
                    fg_h2_pct: 12.0,
                    ..healthy()
                },
                Alarm::H2OutOfBand,
            ),
            (
                Measurements {
                    fg_h2_low_alarm: true,
                    ..healthy()
                },
                Alarm::FormingGasAlarm,
            ),
            (
                Measurements {
                    fg_pressure_bar: 2.5,
                    ..healthy()
                },
                Alarm::FormingGasPressureOutOfBand,
            ),
            (
                Measurements {
                    fg_mixer_temp_c: 55.0,
                    ..healthy()
                },
                Alarm::MixerOvertemperature,
            ),
        ];
        for (m, alarm) in cases {
            assert_eq!(eval(&m).failsafe_trigger, Some(alarm));
        }
    }

    #[test]
    fn test_forming_gas_disabled_skips_checks() {
        let t = Thresholds {
            forming_gas_enabled: false,
            ..Thresholds::default()
        };
        let m = Measurements {
            fg_h2_pct: 0.0,
            fg_pressure_bar: f64::NAN,
            fg_mixer_temp_c: 90.0,
            ..healthy()
        };
        let d = evaluate(&m, ProjectPhase::Advisory, &t);
        assert!(d.failsafe_trigger.is_none());
        assert_eq!(d.phase, ProjectPhase::Advisory);
    }

    #[test]
    fn test_pressure_band() {
        let d = eval(&Measurements {
            n2_pressure_bar: 0.4,
            ..healthy()
        });
        assert_eq!(d.failsafe_trigger, Some(Alarm::PressureOutOfBand));
    }

    #[test]
    fn test_ramp_limits_step() {
        assert_eq!(apply_ramp(75.0, 20.0, 10.0), 30.0);
        assert_eq!(apply_ramp(0.0, 20.0, 10.0), 10.0);
        assert_eq!(apply_ramp(25.0, 20.0, 10.0), 25.0);
        assert_eq!(apply_ramp(40.0, 40.0, 10.0), 40.0);
    }

    #[test]
    fn test_ramp_edge_inputs() {
        assert_eq!(apply_ramp(f64::NAN, 30.0, 10.0), 30.0);
        assert_eq!(apply_ramp(f64::INFINITY, 30.0, 10.0), 30.0);
        assert_eq!(apply_ramp(80.0, 30.0, -5.0), 30.0);
        assert_eq!(apply_ramp(80.0, 30.0, f64::NAN), 30.0);
        assert_eq!(apply_ramp(150.0, 95.0, 10.0), 100.0);
        assert_eq!(apply_ramp(80.0, 30.0, f64::INFINITY), 80.0);
    }

    #[test]
    fn test_reason_serializes_as_tag() {
        let json = serde_json::to_string(&Reason::Alarm(Alarm::ZincAlarm)).unwrap();
        assert_eq!(json, "\"zinc alarm\"");
    }

    #[test]
    fn test_decision_serializes_warnings_as_tags() {
        let d = eval(&Measurements {
            velocity: 240.0,
            ..healthy()
        });
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["warnings"], serde_json::json!(["overspeed"]));
        assert_eq!(v["reason"], "nominal");
    }
}
