// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::process::history::HistoryRing;

/// One poll of the PLC, scaled to engineering units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// Line speed, m/min.
    pub velocity: f64,
    pub velocity_setpoint: f64,
    pub zinc_temp_c: f64,
    pub furnace_temp_c: f64,
    pub jet_wipe_pressure_bar: f64,
    pub jet_wipe_flow_nm3h: f64,
    pub zinc_level_pct: f64,
    pub metres_total: f64,
    pub product_type: u16,
    pub n2_flow_nm3h: f64,
    pub n2_pressure_bar: f64,
    pub n2_purity_pct: f64,
    pub n2_dew_point_c: f64,
    pub fg_flow_nm3h: f64,
    pub fg_n2_pct: f64,
    pub fg_h2_pct: f64,
    pub fg_pressure_bar: f64,
    pub fg_mixer_temp_c: f64,
    pub fg_n2_flow_nm3h: f64,
    pub fg_h2_flow_nm3h: f64,
    pub line_running: bool,
    pub furnace_alarm: bool,
    pub zinc_alarm: bool,
    pub psa_alarm: bool,
    pub fg_h2_high_alarm: bool,
    pub fg_h2_low_alarm: bool,
    pub fg_pressure_alarm: bool,
}

/// Operating mode of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Manual,
    Advisory,
    Auto,
    Failsafe,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::Manual => "manual",
            ControlMode::Advisory => "advisory",
            ControlMode::Auto => "auto",
            ControlMode::Failsafe => "failsafe",
        }
    }
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode a client may ask for. Failsafe is entered through a trigger only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedMode {
    Manual,
    Advisory,
    Auto,
}

impl From<RequestedMode> for ControlMode {
    fn from(mode: RequestedMode) -> Self {
        match mode {
            RequestedMode::Manual => ControlMode::Manual,
            RequestedMode::Advisory => ControlMode::Advisory,
            RequestedMode::Auto => ControlMode::Auto,
        }
    }
}

impl std::str::FromStr for RequestedMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "advisory" => Ok(Self::Advisory),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Commissioning phase of the installation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    #[default]
    ReadOnly,
    Advisory,
    ClosedLoop,
}

impl ProjectPhase {
    /// Whether this phase allows the controller to run in `mode`.
    pub fn permits(&self, mode: RequestedMode) -> bool {
        match self {
            ProjectPhase::ReadOnly => mode == RequestedMode::Manual,
            ProjectPhase::Advisory => mode != RequestedMode::Auto,
            ProjectPhase::ClosedLoop => true,
        }
    }
}

impl std::str::FromStr for ProjectPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "read_only" | "readonly" => Ok(Self::ReadOnly),
            "advisory" => Ok(Self::Advisory),
            "closed_loop" | "closedloop" => Ok(Self::ClosedLoop),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

/// Latched fail-closed condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailsafeState {
    pub active: bool,
    pub reason: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl FailsafeState {
    /// Latch failsafe. Returns false if it was already active; the first
    /// reason is kept.
    pub fn trigger(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.reason = Some(reason.into());
        self.triggered_at = Some(at);
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Unit prices used for the savings counters, USD per Nm³.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    pub lin_usd_m3: f64,
    pub psa_usd_m3: f64,
    pub h2_usd_m3: f64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            lin_usd_m3: 2.28,
            psa_usd_m3: 0.21,
            h2_usd_m3: 8.50,
        }
    }
}

/// Running consumption and savings counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub n2_nm3: f64,
    pub h2_nm3: f64,
    pub h2_cost_usd: f64,
    pub psa_savings_usd: f64,
    pub running_seconds: f64,
}

impl Totals {
    /// Integrate flows over `elapsed`. Non-finite or negative flows count as zero.
    pub fn accumulate(&mut self, m: &Measurements, elapsed: Duration, rates: &CostRates) {
        let hours = elapsed.as_secs_f64() / 3600.0;
        let n2 = sane_flow(m.n2_flow_nm3h) * hours;
        let h2 = sane_flow(m.fg_h2_flow_nm3h) * hours;
        self.n2_nm3 += n2;
        self.h2_nm3 += h2;
        self.h2_cost_usd += h2 * rates.h2_usd_m3;
        self.psa_savings_usd += n2 * (rates.lin_usd_m3 - rates.psa_usd_m3);
        if m.line_running {
            self.running_seconds += elapsed.as_secs_f64();
        }
    }
}

fn sane_flow(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// One history entry: what was measured and what the controller did with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub measurements: Measurements,
    /// Aperture last written to the valve, %.
    pub aperture: f64,
    pub aperture_target: f64,
    pub mode: ControlMode,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub connected: bool,
}

/// Controller state, owned and mutated by the control loop only.
#[derive(Debug, Clone)]
pub struct ProcessState {
    pub measurements: Option<Measurements>,
    pub aperture: f64,
    pub aperture_target: f64,
    pub mode: ControlMode,
    pub phase: ProjectPhase,
    pub failsafe: FailsafeState,
    pub reason: String,
    pub warnings: Vec<String>,
    pub connected: bool,
    pub watchdog_stale: bool,
    pub actuation_enabled: bool,
    pub last_read_at: Option<DateTime<Utc>>,
    pub totals: Totals,
    pub history: HistoryRing,
}

impl ProcessState {
    pub fn new(phase: ProjectPhase, actuation_enabled: bool, history_capacity: usize) -> Self {
        Self {
            measurements: None,
            aperture: 0.0,
            aperture_target: 0.0,
            mode: ControlMode::Manual,
            phase,
            failsafe: FailsafeState::default(),
            reason: String::new(),
            warnings: Vec::new(),
            connected: false,
            watchdog_stale: false,
            actuation_enabled,
            last_read_at: None,
            totals: Totals::default(),
            history: HistoryRing::new(history_capacity),
        }
    }

    pub fn snapshot(&self, timestamp: DateTime<Utc>) -> ProcessSnapshot {
        ProcessSnapshot {
            timestamp,
            measurements: self.measurements.unwrap_or_default(),
            aperture: self.aperture,
            aperture_target: self.aperture_target,
            mode: self.mode,
            reason: self.reason.clone(),
            warnings: self.warnings.clone(),
            connected: self.connected,
        }
    }

    /// Append the current state to history.
    pub fn record(&mut self, timestamp: DateTime<Utc>) {
        let snap = self.snapshot(timestamp);
        self.history.push(snap);
    }

    /// Immutable copy handed to readers.
    pub fn view(&self) -> ProcessView {
        ProcessView {
            snapshot: self.history.latest().cloned(),
            mode: self.mode,
            phase: self.phase,
            failsafe: self.failsafe.clone(),
            totals: self.totals,
            connected: self.connected,
            watchdog_stale: self.watchdog_stale,
            actuation_enabled: self.actuation_enabled,
            last_read_at: self.last_read_at,
            history: self.history.to_vec(),
        }
    }
}

/// Read-only view published to dashboards after every tick.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessView {
    pub snapshot: Option<ProcessSnapshot>,
    pub mode: ControlMode,
    pub phase: ProjectPhase,
    pub failsafe: FailsafeState,
    pub totals: Totals,
    pub connected: bool,
    pub watchdog_stale: bool,
    pub actuation_enabled: bool,
    pub last_read_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub history: Vec<ProcessSnapshot>,
}

impl ProcessView {
    /// Newest `limit` history entries, oldest first.
    pub fn recent_history(&self, limit: usize) -> &[ProcessSnapshot] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }
}

impl Default for ProcessView {
    fn default() -> Self {
        ProcessState::new(ProjectPhase::default(), false, 1).view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_permits() {
        assert!(ProjectPhase::ReadOnly.permits(RequestedMode::Manual));
        assert!(!ProjectPhase::ReadOnly.permits(RequestedMode::Advisory));
        assert!(!ProjectPhase::ReadOnly.permits(RequestedMode::Auto));
        assert!(ProjectPhase::Advisory.permits(RequestedMode::Advisory));
        assert!(!ProjectPhase::Advisory.permits(RequestedMode::Auto));
        assert!(ProjectPhase::ClosedLoop.permits(RequestedMode::Auto));
    }

    #[test]
    fn test_parse_phase_and_mode() {
        assert_eq!("closed-loop".parse::<ProjectPhase>(), Ok(ProjectPhase::ClosedLoop));
        assert_eq!("READ_ONLY".parse::<ProjectPhase>(), Ok(ProjectPhase::ReadOnly));
        assert_eq!("Auto".parse::<RequestedMode>(), Ok(RequestedMode::Auto));
        assert!("failsafe".parse::<RequestedMode>().is_err());
    }

    #[test]
    fn test_failsafe_keeps_first_reason() {
        let mut fs = FailsafeState::default();
        let t = Utc::now();
        assert!(fs.trigger("zinc alarm", t));
        assert!(!fs.trigger("watchdog timeout", t));
        assert_eq!(fs.reason.as_deref(), Some("zinc alarm"));
        fs.clear();
        assert!(!fs.active);
        assert!(fs.reason.is_none());
    }

    #[test]
    fn test_totals_accumulate() {
        let mut totals = Totals::default();
        let m = Measurements {
            n2_flow_nm3h: 360.0,
            fg_h2_flow_nm3h: 36.0,
            line_running: true,
            ..Measurements::default()
        };
        totals.accumulate(&m, Duration::from_secs(10), &CostRates::default());
        assert!((totals.n2_nm3 - 1.0).abs() < 1e-9);
        assert!((totals.h2_nm3 - 0.1).abs() < 1e-9);
        assert!((totals.psa_savings_usd - 2.07).abs() < 1e-9);
        assert!((totals.h2_cost_usd - 0.85).abs() < 1e-9);
        assert!((totals.running_seconds - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_totals_ignore_bad_flow() {
        let mut totals = Totals::default();
        let m = Measurements {
            n2_flow_nm3h: f64::NAN,
            fg_h2_flow_nm3h: -5.0,
            ..Measurements::default()
        };
        totals.accumulate(&m, Duration::from_secs(60), &CostRates::default());
        assert_eq!(totals.n2_nm3, 0.0);
        assert_eq!(totals.h2_nm3, 0.0);
        assert_eq!(totals.running_seconds, 0.0);
    }

    #[test]
    fn test_view_reflects_history() {
        let mut state = ProcessState::new(ProjectPhase::Advisory, false, 3);
        for i in 0..5 {
            state.aperture = f64::from(i);
            state.record(Utc::now());
        }
        let view = state.view();
        assert_eq!(view.history.len(), 3);
        assert_eq!(view.snapshot.as_ref().map(|s| s.aperture), Some(4.0));
        assert_eq!(view.recent_history(2).len(), 2);
        assert_eq!(view.recent_history(10).len(), 3);
    }
}
