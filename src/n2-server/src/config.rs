// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for n2ctl-server.
//!
//! Config is loaded from the `[n2ctl-server]` section of `n2ctl.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./n2ctl.toml`
//! 3. `~/.config/n2ctl/n2ctl.toml`
//! 4. `/etc/n2ctl/n2ctl.toml`

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use n2_app::ConfigFile;
use n2_core::control::logic::Thresholds;
use n2_core::{CostRates, Permission, PermissionSet, ProjectPhase, RoleTable};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    /// Field device connection
    pub plc: PlcConfig,
    /// Polling, timeouts and reconnect behavior
    pub behavior: BehaviorConfig,
    /// Actuation master switch, watchdog and ramp limit
    pub safety: SafetyConfig,
    pub thresholds: ThresholdsConfig,
    /// Valve aperture tiers, percent
    pub apertures: AperturesConfig,
    pub forming_gas: FormingGasConfig,
    /// Unit prices for the consumption counters
    pub economics: EconomicsConfig,
    pub history: HistoryConfig,
    pub authorization: AuthorizationConfig,
    /// TCP listener configuration
    pub listen: ListenConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Line label used in log lines
    pub line_name: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            line_name: Some("galvanizing line".to_string()),
            log_level: None,
        }
    }
}

/// Field device connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlcConfig {
    /// Backend name ("modbus" or "sim")
    pub backend: String,
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Phase offset for the simulated PLC
    pub sim_seed: u64,
}

impl Default for PlcConfig {
    fn default() -> Self {
        Self {
            backend: "modbus".to_string(),
            host: "192.168.1.10".to_string(),
            port: 502,
            unit_id: 1,
            sim_seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectStrategy {
    #[default]
    Fixed,
    Exponential,
}

/// Behavior configuration for polling and reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Control loop period in milliseconds
    pub poll_interval_ms: u64,
    /// Per-call field I/O timeout in milliseconds
    pub io_timeout_ms: u64,
    /// Wait before reconnecting (base delay for exponential)
    pub reconnect_wait_ms: u64,
    pub reconnect_strategy: ReconnectStrategy,
    /// Cap for exponential reconnect backoff
    pub reconnect_max_ms: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            io_timeout_ms: 2_000,
            reconnect_wait_ms: 15_000,
            reconnect_strategy: ReconnectStrategy::Fixed,
            reconnect_max_ms: 120_000,
        }
    }
}

/// Safety configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Master switch for every field write (valve, heartbeat, mode)
    pub actuation_enabled: bool,
    /// Data older than this latches failsafe
    pub watchdog_timeout_secs: u64,
    /// Largest aperture change per tick, percent
    pub ramp_max_delta: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            actuation_enabled: false,
            watchdog_timeout_secs: 60,
            ramp_max_delta: 10.0,
        }
    }
}

/// Process limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub min_production_speed: f64,
    pub low_speed: f64,
    pub nominal_speed: f64,
    pub max_speed: f64,
    pub zinc_temp_min_c: f64,
    pub zinc_temp_max_c: f64,
    pub purity_operative_pct: f64,
    pub purity_critical_pct: f64,
    pub n2_pressure_min_bar: f64,
    pub n2_pressure_max_bar: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        let t = Thresholds::default();
        Self {
            min_production_speed: t.min_production_speed,
            low_speed: t.low_speed,
            nominal_speed: t.nominal_speed,
            max_speed: t.max_speed,
            zinc_temp_min_c: t.zinc_temp_min_c,
            zinc_temp_max_c: t.zinc_temp_max_c,
            purity_operative_pct: t.purity_operative_pct,
            purity_critical_pct: t.purity_critical_pct,
            n2_pressure_min_bar: t.n2_pressure_min_bar,
            n2_pressure_max_bar: t.n2_pressure_max_bar,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AperturesConfig {
    pub low_speed: f64,
    pub nominal: f64,
    pub max: f64,
}

impl Default for AperturesConfig {
    fn default() -> Self {
        Self {
            low_speed: 40.0,
            nominal: 75.0,
            max: 95.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormingGasConfig {
    pub enabled: bool,
    pub h2_min_pct: f64,
    pub h2_max_pct: f64,
    pub pressure_min_bar: f64,
    pub pressure_max_bar: f64,
    pub mixer_temp_max_c: f64,
}

impl Default for FormingGasConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            h2_min_pct: 3.0,
            h2_max_pct: 10.0,
            pressure_min_bar: 0.3,
            pressure_max_bar: 2.0,
            mixer_temp_max_c: 50.0,
        }
    }
}

/// Unit prices, USD per Nm³.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicsConfig {
    pub cost_lin: f64,
    pub cost_psa: f64,
    pub cost_h2: f64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        let rates = CostRates::default();
        Self {
            cost_lin: rates.lin_usd_m3,
            cost_psa: rates.psa_usd_m3,
            cost_h2: rates.h2_usd_m3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Snapshots kept in memory
    pub capacity: usize,
    /// Events kept for `get_events`
    pub recent_events: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            recent_events: 200,
        }
    }
}

/// Roles, tokens and commissioning phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub phase: ProjectPhase,
    /// Role of sessions that present no token
    pub default_role: String,
    /// Extra or overriding roles on top of viewer/operator/engineer/supervisor
    pub roles: HashMap<String, Vec<Permission>>,
    /// Token to role name
    pub tokens: HashMap<String, String>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            phase: ProjectPhase::ReadOnly,
            default_role: "viewer".to_string(),
            roles: HashMap::new(),
            tokens: HashMap::new(),
        }
    }
}

/// TCP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Whether the listener is enabled
    pub enabled: bool,
    /// IP address to listen on
    pub listen: IpAddr,
    /// TCP port to listen on
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 4650,
        }
    }
}

impl ServerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.behavior.poll_interval_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.behavior.io_timeout_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.safety.watchdog_timeout_secs)
    }

    /// Decision-table limits assembled from the threshold, aperture and
    /// forming-gas sections.
    pub fn thresholds(&self) -> Thresholds {
        let t = &self.thresholds;
        let a = &self.apertures;
        let fg = &self.forming_gas;
        Thresholds {
            min_production_speed: t.min_production_speed,
            low_speed: t.low_speed,
            nominal_speed: t.nominal_speed,
            max_speed: t.max_speed,
            zinc_temp_min_c: t.zinc_temp_min_c,
            zinc_temp_max_c: t.zinc_temp_max_c,
            purity_operative_pct: t.purity_operative_pct,
            purity_critical_pct: t.purity_critical_pct,
            n2_pressure_min_bar: t.n2_pressure_min_bar,
            n2_pressure_max_bar: t.n2_pressure_max_bar,
            forming_gas_enabled: fg.enabled,
            h2_min_pct: fg.h2_min_pct,
            h2_max_pct: fg.h2_max_pct,
            fg_pressure_min_bar: fg.pressure_min_bar,
            fg_pressure_max_bar: fg.pressure_max_bar,
            mixer_temp_max_c: fg.mixer_temp_max_c,
            aperture_low_speed: a.low_speed,
            aperture_nominal: a.nominal,
            aperture_max: a.max,
        }
    }

    pub fn cost_rates(&self) -> CostRates {
        CostRates {
            lin_usd_m3: self.economics.cost_lin,
            psa_usd_m3: self.economics.cost_psa,
            h2_usd_m3: self.economics.cost_h2,
        }
    }

    /// Built-in roles with the configured ones layered on top.
    pub fn role_table(&self) -> RoleTable {
        let mut table = RoleTable::default();
        for (name, perms) in &self.authorization.roles {
            table.insert(name.clone(), perms.iter().copied().collect::<PermissionSet>());
        }
        table
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.plc.backend.trim().is_empty() {
            return Err("[plc].backend must not be empty".to_string());
        }
        if self.plc.backend.eq_ignore_ascii_case("modbus") {
            if self.plc.host.trim().is_empty() {
                return Err("[plc].host must be set for the modbus backend".to_string());
            }
            if self.plc.port == 0 {
                return Err("[plc].port must be > 0".to_string());
            }
        }
        if self.plc.unit_id > 247 {
            return Err("[plc].unit_id must be in range 0..=247".to_string());
        }

        let b = &self.behavior;
        if b.poll_interval_ms == 0 {
            return Err("[behavior].poll_interval_ms must be > 0".to_string());
        }
        if b.io_timeout_ms == 0 {
            return Err("[behavior].io_timeout_ms must be > 0".to_string());
        }
        if b.io_timeout_ms >= b.poll_interval_ms {
            return Err(
                "[behavior].io_timeout_ms must be smaller than [behavior].poll_interval_ms"
                    .to_string(),
            );
        }
        if b.reconnect_wait_ms == 0 {
            return Err("[behavior].reconnect_wait_ms must be > 0".to_string());
        }
        if b.reconnect_strategy == ReconnectStrategy::Exponential
            && b.reconnect_max_ms < b.reconnect_wait_ms
        {
            return Err(
                "[behavior].reconnect_max_ms must be >= [behavior].reconnect_wait_ms".to_string(),
            );
        }

        let s = &self.safety;
        if s.watchdog_timeout_secs == 0 {
            return Err("[safety].watchdog_timeout_secs must be > 0".to_string());
        }
        if s.watchdog_timeout_secs.saturating_mul(1000) <= b.poll_interval_ms {
            return Err(
                "[safety].watchdog_timeout_secs must exceed [behavior].poll_interval_ms"
                    .to_string(),
            );
        }
        if !s.ramp_max_delta.is_finite() || s.ramp_max_delta <= 0.0 || s.ramp_max_delta > 100.0 {
            return Err("[safety].ramp_max_delta must be in range (0, 100]".to_string());
        }

        validate_thresholds(&self.thresholds)?;
        validate_apertures(&self.apertures)?;
        if self.forming_gas.enabled {
            validate_forming_gas(&self.forming_gas)?;
        }

        let e = &self.economics;
        for (name, v) in [
            ("cost_lin", e.cost_lin),
            ("cost_psa", e.cost_psa),
            ("cost_h2", e.cost_h2),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("[economics].{name} must be a non-negative number"));
            }
        }

        if self.history.capacity == 0 {
            return Err("[history].capacity must be > 0".to_string());
        }
        if self.history.recent_events == 0 {
            return Err("[history].recent_events must be > 0".to_string());
        }

        validate_authorization(&self.authorization, &self.role_table())?;

        if self.listen.enabled && self.listen.port == 0 {
            return Err("[listen].port must be > 0 when listener is enabled".to_string());
        }
        Ok(())
    }

    /// Generate an example configuration wrapped under the `[n2ctl-server]`
    /// section header, suitable for use in a combined `n2ctl.toml` file.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "n2ctl-server")]
            inner: ServerConfig,
        }
        let mut example = ServerConfig {
            general: GeneralConfig {
                line_name: Some("galvanizing line 1".to_string()),
                log_level: Some("info".to_string()),
            },
            ..ServerConfig::default()
        };
        example.authorization.phase = ProjectPhase::Advisory;
        example
            .authorization
            .tokens
            .insert("change-me-supervisor".to_string(), "supervisor".to_string());
        example
            .authorization
            .tokens
            .insert("change-me-operator".to_string(), "operator".to_string());
        example.authorization.roles.insert(
            "shift_lead".to_string(),
            vec![
                Permission::View,
                Permission::SetMode,
                Permission::TriggerFailsafe,
                Permission::ClearFailsafe,
            ],
        );
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

fn ordered(path: &str, values: &[f64]) -> Result<(), String> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(format!("{path} must be finite numbers"));
    }
    if values.windows(2).any(|w| w[0] >= w[1]) {
        return Err(format!("{path} must be strictly increasing"));
    }
    Ok(())
}

fn validate_thresholds(t: &ThresholdsConfig) -> Result<(), String> {
    if t.min_production_speed < 0.0 {
        return Err("[thresholds].min_production_speed must be >= 0".to_string());
    }
    ordered(
        "[thresholds] min_production_speed < low_speed < nominal_speed < max_speed",
        &[t.min_production_speed, t.low_speed, t.nominal_speed, t.max_speed],
    )?;
    ordered(
        "[thresholds] zinc_temp_min_c < zinc_temp_max_c",
        &[t.zinc_temp_min_c, t.zinc_temp_max_c],
    )?;
    ordered(
        "[thresholds] purity_critical_pct < purity_operative_pct",
        &[t.purity_critical_pct, t.purity_operative_pct],
    )?;
    if t.purity_critical_pct < 0.0 || t.purity_operative_pct > 100.0 {
        return Err("[thresholds] purity limits must be within 0..=100".to_string());
    }
    ordered(
        "[thresholds] n2_pressure_min_bar < n2_pressure_max_bar",
        &[t.n2_pressure_min_bar, t.n2_pressure_max_bar],
    )?;
    if t.n2_pressure_min_bar < 0.0 {
        return Err("[thresholds].n2_pressure_min_bar must be >= 0".to_string());
    }
    Ok(())
}

fn validate_apertures(a: &AperturesConfig) -> Result<(), String> {
    let tiers = [a.low_speed, a.nominal, a.max];
    if tiers.iter().any(|v| !v.is_finite() || !(0.0..=100.0).contains(v)) {
        return Err("[apertures] tiers must be within 0..=100".to_string());
    }
    if a.low_speed > a.nominal || a.nominal > a.max {
        return Err("[apertures] low_speed <= nominal <= max is required".to_string());
    }
    Ok(())
}

fn validate_forming_gas(fg: &FormingGasConfig) -> Result<(), String> {
    ordered(
        "[forming_gas] h2_min_pct < h2_max_pct",
        &[fg.h2_min_pct, fg.h2_max_pct],
    )?;
    if fg.h2_min_pct < 0.0 || fg.h2_max_pct > 100.0 {
        return Err("[forming_gas] h2 band must be within 0..=100".to_string());
    }
    ordered(
        "[forming_gas] pressure_min_bar < pressure_max_bar",
        &[fg.pressure_min_bar, fg.pressure_max_bar],
    )?;
    if !fg.mixer_temp_max_c.is_finite() {
        return Err("[forming_gas].mixer_temp_max_c must be a finite number".to_string());
    }
    Ok(())
}

fn validate_authorization(auth: &AuthorizationConfig, roles: &RoleTable) -> Result<(), String> {
    if !roles.contains(&auth.default_role) {
        return Err(format!(
            "[authorization].default_role '{}' is not a known role",
            auth.default_role
        ));
    }
    for (token, role) in &auth.tokens {
        if token.trim().is_empty() {
            return Err("[authorization.tokens] must not contain empty tokens".to_string());
        }
        if !roles.contains(role) {
            return Err(format!(
                "[authorization.tokens] maps a token to unknown role '{}'",
                role
            ));
        }
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "n2ctl-server"
    }
}
