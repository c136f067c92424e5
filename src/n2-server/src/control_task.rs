// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Control task: the single owner of the field device and the process state.
//!
//! Each tick reconnects if due, polls the PLC, checks the watchdog, decides
//! the valve target and writes it (when the mode and the master flag allow),
//! then records history and publishes a fresh [`ProcessView`]. Commands from
//! clients are served between ticks in the same `select!`, so state has
//! exactly one writer.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use n2_core::control::logic::{apply_ramp, evaluate, Thresholds};
use n2_core::control::{
    can_clear_failsafe, can_request_mode, can_trigger_failsafe, EventEmitter, EventType,
    FixedBackoff, GateDecision, ModeEvent, ModeMachine, ProcessEvent, ReconnectPolicy, Severity,
    Watchdog,
};
use n2_core::{
    Actor, ControlCommand, ControlError, ControlMode, ControlRequest, ControlResult, CostRates,
    DynResult, FieldDevice, FieldError, FieldFuture, FieldResult, Measurements, Permission,
    ProcessState, ProcessView, ProjectPhase, RequestedMode,
};

/// Configuration for the control task.
pub struct ControlTaskConfig {
    pub line_name: String,
    pub poll_interval: Duration,
    pub io_timeout: Duration,
    pub watchdog_timeout: Duration,
    pub ramp_max_delta: f64,
    pub actuation_enabled: bool,
    pub phase: ProjectPhase,
    pub thresholds: Thresholds,
    pub rates: CostRates,
    pub history_capacity: usize,
    pub reconnect: Box<dyn ReconnectPolicy>,
}

impl Default for ControlTaskConfig {
    fn default() -> Self {
        Self {
            line_name: "galvanizing line".to_string(),
            poll_interval: Duration::from_secs(5),
            io_timeout: Duration::from_secs(2),
            watchdog_timeout: Duration::from_secs(60),
            ramp_max_delta: 10.0,
            actuation_enabled: false,
            phase: ProjectPhase::ReadOnly,
            thresholds: Thresholds::default(),
            rates: CostRates::default(),
            history_capacity: 500,
            reconnect: Box::new(FixedBackoff::default()),
        }
    }
}

/// Run a field call under the per-call timeout.
async fn guarded<T>(io_timeout: Duration, fut: FieldFuture<'_, T>) -> FieldResult<T> {
    match time::timeout(io_timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(FieldError::Timeout(timeout_ms(io_timeout))),
    }
}

fn timeout_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

pub struct ControlLoop {
    device: Box<dyn FieldDevice>,
    line_name: String,
    poll_interval: Duration,
    io_timeout: Duration,
    ramp_max_delta: f64,
    thresholds: Thresholds,
    rates: CostRates,
    reconnect: Box<dyn ReconnectPolicy>,
    state: ProcessState,
    machine: ModeMachine,
    watchdog: Watchdog,
    emitter: EventEmitter,
    heartbeat: u16,
    failures: u32,
    /// Earliest instant for the next connect attempt, `None` means now.
    reconnect_at: Option<Instant>,
    ever_connected: bool,
    /// Mode code last acknowledged by the PLC.
    written_mode: Option<ControlMode>,
    last_tick: Option<Instant>,
}

impl ControlLoop {
    pub fn new(device: Box<dyn FieldDevice>, config: ControlTaskConfig, emitter: EventEmitter) -> Self {
        let ControlTaskConfig {
            line_name,
            poll_interval,
            io_timeout,
            watchdog_timeout,
            ramp_max_delta,
            actuation_enabled,
            phase,
            thresholds,
            rates,
            history_capacity,
            reconnect,
        } = config;
        Self {
            device,
            line_name,
            poll_interval,
            io_timeout,
            ramp_max_delta,
            thresholds,
            rates,
            reconnect,
            state: ProcessState::new(phase, actuation_enabled, history_capacity),
            machine: ModeMachine::new(),
            watchdog: Watchdog::new(watchdog_timeout, Instant::now().into_std()),
            emitter,
            heartbeat: 0,
            failures: 0,
            reconnect_at: None,
            ever_connected: false,
            written_mode: None,
            last_tick: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn view(&self) -> ProcessView {
        self.state.view()
    }

    /// One control cycle. Field faults are absorbed here and never abort the loop.
    pub async fn tick(&mut self) {
        let now = Instant::now();
        self.reconnect_if_due(now).await;
        let fresh = self.poll(now).await;
        self.check_watchdog(now);
        if let Some(m) = fresh.as_ref() {
            self.decide(m);
        }
        self.actuate(fresh.is_some(), now).await;
        self.account(fresh.as_ref(), now);
        self.state.record(Utc::now());
        debug!(
            "[{}] tick: mode={} target={:.1} aperture={:.1} reason='{}' connected={}",
            self.line_name,
            self.state.mode,
            self.state.aperture_target,
            self.state.aperture,
            self.state.reason,
            self.state.connected
        );
    }

    async fn reconnect_if_due(&mut self, now: Instant) {
        if self.device.is_connected() {
            return;
        }
        if let Some(at) = self.reconnect_at {
            if now < at {
                return;
            }
        }
        match guarded(self.io_timeout, self.device.connect()).await {
            Ok(()) => {
                let description = if self.ever_connected {
                    format!("reconnected to PLC after {} failed attempt(s)", self.failures)
                } else {
                    "connected to PLC".to_string()
                };
                self.ever_connected = true;
                self.failures = 0;
                self.reconnect_at = None;
                self.written_mode = None;
                self.state.connected = true;
                info!("[{}] {}", self.line_name, description);
                self.emitter.emit(ProcessEvent::new(
                    Severity::Info,
                    EventType::Reconnected,
                    description,
                ));
            }
            Err(e) => {
                self.device.disconnect();
                self.state.connected = false;
                let delay = self.schedule_reconnect(now);
                warn!(
                    "[{}] PLC connect failed: {} (next attempt in {:?})",
                    self.line_name, e, delay
                );
            }
        }
    }

    fn schedule_reconnect(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.reconnect.delay(self.failures);
        self.reconnect_at = Some(now + delay);
        delay
    }

    async fn poll(&mut self, now: Instant) -> Option<Measurements> {
        if !self.device.is_connected() {
            self.state.connected = false;
            return None;
        }
        match guarded(self.io_timeout, self.device.read_all()).await {
            Ok(m) => {
                self.state.measurements = Some(m);
                self.state.last_read_at = Some(Utc::now());
                self.state.connected = true;
                self.watchdog.feed(now.into_std());
                Some(m)
            }
            Err(e) => {
                self.io_failed("read", e, now);
                None
            }
        }
    }

    /// Connection-class failures drop the session; device exceptions only log.
    fn io_failed(&mut self, what: &str, err: FieldError, now: Instant) {
        if !err.is_connection_loss() {
            warn!("[{}] PLC {} failed: {}", self.line_name, what, err);
            return;
        }
        self.device.disconnect();
        let was_connected = std::mem::replace(&mut self.state.connected, false);
        self.written_mode = None;
        let delay = self.schedule_reconnect(now);
        warn!(
            "[{}] PLC {} failed: {}; reconnecting in {:?}",
            self.line_name, what, err, delay
        );
        if was_connected {
            self.emitter.emit(ProcessEvent::new(
                Severity::Warning,
                EventType::ConnectionLost,
                format!("{what} failed: {err}"),
            ));
        }
    }

    fn check_watchdog(&mut self, now: Instant) {
        let report = self.watchdog.check(now.into_std());
        self.state.watchdog_stale = self.watchdog.is_stale();
        if report.became_stale {
            warn!(
                "[{}] no fresh PLC data for {:?}",
                self.line_name, report.age
            );
        }
        if self.watchdog.is_stale() {
            self.enter_failsafe("watchdog timeout", None);
        }
    }

    fn decide(&mut self, m: &Measurements) {
        let decision = evaluate(m, self.state.phase, &self.thresholds);

        let warnings: Vec<String> = decision
            .warnings
            .iter()
            .map(|w| w.as_str().to_string())
            .collect();
        if warnings != self.state.warnings && !warnings.is_empty() {
            warn!("[{}] process warnings: {}", self.line_name, warnings.join(", "));
        }
        self.state.warnings = warnings;

        match self.state.mode {
            ControlMode::Failsafe => {
                self.state.aperture_target = 0.0;
            }
            ControlMode::Auto => {
                if let Some(alarm) = decision.failsafe_trigger {
                    self.enter_failsafe(alarm.as_str(), None);
                } else {
                    self.state.aperture_target = decision.target;
                    self.state.reason = decision.reason.as_str().to_string();
                }
            }
            ControlMode::Manual | ControlMode::Advisory => {
                self.state.aperture_target = decision.target;
                self.state.reason = decision.reason.as_str().to_string();
            }
        }
    }

    /// Without fresh data only failsafe still drives the valve closed.
    async fn actuate(&mut self, fresh: bool, now: Instant) {
        if !self.state.actuation_enabled || !self.device.is_connected() {
            return;
        }
        if !fresh && self.state.mode != ControlMode::Failsafe {
            return;
        }

        let next = match self.state.mode {
            ControlMode::Failsafe => Some(0.0),
            ControlMode::Auto => Some(apply_ramp(
                self.state.aperture_target,
                self.state.aperture,
                self.ramp_max_delta,
            )),
            ControlMode::Manual | ControlMode::Advisory => None,
        };
        if let Some(aperture) = next {
            match guarded(self.io_timeout, self.device.write_aperture(aperture)).await {
                Ok(()) => self.state.aperture = aperture,
                Err(e) => {
                    let fatal = e.is_connection_loss();
                    self.io_failed("valve write", e, now);
                    if fatal {
                        return;
                    }
                }
            }
        }

        // Failsafe permits only the closed valve and the heartbeat.
        let mode = self.state.mode;
        if mode != ControlMode::Failsafe && self.written_mode != Some(mode) {
            match guarded(self.io_timeout, self.device.write_mode(mode)).await {
                Ok(()) => self.written_mode = Some(mode),
                Err(e) => {
                    let fatal = e.is_connection_loss();
                    self.io_failed("mode write", e, now);
                    if fatal {
                        return;
                    }
                }
            }
        }

        self.heartbeat = self.heartbeat.wrapping_add(1);
        let counter = self.heartbeat;
        if let Err(e) = guarded(self.io_timeout, self.device.write_heartbeat(counter)).await {
            self.io_failed("heartbeat write", e, now);
        }
    }

    fn account(&mut self, fresh: Option<&Measurements>, now: Instant) {
        let elapsed = self
            .last_tick
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or_default();
        self.last_tick = Some(now);
        if let Some(m) = fresh {
            self.state.totals.accumulate(m, elapsed, &self.rates);
        }
    }

    /// Latch failsafe. Returns false if it was already latched.
    fn enter_failsafe(&mut self, reason: &str, actor: Option<&Actor>) -> bool {
        if !self.state.failsafe.trigger(reason, Utc::now()) {
            return false;
        }
        let previous = self.machine.process_event(ModeEvent::Trip);
        self.state.mode = self.machine.mode();
        self.state.aperture_target = 0.0;
        self.state.reason = reason.to_string();
        error!("[{}] FAILSAFE: {}", self.line_name, reason);

        let mut event = ProcessEvent::new(Severity::Critical, EventType::FailsafeTriggered, reason);
        if let Some(actor) = actor {
            event = event.with_actor(actor.role.clone());
        }
        self.emitter.emit(event);
        if let Some(old) = previous {
            self.emit_mode_change(old, actor);
        }
        true
    }

    fn emit_mode_change(&self, old: ControlMode, actor: Option<&Actor>) {
        let description = format!("mode {} -> {}", old, self.state.mode);
        info!("[{}] {}", self.line_name, description);
        let mut event = ProcessEvent::new(Severity::Info, EventType::ModeChange, description);
        if let Some(actor) = actor {
            event = event.with_actor(actor.role.clone());
        }
        self.emitter.emit(event);
    }

    fn deny(&self, cmd: &ControlCommand, actor: &Actor, reason: String) -> ControlResult<ProcessView> {
        warn!(
            "[{}] {} denied for role '{}': {}",
            self.line_name,
            cmd.name(),
            actor.role,
            reason
        );
        self.emitter.emit(
            ProcessEvent::new(
                Severity::Warning,
                EventType::AuthorizationDenied,
                format!("{}: {}", cmd.name(), reason),
            )
            .with_actor(actor.role.clone()),
        );
        Err(ControlError::denied(reason))
    }

    /// Serve one client command. Refusals leave the state untouched.
    pub fn handle_command(&mut self, cmd: ControlCommand, actor: &Actor) -> ControlResult<ProcessView> {
        if !actor.permissions.contains(Permission::View) {
            return self.deny(&cmd, actor, "missing permission view".to_string());
        }
        match &cmd {
            ControlCommand::GetState => Ok(self.view()),
            ControlCommand::SetMode(mode) => self.set_mode(&cmd, *mode, actor),
            ControlCommand::ClearFailsafe => self.clear_failsafe(&cmd, actor),
            ControlCommand::TriggerFailsafe { reason } => {
                if let GateDecision::Denied(why) = can_trigger_failsafe(actor.permissions) {
                    return self.deny(&cmd, actor, why);
                }
                if !self.enter_failsafe(reason, Some(actor)) {
                    info!(
                        "[{}] failsafe already active, trigger by '{}' ignored",
                        self.line_name, actor.role
                    );
                }
                Ok(self.view())
            }
        }
    }

    fn set_mode(
        &mut self,
        cmd: &ControlCommand,
        mode: RequestedMode,
        actor: &Actor,
    ) -> ControlResult<ProcessView> {
        if let GateDecision::Denied(why) = can_request_mode(
            actor.permissions,
            self.state.phase,
            mode,
            self.state.failsafe.active,
        ) {
            return self.deny(cmd, actor, why);
        }
        if mode == RequestedMode::Auto && !self.state.actuation_enabled {
            return self.deny(cmd, actor, "actuation is disabled".to_string());
        }
        if let Some(old) = self.machine.process_event(ModeEvent::Request(mode)) {
            self.state.mode = self.machine.mode();
            self.emit_mode_change(old, Some(actor));
        }
        Ok(self.view())
    }

    fn clear_failsafe(&mut self, cmd: &ControlCommand, actor: &Actor) -> ControlResult<ProcessView> {
        if let GateDecision::Denied(why) =
            can_clear_failsafe(actor.permissions, self.state.failsafe.active)
        {
            return self.deny(cmd, actor, why);
        }
        if self.watchdog.is_stale() {
            return self.deny(
                cmd,
                actor,
                "watchdog is stale, fresh PLC data required".to_string(),
            );
        }
        let reason = self.state.failsafe.reason.clone().unwrap_or_default();
        self.state.failsafe.clear();
        let previous = self.machine.process_event(ModeEvent::Clear);
        self.state.mode = self.machine.mode();
        self.state.reason.clear();
        info!(
            "[{}] failsafe '{}' cleared by '{}'",
            self.line_name, reason, actor.role
        );
        self.emitter.emit(
            ProcessEvent::new(
                Severity::Info,
                EventType::FailsafeCleared,
                format!("cleared failsafe '{reason}'"),
            )
            .with_actor(actor.role.clone()),
        );
        if let Some(old) = previous {
            self.emit_mode_change(old, Some(actor));
        }
        Ok(self.view())
    }

    /// Close the valve if we were driving it, then drop the session.
    pub async fn shutdown(&mut self) {
        if self.state.actuation_enabled
            && self.state.mode == ControlMode::Auto
            && self.device.is_connected()
        {
            match guarded(self.io_timeout, self.device.write_aperture(0.0)).await {
                Ok(()) => info!("[{}] valve closed on shutdown", self.line_name),
                Err(e) => warn!("[{}] could not close valve on shutdown: {}", self.line_name, e),
            }
        }
        self.device.disconnect();
    }
}

/// Drive the control loop until the request channel closes or shutdown is signalled.
pub async fn run_control_task(
    mut control: ControlLoop,
    mut rx: mpsc::Receiver<ControlRequest>,
    state_tx: watch::Sender<ProcessView>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> DynResult<()> {
    {
        let info = control.device.info();
        info!(
            "[{}] control task started ({} {}, poll every {:?})",
            control.line_name, info.vendor, info.model, control.poll_interval
        );
    }

    let mut interval = time::interval(control.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                control.tick().await;
                let _ = state_tx.send(control.view());
            }
            maybe_req = rx.recv() => {
                let Some(ControlRequest { cmd, actor, respond_to }) = maybe_req else { break; };
                let started = Instant::now();
                let name = cmd.name();
                let result = control.handle_command(cmd, &actor);
                let _ = state_tx.send(control.view());
                let _ = respond_to.send(result);
                debug!("Command {} completed in {:?}", name, started.elapsed());
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    control.shutdown().await;
    info!("control task shutting down");
    Ok(())
}
