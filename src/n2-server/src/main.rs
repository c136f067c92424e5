// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod control_task;
mod event_sinks;
mod listener;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use n2_app::{init_logging, normalize_name, ConfigFile};
use n2_backend::{register_builtin_backends_on, FieldAccess, RegistrationContext};
use n2_core::control::{EventEmitter, ExponentialBackoff, FixedBackoff, ReconnectPolicy};
use n2_core::{ControlRequest, DynResult, ProjectPhase};
use n2_protocol::RoleResolver;

use config::{ReconnectStrategy, ServerConfig};
use control_task::{ControlLoop, ControlTaskConfig};
use event_sinks::{RecentEvents, TracingSink};
use listener::ListenerContext;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - nitrogen injection controller");
const CONTROL_TASK_CHANNEL_BUFFER: usize = 32;
const SHUTDOWN_MARGIN: Duration = Duration::from_millis(400);

/// How long the control task gets to close the valve before it is aborted.
fn shutdown_grace(io_timeout: Duration) -> Duration {
    io_timeout.saturating_add(SHUTDOWN_MARGIN)
}

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Field backend to use (modbus, sim)
    #[arg(short = 'b', long = "backend")]
    backend: Option<String>,
    /// PLC address as <host>:<port>
    #[arg(long = "plc", value_name = "HOST:PORT")]
    plc: Option<String>,
    /// Modbus unit id of the PLC
    #[arg(short = 'u', long = "unit-id")]
    unit_id: Option<u8>,
    /// IP address for the JSON TCP listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the JSON TCP listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
    /// Commissioning phase (read_only, advisory, closed_loop)
    #[arg(long = "phase")]
    phase: Option<ProjectPhase>,
}

struct ResolvedConfig {
    backend: String,
    access: FieldAccess,
    phase: ProjectPhase,
}

fn resolve_config(
    cli: &Cli,
    cfg: &ServerConfig,
    registry: &RegistrationContext,
) -> DynResult<ResolvedConfig> {
    let backend = normalize_name(cli.backend.as_deref().unwrap_or(&cfg.plc.backend));
    if !registry.is_backend_registered(&backend) {
        return Err(format!(
            "Unknown field backend: {} (available: {})",
            backend,
            registry.registered_backends().join(", ")
        )
        .into());
    }

    let access = if backend == "sim" {
        FieldAccess::Simulated {
            seed: cfg.plc.sim_seed,
        }
    } else {
        let addr = match cli.plc {
            Some(ref addr) => addr.clone(),
            None => format!("{}:{}", cfg.plc.host, cfg.plc.port),
        };
        if addr.rsplit_once(':').is_none() {
            return Err(format!("PLC address must be <host>:<port>, got '{}'", addr).into());
        }
        FieldAccess::Tcp {
            addr,
            unit_id: cli.unit_id.unwrap_or(cfg.plc.unit_id),
        }
    };

    Ok(ResolvedConfig {
        backend,
        access,
        phase: cli.phase.unwrap_or(cfg.authorization.phase),
    })
}

fn build_control_task_config(cfg: &ServerConfig, phase: ProjectPhase) -> ControlTaskConfig {
    let wait = Duration::from_millis(cfg.behavior.reconnect_wait_ms);
    let reconnect: Box<dyn ReconnectPolicy> = match cfg.behavior.reconnect_strategy {
        ReconnectStrategy::Fixed => Box::new(FixedBackoff::new(wait)),
        ReconnectStrategy::Exponential => Box::new(ExponentialBackoff::new(
            wait,
            Duration::from_millis(cfg.behavior.reconnect_max_ms),
        )),
    };
    ControlTaskConfig {
        line_name: cfg
            .general
            .line_name
            .clone()
            .unwrap_or_else(|| "galvanizing line".to_string()),
        poll_interval: cfg.poll_interval(),
        io_timeout: cfg.io_timeout(),
        watchdog_timeout: cfg.watchdog_timeout(),
        ramp_max_delta: cfg.safety.ramp_max_delta,
        actuation_enabled: cfg.safety.actuation_enabled,
        phase,
        thresholds: cfg.thresholds(),
        rates: cfg.cost_rates(),
        history_capacity: cfg.history.capacity,
        reconnect,
    }
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let mut registry = RegistrationContext::new();
    register_builtin_backends_on(&mut registry);

    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_combined_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let resolved = resolve_config(&cli, &cfg, &registry)?;

    match &resolved.access {
        FieldAccess::Tcp { addr, unit_id } => info!(
            "Starting n2ctl-server (backend: {}, plc: {} unit {}, phase: {:?})",
            resolved.backend, addr, unit_id, resolved.phase
        ),
        FieldAccess::Simulated { seed } => info!(
            "Starting n2ctl-server (backend: {}, seed {}, phase: {:?})",
            resolved.backend, seed, resolved.phase
        ),
    }
    if !cfg.safety.actuation_enabled {
        warn!("Actuation is disabled: no field writes will be made");
    }

    let device = registry.build_device(&resolved.backend, resolved.access.clone())?;

    let events = RecentEvents::new(cfg.history.recent_events);
    let mut emitter = EventEmitter::new();
    emitter.register(Arc::new(TracingSink));
    emitter.register(Arc::new(events.clone()));

    let control = ControlLoop::new(
        device,
        build_control_task_config(&cfg, resolved.phase),
        emitter,
    );

    let (tx, rx) = mpsc::channel::<ControlRequest>(CONTROL_TASK_CHANNEL_BUFFER);
    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(control.view());

    let control_shutdown_rx = shutdown_rx.clone();
    let mut control_handle = tokio::spawn(async move {
        if let Err(e) =
            control_task::run_control_task(control, rx, state_tx, control_shutdown_rx).await
        {
            error!("Control task error: {:?}", e);
        }
    });

    if cfg.listen.enabled {
        let listen_ip = cli.listen.unwrap_or(cfg.listen.listen);
        let listen_port = cli.port.unwrap_or(cfg.listen.port);
        let listen_addr = SocketAddr::from((listen_ip, listen_port));
        let ctx = ListenerContext {
            control_tx: tx.clone(),
            state_rx: state_rx.clone(),
            resolver: Arc::new(RoleResolver::new(
                cfg.role_table(),
                cfg.authorization.tokens.clone(),
                cfg.authorization.default_role.clone(),
            )),
            events,
        };
        let listener_shutdown_rx = shutdown_rx.clone();
        task_handles.push(tokio::spawn(async move {
            if let Err(e) = listener::run_listener(listen_addr, ctx, listener_shutdown_rx).await {
                error!("Listener error: {:?}", e);
            }
        }));
    }

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);
    drop(tx);
    drop(state_rx);

    // The control task may still be writing the closed valve.
    let grace = shutdown_grace(cfg.io_timeout());
    if tokio::time::timeout(grace, &mut control_handle).await.is_err() {
        warn!("Control task did not stop within {:?}, aborting", grace);
        control_handle.abort();
        let _ = control_handle.await;
    }
    tokio::time::sleep(SHUTDOWN_MARGIN).await;

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RegistrationContext {
        let mut registry = RegistrationContext::new();
        register_builtin_backends_on(&mut registry);
        registry
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "n2ctl-server",
            "--plc",
            "10.0.0.5:1502",
            "--unit-id",
            "7",
            "--phase",
            "closed_loop",
        ]);
        let resolved = resolve_config(&cli, &ServerConfig::default(), &registry()).unwrap();
        assert_eq!(resolved.backend, "modbus");
        assert_eq!(resolved.phase, ProjectPhase::ClosedLoop);
        match resolved.access {
            FieldAccess::Tcp { addr, unit_id } => {
                assert_eq!(addr, "10.0.0.5:1502");
                assert_eq!(unit_id, 7);
            }
            other => panic!("unexpected access {:?}", other),
        }
    }

    #[test]
    fn test_config_defaults_resolve_to_plc_address() {
        let cli = Cli::parse_from(["n2ctl-server"]);
        let resolved = resolve_config(&cli, &ServerConfig::default(), &registry()).unwrap();
        assert_eq!(resolved.phase, ProjectPhase::ReadOnly);
        assert!(matches!(
            resolved.access,
            FieldAccess::Tcp { ref addr, unit_id: 1 } if addr == "192.168.1.10:502"
        ));
    }

    #[test]
    fn test_sim_backend_and_unknown_backend() {
        let cli = Cli::parse_from(["n2ctl-server", "--backend", "SIM"]);
        let resolved = resolve_config(&cli, &ServerConfig::default(), &registry()).unwrap();
        assert!(matches!(resolved.access, FieldAccess::Simulated { seed: 0 }));

        let cli = Cli::parse_from(["n2ctl-server", "--backend", "profibus"]);
        let err = resolve_config(&cli, &ServerConfig::default(), &registry())
            .err()
            .unwrap();
        assert!(err.to_string().contains("available"));
    }

    #[test]
    fn test_control_task_config_from_server_config() {
        let mut cfg = ServerConfig::default();
        cfg.behavior.reconnect_strategy = ReconnectStrategy::Exponential;
        cfg.safety.ramp_max_delta = 5.0;
        let task = build_control_task_config(&cfg, ProjectPhase::Advisory);
        assert_eq!(task.poll_interval, Duration::from_secs(5));
        assert_eq!(task.io_timeout, Duration::from_secs(2));
        assert_eq!(task.ramp_max_delta, 5.0);
        assert_eq!(task.phase, ProjectPhase::Advisory);
        assert_eq!(task.reconnect.delay(2), Duration::from_secs(30));
    }

    #[test]
    fn test_shutdown_grace_outlasts_io_timeout() {
        let cfg = ServerConfig::default();
        assert!(shutdown_grace(cfg.io_timeout()) > cfg.io_timeout());
        assert_eq!(shutdown_grace(Duration::MAX), Duration::MAX);
    }
}
