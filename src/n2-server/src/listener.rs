// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-over-TCP listener for n2ctl-server.
//!
//! Accepts client connections speaking the `ClientEnvelope`/`ClientResponse`
//! protocol defined in `n2-protocol`. Each session holds the role resolved
//! from the last token it presented.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use n2_core::{Actor, ControlRequest, Permission, ProcessView};
use n2_protocol::{
    client_command_to_control, encode_response, parse_envelope, ClientCommand, ClientResponse,
    RoleResolver,
};

use crate::event_sinks::RecentEvents;

const DEFAULT_EVENTS_LIMIT: usize = 50;

/// Everything a client session needs, cloned per connection.
#[derive(Clone)]
pub struct ListenerContext {
    pub control_tx: mpsc::Sender<ControlRequest>,
    pub state_rx: watch::Receiver<ProcessView>,
    pub resolver: Arc<RoleResolver>,
    pub events: RecentEvents,
}

/// Run the JSON TCP listener, accepting client connections.
pub async fn run_listener(
    addr: SocketAddr,
    ctx: ListenerContext,
    shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    serve(listener, ctx, shutdown_rx).await
}

/// Accept loop on an already bound socket.
pub async fn serve(
    listener: TcpListener,
    ctx: ListenerContext,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                info!("Client connected: {}", peer);
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(socket, peer, ctx).await {
                        error!("Client {} error: {:?}", peer, e);
                    }
                });
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Listener shutting down");
                    return Ok(());
                }
            }
        }
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, resp: &ClientResponse) -> std::io::Result<()> {
    let line = encode_response(resp)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

fn missing_view(actor: &Actor) -> Option<ClientResponse> {
    if actor.permissions.contains(Permission::View) {
        None
    } else {
        Some(ClientResponse::error(format!(
            "role '{}' lacks permission view",
            actor.role
        )))
    }
}

async fn handle_client(socket: TcpStream, addr: SocketAddr, ctx: ListenerContext) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let mut actor = ctx.resolver.default_actor();
    let mut session_token: Option<String> = None;

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            info!("Client {} disconnected", addr);
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope = match parse_envelope(trimmed) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Invalid JSON from {}: {} / {:?}", addr, trimmed, e);
                send(&mut writer, &ClientResponse::error(format!("Invalid JSON: {}", e))).await?;
                continue;
            }
        };

        // The role is re-resolved only when the client presents a new token.
        if let Some(token) = envelope.token.as_deref() {
            if session_token.as_deref() != Some(token) {
                match ctx.resolver.resolve(token) {
                    Ok(resolved) => {
                        info!("Client {} acting as role '{}'", addr, resolved.role);
                        actor = resolved;
                        session_token = Some(token.to_string());
                    }
                    Err(err) => {
                        warn!("Client {} presented a bad token", addr);
                        send(&mut writer, &ClientResponse::error(err)).await?;
                        continue;
                    }
                }
            }
        }

        let resp = match &envelope.cmd {
            ClientCommand::Whoami => Some(ClientResponse::role(actor.clone())),
            ClientCommand::GetHistory { limit } => Some(missing_view(&actor).unwrap_or_else(|| {
                let view = ctx.state_rx.borrow();
                let limit = limit.unwrap_or(view.history.len());
                ClientResponse::history(view.recent_history(limit).to_vec())
            })),
            ClientCommand::GetEvents { limit } => Some(missing_view(&actor).unwrap_or_else(|| {
                ClientResponse::events(ctx.events.recent(limit.unwrap_or(DEFAULT_EVENTS_LIMIT)))
            })),
            // Fast path: serve GetState from the watch channel once the
            // control task has published a snapshot.
            ClientCommand::GetState => missing_view(&actor).or_else(|| {
                let view = ctx.state_rx.borrow().clone();
                view.snapshot.is_some().then(|| ClientResponse::state(view))
            }),
            _ => None,
        };
        if let Some(resp) = resp {
            send(&mut writer, &resp).await?;
            continue;
        }

        let Some(cmd) = client_command_to_control(&envelope.cmd) else {
            continue;
        };
        let (resp_tx, resp_rx) = oneshot::channel();
        let req = ControlRequest {
            cmd,
            actor: actor.clone(),
            respond_to: resp_tx,
        };

        if let Err(e) = ctx.control_tx.send(req).await {
            error!("Failed to send {} to control task", e.0.cmd.name());
            send(
                &mut writer,
                &ClientResponse::error("Internal error: control task not available"),
            )
            .await?;
            continue;
        }

        let resp = match resp_rx.await {
            Ok(Ok(view)) => ClientResponse::state(view),
            Ok(Err(err)) => ClientResponse::error(err.message),
            Err(e) => {
                error!("Control response oneshot recv error: {:?}", e);
                ClientResponse::error("Internal error waiting for control response")
            }
        };
        send(&mut writer, &resp).await?;
    }

    Ok(())
}
