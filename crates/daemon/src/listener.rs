// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoint for cluster agents.
//!
//! Agents authenticate with their deploy token, either as
//! `Authorization: Bearer <token>` or as a `token` query parameter. Each
//! accepted connection runs in its own task, writing events from its
//! registry queue as JSON text frames until either side closes.

use std::io;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use keel_core::ConnectionId;
use keel_wire::encode;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::{AgentConnection, Registry, RegistryError};
use crate::store::Store;

/// Errors from serving one agent connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Accepts agent connections and feeds them into the registry.
pub struct Listener<S> {
    tcp: TcpListener,
    store: S,
    registry: Registry,
}

impl<S: Store> Listener<S> {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        store: S,
        registry: Registry,
    ) -> io::Result<Self> {
        let tcp = TcpListener::bind(addr).await?;
        Ok(Self { tcp, store, registry })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Accept connections until `cancel` fires. Open connections are told
    /// to close on cancellation.
    pub async fn run(self, cancel: CancellationToken) {
        if let Ok(addr) = self.tcp.local_addr() {
            info!(%addr, "listening for agents");
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.tcp.accept() => match result {
                    Ok((stream, peer)) => {
                        let store = self.store.clone();
                        let registry = self.registry.clone();
                        let cancel = cancel.child_token();
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, &store, &registry, cancel).await
                            {
                                log_connection_error(peer, e);
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
            }
        }
        info!("listener stopped");
    }
}

async fn handle_connection<S: Store>(
    stream: TcpStream,
    store: &S,
    registry: &Registry,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    let mut token = None;
    let capture_token = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        token = token_from_request(req);
        Ok(resp)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, capture_token).await?;

    let connection_id = ConnectionId::generate();
    let token = token.unwrap_or_default();
    let AgentConnection { connection_id, mut events, .. } =
        match registry.on_connect(store, connection_id, &token).await {
            Ok(conn) => conn,
            Err(e) => {
                let frame =
                    CloseFrame { code: CloseCode::Policy, reason: "invalid deploy token".into() };
                let _ = ws.close(Some(frame)).await;
                return Err(e.into());
            }
        };

    let (mut sink, mut source) = ws.split();
    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break Ok(());
            }
            event = events.recv() => {
                // Closed when the registry drops this connection.
                let Some(event) = event else { break Ok(()) };
                match encode(&event) {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::text(text)).await {
                            break Err(e.into());
                        }
                    }
                    Err(e) => warn!(
                        connection_id = %connection_id,
                        event = event.name(),
                        error = %e,
                        "dropping event"
                    ),
                }
            }
            msg = source.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                // Agents report back over the HTTP callbacks.
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
        }
    };

    registry.on_disconnect(&connection_id);
    result
}

/// Deploy token from the `Authorization` header, falling back to the
/// `token` query parameter.
pub(crate) fn token_from_request(req: &Request) -> Option<String> {
    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn log_connection_error(peer: SocketAddr, e: ConnectionError) {
    match e {
        ConnectionError::Registry(RegistryError::Unauthorized) => {
            warn!(%peer, "refused agent with unknown deploy token")
        }
        ConnectionError::WebSocket(e) => debug!(%peer, error = %e, "agent connection closed"),
        e => error!(%peer, error = %e, "agent connection failed"),
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
