//! WebSocket connection handling.
//!
//! Each upgrade is checked (session id, rate limit, bearer token) before the
//! socket is accepted. An accepted socket is split in two: a writer task
//! drains the bounded outbox the session actor feeds, and the reader loop
//! forwards text frames to the actor until the peer goes away. A writer
//! whose outbox overflowed sends 1013 if it can and drops the socket.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, Query};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Extension;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tether_types::{CloseCode, ConnId, Role, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use crate::auth::Identity;
use crate::http::{authenticate, rate_limited, ApiError, TokenQuery};
use crate::server::TetherRelay;
use crate::session::{outbox, Outgoing, OutboxReader, SessionHandle};

/// How long a close frame may take to reach a peer that stopped reading.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type Sink = SplitSink<WebSocket, Message>;

/// `GET /sessions/{id}/producer`
pub async fn producer_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(relay): Extension<Arc<TetherRelay>>,
) -> Result<Response, ApiError> {
    upgrade(relay, ws, Role::Producer, &session_id, &query, &headers, addr).await
}

/// `GET /sessions/{id}/viewer`
pub async fn viewer_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(relay): Extension<Arc<TetherRelay>>,
) -> Result<Response, ApiError> {
    upgrade(relay, ws, Role::Viewer, &session_id, &query, &headers, addr).await
}

async fn upgrade(
    relay: Arc<TetherRelay>,
    ws: WebSocketUpgrade,
    role: Role,
    raw_session_id: &str,
    query: &TokenQuery,
    headers: &HeaderMap,
    addr: SocketAddr,
) -> Result<Response, ApiError> {
    let session_id =
        SessionId::parse(raw_session_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    relay
        .rate_limits()
        .check_connection(addr.ip())
        .map_err(|e| rate_limited(&relay, e))?;
    let identity = authenticate(&relay, headers, query).await?;

    let max_message_size = relay.config().server.max_message_size;
    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| {
            let conn = relay.next_conn_id();
            let span = tracing::info_span!(
                "connection",
                session_id = %session_id,
                %conn,
                %role,
                user_id = %identity.user_id,
            );
            run_connection(relay, session_id, conn, role, identity, socket).instrument(span)
        }))
}

async fn run_connection(
    relay: Arc<TetherRelay>,
    session_id: SessionId,
    conn: ConnId,
    role: Role,
    identity: Identity,
    socket: WebSocket,
) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, reader) = outbox(relay.config().session.outbound_buffer);

    let handle = match relay.hub().connect(&session_id, conn, role, outbound).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "session refused connection");
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };
    relay.metrics().connection_opened();
    info!(user_id = %identity.user_id, "socket open");

    let mut writer = tokio::spawn(write_loop(sink, reader).in_current_span());

    let mut writer_done = false;
    loop {
        tokio::select! {
            message = stream.next() => {
                let Some(message) = message else { break };
                if !forward(&relay, &handle, conn, message).await {
                    break;
                }
            }
            _ = &mut writer => {
                // The relay closed this socket (superseded, timed out or overloaded).
                writer_done = true;
                break;
            }
        }
    }

    handle.closed(conn).await;
    relay.metrics().connection_closed();
    if !writer_done {
        // The actor drops our sender on close, which ends the writer.
        let _ = writer.await;
    }
    info!("socket closed");
}

enum WriteStep {
    Continue,
    Stop,
    Overflowed,
}

/// Write frames from the outbox until it closes or the actor gives up on us.
async fn write_loop(mut sink: Sink, mut reader: OutboxReader) {
    loop {
        let step = tokio::select! {
            biased;
            _ = reader.overflow.notified() => WriteStep::Overflowed,
            step = write_next(&mut sink, &mut reader.frames) => step,
        };
        match step {
            WriteStep::Continue => {}
            WriteStep::Stop => return,
            WriteStep::Overflowed => {
                warn!("peer reads too slowly, dropping socket");
                let close = send_close(&mut sink, CloseCode::Overloaded);
                let _ = tokio::time::timeout(CLOSE_GRACE, close).await;
                return;
            }
        }
    }
}

async fn write_next(sink: &mut Sink, frames: &mut mpsc::Receiver<Outgoing>) -> WriteStep {
    match frames.recv().await {
        Some(Outgoing::Text(text)) => match sink.send(Message::Text(text)).await {
            Ok(()) => WriteStep::Continue,
            Err(_) => WriteStep::Stop,
        },
        Some(Outgoing::Close(code)) => {
            send_close(sink, code).await;
            WriteStep::Stop
        }
        None => {
            let _ = sink.close().await;
            WriteStep::Stop
        }
    }
}

async fn send_close(sink: &mut Sink, code: CloseCode) {
    let frame = CloseFrame {
        code: code.code(),
        reason: code.reason().into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

/// Pass one socket message to the session. Returns false when reading should stop.
async fn forward(
    relay: &TetherRelay,
    handle: &SessionHandle,
    conn: ConnId,
    message: Result<Message, axum::Error>,
) -> bool {
    match message {
        Ok(Message::Text(text)) => {
            relay.metrics().frames_received.fetch_add(1, Ordering::Relaxed);
            handle.frame(conn, text).await
        }
        Ok(Message::Binary(data)) => {
            // Not JSON text; the relay answers with invalid_message.
            relay.metrics().frames_received.fetch_add(1, Ordering::Relaxed);
            handle
                .frame(conn, String::from_utf8_lossy(&data).into_owned())
                .await
        }
        Ok(Message::Close(frame)) => {
            debug!(?frame, "peer closed");
            false
        }
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => true,
        Err(e) => {
            debug!(error = %e, "socket error");
            false
        }
    }
}
