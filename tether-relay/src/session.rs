//! Session actors.
//!
//! Every live session is owned by one tokio task that holds its
//! [`tether_core::Relay`] and the outbound channel of each connected socket.
//! Sockets talk to the task through a [`SessionHandle`]; the task runs the
//! heartbeat timer and applies the [`Action`]s the relay returns, so all
//! state for a session changes on a single task and needs no locks.
//!
//! A task stops as soon as it has no sockets and nothing queued. With input
//! still queued it lingers for the queue's maximum age, after which every
//! entry would have expired anyway.
//!
//! Each socket's [`Outbox`] is bounded. The actor never waits on it: a
//! socket whose buffer is full is dropped and cleaned up like any other
//! close, and its writer is told to give up.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tether_core::{Action, Event, Relay, RelayConfig, Tick};
use tether_types::{CloseCode, ConnId, Role, SessionId};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

use crate::error::{RelayError, Result};
use crate::server::RelayMetrics;
use crate::storage::SessionStore;

/// Times `connect` retries after racing a stopping actor.
const CONNECT_ATTEMPTS: usize = 3;

/// What a socket writer should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Send a text frame.
    Text(String),
    /// Send a close frame and stop.
    Close(CloseCode),
}

/// Actor side of one socket's outbound path.
#[derive(Debug, Clone)]
pub struct Outbox {
    frames: mpsc::Sender<Outgoing>,
    overflow: Arc<Notify>,
}

/// Socket side of an [`Outbox`].
#[derive(Debug)]
pub struct OutboxReader {
    /// Frames to write, in order.
    pub frames: mpsc::Receiver<Outgoing>,
    /// Fires once the actor gave up on this socket because `frames` was full.
    pub overflow: Arc<Notify>,
}

/// Create an outbox holding at most `capacity` unsent frames.
pub fn outbox(capacity: usize) -> (Outbox, OutboxReader) {
    let (frames, rx) = mpsc::channel(capacity.max(1));
    let overflow = Arc::new(Notify::new());
    (
        Outbox {
            frames,
            overflow: overflow.clone(),
        },
        OutboxReader {
            frames: rx,
            overflow,
        },
    )
}

enum Delivery {
    Sent,
    Gone,
    Full,
}

impl Outbox {
    fn deliver(&self, item: Outgoing) -> Delivery {
        match self.frames.try_send(item) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                self.overflow.notify_one();
                Delivery::Full
            }
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }
}

/// Message from a socket to its session actor.
#[derive(Debug)]
pub enum Command {
    /// A socket joined.
    Connect {
        /// Relay-local connection id.
        conn: ConnId,
        /// Producer or viewer route.
        role: Role,
        /// Where frames for this socket go.
        outbound: Outbox,
        /// Answered once the actor has registered the socket.
        ready: oneshot::Sender<()>,
    },
    /// A text frame arrived.
    Frame {
        /// Sender.
        conn: ConnId,
        /// Raw JSON.
        text: String,
    },
    /// The socket is gone.
    Closed {
        /// The socket.
        conn: ConnId,
    },
}

/// Sending side of one session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    generation: u64,
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Forward a text frame. Returns false once the actor has stopped.
    pub async fn frame(&self, conn: ConnId, text: String) -> bool {
        self.tx.send(Command::Frame { conn, text }).await.is_ok()
    }

    /// Report that a socket closed.
    pub async fn closed(&self, conn: ConnId) {
        let _ = self.tx.send(Command::Closed { conn }).await;
    }
}

struct HubInner {
    sessions: DashMap<SessionId, SessionHandle>,
    store: Arc<dyn SessionStore>,
    metrics: Arc<RelayMetrics>,
    config: RelayConfig,
    command_buffer: usize,
    generations: AtomicU64,
}

/// Directory of running session actors.
#[derive(Clone)]
pub struct SessionHub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for SessionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHub")
            .field("sessions", &self.inner.sessions.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl SessionHub {
    /// Create an empty hub.
    pub fn new(
        store: Arc<dyn SessionStore>,
        metrics: Arc<RelayMetrics>,
        config: RelayConfig,
        command_buffer: usize,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: DashMap::new(),
                store,
                metrics,
                config,
                command_buffer: command_buffer.max(1),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Number of running session actors.
    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Check if no session actor is running.
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Check if a session currently has an actor.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.inner.sessions.contains_key(session_id)
    }

    /// Register a socket with its session, starting the actor if needed.
    ///
    /// Returns once the actor has processed the connect, so frames sent
    /// through the returned handle are ordered after it.
    pub async fn connect(
        &self,
        session_id: &SessionId,
        conn: ConnId,
        role: Role,
        outbound: Outbox,
    ) -> Result<SessionHandle> {
        for _ in 0..CONNECT_ATTEMPTS {
            let handle = self.handle_for(session_id);
            let (ready, registered) = oneshot::channel();
            let command = Command::Connect {
                conn,
                role,
                outbound: outbound.clone(),
                ready,
            };

            if handle.tx.send(command).await.is_ok() && registered.await.is_ok() {
                return Ok(handle);
            }

            // The actor stopped before it saw us; drop its entry if still there.
            self.inner
                .sessions
                .remove_if(session_id, |_, current| current.generation == handle.generation);
            debug!(session_id = %session_id, %conn, "retrying connect after actor stop");
        }

        Err(RelayError::SessionUnavailable {
            session_id: session_id.to_string(),
        })
    }

    fn handle_for(&self, session_id: &SessionId) -> SessionHandle {
        self.inner
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| self.spawn(session_id.clone()))
            .clone()
    }

    fn spawn(&self, session_id: SessionId) -> SessionHandle {
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.command_buffer);
        let span = tracing::info_span!("session", session_id = %session_id);
        let inner = self.inner.clone();

        tokio::spawn(
            async move {
                let mut actor = SessionActor {
                    relay: Relay::new(session_id, inner.config),
                    peers: HashMap::new(),
                    rx,
                    generation,
                    hub: inner,
                };
                actor.restore().await;
                actor.run().await;
            }
            .instrument(span),
        );

        SessionHandle { generation, tx }
    }
}

struct SessionActor {
    relay: Relay,
    peers: HashMap<ConnId, Outbox>,
    rx: mpsc::Receiver<Command>,
    generation: u64,
    hub: Arc<HubInner>,
}

impl SessionActor {
    /// Load the last persisted description of this session, if any.
    async fn restore(&mut self) {
        let stored = match self.hub.store.load_session(self.relay.session_id()).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "failed to load session record, starting empty");
                None
            }
        };
        if let Some(info) = stored {
            for action in self.relay.restore(info, now_tick()) {
                self.execute(action).await;
            }
        }
    }

    async fn run(mut self) {
        let period = self.relay.heartbeat().interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // An actor nobody reaches within one heartbeat period is abandoned.
        let mut linger_until = Some(Instant::now() + period);
        debug!("session actor started");

        loop {
            let had_peers = self.relay.has_peers();
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                _ = heartbeat.tick(), if had_peers => {
                    self.apply(Event::HeartbeatTick).await;
                }
                _ = linger(linger_until) => {
                    debug!(queued = self.relay.queued(), "idle session expired");
                    break;
                }
            }

            if self.relay.has_peers() {
                if !had_peers {
                    heartbeat.reset();
                }
                linger_until = None;
            } else if self.relay.queued() == 0 {
                break;
            } else if linger_until.is_none() {
                linger_until = Some(Instant::now() + self.relay.queue_max_age());
            }
        }

        self.shutdown();
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                conn,
                role,
                outbound,
                ready,
            } => {
                self.peers.insert(conn, outbound);
                let event = match role {
                    Role::Producer => Event::ProducerConnected(conn),
                    Role::Viewer => Event::ViewerConnected(conn),
                };
                self.apply(event).await;
                info!(%conn, %role, viewers = self.relay.registry().viewer_count(), "connected");
                let _ = ready.send(());
            }
            Command::Frame { conn, text } => {
                self.apply(Event::Frame { conn, text }).await;
            }
            Command::Closed { conn } => {
                if self.peers.remove(&conn).is_some() {
                    info!(%conn, "disconnected");
                }
                self.apply(Event::Closed(conn)).await;
            }
        }
    }

    async fn apply(&mut self, event: Event) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            for action in self.relay.handle(event, now_tick()) {
                if let Some(conn) = self.execute(action).await {
                    pending.push_back(Event::Closed(conn));
                }
            }
        }
    }

    /// Apply one action. Returns a socket that was dropped for overflowing.
    async fn execute(&mut self, action: Action) -> Option<ConnId> {
        let metrics = &self.hub.metrics;
        match action {
            Action::Send { conn, frame } => {
                let outbound = self.peers.get(&conn)?;
                let text = match frame.to_text() {
                    Ok(text) => text,
                    Err(e) => {
                        metrics.errors_total.fetch_add(1, Ordering::Relaxed);
                        error!(%conn, error = %e, "failed to encode frame");
                        return None;
                    }
                };
                match outbound.deliver(Outgoing::Text(text)) {
                    Delivery::Sent => {
                        metrics.frames_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Delivery::Gone => {}
                    Delivery::Full => return self.overflowed(conn),
                }
            }
            Action::Close { conn, code } => {
                match code {
                    CloseCode::Superseded => {
                        metrics.evictions_total.fetch_add(1, Ordering::Relaxed);
                    }
                    CloseCode::HeartbeatTimeout => {
                        metrics.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
                    }
                    CloseCode::Normal | CloseCode::Overloaded => {}
                }
                if let Some(outbound) = self.peers.remove(&conn) {
                    warn!(%conn, code = code.code(), reason = code.reason(), "closing connection");
                    // A full outbox already woke the writer, which closes on its own.
                    let _ = outbound.deliver(Outgoing::Close(code));
                }
            }
            Action::Persist(info) => {
                if let Err(e) = self.hub.store.save_session(&info).await {
                    metrics.errors_total.fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "failed to persist session");
                }
            }
        }
        None
    }

    fn overflowed(&mut self, conn: ConnId) -> Option<ConnId> {
        self.peers.remove(&conn)?;
        self.hub
            .metrics
            .overloaded_closes
            .fetch_add(1, Ordering::Relaxed);
        warn!(%conn, "outbound buffer full, dropping slow socket");
        Some(conn)
    }

    fn shutdown(mut self) {
        let generation = self.generation;
        self.hub
            .sessions
            .remove_if(self.relay.session_id(), |_, handle| {
                handle.generation == generation
            });

        // Connects still buffered see their `ready` dropped and retry on a fresh actor.
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        debug!("session actor stopped");
    }
}

async fn linger(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Read both clocks for one event.
fn now_tick() -> Tick {
    Tick::new(Instant::now().into_std(), unix_ms())
}

/// Wall-clock time in unix milliseconds.
pub(crate) fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
