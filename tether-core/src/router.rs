//! Session relay state machine.
//!
//! [`Relay`] owns everything one session knows: the bound session id, the
//! last session description, the connection registry and the offline queue.
//! It consumes [`Event`]s and produces [`Action`]s; it never touches a socket.
//!
//! Routing:
//!
//! | from     | frame       | effect                                                  |
//! |----------|-------------|---------------------------------------------------------|
//! | producer | `attach`    | persist attached, broadcast `status` + `snapshot`       |
//! | producer | `output`    | broadcast verbatim to viewers (never queued)            |
//! | producer | `detach`    | persist detached, broadcast `status`                    |
//! | viewer   | `subscribe` | reply `status` + `snapshot` if the bound id is listed    |
//! | viewer   | `prompt`    | forward to producer, or queue while none is bound       |
//! | viewer   | `resize`    | same as `prompt`                                        |
//! | either   | `pong`      | refresh liveness                                        |
//!
//! Frames naming another session get `error(session_mismatch)`; frames that
//! do not parse get `error(invalid_message)`. Neither changes state.

use std::time::Duration;

use tether_types::{
    CloseCode, ConnId, ErrorMessage, Prompt, ProducerMessage, Role, SessionId,
    SessionInfo, SessionStatus, Snapshot, Status, ToProducer, ToViewer, TypesError,
    ViewerMessage, WireFrame,
};

use crate::clock::Tick;
use crate::heartbeat::{HeartbeatPolicy, Liveness};
use crate::queue::{OfflineQueue, DEFAULT_QUEUE_CAPACITY, DEFAULT_QUEUE_MAX_AGE};
use crate::registry::{Connection, ConnectionRegistry};

/// Source tag for prompts typed in a viewer.
const WEB_SOURCE: &str = "web";

/// Tunables for one relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Heartbeat timing.
    pub heartbeat: HeartbeatPolicy,
    /// Offline queue capacity.
    pub queue_capacity: usize,
    /// Offline queue entry lifetime.
    pub queue_max_age: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_max_age: DEFAULT_QUEUE_MAX_AGE,
        }
    }
}

/// Inputs to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A producer socket opened.
    ProducerConnected(ConnId),
    /// A viewer socket opened.
    ViewerConnected(ConnId),
    /// A text frame arrived.
    Frame {
        /// Sender.
        conn: ConnId,
        /// Raw JSON.
        text: String,
    },
    /// A socket closed (for any reason).
    Closed(ConnId),
    /// The heartbeat timer fired.
    HeartbeatTick,
}

/// A frame to write to one socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Frame for the producer.
    Producer(ToProducer),
    /// Frame for a viewer.
    Viewer(ToViewer),
    /// Producer text forwarded to viewers without re-encoding.
    Verbatim(String),
}

impl Outbound {
    /// Encode as a JSON text frame.
    pub fn to_text(&self) -> Result<String, TypesError> {
        match self {
            Outbound::Producer(msg) => msg.to_json(),
            Outbound::Viewer(msg) => msg.to_json(),
            Outbound::Verbatim(text) => Ok(text.clone()),
        }
    }
}

/// Instructions for the I/O layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write a frame to one connection.
    Send {
        /// Target connection.
        conn: ConnId,
        /// The frame.
        frame: Outbound,
    },
    /// Close one connection with a code.
    Close {
        /// Target connection.
        conn: ConnId,
        /// Close code.
        code: CloseCode,
    },
    /// Write the session description to the store.
    Persist(SessionInfo),
}

/// State for one session.
#[derive(Debug)]
pub struct Relay {
    session_id: SessionId,
    info: Option<SessionInfo>,
    registry: ConnectionRegistry,
    queue: OfflineQueue<ToProducer>,
    heartbeat: HeartbeatPolicy,
}

impl Relay {
    /// Create a relay for `session_id` with no known metadata.
    pub fn new(session_id: SessionId, config: RelayConfig) -> Self {
        Self {
            session_id,
            info: None,
            registry: ConnectionRegistry::new(),
            queue: OfflineQueue::new(config.queue_capacity, config.queue_max_age),
            heartbeat: config.heartbeat,
        }
    }

    /// Seed the relay with a previously persisted description.
    ///
    /// No producer is bound yet, so the restored status is `detached`. A
    /// record stored as attached is written back as detached.
    pub fn restore(&mut self, mut info: SessionInfo, tick: Tick) -> Vec<Action> {
        let mut actions = Vec::new();
        if info.status == SessionStatus::Attached {
            info.status = SessionStatus::Detached;
            info.updated_at = tick.unix_ms;
            actions.push(Action::Persist(info.clone()));
        }
        self.info = Some(info);
        actions
    }

    /// The session this relay serves.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Last known session description.
    pub fn info(&self) -> Option<&SessionInfo> {
        self.info.as_ref()
    }

    /// Current attachment status.
    pub fn status(&self) -> SessionStatus {
        self.info
            .as_ref()
            .map(|info| info.status)
            .unwrap_or(SessionStatus::Detached)
    }

    /// Connection registry (read-only).
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Number of messages waiting for a producer.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Heartbeat timing in use.
    pub fn heartbeat(&self) -> HeartbeatPolicy {
        self.heartbeat
    }

    /// Offline queue entry lifetime.
    pub fn queue_max_age(&self) -> Duration {
        self.queue.max_age()
    }

    /// Check if any socket is connected.
    pub fn has_peers(&self) -> bool {
        !self.registry.is_empty()
    }

    /// Process one event.
    pub fn handle(&mut self, event: Event, tick: Tick) -> Vec<Action> {
        let mut actions = Vec::new();
        match event {
            Event::ProducerConnected(conn) => self.on_producer_connected(conn, tick, &mut actions),
            Event::ViewerConnected(conn) => self.on_viewer_connected(conn, tick, &mut actions),
            Event::Frame { conn, text } => match self.registry.role_of(conn) {
                Some(Role::Producer) => self.on_producer_frame(conn, &text, tick, &mut actions),
                Some(Role::Viewer) => self.on_viewer_frame(conn, &text, tick, &mut actions),
                // Frames can race with eviction; the sender is already gone.
                None => {}
            },
            Event::Closed(conn) => self.on_closed(conn, tick, &mut actions),
            Event::HeartbeatTick => self.on_heartbeat(tick, &mut actions),
        }
        actions
    }

    fn on_producer_connected(&mut self, conn: ConnId, tick: Tick, actions: &mut Vec<Action>) {
        let producer = Connection::new(conn, Role::Producer, tick.at);
        if let Some(evicted) = self.registry.bind_producer(producer) {
            actions.push(Action::Close {
                conn: evicted.id,
                code: CloseCode::Superseded,
            });
        }

        for msg in self.queue.drain(tick.at) {
            actions.push(Action::Send {
                conn,
                frame: Outbound::Producer(msg),
            });
        }
    }

    fn on_viewer_connected(&mut self, conn: ConnId, tick: Tick, actions: &mut Vec<Action>) {
        self.registry
            .add_viewer(Connection::new(conn, Role::Viewer, tick.at));
        self.send_state(conn, actions);
    }

    fn on_producer_frame(&mut self, conn: ConnId, text: &str, tick: Tick, actions: &mut Vec<Action>) {
        let msg = match ProducerMessage::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                let error = ErrorMessage::invalid_message(e.to_string());
                actions.push(send_producer(conn, ToProducer::Error(error)));
                return;
            }
        };

        match msg {
            ProducerMessage::Attach(attach) => {
                if !self.check_session(conn, Role::Producer, &attach.session_id, actions) {
                    return;
                }
                let created_at = self
                    .info
                    .as_ref()
                    .map(|info| info.created_at)
                    .unwrap_or(tick.unix_ms);
                let info = SessionInfo {
                    id: self.session_id.clone(),
                    device_id: attach.device_id,
                    device_name: attach.device_name,
                    cwd: attach.cwd,
                    status: SessionStatus::Attached,
                    created_at,
                    updated_at: tick.unix_ms,
                };
                self.info = Some(info.clone());

                actions.push(Action::Persist(info.clone()));
                self.broadcast(ToViewer::Status(self.status_frame()), actions);
                self.broadcast(
                    ToViewer::Snapshot(Snapshot {
                        sessions: vec![info],
                    }),
                    actions,
                );
            }
            ProducerMessage::Output(output) => {
                if !self.check_session(conn, Role::Producer, &output.session_id, actions) {
                    return;
                }
                for viewer in self.registry.viewer_ids() {
                    actions.push(Action::Send {
                        conn: viewer,
                        frame: Outbound::Verbatim(text.to_string()),
                    });
                }
            }
            ProducerMessage::Detach(detach) => {
                if !self.check_session(conn, Role::Producer, &detach.session_id, actions) {
                    return;
                }
                self.mark_detached(tick, actions);
            }
            ProducerMessage::Pong => {
                self.registry.record_pong(conn, tick.at);
            }
        }
    }

    fn on_viewer_frame(&mut self, conn: ConnId, text: &str, tick: Tick, actions: &mut Vec<Action>) {
        let msg = match ViewerMessage::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                let error = ErrorMessage::invalid_message(e.to_string());
                actions.push(send_viewer(conn, ToViewer::Error(error)));
                return;
            }
        };

        match msg {
            ViewerMessage::Subscribe(subscribe) => {
                if subscribe.session_ids.contains(&self.session_id) {
                    self.send_state(conn, actions);
                }
            }
            ViewerMessage::Prompt(prompt) => {
                if !self.check_session(conn, Role::Viewer, &prompt.session_id, actions) {
                    return;
                }
                let msg = ToProducer::Prompt(Prompt {
                    session_id: prompt.session_id,
                    text: prompt.text,
                    source: WEB_SOURCE.to_string(),
                    timestamp: tick.unix_ms,
                });
                self.deliver_to_producer(msg, tick, actions);
            }
            ViewerMessage::Resize(resize) => {
                if !self.check_session(conn, Role::Viewer, &resize.session_id, actions) {
                    return;
                }
                self.deliver_to_producer(ToProducer::Resize(resize), tick, actions);
            }
            ViewerMessage::Pong => {
                self.registry.record_pong(conn, tick.at);
            }
        }
    }

    fn on_closed(&mut self, conn: ConnId, tick: Tick, actions: &mut Vec<Action>) {
        if let Some(closed) = self.registry.remove(conn) {
            if closed.role == Role::Producer {
                self.mark_detached(tick, actions);
            }
        }
    }

    fn on_heartbeat(&mut self, tick: Tick, actions: &mut Vec<Action>) {
        let (dead, alive): (Vec<_>, Vec<_>) = self
            .registry
            .connections()
            .map(|conn| (conn.id, conn.role, self.heartbeat.assess(conn.last_pong_at, tick.at)))
            .partition(|(_, _, liveness)| *liveness == Liveness::TimedOut);

        // Remove every dead peer before anything is broadcast to viewers.
        let mut producer_died = false;
        for (conn, role, _) in dead {
            self.registry.remove(conn);
            actions.push(Action::Close {
                conn,
                code: CloseCode::HeartbeatTimeout,
            });
            producer_died |= role == Role::Producer;
        }
        if producer_died {
            self.mark_detached(tick, actions);
        }

        for (conn, role, _) in alive {
            let frame = match role {
                Role::Producer => Outbound::Producer(ToProducer::Ping),
                Role::Viewer => Outbound::Viewer(ToViewer::Ping),
            };
            actions.push(Action::Send { conn, frame });
        }
    }

    /// Flip to detached, persist and broadcast, if currently attached.
    fn mark_detached(&mut self, tick: Tick, actions: &mut Vec<Action>) {
        let Some(info) = self.info.as_mut() else {
            return;
        };
        if info.status == SessionStatus::Detached {
            return;
        }
        info.status = SessionStatus::Detached;
        info.updated_at = tick.unix_ms;

        actions.push(Action::Persist(info.clone()));
        self.broadcast(ToViewer::Status(self.status_frame()), actions);
    }

    fn deliver_to_producer(&mut self, msg: ToProducer, tick: Tick, actions: &mut Vec<Action>) {
        match self.registry.producer() {
            Some(producer) => actions.push(send_producer(producer.id, msg)),
            None => {
                self.queue.enqueue(msg, tick.at);
            }
        }
    }

    /// Reply with `error(session_mismatch)` unless `claimed` is the bound id.
    fn check_session(
        &self,
        conn: ConnId,
        role: Role,
        claimed: &SessionId,
        actions: &mut Vec<Action>,
    ) -> bool {
        if *claimed == self.session_id {
            return true;
        }
        let error = ErrorMessage::session_mismatch(&self.session_id, claimed);
        actions.push(match role {
            Role::Producer => send_producer(conn, ToProducer::Error(error)),
            Role::Viewer => send_viewer(conn, ToViewer::Error(error)),
        });
        false
    }

    /// `status`, then `snapshot` if metadata is known.
    fn send_state(&self, conn: ConnId, actions: &mut Vec<Action>) {
        actions.push(send_viewer(conn, ToViewer::Status(self.status_frame())));
        if let Some(info) = &self.info {
            actions.push(send_viewer(
                conn,
                ToViewer::Snapshot(Snapshot {
                    sessions: vec![info.clone()],
                }),
            ));
        }
    }

    fn status_frame(&self) -> Status {
        Status {
            session_id: self.session_id.clone(),
            status: self.status(),
        }
    }

    fn broadcast(&self, msg: ToViewer, actions: &mut Vec<Action>) {
        for viewer in self.registry.viewer_ids() {
            actions.push(send_viewer(viewer, msg.clone()));
        }
    }
}

fn send_producer(conn: ConnId, msg: ToProducer) -> Action {
    Action::Send {
        conn,
        frame: Outbound::Producer(msg),
    }
}

fn send_viewer(conn: ConnId, msg: ToViewer) -> Action {
    Action::Send {
        conn,
        frame: Outbound::Viewer(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tether_types::{ErrorCode, Resize};

    const SID: &str = "01HQXK7V8G3N5M2R4P6T1W9Y0Z";

    fn id(n: u64) -> ConnId {
        ConnId::new(n)
    }

    fn relay() -> Relay {
        Relay::new(SessionId::from_raw(SID), RelayConfig::default())
    }

    fn start() -> Tick {
        Tick::new(Instant::now(), 1_700_000_000_000)
    }

    fn frame(conn: u64, text: &str) -> Event {
        Event::Frame {
            conn: id(conn),
            text: text.to_string(),
        }
    }

    fn attach_json(session: &str) -> String {
        format!(
            r#"{{"type":"attach","session_id":"{session}","device_id":"dev-1","device_name":"laptop","cwd":"/home/x"}}"#
        )
    }

    fn prompt_json(session: &str, text: &str) -> String {
        format!(r#"{{"type":"prompt","session_id":"{session}","text":"{text}"}}"#)
    }

    fn sends_to(actions: &[Action], conn: ConnId) -> Vec<&Outbound> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Send { conn: c, frame } if *c == conn => Some(frame),
                _ => None,
            })
            .collect()
    }

    fn persisted(actions: &[Action]) -> Vec<&SessionInfo> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Persist(info) => Some(info),
                _ => None,
            })
            .collect()
    }

    fn error_code(frame: &Outbound) -> Option<ErrorCode> {
        match frame {
            Outbound::Viewer(ToViewer::Error(e)) | Outbound::Producer(ToProducer::Error(e)) => {
                Some(e.code)
            }
            _ => None,
        }
    }

    #[test]
    fn attach_persists_and_both_viewers_get_identical_snapshot() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ViewerConnected(id(1)), t);
        relay.handle(Event::ViewerConnected(id(2)), t);
        relay.handle(Event::ProducerConnected(id(10)), t);

        let actions = relay.handle(frame(10, &attach_json(SID)), t);

        let stored = persisted(&actions);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, SessionStatus::Attached);
        assert_eq!(stored[0].cwd, "/home/x");

        let to_first = sends_to(&actions, id(1));
        let to_second = sends_to(&actions, id(2));
        assert_eq!(to_first, to_second);
        assert!(matches!(
            to_first.as_slice(),
            [
                Outbound::Viewer(ToViewer::Status(Status {
                    status: SessionStatus::Attached,
                    ..
                })),
                Outbound::Viewer(ToViewer::Snapshot(_)),
            ]
        ));
        if let Outbound::Viewer(ToViewer::Snapshot(snapshot)) = to_first[1] {
            assert_eq!(snapshot.sessions[0].id.as_str(), SID);
            assert_eq!(snapshot.sessions[0].cwd, "/home/x");
        }
    }

    #[test]
    fn viewer_prompt_for_other_session_is_rejected() {
        let mut relay = Relay::new(SessionId::from_raw("S2"), RelayConfig::default());
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(Event::ViewerConnected(id(1)), t);

        let actions = relay.handle(frame(1, &prompt_json("S1", "ls")), t);

        let replies = sends_to(&actions, id(1));
        assert_eq!(replies.len(), 1);
        assert_eq!(error_code(replies[0]), Some(ErrorCode::SessionMismatch));
        assert!(sends_to(&actions, id(10)).is_empty());
        assert_eq!(relay.queued(), 0);
    }

    #[test]
    fn second_producer_evicts_first_with_4000() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ViewerConnected(id(1)), t);
        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(frame(10, &attach_json(SID)), t);

        let actions = relay.handle(Event::ProducerConnected(id(11)), t);

        assert_eq!(
            actions,
            vec![Action::Close {
                conn: id(10),
                code: CloseCode::Superseded
            }]
        );
        assert_eq!(relay.registry().producer().unwrap().id, id(11));
        assert_eq!(relay.status(), SessionStatus::Attached);

        // The evicted socket's close is not a detach.
        assert!(relay.handle(Event::Closed(id(10)), t).is_empty());
        assert_eq!(relay.status(), SessionStatus::Attached);
    }

    #[test]
    fn silent_producer_times_out_with_4001_and_detaches() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(frame(10, &attach_json(SID)), t);
        relay.handle(Event::ViewerConnected(id(1)), t);

        // The viewer keeps answering pings.
        let later = t.advance(Duration::from_secs(60));
        relay.handle(frame(1, r#"{"type":"pong"}"#), later);

        let tick = t.advance(Duration::from_secs(91));
        let actions = relay.handle(Event::HeartbeatTick, tick);

        assert!(actions.contains(&Action::Close {
            conn: id(10),
            code: CloseCode::HeartbeatTimeout
        }));
        let stored = persisted(&actions);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, SessionStatus::Detached);
        assert_eq!(relay.status(), SessionStatus::Detached);

        let to_viewer = sends_to(&actions, id(1));
        assert_eq!(
            to_viewer,
            vec![
                &Outbound::Viewer(ToViewer::Status(Status {
                    session_id: SessionId::from_raw(SID),
                    status: SessionStatus::Detached,
                })),
                &Outbound::Viewer(ToViewer::Ping),
            ]
        );

        // Cleanup already ran; the later socket close changes nothing.
        assert!(relay.handle(Event::Closed(id(10)), tick).is_empty());
    }

    #[test]
    fn live_peers_are_pinged() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(Event::ViewerConnected(id(1)), t);

        let actions = relay.handle(Event::HeartbeatTick, t.advance(Duration::from_secs(30)));

        assert_eq!(
            actions,
            vec![
                Action::Send {
                    conn: id(10),
                    frame: Outbound::Producer(ToProducer::Ping)
                },
                Action::Send {
                    conn: id(1),
                    frame: Outbound::Viewer(ToViewer::Ping)
                },
            ]
        );
    }

    #[test]
    fn silent_viewer_is_dropped() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ViewerConnected(id(1)), t);

        let actions = relay.handle(Event::HeartbeatTick, t.advance(Duration::from_secs(120)));

        assert_eq!(
            actions,
            vec![Action::Close {
                conn: id(1),
                code: CloseCode::HeartbeatTimeout
            }]
        );
        assert!(!relay.has_peers());
    }

    #[test]
    fn output_is_broadcast_verbatim() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(Event::ViewerConnected(id(1)), t);
        relay.handle(Event::ViewerConnected(id(2)), t);

        let text = format!(
            r#"{{"type":"output","session_id":"{SID}","data":"aGVsbG8=","timestamp":42}}"#
        );
        let actions = relay.handle(frame(10, &text), t);

        for viewer in [id(1), id(2)] {
            assert_eq!(
                sends_to(&actions, viewer),
                vec![&Outbound::Verbatim(text.clone())]
            );
        }
    }

    #[test]
    fn output_without_viewers_is_dropped() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);

        let text = format!(r#"{{"type":"output","session_id":"{SID}","data":"","timestamp":1}}"#);
        assert!(relay.handle(frame(10, &text), t).is_empty());
        assert_eq!(relay.queued(), 0);
    }

    #[test]
    fn prompts_queue_while_producer_absent() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ViewerConnected(id(1)), t);

        relay.handle(frame(1, &prompt_json(SID, "first")), t);
        relay.handle(
            frame(
                1,
                &format!(r#"{{"type":"resize","session_id":"{SID}","cols":120,"rows":40}}"#),
            ),
            t,
        );
        assert_eq!(relay.queued(), 2);

        let actions = relay.handle(Event::ProducerConnected(id(10)), t.advance(Duration::from_secs(5)));
        let delivered = sends_to(&actions, id(10));

        assert_eq!(delivered.len(), 2);
        match delivered[0] {
            Outbound::Producer(ToProducer::Prompt(prompt)) => {
                assert_eq!(prompt.text, "first");
                assert_eq!(prompt.source, "web");
                assert_eq!(prompt.timestamp, t.unix_ms);
            }
            other => panic!("expected prompt, got {other:?}"),
        }
        assert!(matches!(
            delivered[1],
            Outbound::Producer(ToProducer::Resize(Resize { cols: 120, rows: 40, .. }))
        ));
        assert_eq!(relay.queued(), 0);
    }

    #[test]
    fn stale_queued_prompt_is_not_delivered() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ViewerConnected(id(1)), t);
        relay.handle(frame(1, &prompt_json(SID, "old")), t);

        let actions = relay.handle(Event::ProducerConnected(id(10)), t.advance(Duration::from_secs(6 * 60)));
        assert!(sends_to(&actions, id(10)).is_empty());
    }

    #[test]
    fn prompt_goes_straight_to_bound_producer() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(Event::ViewerConnected(id(1)), t);

        let actions = relay.handle(frame(1, &prompt_json(SID, "pwd")), t);

        assert_eq!(sends_to(&actions, id(10)).len(), 1);
        assert_eq!(relay.queued(), 0);
    }

    #[test]
    fn new_viewer_gets_status_then_snapshot() {
        let mut relay = relay();
        let t = start();

        let actions = relay.handle(Event::ViewerConnected(id(1)), t);
        assert_eq!(
            actions,
            vec![send_viewer(
                id(1),
                ToViewer::Status(Status {
                    session_id: SessionId::from_raw(SID),
                    status: SessionStatus::Detached
                })
            )]
        );

        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(frame(10, &attach_json(SID)), t);

        let actions = relay.handle(Event::ViewerConnected(id(2)), t);
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            sends_to(&actions, id(2))[1],
            Outbound::Viewer(ToViewer::Snapshot(_))
        ));
    }

    #[test]
    fn detach_persists_and_broadcasts() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(frame(10, &attach_json(SID)), t);
        relay.handle(Event::ViewerConnected(id(1)), t);

        let later = t.advance(Duration::from_secs(1));
        let actions = relay.handle(
            frame(10, &format!(r#"{{"type":"detach","session_id":"{SID}"}}"#)),
            later,
        );

        let stored = persisted(&actions);
        assert_eq!(stored[0].status, SessionStatus::Detached);
        assert_eq!(stored[0].updated_at, later.unix_ms);
        assert_eq!(stored[0].created_at, t.unix_ms);
        assert_eq!(sends_to(&actions, id(1)).len(), 1);
    }

    #[test]
    fn producer_close_detaches_once() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(frame(10, &attach_json(SID)), t);

        let actions = relay.handle(Event::Closed(id(10)), t);
        assert_eq!(persisted(&actions).len(), 1);
        assert!(relay.handle(Event::Closed(id(10)), t).is_empty());
    }

    #[test]
    fn malformed_frames_get_invalid_message() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);
        relay.handle(Event::ViewerConnected(id(1)), t);

        for (conn, text) in [
            (1, "{oops"),
            (1, r#"{"type":"attach","session_id":"x"}"#),
            (1, r#"{"type":"output","session_id":"x","data":"","timestamp":0}"#),
            (10, r#"{"type":"subscribe","session_ids":[]}"#),
            (10, "[]"),
        ] {
            let actions = relay.handle(frame(conn, text), t);
            assert_eq!(actions.len(), 1, "frame {text}");
            let replies = sends_to(&actions, id(conn));
            assert_eq!(error_code(replies[0]), Some(ErrorCode::InvalidMessage));
        }
        assert_eq!(relay.status(), SessionStatus::Detached);
    }

    #[test]
    fn producer_frame_for_other_session_is_rejected() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);

        let actions = relay.handle(frame(10, &attach_json("01HQXK7V8G3N5M2R4P6T1W9Y00")), t);

        assert_eq!(actions.len(), 1);
        assert_eq!(
            error_code(sends_to(&actions, id(10))[0]),
            Some(ErrorCode::SessionMismatch)
        );
        assert!(relay.info().is_none());
    }

    #[test]
    fn subscribe_replies_only_for_bound_session() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ViewerConnected(id(1)), t);

        let other = relay.handle(frame(1, r#"{"type":"subscribe","session_ids":["S9"]}"#), t);
        assert!(other.is_empty());

        let mine = relay.handle(
            frame(1, &format!(r#"{{"type":"subscribe","session_ids":["S9","{SID}"]}}"#)),
            t,
        );
        assert_eq!(mine.len(), 1);
    }

    #[test]
    fn pong_refreshes_liveness() {
        let mut relay = relay();
        let t = start();
        relay.handle(Event::ProducerConnected(id(10)), t);

        relay.handle(frame(10, r#"{"type":"pong"}"#), t.advance(Duration::from_secs(80)));
        let actions = relay.handle(Event::HeartbeatTick, t.advance(Duration::from_secs(120)));

        assert_eq!(
            actions,
            vec![send_producer(id(10), ToProducer::Ping)]
        );
    }

    #[test]
    fn restored_info_starts_detached() {
        let info = SessionInfo {
            id: SessionId::from_raw(SID),
            device_id: "dev".into(),
            device_name: "laptop".into(),
            cwd: "/srv".into(),
            status: SessionStatus::Attached,
            created_at: 1,
            updated_at: 2,
        };
        let mut relay = relay();
        let restored = relay.restore(info.clone(), start());
        assert_eq!(relay.status(), SessionStatus::Detached);

        // The stale attached row is corrected in storage.
        let expected = SessionInfo {
            status: SessionStatus::Detached,
            updated_at: start().unix_ms,
            ..info
        };
        assert_eq!(restored, vec![Action::Persist(expected)]);

        let actions = relay.handle(Event::ViewerConnected(id(1)), start());
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn restoring_detached_info_writes_nothing() {
        let info = SessionInfo {
            id: SessionId::from_raw(SID),
            device_id: "dev".into(),
            device_name: "laptop".into(),
            cwd: "/srv".into(),
            status: SessionStatus::Detached,
            created_at: 1,
            updated_at: 2,
        };
        let mut relay = relay();

        assert!(relay.restore(info, start()).is_empty());
        assert_eq!(relay.info().map(|info| info.updated_at), Some(2));
    }

    #[test]
    fn frames_from_unknown_connections_are_ignored() {
        let mut relay = relay();
        assert!(relay.handle(frame(99, "{oops"), start()).is_empty());
    }
}
