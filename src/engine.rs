// Protocol engine (spec section 4.E): connection lifecycle, outbound and
// inbound QoS state machines, keepalive, subscription tracking, flow
// control, and failure semantics. Grounded on `ruo::async_client::AsyncClient`
// and `ruo::client::Client`'s `recv_router`, generalized from one packet
// dispatch loop serving a single socket into a pure state machine that
// produces `Action`s for the network loop to carry out, so the engine itself
// never touches a transport or a clock directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use codec::{
    AuthPacket, ConnectAckReason, ConnectPacket, DisconnectPacket, PingRequestPacket, Properties,
    Property, PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
    PublishReleasePacket, QoS, ReasonCode, SubscribePacket, SubscribeTopic, UnsubscribePacket, Will,
};

use crate::connect_options::{BrokerUrl, ConnectOptions};
use crate::error::{ClientError, Result};
use crate::persistence::{parse_key, persistence_key, Direction, PersistenceStore};
use crate::state::{
    ClientState, InboundEntry, OutboundEntry, OutboundKind, OutboundPhase, PendingKind, PendingOperation,
};
use crate::token::{Token, TokenAllocator};
use crate::wire::{IncomingPacket, OutboundPacket};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingConnack,
    Connected,
    Disconnecting,
    Reconnecting,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TimerKind {
    ConnectTimeout,
    Keepalive,
    PingResponse,
    DisconnectTimeout,
    RetryBackoff,
}

/// What the engine wants the network loop to do. The engine never performs
/// I/O or reads a clock itself; it only describes intent.
#[derive(Debug)]
pub enum Action {
    OpenTransport(BrokerUrl),
    Send(Vec<u8>),
    StartTimer(TimerKind, Duration),
    CancelTimer(TimerKind),
    Notify(CallbackEvent),
    CloseTransport,
}

#[derive(Clone, Debug)]
pub enum CallbackEvent {
    Connected { session_present: bool, server_url: BrokerUrl },
    ConnectFailed { error: String },
    ConnectionLost { error: String },
    Delivered { token: Token },
    OperationFailed { token: Token, error: String, reason_code: Option<ReasonCode> },
    MessageArrived { packet_id: Option<codec::PacketId>, topic: String, payload: Vec<u8>, qos: QoS, retain: bool },
    Disconnected,
    /// An AUTH packet arrived (SPEC_FULL 4.E.2): the engine can't decide
    /// the continuation itself, so it's surfaced for the network loop to
    /// hand to the user's auth-continuation callback, feeding any response
    /// back through `Engine::send_auth_continuation`.
    AuthReceived { reason_code: ReasonCode, properties: Properties },
}

/// One request from the public client handle. `Token`s are allocated by the
/// handle, not the engine, so completions can be promised before the engine
/// has even seen the operation.
#[derive(Clone, Debug)]
pub enum EngineCommand {
    Connect,
    Disconnect { timeout: Duration },
    Publish { token: Token, topic: String, payload: Vec<u8>, qos: QoS, retain: bool, properties: Properties },
    Subscribe { token: Token, topics: Vec<SubscribeTopic> },
    Unsubscribe { token: Token, filters: Vec<String> },
}

/// Owns every per-connection table and drives the four state machines in
/// spec section 4.E. Mutated only from the network loop thread (spec
/// section 5: "the network loop has exclusive write access to client
/// state").
pub struct Engine {
    options: ConnectOptions,
    store: Arc<dyn PersistenceStore>,
    state: ClientState,
    connection_state: ConnectionState,
    session_present: bool,
    url_index: usize,
    /// URLs tried so far within the current connect cycle (reset at
    /// `start_connect`), used to tell "still failing over through the
    /// configured URL list" apart from "exhausted every URL".
    urls_attempted: usize,
    next_retry_interval: Duration,
    awaiting_pingresp: bool,
    tokens: Arc<TokenAllocator>,
}

impl Engine {
    /// `tokens` is shared with the public client handle so that entries
    /// reloaded from the store at startup (no caller waiting on them, since
    /// the process that submitted them is gone) get tokens out of the same
    /// sequence as everything else, rather than colliding with id 0.
    #[must_use]
    pub fn new(options: ConnectOptions, store: Arc<dyn PersistenceStore>, tokens: Arc<TokenAllocator>) -> Self {
        let receive_maximum = options.receive_maximum();
        let min_retry = options.min_retry_interval();
        let mut engine = Self {
            options,
            store,
            state: ClientState::new(receive_maximum),
            connection_state: ConnectionState::Disconnected,
            session_present: false,
            url_index: 0,
            urls_attempted: 0,
            next_retry_interval: min_retry,
            awaiting_pingresp: false,
            tokens,
        };
        engine.restore_session();
        engine
    }

    /// Reloads persisted outbound entries into `state` so a persistent
    /// session (clean_start=false) survives a process restart, not just a
    /// reconnect within the same process (spec section 3, "persists
    /// in-flight messages so that sessions survive process restarts").
    /// A clean-session client never persisted anything, so this is a no-op
    /// for it even if stale entries happen to remain in the store.
    fn restore_session(&mut self) {
        if !self.options.is_persistent_session() {
            return;
        }
        let Ok(keys) = self.store.keys(self.client_id()) else { return };
        let mut restored: Vec<(u64, OutboundEntry)> = Vec::new();
        for key in keys {
            let Some((Direction::Outbound, id)) = parse_key(&key) else { continue };
            let Ok(Some(bytes)) = self.store.get(&key) else { continue };
            let Some(entry) = decode_outbound_entry(id, &bytes, self.tokens.next()) else { continue };
            restored.push((id.value().into(), entry));
        }
        restored.sort_by_key(|(id, _)| *id);
        for (_, entry) in restored {
            self.state.insert_outbound(entry);
        }
    }

    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.options.client_id()
    }

    #[must_use]
    pub const fn protocol_version(&self) -> codec::ProtocolVersion {
        self.options.protocol_version()
    }

    fn current_url(&self) -> Option<&BrokerUrl> {
        self.options.urls().get(self.url_index)
    }

    fn advance_url(&mut self) {
        self.url_index = (self.url_index + 1) % self.options.urls().len().max(1);
    }

    pub fn dispatch(&mut self, command: EngineCommand) -> Vec<Action> {
        match command {
            EngineCommand::Connect => self.start_connect(),
            EngineCommand::Disconnect { timeout } => self.begin_disconnect(timeout),
            EngineCommand::Publish { token, topic, payload, qos, retain, properties } => {
                self.publish(token, topic, payload, qos, retain, properties)
            }
            EngineCommand::Subscribe { token, topics } => self.subscribe(token, topics),
            EngineCommand::Unsubscribe { token, filters } => self.unsubscribe(token, filters),
        }
    }

    // ---- Connection lifecycle --------------------------------------

    /// Entry point for a fresh connect cycle: a user `connect()` call, or
    /// the first attempt after a backoff following a dropped connection.
    /// Resets the per-cycle URL failover counter; `begin_connect_attempt`
    /// does the actual work so that failing over to the next URL mid-cycle
    /// (`fail_connect_attempt`) doesn't reset it back to zero.
    fn start_connect(&mut self) -> Vec<Action> {
        self.urls_attempted = 0;
        self.begin_connect_attempt()
    }

    fn begin_connect_attempt(&mut self) -> Vec<Action> {
        self.connection_state = ConnectionState::Connecting;
        match self.current_url() {
            Some(url) => vec![Action::OpenTransport(url.clone())],
            None => {
                self.connection_state = ConnectionState::Disconnected;
                vec![Action::Notify(CallbackEvent::ConnectFailed {
                    error: "no broker URLs configured".to_string(),
                })]
            }
        }
    }

    /// Called once the transport reports writable and the caller has
    /// written the CONNECT packet built by `build_connect_packet`.
    pub fn on_transport_connected(&mut self) -> Vec<Action> {
        self.connection_state = ConnectionState::AwaitingConnack;
        vec![Action::StartTimer(TimerKind::ConnectTimeout, self.options.connect_timeout())]
    }

    #[must_use]
    pub fn build_connect_packet(&self) -> Result<OutboundPacket> {
        let mut packet = ConnectPacket::new(self.options.client_id(), self.options.protocol_version())?;
        packet.set_clean_start(self.options.clean_start());
        packet.set_keep_alive(clamp_keep_alive(self.options.keep_alive()));
        if let Some(username) = self.options.username() {
            packet.set_username(Some(username));
        }
        if let Some(password) = self.options.password() {
            packet.set_password(Some(password));
        }
        if let Some(will) = self.options.will() {
            packet.set_will(Some(Will {
                topic: codec::PubTopic::new(&will.topic)?,
                message: will.payload.clone(),
                qos: will.qos,
                retain: will.retain,
                properties: {
                    let mut props = Properties::new();
                    if self.options.protocol_version().is_v5() && will.delay_interval > 0 {
                        props.push(Property::WillDelayInterval(codec::U32Data::new(will.delay_interval)));
                    }
                    props
                },
            }));
        }
        if self.options.protocol_version().is_v5() {
            packet
                .mut_properties()
                .push(Property::SessionExpiryInterval(codec::U32Data::new(self.options.session_expiry_interval())));
            packet
                .mut_properties()
                .push(Property::ReceiveMaximum(codec::U16Data::new(self.options.receive_maximum())));
        }
        Ok(OutboundPacket::Connect(Box::new(packet)))
    }

    pub fn on_connect_timeout(&mut self) -> Vec<Action> {
        if self.connection_state != ConnectionState::AwaitingConnack {
            return Vec::new();
        }
        self.fail_connect_attempt("connect timed out".to_string())
    }

    pub fn on_transport_error(&mut self, error: ClientError) -> Vec<Action> {
        match self.connection_state {
            ConnectionState::Connecting | ConnectionState::AwaitingConnack => {
                self.fail_connect_attempt(error.to_string())
            }
            ConnectionState::Connected => {
                if self.options.automatic_reconnect() {
                    self.connection_state = ConnectionState::Reconnecting;
                    let backoff = self.next_retry_interval;
                    self.next_retry_interval =
                        (self.next_retry_interval * 2).min(self.options.max_retry_interval());
                    vec![
                        Action::CancelTimer(TimerKind::Keepalive),
                        Action::CancelTimer(TimerKind::PingResponse),
                        Action::CloseTransport,
                        Action::Notify(CallbackEvent::ConnectionLost { error: error.to_string() }),
                        Action::StartTimer(TimerKind::RetryBackoff, backoff),
                    ]
                } else {
                    self.connection_state = ConnectionState::Disconnected;
                    vec![
                        Action::CancelTimer(TimerKind::Keepalive),
                        Action::CancelTimer(TimerKind::PingResponse),
                        Action::CloseTransport,
                        Action::Notify(CallbackEvent::ConnectionLost { error: error.to_string() }),
                    ]
                }
            }
            ConnectionState::Disconnecting | ConnectionState::Reconnecting | ConnectionState::Disconnected => {
                Vec::new()
            }
        }
    }

    /// Handles a failed connect attempt (CONNACK failure reason, transport
    /// error, or connect-timeout expiry; spec section 4.E, "AwaitingConnack
    /// → Disconnected on ..."). Failing over to the next configured URL is
    /// unconditional — "the engine tries [URLs] in order on each (re)connect
    /// attempt" (spec section 6) does not mention `automatic_reconnect` at
    /// all; that flag only gates whether an already-`Connected` session
    /// reconnects after later dropping (`on_transport_error`'s `Connected`
    /// arm), not whether the initial URL list is exhausted.
    fn fail_connect_attempt(&mut self, error: String) -> Vec<Action> {
        self.advance_url();
        self.urls_attempted += 1;
        let total_urls = self.options.urls().len();
        if total_urls > 1 && self.urls_attempted < total_urls {
            log::warn!("connect attempt failed ({error}); trying next configured URL");
            let mut actions = vec![Action::CancelTimer(TimerKind::ConnectTimeout), Action::CloseTransport];
            actions.extend(self.begin_connect_attempt());
            return actions;
        }
        self.urls_attempted = 0;
        self.connection_state = ConnectionState::Disconnected;
        vec![
            Action::CancelTimer(TimerKind::ConnectTimeout),
            Action::CloseTransport,
            Action::Notify(CallbackEvent::ConnectFailed { error }),
        ]
    }

    pub fn on_retry_timer(&mut self) -> Vec<Action> {
        if self.connection_state != ConnectionState::Reconnecting {
            return Vec::new();
        }
        self.start_connect()
    }

    fn begin_disconnect(&mut self, timeout: Duration) -> Vec<Action> {
        if self.connection_state != ConnectionState::Connected {
            self.connection_state = ConnectionState::Disconnected;
            return vec![Action::CloseTransport, Action::Notify(CallbackEvent::Disconnected)];
        }
        self.connection_state = ConnectionState::Disconnecting;
        let mut actions = vec![Action::Send(self.encode(OutboundPacket::Disconnect(DisconnectPacket::new())))];
        actions.push(Action::StartTimer(TimerKind::DisconnectTimeout, timeout));
        actions
    }

    /// Called once every in-flight QoS>0 has settled or the disconnect
    /// timeout expired, whichever first.
    pub fn finish_disconnect(&mut self) -> Vec<Action> {
        self.connection_state = ConnectionState::Disconnected;
        vec![
            Action::CancelTimer(TimerKind::DisconnectTimeout),
            Action::CancelTimer(TimerKind::Keepalive),
            Action::CancelTimer(TimerKind::PingResponse),
            Action::CloseTransport,
            Action::Notify(CallbackEvent::Disconnected),
        ]
    }

    #[must_use]
    pub fn has_settled(&self) -> bool {
        self.state.outbound_len() == 0
    }

    // ---- Incoming packets --------------------------------------------

    pub fn handle_incoming(&mut self, packet: IncomingPacket) -> Vec<Action> {
        match packet {
            IncomingPacket::ConnectAck(ack) => self.on_connack(ack),
            IncomingPacket::Publish(publish) => self.on_publish(publish),
            IncomingPacket::PublishAck(ack) => self.on_puback(ack),
            IncomingPacket::PublishReceived(rec) => self.on_pubrec(rec),
            IncomingPacket::PublishRelease(rel) => self.on_pubrel(rel),
            IncomingPacket::PublishComplete(comp) => self.on_pubcomp(comp),
            IncomingPacket::SubscribeAck(ack) => self.on_suback(ack),
            IncomingPacket::UnsubscribeAck(ack) => self.on_unsuback(ack),
            IncomingPacket::PingResponse(_) => {
                self.awaiting_pingresp = false;
                vec![Action::CancelTimer(TimerKind::PingResponse)]
            }
            IncomingPacket::Disconnect(_) => self.on_server_disconnect(),
            IncomingPacket::Auth(auth) => self.on_auth(auth),
        }
    }

    fn on_connack(&mut self, ack: codec::ConnectAckPacket) -> Vec<Action> {
        if self.connection_state != ConnectionState::AwaitingConnack {
            return Vec::new();
        }
        if !ack.reason().is_success() {
            let error = connack_reason_string(ack.reason());
            return self.fail_connect_attempt(error);
        }

        self.connection_state = ConnectionState::Connected;
        self.session_present = ack.session_present();
        self.next_retry_interval = self.options.min_retry_interval();
        for property in ack.properties().as_slice() {
            if let Property::ReceiveMaximum(value) = property {
                self.state.set_receive_maximum(value.value());
            }
        }

        let mut actions = vec![Action::CancelTimer(TimerKind::ConnectTimeout)];
        if !self.session_present {
            self.state.clear();
            for key in self.store.keys(self.client_id()).unwrap_or_default() {
                let _ = self.store.remove(&key);
            }
        } else {
            actions.extend(self.resend_after_reconnect());
        }
        if self.options.keep_alive() > Duration::ZERO {
            actions.push(Action::StartTimer(TimerKind::Keepalive, self.options.keep_alive()));
        }
        actions.push(Action::Notify(CallbackEvent::Connected {
            session_present: self.session_present,
            server_url: self.current_url().cloned().unwrap_or_else(|| BrokerUrl {
                scheme: crate::connect_options::Scheme::Tcp,
                host: String::new(),
                port: 0,
                path: String::new(),
            }),
        }));
        actions.extend(self.drain_pending());
        actions
    }

    /// Resends every in-flight publish after a reconnect with
    /// `sessionPresent=true` (spec section 4.E: "every entry in
    /// AwaitingPuback or AwaitingPubrec is resent with dup=1; every entry in
    /// AwaitingPubcomp is resent as a bare PUBREL"). That resend contract is
    /// publish-only: a SUBSCRIBE/UNSUBSCRIBE still awaiting its ack when the
    /// connection dropped is not part of broker session state (MQTT
    /// 3.1.1/5.0 section 4.4 only describes session state for publishes),
    /// so it fails back to the caller instead of being resent.
    fn resend_after_reconnect(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        let ids: Vec<_> = self.state.outbound_in_allocation_order().into_iter().map(|e| e.packet_id).collect();
        for id in ids {
            let Some(kind) = self.state.outbound(id).map(|e| e.kind) else { continue };
            match kind {
                OutboundKind::Publish => {
                    let entry = self.state.outbound_mut(id).expect("looked up above");
                    match entry.phase {
                        OutboundPhase::AwaitingPuback | OutboundPhase::AwaitingPubrec => {
                            entry.dup = true;
                            let mut publish = PublishPacket::new(&entry.topic, entry.qos, &entry.payload)
                                .expect("previously-validated topic/payload");
                            let _ = publish.set_packet_id(id);
                            let _ = publish.set_dup(true);
                            publish.set_retain(entry.retain);
                            *publish.mut_properties() = entry.properties.clone();
                            actions.push(Action::Send(self.encode(OutboundPacket::Publish(publish))));
                        }
                        OutboundPhase::AwaitingPubcomp => {
                            let rel = PublishReleasePacket::new(id);
                            actions.push(Action::Send(self.encode(OutboundPacket::PublishRelease(rel))));
                        }
                    }
                }
                OutboundKind::Subscribe | OutboundKind::Unsubscribe => {
                    let token = self.state.outbound(id).expect("looked up above").token;
                    self.state.remove_outbound(id);
                    actions.push(Action::Notify(CallbackEvent::OperationFailed {
                        token,
                        error: "connection lost before the broker acknowledged this operation".to_string(),
                        reason_code: None,
                    }));
                }
            }
        }
        actions
    }

    fn drain_pending(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        while self.state.has_capacity() {
            let Some(op) = self.state.pop_pending() else { break };
            actions.extend(self.start_operation(op));
        }
        actions
    }

    fn start_operation(&mut self, op: PendingOperation) -> Vec<Action> {
        match op.kind {
            PendingKind::Publish { qos, retain } => {
                self.send_publish(op.token, op.topic, op.payload, qos, retain, op.properties)
            }
            PendingKind::Subscribe => {
                let topics = decode_subscribe_payload(&op.payload);
                self.send_subscribe(op.token, topics)
            }
            PendingKind::Unsubscribe => {
                let filters = decode_unsubscribe_payload(&op.payload);
                self.send_unsubscribe(op.token, filters)
            }
        }
    }

    fn on_publish(&mut self, publish: PublishPacket) -> Vec<Action> {
        match publish.qos() {
            QoS::AtMostOnce => {
                vec![Action::Notify(CallbackEvent::MessageArrived {
                    packet_id: None,
                    topic: publish.topic().to_string(),
                    payload: publish.payload().to_vec(),
                    qos: QoS::AtMostOnce,
                    retain: publish.retain(),
                })]
            }
            QoS::AtLeastOnce => {
                let Some(id) = publish.packet_id() else {
                    return Vec::new();
                };
                // PUBACK is withheld until the arrival callback accepts the
                // message (spec section 4.E, "Inbound QoS state machines");
                // see `ack_inbound_publish`, called by the network loop.
                vec![Action::Notify(CallbackEvent::MessageArrived {
                    packet_id: Some(id),
                    topic: publish.topic().to_string(),
                    payload: publish.payload().to_vec(),
                    qos: QoS::AtLeastOnce,
                    retain: publish.retain(),
                })]
            }
            QoS::ExactlyOnce => {
                let Some(id) = publish.packet_id() else {
                    return Vec::new();
                };
                if self.state.inbound(id).is_some() {
                    // Duplicate delivery before PUBREL: resend PUBREC, do not
                    // redeliver to the user (spec section 4.E, "QoS 2").
                    let rec = PublishReceivedPacket::new(id);
                    return vec![Action::Send(self.encode(OutboundPacket::PublishReceived(rec)))];
                }
                self.state.insert_inbound(InboundEntry {
                    packet_id: id,
                    topic: publish.topic().to_string(),
                    payload: publish.payload().to_vec(),
                    properties: publish.properties().clone(),
                });
                // PUBREC acknowledges receipt, not delivery: it is sent
                // unconditionally. The user callback gate is at PUBREL.
                let rec = PublishReceivedPacket::new(id);
                vec![Action::Send(self.encode(OutboundPacket::PublishReceived(rec)))]
            }
        }
    }

    fn on_pubrel(&mut self, rel: PublishReleasePacket) -> Vec<Action> {
        let id = rel.packet_id();
        let Some(entry) = self.state.inbound(id) else {
            // Nothing recorded (e.g. already completed and dropped): still
            // ack so the broker's retransmission stops (idempotent).
            let comp = PublishCompletePacket::new(id);
            return vec![Action::Send(self.encode(OutboundPacket::PublishComplete(comp)))];
        };
        // PUBCOMP and dropping the entry both wait for the arrival callback
        // to accept (see `ack_inbound_release`); until then the entry stays
        // `AwaitingPubrel` so a retransmitted PUBREL finds it again.
        vec![Action::Notify(CallbackEvent::MessageArrived {
            packet_id: Some(id),
            topic: entry.topic.clone(),
            payload: entry.payload.clone(),
            qos: QoS::ExactlyOnce,
            retain: false,
        })]
    }

    /// Called by the network loop once the arrival callback has run for a
    /// QoS 1 publish. PUBACK is sent only if the callback accepted;
    /// otherwise nothing is sent and the broker will redeliver with dup=1.
    pub fn ack_inbound_publish(&self, id: codec::PacketId, accepted: bool) -> Vec<Action> {
        if !accepted {
            return Vec::new();
        }
        let ack = PublishAckPacket::new(id);
        vec![Action::Send(self.encode(OutboundPacket::PublishAck(ack)))]
    }

    /// Called by the network loop once the arrival callback has run for a
    /// QoS 2 PUBREL. The entry is dropped and PUBCOMP sent only if the
    /// callback accepted; otherwise the entry is left `AwaitingPubrel`.
    pub fn ack_inbound_release(&mut self, id: codec::PacketId, accepted: bool) -> Vec<Action> {
        if !accepted {
            return Vec::new();
        }
        self.state.remove_inbound(id);
        let comp = PublishCompletePacket::new(id);
        vec![Action::Send(self.encode(OutboundPacket::PublishComplete(comp)))]
    }

    fn on_puback(&mut self, ack: PublishAckPacket) -> Vec<Action> {
        let id = ack.packet_id();
        let Some(entry) = self.state.outbound(id) else {
            log::warn!("unmatched PUBACK for packet id {id}");
            return Vec::new();
        };
        if entry.phase != OutboundPhase::AwaitingPuback {
            log::warn!("unexpected PUBACK for packet id {id} in phase {:?}", entry.phase);
            return Vec::new();
        }
        let token = entry.token;
        self.state.remove_outbound(id);
        self.forget_persisted(Direction::Outbound, id);
        let mut actions = vec![Action::Notify(CallbackEvent::Delivered { token })];
        actions.extend(self.drain_pending());
        actions.extend(self.maybe_finish_disconnect());
        actions
    }

    fn on_pubrec(&mut self, rec: PublishReceivedPacket) -> Vec<Action> {
        let id = rec.packet_id();
        let Some(entry) = self.state.outbound_mut(id) else {
            log::warn!("unmatched PUBREC for packet id {id}");
            return Vec::new();
        };
        if entry.phase != OutboundPhase::AwaitingPubrec {
            log::warn!("unexpected PUBREC for packet id {id} in phase {:?}", entry.phase);
            return Vec::new();
        }
        entry.phase = OutboundPhase::AwaitingPubcomp;
        entry.dup = false;
        self.persist_outbound(id);
        let rel = PublishReleasePacket::new(id);
        vec![Action::Send(self.encode(OutboundPacket::PublishRelease(rel)))]
    }

    fn on_pubcomp(&mut self, comp: PublishCompletePacket) -> Vec<Action> {
        let id = comp.packet_id();
        let Some(entry) = self.state.outbound(id) else {
            log::warn!("unmatched PUBCOMP for packet id {id}");
            return Vec::new();
        };
        if entry.phase != OutboundPhase::AwaitingPubcomp {
            // Out-of-order PUBCOMP before PUBREC: a protocol violation, not
            // an ordinary operation failure (contrast `on_suback`, where a
            // failure reason code is a legitimate outcome that leaves the
            // connection up). Spec section 4.E groups this with the other
            // wire-level protocol errors that close the connection.
            let token = entry.token;
            let message = "PUBCOMP received before PUBREC".to_string();
            let mut actions = vec![Action::Notify(CallbackEvent::OperationFailed {
                token,
                error: message.clone(),
                reason_code: None,
            })];
            actions.extend(self.on_transport_error(ClientError::Protocol(message)));
            return actions;
        }
        let token = entry.token;
        self.state.remove_outbound(id);
        self.forget_persisted(Direction::Outbound, id);
        let mut actions = vec![Action::Notify(CallbackEvent::Delivered { token })];
        actions.extend(self.drain_pending());
        actions.extend(self.maybe_finish_disconnect());
        actions
    }

    fn on_suback(&mut self, ack: codec::SubscribeAckPacket) -> Vec<Action> {
        let id = ack.packet_id();
        let Some(entry) = self.state.outbound(id) else {
            log::warn!("unmatched SUBACK for packet id {id}");
            return Vec::new();
        };
        let token = entry.token;
        self.state.remove_outbound(id);
        self.forget_persisted(Direction::Outbound, id);
        let mut actions = Vec::new();
        if let Some(failure) = ack.reasons().iter().find(|r| !r.is_success()) {
            actions.push(Action::Notify(CallbackEvent::OperationFailed {
                token,
                error: failure.description().to_string(),
                reason_code: Some(*failure),
            }));
        } else {
            actions.push(Action::Notify(CallbackEvent::Delivered { token }));
        }
        actions.extend(self.drain_pending());
        actions.extend(self.maybe_finish_disconnect());
        actions
    }

    fn on_unsuback(&mut self, ack: codec::UnsubscribeAckPacket) -> Vec<Action> {
        let id = ack.packet_id();
        let Some(entry) = self.state.outbound(id) else {
            log::warn!("unmatched UNSUBACK for packet id {id}");
            return Vec::new();
        };
        let token = entry.token;
        self.state.remove_outbound(id);
        self.forget_persisted(Direction::Outbound, id);
        let mut actions = vec![Action::Notify(CallbackEvent::Delivered { token })];
        actions.extend(self.drain_pending());
        actions.extend(self.maybe_finish_disconnect());
        actions
    }

    fn on_server_disconnect(&mut self) -> Vec<Action> {
        self.connection_state = ConnectionState::Disconnected;
        vec![
            Action::CancelTimer(TimerKind::Keepalive),
            Action::CancelTimer(TimerKind::PingResponse),
            Action::CloseTransport,
            Action::Notify(CallbackEvent::Disconnected),
        ]
    }

    fn on_auth(&mut self, auth: AuthPacket) -> Vec<Action> {
        vec![Action::Notify(CallbackEvent::AuthReceived {
            reason_code: auth.reason_code(),
            properties: auth.properties().clone(),
        })]
    }

    /// Builds and sends the AUTH continuation packet the user's
    /// auth-continuation callback supplied in response to an
    /// `AuthReceived` notification (SPEC_FULL 4.E.2). Called by the network
    /// loop, never directly from `on_auth`, since only the loop has access
    /// to the registered callback.
    pub fn send_auth_continuation(&self, reason_code: ReasonCode, properties: Properties) -> Vec<Action> {
        let mut packet = AuthPacket::new();
        packet.set_reason_code(reason_code);
        *packet.mut_properties() = properties;
        vec![Action::Send(self.encode(OutboundPacket::Auth(packet)))]
    }

    // ---- Outbound operations ------------------------------------------

    fn publish(
        &mut self,
        token: Token,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        properties: Properties,
    ) -> Vec<Action> {
        if self.connection_state != ConnectionState::Connected {
            return vec![Action::Notify(CallbackEvent::OperationFailed {
                token,
                error: "not connected".to_string(),
                reason_code: None,
            })];
        }
        if qos == QoS::AtMostOnce {
            return self.send_publish(token, topic, payload, qos, retain, properties);
        }
        if self.state.has_capacity() {
            self.send_publish(token, topic, payload, qos, retain, properties)
        } else {
            self.state.enqueue_pending(PendingOperation {
                kind: PendingKind::Publish { qos, retain },
                token,
                topic,
                payload,
                properties,
            });
            Vec::new()
        }
    }

    fn send_publish(
        &mut self,
        token: Token,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        properties: Properties,
    ) -> Vec<Action> {
        let Ok(mut packet) = PublishPacket::new(&topic, qos, &payload) else {
            return vec![Action::Notify(CallbackEvent::OperationFailed {
                token,
                error: "invalid topic name".to_string(),
                reason_code: None,
            })];
        };
        packet.set_retain(retain);
        *packet.mut_properties() = properties.clone();

        if qos == QoS::AtMostOnce {
            return vec![Action::Send(self.encode(OutboundPacket::Publish(packet)))];
        }

        let id = match self.state.next_packet_id() {
            Ok(id) => id,
            Err(e) => {
                return vec![Action::Notify(CallbackEvent::OperationFailed {
                    token,
                    error: e.to_string(),
                    reason_code: None,
                })]
            }
        };
        let _ = packet.set_packet_id(id);
        let phase = if qos == QoS::AtLeastOnce { OutboundPhase::AwaitingPuback } else { OutboundPhase::AwaitingPubrec };
        self.state.insert_outbound(OutboundEntry {
            packet_id: id,
            kind: OutboundKind::Publish,
            qos,
            topic,
            payload,
            retain,
            properties,
            phase,
            first_send: Instant::now(),
            dup: false,
            token,
            alloc_seq: 0,
        });
        self.persist_outbound(id);
        vec![Action::Send(self.encode(OutboundPacket::Publish(packet)))]
    }

    fn subscribe(&mut self, token: Token, topics: Vec<SubscribeTopic>) -> Vec<Action> {
        if self.connection_state != ConnectionState::Connected {
            return vec![Action::Notify(CallbackEvent::OperationFailed {
                token,
                error: "not connected".to_string(),
                reason_code: None,
            })];
        }
        if self.state.has_capacity() {
            self.send_subscribe(token, topics)
        } else {
            self.state.enqueue_pending(PendingOperation {
                kind: PendingKind::Subscribe,
                token,
                topic: String::new(),
                payload: encode_subscribe_payload(&topics),
                properties: Properties::new(),
            });
            Vec::new()
        }
    }

    fn send_subscribe(&mut self, token: Token, topics: Vec<SubscribeTopic>) -> Vec<Action> {
        let id = match self.state.next_packet_id() {
            Ok(id) => id,
            Err(e) => {
                return vec![Action::Notify(CallbackEvent::OperationFailed {
                    token,
                    error: e.to_string(),
                    reason_code: None,
                })]
            }
        };
        let Some(first) = topics.first() else {
            return vec![Action::Notify(CallbackEvent::OperationFailed {
                token,
                error: "no topic filters given".to_string(),
                reason_code: None,
            })];
        };
        let mut packet = match SubscribePacket::new(first.filter(), first.qos(), id) {
            Ok(p) => p,
            Err(e) => {
                return vec![Action::Notify(CallbackEvent::OperationFailed {
                    token,
                    error: e.to_string(),
                    reason_code: None,
                })]
            }
        };
        *packet.mut_topics() = topics;
        self.state.insert_outbound(OutboundEntry {
            packet_id: id,
            kind: OutboundKind::Subscribe,
            qos: QoS::AtLeastOnce,
            topic: String::new(),
            payload: Vec::new(),
            retain: false,
            properties: Properties::new(),
            phase: OutboundPhase::AwaitingPuback,
            first_send: Instant::now(),
            dup: false,
            token,
            alloc_seq: 0,
        });
        vec![Action::Send(self.encode(OutboundPacket::Subscribe(packet)))]
    }

    fn unsubscribe(&mut self, token: Token, filters: Vec<String>) -> Vec<Action> {
        if self.connection_state != ConnectionState::Connected {
            return vec![Action::Notify(CallbackEvent::OperationFailed {
                token,
                error: "not connected".to_string(),
                reason_code: None,
            })];
        }
        if self.state.has_capacity() {
            self.send_unsubscribe(token, filters)
        } else {
            self.state.enqueue_pending(PendingOperation {
                kind: PendingKind::Unsubscribe,
                token,
                topic: String::new(),
                payload: encode_unsubscribe_payload(&filters),
                properties: Properties::new(),
            });
            Vec::new()
        }
    }

    fn send_unsubscribe(&mut self, token: Token, filters: Vec<String>) -> Vec<Action> {
        let id = match self.state.next_packet_id() {
            Ok(id) => id,
            Err(e) => {
                return vec![Action::Notify(CallbackEvent::OperationFailed {
                    token,
                    error: e.to_string(),
                    reason_code: None,
                })]
            }
        };
        let Some(first) = filters.first() else {
            return vec![Action::Notify(CallbackEvent::OperationFailed {
                token,
                error: "no filters given".to_string(),
                reason_code: None,
            })];
        };
        let mut packet = match UnsubscribePacket::new(first, id) {
            Ok(p) => p,
            Err(e) => {
                return vec![Action::Notify(CallbackEvent::OperationFailed {
                    token,
                    error: e.to_string(),
                    reason_code: None,
                })]
            }
        };
        for extra in &filters[1..] {
            match codec::TopicFilter::new(extra) {
                Ok(filter) => packet.mut_filters().push(filter),
                Err(e) => {
                    return vec![Action::Notify(CallbackEvent::OperationFailed {
                        token,
                        error: e.to_string(),
                        reason_code: None,
                    })]
                }
            }
        }
        self.state.insert_outbound(OutboundEntry {
            packet_id: id,
            kind: OutboundKind::Unsubscribe,
            qos: QoS::AtLeastOnce,
            topic: String::new(),
            payload: Vec::new(),
            retain: false,
            properties: Properties::new(),
            phase: OutboundPhase::AwaitingPuback,
            first_send: Instant::now(),
            dup: false,
            token,
            alloc_seq: 0,
        });
        vec![Action::Send(self.encode(OutboundPacket::Unsubscribe(packet)))]
    }

    // ---- Keepalive ------------------------------------------------------

    pub fn on_keepalive_timer(&mut self) -> Vec<Action> {
        if self.connection_state != ConnectionState::Connected {
            return Vec::new();
        }
        if self.awaiting_pingresp {
            // PINGRESP never arrived within the prior window: connection is
            // lost (spec section 4.E, "Keepalive").
            return self.on_transport_error(ClientError::Timeout);
        }
        self.awaiting_pingresp = true;
        vec![
            Action::Send(self.encode(OutboundPacket::PingRequest(PingRequestPacket::new()))),
            Action::StartTimer(TimerKind::PingResponse, self.options.keep_alive()),
            Action::StartTimer(TimerKind::Keepalive, self.options.keep_alive()),
        ]
    }

    // ---- Persistence ----------------------------------------------------

    /// Invariant (spec section 3): "Every entry in the outbound table has a
    /// corresponding store record iff the session is persistent" — a clean
    /// session never touches the store at all.
    fn persist_outbound(&self, id: codec::PacketId) {
        if !self.options.is_persistent_session() {
            return;
        }
        let Some(entry) = self.state.outbound(id) else { return };
        let key = persistence_key(self.client_id(), Direction::Outbound, id);
        let bytes = encode_outbound_entry(entry);
        if let Err(e) = self.store.put(&key, &bytes) {
            log::warn!("failed to persist outbound entry {id}: {e}");
        }
    }

    fn forget_persisted(&self, direction: Direction, id: codec::PacketId) {
        if !self.options.is_persistent_session() {
            return;
        }
        let key = persistence_key(self.client_id(), direction, id);
        let _ = self.store.remove(&key);
    }

    /// Spec section 4.E, "Any state → Disconnecting on user disconnect;
    /// engine ... waits up to the user-specified timeout for in-flight
    /// QoS>0 to settle, then tears down": tears down immediately once
    /// settled, instead of always waiting out the full timeout.
    fn maybe_finish_disconnect(&mut self) -> Vec<Action> {
        if self.connection_state == ConnectionState::Disconnecting && self.has_settled() {
            self.finish_disconnect()
        } else {
            Vec::new()
        }
    }

    /// Encodes a packet built from already-validated client state. A
    /// failure here (e.g. `PacketTooLarge`) can't be attributed to a
    /// specific token from this call site, so it's logged and the packet
    /// dropped rather than threaded back through every caller's `Vec<Action>`.
    fn encode(&self, packet: OutboundPacket) -> Vec<u8> {
        match packet.encode(self.options.protocol_version()) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("failed to encode outbound packet: {e}");
                Vec::new()
            }
        }
    }
}

fn clamp_keep_alive(keep_alive: Duration) -> u16 {
    u16::try_from(keep_alive.as_secs()).unwrap_or(u16::MAX)
}

fn connack_reason_string(reason: ConnectAckReason) -> String {
    match reason {
        ConnectAckReason::V3(rc) => format!("{rc:?}"),
        ConnectAckReason::V5(rc) => rc.description().to_string(),
    }
}

/// `PendingOperation` only carries `String`/`Vec<u8>`/`Properties` fields
/// (spec section 3), so SUBSCRIBE/UNSUBSCRIBE payloads waiting on flow
/// control are flattened into `payload` with a tiny line-oriented encoding
/// instead of widening the pending-queue entry with a second packet-type
/// branch.
fn encode_subscribe_payload(topics: &[SubscribeTopic]) -> Vec<u8> {
    let mut buf = Vec::new();
    for topic in topics {
        buf.extend_from_slice(topic.filter().as_bytes());
        buf.push(b'\0');
        buf.push(u8::from(topic.qos()));
        buf.push(b'\n');
    }
    buf
}

fn decode_subscribe_payload(bytes: &[u8]) -> Vec<SubscribeTopic> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .filter_map(|line| {
            let (filter, qos_byte) = line.rsplit_once('\0')?;
            let qos = codec::QoS::try_from(*qos_byte.as_bytes().first()?).ok()?;
            SubscribeTopic::new(filter, qos).ok()
        })
        .collect()
}

fn encode_unsubscribe_payload(filters: &[String]) -> Vec<u8> {
    filters.join("\n").into_bytes()
}

fn decode_unsubscribe_payload(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes).lines().map(str::to_string).collect()
}

/// Minimal durable representation of an in-flight outbound entry: enough to
/// restore the phase and resend with dup=1 after a crash (spec section 6,
/// "Persistence layout").
fn encode_outbound_entry(entry: &OutboundEntry) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(match entry.phase {
        OutboundPhase::AwaitingPuback => 0,
        OutboundPhase::AwaitingPubrec => 1,
        OutboundPhase::AwaitingPubcomp => 2,
    });
    buf.push(u8::from(entry.qos));
    buf.push(u8::from(entry.retain));
    buf.extend_from_slice(&(entry.topic.len() as u32).to_be_bytes());
    buf.extend_from_slice(entry.topic.as_bytes());
    buf.extend_from_slice(&(entry.payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&entry.payload);
    buf
}

/// Reverses `encode_outbound_entry` when reloading a persistent session at
/// startup. `token` is freshly allocated: the original caller's completion
/// handle died with the previous process, so there is no token to recover
/// (SPEC_FULL 9, open question resolution).
fn decode_outbound_entry(packet_id: codec::PacketId, bytes: &[u8], token: Token) -> Option<OutboundEntry> {
    let phase = match *bytes.first()? {
        0 => OutboundPhase::AwaitingPuback,
        1 => OutboundPhase::AwaitingPubrec,
        2 => OutboundPhase::AwaitingPubcomp,
        _ => return None,
    };
    let qos = QoS::try_from(*bytes.get(1)?).ok()?;
    let retain = *bytes.get(2)? != 0;
    let mut pos = 3;
    let topic_len = u32::from_be_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?) as usize;
    pos += 4;
    let topic = String::from_utf8(bytes.get(pos..pos + topic_len)?.to_vec()).ok()?;
    pos += topic_len;
    let payload_len = u32::from_be_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?) as usize;
    pos += 4;
    let payload = bytes.get(pos..pos + payload_len)?.to_vec();
    Some(OutboundEntry {
        packet_id,
        kind: OutboundKind::Publish,
        qos,
        topic,
        payload,
        retain,
        properties: Properties::new(),
        phase,
        first_send: Instant::now(),
        dup: true,
        token,
        alloc_seq: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{persistence_key, Direction, MemoryStore, PersistenceStore};
    use codec::{ConnectAckPacket, ConnectAckReason, ConnectReturnCode};

    fn connected_engine(client_id: &str) -> Engine {
        let mut options = ConnectOptions::new(client_id).unwrap();
        options.add_url("tcp://broker.example.com:1883").unwrap();
        let mut engine = Engine::new(options, Arc::new(MemoryStore::new()), Arc::new(TokenAllocator::new()));
        assert!(matches!(engine.start_connect().as_slice(), [Action::OpenTransport(_)]));
        engine.on_transport_connected();
        let ack = ConnectAckPacket::new(false, ConnectAckReason::V3(ConnectReturnCode::Accepted));
        engine.on_connack(ack);
        assert_eq!(engine.connection_state(), ConnectionState::Connected);
        engine
    }

    fn publish_in(topic: &str, qos: QoS, id: u16) -> PublishPacket {
        let mut packet = PublishPacket::new(topic, qos, b"payload").unwrap();
        if qos != QoS::AtMostOnce {
            packet.set_packet_id(codec::PacketId::new(id)).unwrap();
        }
        packet
    }

    #[test]
    fn qos2_duplicate_publish_does_not_redeliver() {
        let mut engine = connected_engine("client-qos2-dup");
        let first = engine.handle_incoming(IncomingPacket::Publish(publish_in("t", QoS::ExactlyOnce, 9)));
        let second = engine.handle_incoming(IncomingPacket::Publish(publish_in("t", QoS::ExactlyOnce, 9)));

        let arrivals = |actions: &[Action]| {
            actions.iter().filter(|a| matches!(a, Action::Notify(CallbackEvent::MessageArrived { .. }))).count()
        };
        assert_eq!(arrivals(&first), 1);
        assert_eq!(arrivals(&second), 0, "duplicate PUBLISH before PUBREL must not redeliver");
        // PUBREC is sent both times regardless (idempotent ack).
        assert!(first.iter().any(|a| matches!(a, Action::Send(_))));
        assert!(second.iter().any(|a| matches!(a, Action::Send(_))));
    }

    #[test]
    fn reconnect_resends_outbound_in_allocation_order_with_dup() {
        let mut engine = connected_engine("client-resend-order");
        let tokens: Vec<Token> = (0..3).map(|_| engine.tokens.next()).collect();
        for (i, token) in tokens.iter().enumerate() {
            let actions = engine.publish(*token, format!("t/{i}"), b"x".to_vec(), QoS::AtLeastOnce, false, Properties::new());
            assert!(actions.iter().any(|a| matches!(a, Action::Send(_))));
        }
        let ids = engine.state.outbound_in_allocation_order().into_iter().map(|e| e.packet_id).collect::<Vec<_>>();

        // Connection drops, broker remembers the session.
        engine.connection_state = ConnectionState::AwaitingConnack;
        let ack = ConnectAckPacket::new(true, ConnectAckReason::V3(ConnectReturnCode::Accepted));
        let actions = engine.on_connack(ack);
        let resend_count = actions.iter().filter(|a| matches!(a, Action::Send(_))).count();
        assert_eq!(resend_count, 3, "all three unacknowledged publishes resend");

        let resent = engine.state.outbound_in_allocation_order();
        assert_eq!(resent.iter().map(|e| e.packet_id).collect::<Vec<_>>(), ids);
        assert!(resent.iter().all(|e| e.dup));
    }

    #[test]
    fn auth_continuation_round_trips_through_the_engine() {
        let mut engine = connected_engine("client-auth");
        let mut incoming = AuthPacket::new();
        incoming.set_reason_code(ReasonCode::ContinueAuthentication);

        let actions = engine.on_auth(incoming);
        assert!(matches!(
            actions.as_slice(),
            [Action::Notify(CallbackEvent::AuthReceived { reason_code: ReasonCode::ContinueAuthentication, .. })]
        ));

        let actions = engine.send_auth_continuation(ReasonCode::ContinueAuthentication, Properties::new());
        assert!(matches!(actions.as_slice(), [Action::Send(bytes)] if !bytes.is_empty()));
    }

    #[test]
    fn flow_control_enqueues_beyond_receive_maximum() {
        let mut engine = connected_engine("client-flow-control");
        engine.state.set_receive_maximum(2);
        for i in 0..2 {
            let token = engine.tokens.next();
            let actions = engine.publish(token, format!("t/{i}"), b"x".to_vec(), QoS::AtLeastOnce, false, Properties::new());
            assert!(actions.iter().any(|a| matches!(a, Action::Send(_))));
        }
        let token = engine.tokens.next();
        let actions = engine.publish(token, "t/overflow".to_string(), b"x".to_vec(), QoS::AtLeastOnce, false, Properties::new());
        assert!(actions.is_empty(), "third send should be enqueued, not written to the wire");
        assert_eq!(engine.state.pending_len(), 1);
    }

    #[test]
    fn out_of_order_pubcomp_before_pubrec_is_protocol_error() {
        let mut engine = connected_engine("client-oop-pubcomp");
        let token = engine.tokens.next();
        engine.publish(token, "t".to_string(), b"x".to_vec(), QoS::ExactlyOnce, false, Properties::new());
        let id = engine.state.outbound_in_allocation_order()[0].packet_id;
        let actions = engine.on_pubcomp(PublishCompletePacket::new(id));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Notify(CallbackEvent::OperationFailed { reason_code: None, .. })
        )));
        assert!(
            actions.iter().any(|a| matches!(a, Action::CloseTransport)),
            "a protocol violation must tear down the connection, unlike an ordinary operation failure"
        );
        assert_ne!(engine.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn reconnect_fails_pending_subscribe_instead_of_resending() {
        let mut engine = connected_engine("client-resend-subscribe");
        let token = engine.tokens.next();
        let topics = vec![SubscribeTopic::new("t/#", QoS::AtLeastOnce).unwrap()];
        engine.subscribe(token, topics);
        assert_eq!(engine.state.outbound_len(), 1);

        // Connection drops mid-subscribe; broker remembers the session.
        engine.connection_state = ConnectionState::AwaitingConnack;
        let ack = ConnectAckPacket::new(true, ConnectAckReason::V3(ConnectReturnCode::Accepted));
        let actions = engine.on_connack(ack);

        assert!(
            actions.iter().any(|a| matches!(
                a,
                Action::Notify(CallbackEvent::OperationFailed { token: t, .. }) if *t == token
            )),
            "a stale subscribe must fail back to the caller, not be silently dropped"
        );
        assert!(!actions.iter().any(|a| matches!(a, Action::Send(_))), "no SUBSCRIBE/PUBLISH resend for it");
        assert_eq!(engine.state.outbound_len(), 0, "the stale entry must not linger in the outbound table");
    }

    #[test]
    fn ha_url_failover_is_unconditional_on_automatic_reconnect() {
        let mut options = ConnectOptions::new("client-ha-failover").unwrap();
        options.add_url("tcp://broker-a.example.com:1883").unwrap();
        options.add_url("tcp://broker-b.example.com:1883").unwrap();
        options.add_url("tcp://broker-c.example.com:1883").unwrap();
        options.set_automatic_reconnect(false);
        let mut engine = Engine::new(options, Arc::new(MemoryStore::new()), Arc::new(TokenAllocator::new()));

        let actions = engine.start_connect();
        assert!(matches!(actions.as_slice(), [Action::OpenTransport(_)]));

        let actions = engine.on_transport_error(ClientError::Timeout);
        assert!(
            actions.iter().any(|a| matches!(a, Action::OpenTransport(_))),
            "must fail over to the next URL even with automatic_reconnect disabled"
        );
        assert_eq!(engine.connection_state(), ConnectionState::Connecting);

        let actions = engine.on_transport_error(ClientError::Timeout);
        assert!(actions.iter().any(|a| matches!(a, Action::OpenTransport(_))));
        assert_eq!(engine.connection_state(), ConnectionState::Connecting);

        // Third and last URL succeeds.
        engine.on_transport_connected();
        let ack = ConnectAckPacket::new(false, ConnectAckReason::V3(ConnectReturnCode::Accepted));
        let actions = engine.on_connack(ack);
        assert!(actions.iter().any(|a| matches!(a, Action::Notify(CallbackEvent::Connected { .. }))));
        assert_eq!(engine.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn exhausting_the_url_list_reports_connect_failed_regardless_of_automatic_reconnect() {
        let mut options = ConnectOptions::new("client-ha-exhausted").unwrap();
        options.add_url("tcp://broker-a.example.com:1883").unwrap();
        options.add_url("tcp://broker-b.example.com:1883").unwrap();
        options.set_automatic_reconnect(true);
        let mut engine = Engine::new(options, Arc::new(MemoryStore::new()), Arc::new(TokenAllocator::new()));

        engine.start_connect();
        let actions = engine.on_transport_error(ClientError::Timeout);
        assert!(actions.iter().any(|a| matches!(a, Action::OpenTransport(_))));

        let actions = engine.on_transport_error(ClientError::Timeout);
        assert!(actions.iter().any(|a| matches!(a, Action::Notify(CallbackEvent::ConnectFailed { .. }))));
        assert!(
            !actions.iter().any(|a| matches!(a, Action::StartTimer(TimerKind::RetryBackoff, _))),
            "an exhausted initial connect attempt does not enter the post-connection reconnect/backoff loop"
        );
        assert_eq!(engine.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_settles_early_once_outbound_drains() {
        let mut engine = connected_engine("client-early-settle");
        let token = engine.tokens.next();
        engine.publish(token, "t".to_string(), b"x".to_vec(), QoS::AtLeastOnce, false, Properties::new());
        let id = engine.state.outbound_in_allocation_order()[0].packet_id;

        engine.begin_disconnect(Duration::from_secs(30));
        assert_eq!(engine.connection_state(), ConnectionState::Disconnecting);

        let actions = engine.on_puback(PublishAckPacket::new(id));
        assert!(actions.iter().any(|a| matches!(a, Action::CloseTransport)));
        assert!(actions.iter().any(|a| matches!(a, Action::Notify(CallbackEvent::Disconnected))));
        assert_eq!(engine.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn persistent_session_reloaded_from_store_at_construction() {
        let store = Arc::new(MemoryStore::new());
        let key = persistence_key("client-restart", Direction::Outbound, codec::PacketId::new(3));
        let entry = OutboundEntry {
            packet_id: codec::PacketId::new(3),
            kind: OutboundKind::Publish,
            qos: QoS::AtLeastOnce,
            topic: "t".to_string(),
            payload: b"payload".to_vec(),
            retain: false,
            properties: Properties::new(),
            phase: OutboundPhase::AwaitingPuback,
            first_send: Instant::now(),
            dup: false,
            token: Token::default(),
            alloc_seq: 0,
        };
        store.put(&key, &encode_outbound_entry(&entry)).unwrap();

        let mut options = ConnectOptions::new("client-restart").unwrap();
        options.add_url("tcp://broker.example.com:1883").unwrap();
        options.set_clean_start(false);
        let mut engine = Engine::new(options, store, Arc::new(TokenAllocator::new()));
        assert!(!engine.has_settled(), "restored entry must be in the outbound table before any connect");

        engine.start_connect();
        engine.on_transport_connected();
        let ack = ConnectAckPacket::new(true, ConnectAckReason::V3(ConnectReturnCode::Accepted));
        let actions = engine.on_connack(ack);
        assert!(actions.iter().any(|a| matches!(a, Action::Send(_))), "restored entry resends on sessionPresent=true");
    }

    #[test]
    fn clean_session_never_writes_to_the_store() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = connected_engine("client-clean-no-persist");
        engine.store = store;
        let token = engine.tokens.next();
        engine.publish(token, "t".to_string(), b"x".to_vec(), QoS::AtLeastOnce, false, Properties::new());
        assert!(engine.store.keys("client-clean-no-persist").unwrap().is_empty());
    }
}
