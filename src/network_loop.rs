// Network loop (spec section 4.F): the task that owns a client's transport
// and clock, and the only code that ever calls into `Engine` for that
// client — which is exactly what makes "the network loop has exclusive
// write access to client state" (spec section 5) true without a lock.
//
// Generalized from `ruo::async_client::AsyncClient::start`'s single
// `tokio::select!` loop (read socket / tick keepalive timer): that loop
// inlined packet parsing and reconnection directly; this one instead asks
// `Engine` what to do and only carries out the returned `Action`s. Tokio's
// own scheduler is what multiplexes many clients' loops onto a shared
// thread pool, so the deadline heap here (SPEC_FULL 4.F.1) is scoped to one
// client's timers rather than the whole process — there's nothing left for
// a process-wide heap to multiplex that the scheduler doesn't already do.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::sleep_until;

use codec::{ProtocolVersion, QoS};

use crate::callbacks::Callbacks;
use crate::engine::{Action, CallbackEvent, Engine, EngineCommand, TimerKind};
use crate::error::{ClientError, Result};
use crate::transport::Transport;
use crate::wire::{self, OutboundPacket};

/// One entry in the per-client deadline heap. `generation` lets a timer
/// restarted under the same `TimerKind` invalidate the stale heap entry
/// left behind by the previous `StartTimer`, without scanning the heap.
#[derive(Clone, Copy, Eq, PartialEq)]
struct TimerEntry {
    deadline: Instant,
    kind: TimerKind,
    generation: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct Timers {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    generations: HashMap<TimerKind, u64>,
    next_generation: u64,
}

impl Timers {
    fn new() -> Self {
        Self { heap: BinaryHeap::new(), generations: HashMap::new(), next_generation: 0 }
    }

    fn start(&mut self, kind: TimerKind, delay: Duration) {
        self.next_generation += 1;
        self.generations.insert(kind, self.next_generation);
        self.heap.push(Reverse(TimerEntry {
            deadline: Instant::now() + delay,
            kind,
            generation: self.next_generation,
        }));
    }

    fn cancel(&mut self, kind: TimerKind) {
        self.generations.remove(&kind);
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Pop every entry whose deadline has passed and is still live (not
    /// superseded by a later `start`/`cancel` of the same kind).
    fn take_expired(&mut self) -> Vec<TimerKind> {
        let now = Instant::now();
        let mut fired = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let top = self.heap.pop().expect("just peeked").0;
            if self.generations.get(&top.kind).copied() == Some(top.generation) {
                fired.push(top.kind);
            }
        }
        fired
    }
}

fn encode_or_log(packet: &OutboundPacket, version: ProtocolVersion) -> Vec<u8> {
    match packet.encode(version) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("failed to encode outbound packet: {e}");
            Vec::new()
        }
    }
}

/// Dispatches one `CallbackEvent`: inline user callback invocation (spec
/// section 5's default dispatch mode) plus, for `MessageArrived`, the
/// accept/reject decision that gates PUBACK/PUBCOMP. Every event (including
/// ones already handled here) is also forwarded on `events` for the public
/// handle's own bookkeeping (pending tokens, `waitForCompletion`).
fn dispatch_event(
    engine: &mut Engine,
    callbacks: &Callbacks,
    events: &mpsc::UnboundedSender<CallbackEvent>,
    event: CallbackEvent,
) -> Vec<Action> {
    let mut more = Vec::new();
    match &event {
        CallbackEvent::Connected { session_present, server_url } => {
            callbacks.on_connected(*session_present, server_url);
        }
        CallbackEvent::ConnectFailed { error } => callbacks.on_connect_failed(error),
        CallbackEvent::ConnectionLost { error } => callbacks.on_connection_lost(error),
        CallbackEvent::Delivered { token } => callbacks.on_delivery_complete(*token),
        CallbackEvent::OperationFailed { token, error, .. } => {
            callbacks.on_operation_failed(*token, error);
        }
        CallbackEvent::Disconnected => callbacks.on_disconnected(),
        CallbackEvent::AuthReceived { reason_code, properties } => {
            if let Some((rc, props)) = callbacks.on_auth_continuation(*reason_code, properties) {
                more.extend(engine.send_auth_continuation(rc, props));
            }
        }
        CallbackEvent::MessageArrived { packet_id, topic, payload, qos, retain } => {
            let accepted = callbacks.on_message_arrived(topic, payload, *qos, *retain);
            match (*qos, *packet_id) {
                (QoS::AtLeastOnce, Some(id)) => more.extend(engine.ack_inbound_publish(id, accepted)),
                (QoS::ExactlyOnce, Some(id)) => more.extend(engine.ack_inbound_release(id, accepted)),
                _ => {}
            }
        }
    }
    let _ = events.send(event);
    more
}

/// Carries out every `Action` the engine returned, feeding back into the
/// engine (and onto the work queue) whenever an action's outcome produces
/// more actions — e.g. a failed write surfaces as `on_transport_error`,
/// whose own actions (close, notify, maybe schedule a retry) join the same
/// queue rather than recursing.
async fn execute_actions(
    engine: &mut Engine,
    transport: &mut Option<Transport>,
    timers: &mut Timers,
    callbacks: &Callbacks,
    events: &mpsc::UnboundedSender<CallbackEvent>,
    actions: Vec<Action>,
) {
    let mut queue: VecDeque<Action> = actions.into();
    while let Some(action) = queue.pop_front() {
        match action {
            Action::OpenTransport(url) => match Transport::connect(&url).await {
                Ok(mut opened) => match engine.build_connect_packet() {
                    Ok(packet) => {
                        let bytes = encode_or_log(&packet, engine.protocol_version());
                        match opened.write_all(&bytes).await {
                            Ok(()) => {
                                *transport = Some(opened);
                                queue.extend(engine.on_transport_connected());
                            }
                            Err(e) => queue.extend(engine.on_transport_error(e)),
                        }
                    }
                    Err(e) => queue.extend(engine.on_transport_error(e)),
                },
                Err(e) => queue.extend(engine.on_transport_error(e)),
            },
            Action::Send(bytes) => {
                if let Some(t) = transport.as_mut() {
                    if let Err(e) = t.write_all(&bytes).await {
                        *transport = None;
                        queue.extend(engine.on_transport_error(e));
                    }
                }
            }
            Action::StartTimer(kind, delay) => timers.start(kind, delay),
            Action::CancelTimer(kind) => timers.cancel(kind),
            Action::Notify(event) => queue.extend(dispatch_event(engine, callbacks, events, event)),
            Action::CloseTransport => {
                if let Some(mut t) = transport.take() {
                    let _ = t.close().await;
                }
            }
        }
    }
}

fn fire_timer(engine: &mut Engine, kind: TimerKind) -> Vec<Action> {
    match kind {
        TimerKind::ConnectTimeout => engine.on_connect_timeout(),
        TimerKind::Keepalive => engine.on_keepalive_timer(),
        // PINGRESP didn't arrive before its own deadline: indistinguishable
        // from any other transport stall (spec section 4.E, "Keepalive").
        TimerKind::PingResponse => engine.on_transport_error(ClientError::Timeout),
        TimerKind::DisconnectTimeout => engine.finish_disconnect(),
        TimerKind::RetryBackoff => engine.on_retry_timer(),
    }
}

async fn read_transport(transport: &mut Option<Transport>, buf: &mut Vec<u8>) -> Result<usize> {
    transport
        .as_mut()
        .expect("only polled while select's `if transport.is_some()` guard holds")
        .read_buf(buf)
        .await
}

/// Drives one client end to end until its command channel closes (the
/// public handle was dropped). Spawn one of these per client; that is this
/// crate's realization of spec section 4.F's "single network loop" —
/// tokio schedules many such tasks concurrently the same way a hand-rolled
/// multiplexer would, without this code needing to know how many siblings
/// it has.
pub async fn run(
    mut engine: Engine,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    callbacks: Arc<Callbacks>,
    events: mpsc::UnboundedSender<CallbackEvent>,
) {
    let mut transport: Option<Transport> = None;
    let mut read_buf: Vec<u8> = Vec::with_capacity(4096);
    let mut timers = Timers::new();
    let far_future = Instant::now() + Duration::from_secs(60 * 60 * 24 * 365);

    loop {
        let deadline = timers.next_deadline().unwrap_or(far_future);
        let sleep = sleep_until(deadline.into());
        tokio::pin!(sleep);

        tokio::select! {
            maybe_cmd = commands.recv() => {
                let Some(cmd) = maybe_cmd else { break };
                let actions = engine.dispatch(cmd);
                execute_actions(&mut engine, &mut transport, &mut timers, &callbacks, &events, actions).await;
            }

            result = read_transport(&mut transport, &mut read_buf), if transport.is_some() => {
                match result {
                    Ok(0) => {
                        let closed = ClientError::Transport(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "connection closed by peer",
                        ));
                        let actions = engine.on_transport_error(closed);
                        execute_actions(&mut engine, &mut transport, &mut timers, &callbacks, &events, actions).await;
                    }
                    Ok(_) => {
                        let version = engine.protocol_version();
                        while let Some(len) = wire::frame_length(&read_buf) {
                            let frame: Vec<u8> = read_buf.drain(..len).collect();
                            match wire::decode_incoming(&frame, version) {
                                Ok(packet) => {
                                    let actions = engine.handle_incoming(packet);
                                    execute_actions(&mut engine, &mut transport, &mut timers, &callbacks, &events, actions).await;
                                }
                                Err(e) => {
                                    // A malformed frame is a protocol error, not a
                                    // transient read hiccup (spec section 4.E: "Wire
                                    // decode errors ... close the connection; move
                                    // to Reconnecting/Disconnected per config").
                                    // `read_buf` may still hold further bytes from
                                    // the same read, but once the transport is
                                    // closed there's nothing left to decode them
                                    // into, so stop draining it.
                                    log::warn!("discarding unparsable frame: {e}");
                                    let actions = engine.on_transport_error(ClientError::from(e));
                                    execute_actions(&mut engine, &mut transport, &mut timers, &callbacks, &events, actions).await;
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let actions = engine.on_transport_error(e);
                        execute_actions(&mut engine, &mut transport, &mut timers, &callbacks, &events, actions).await;
                    }
                }
            }

            () = &mut sleep, if timers.next_deadline().is_some() => {
                for kind in timers.take_expired() {
                    let actions = fire_timer(&mut engine, kind);
                    execute_actions(&mut engine, &mut transport, &mut timers, &callbacks, &events, actions).await;
                }
            }
        }
    }

    if let Some(mut t) = transport.take() {
        let _ = t.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::connect_options::ConnectOptions;
    use crate::engine::EngineCommand;
    use crate::persistence::MemoryStore;

    /// With no broker URL configured, `Connect` fails synchronously and the
    /// loop notifies without ever touching a transport.
    #[tokio::test]
    async fn reports_connect_failure_with_no_urls() {
        let options = ConnectOptions::new("client-1").unwrap();
        let engine = Engine::new(options, Arc::new(MemoryStore::new()), Arc::new(crate::token::TokenAllocator::new()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run(engine, cmd_rx, Arc::new(Callbacks::new()), event_tx));
        cmd_tx.send(EngineCommand::Connect).unwrap();
        let event = event_rx.recv().await.unwrap();
        assert!(matches!(event, CallbackEvent::ConnectFailed { .. }));

        drop(cmd_tx);
        handle.await.unwrap();
    }

    /// Dropping the command sender ends the loop even if nothing else ever
    /// happened to the client.
    #[tokio::test]
    async fn exits_when_commands_channel_closes() {
        let options = ConnectOptions::new("client-2").unwrap();
        let engine = Engine::new(options, Arc::new(MemoryStore::new()), Arc::new(crate::token::TokenAllocator::new()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, _event_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run(engine, cmd_rx, Arc::new(Callbacks::new()), event_tx));
        drop(cmd_tx);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
