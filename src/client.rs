// Public client handle (spec section 4.G). Thread-safe facade over the
// engine/network-loop split: every operation here allocates a `Token`,
// marshals an `EngineCommand` onto the loop's queue, and (for operations
// that complete asynchronously) registers a completion slot that
// `wait_for_completion` can later block on. Grounded on
// `ruo::async_client::AsyncClient`, generalized from a struct that owned its
// socket and drove its own `tokio::select!` loop into a handle that only
// ever talks to the loop through channels — the split spec section 5
// requires ("the network loop has exclusive write access to client state").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use codec::{Properties, QoS, ReasonCode, SubscribeTopic};

use crate::callbacks::Callbacks;
use crate::connect_options::ConnectOptions;
use crate::engine::{CallbackEvent, Engine, EngineCommand};
use crate::error::{ClientError, Result};
use crate::network_loop;
use crate::persistence::PersistenceStore;
use crate::token::{Token, TokenAllocator};

/// A structured outbound message (spec section 4.G, `sendMessage`), as
/// opposed to `send`'s bare topic/payload pair.
#[derive(Clone, Debug)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub properties: Properties,
}

impl Message {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS) -> Self {
        Self { topic: topic.into(), payload: payload.into(), qos, retain: false, properties: Properties::new() }
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// What a completed token resolved to: `Ok(())` for any acknowledgement
/// (PUBACK/PUBCOMP/SUBACK/UNSUBACK/CONNACK/disconnect), `Err` for a failure
/// surfaced through `CallbackEvent::OperationFailed`/`ConnectFailed`.
#[derive(Clone, Debug)]
pub struct OperationFailure {
    pub message: String,
    pub reason_code: Option<ReasonCode>,
}

impl std::fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type Completion = std::result::Result<(), OperationFailure>;

/// Returned by `wait_for_completion`.
#[derive(Debug)]
pub enum WaitOutcome {
    Done(Completion),
    Timeout,
}

struct PendingTokens {
    /// Senders the event-dispatch task resolves when the matching
    /// `CallbackEvent` arrives. Present for a token iff it hasn't completed
    /// yet (what `pending_tokens()` reports).
    senders: Mutex<HashMap<Token, oneshot::Sender<Completion>>>,
    /// Receivers waiting to be claimed by `wait_for_completion`. Kept
    /// separate from `senders` so a completion that races ahead of the
    /// caller ever calling `wait_for_completion` isn't lost: the oneshot
    /// buffers the one value regardless of which side runs first.
    receivers: Mutex<HashMap<Token, oneshot::Receiver<Completion>>>,
    /// connect()/disconnect() have no packet id for the engine to echo
    /// back, so their completion is driven off `Connected`/`ConnectFailed`/
    /// `Disconnected` directly rather than by token lookup.
    pending_connect: Mutex<Option<Token>>,
    pending_disconnect: Mutex<Option<Token>>,
}

impl PendingTokens {
    fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            receivers: Mutex::new(HashMap::new()),
            pending_connect: Mutex::new(None),
            pending_disconnect: Mutex::new(None),
        }
    }

    fn register(&self, token: Token) {
        let (tx, rx) = oneshot::channel();
        self.senders.lock().unwrap().insert(token, tx);
        self.receivers.lock().unwrap().insert(token, rx);
    }

    fn resolve(&self, token: Token, outcome: Completion) {
        if let Some(tx) = self.senders.lock().unwrap().remove(&token) {
            let _ = tx.send(outcome);
        }
    }

    fn take_receiver(&self, token: Token) -> Option<oneshot::Receiver<Completion>> {
        self.receivers.lock().unwrap().remove(&token)
    }

    fn outstanding(&self) -> Vec<Token> {
        self.senders.lock().unwrap().keys().copied().collect()
    }
}

/// Background task that fans `CallbackEvent`s out to dispatch inline user
/// callbacks (already done by the network loop) into token completions and
/// the `is_connected` flag. One per client, spawned alongside the loop.
async fn run_event_dispatch(
    mut events: mpsc::UnboundedReceiver<CallbackEvent>,
    pending: Arc<PendingTokens>,
    connected: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        match event {
            CallbackEvent::Connected { .. } => {
                connected.store(true, Ordering::SeqCst);
                if let Some(token) = pending.pending_connect.lock().unwrap().take() {
                    pending.resolve(token, Ok(()));
                }
            }
            CallbackEvent::ConnectFailed { error } => {
                if let Some(token) = pending.pending_connect.lock().unwrap().take() {
                    pending.resolve(token, Err(OperationFailure { message: error, reason_code: None }));
                }
            }
            CallbackEvent::ConnectionLost { .. } => {
                connected.store(false, Ordering::SeqCst);
            }
            CallbackEvent::Disconnected => {
                connected.store(false, Ordering::SeqCst);
                if let Some(token) = pending.pending_disconnect.lock().unwrap().take() {
                    pending.resolve(token, Ok(()));
                }
            }
            CallbackEvent::Delivered { token } => pending.resolve(token, Ok(())),
            CallbackEvent::OperationFailed { token, error, reason_code } => {
                pending.resolve(token, Err(OperationFailure { message: error, reason_code }));
            }
            CallbackEvent::MessageArrived { .. } => {
                // Already dispatched to the user callback inline by the
                // network loop (spec section 5's default dispatch mode);
                // nothing left for the token-completion side to do.
            }
            CallbackEvent::AuthReceived { .. } => {
                // Already dispatched to the auth-continuation callback
                // inline by the network loop; not tied to any token.
            }
        }
    }
}

/// Thread-safe facade over one client's engine and network loop (spec
/// section 4.G). Cloning shares the same underlying client; the loop and
/// event-dispatch tasks are torn down once the last handle is dropped or
/// `destroy` is called explicitly.
#[derive(Clone)]
pub struct AsyncClient {
    commands: mpsc::UnboundedSender<EngineCommand>,
    callbacks: Arc<Callbacks>,
    tokens: Arc<TokenAllocator>,
    pending: Arc<PendingTokens>,
    connected: Arc<AtomicBool>,
    tasks: Arc<Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>>,
}

impl AsyncClient {
    /// Spawns the network loop and event-dispatch task for one client and
    /// returns a handle to it. Calls `crate::logging::init_from_env()`
    /// (idempotent) so a caller never has to remember to initialize tracing
    /// themselves (DESIGN NOTES' "global trace/log state").
    #[must_use]
    pub fn create(options: ConnectOptions, store: Arc<dyn PersistenceStore>) -> Self {
        crate::logging::init_from_env();

        let tokens = Arc::new(TokenAllocator::new());
        let engine = Engine::new(options, store, Arc::clone(&tokens));
        let callbacks = Arc::new(Callbacks::new());
        let pending = Arc::new(PendingTokens::new());
        let connected = Arc::new(AtomicBool::new(false));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let loop_handle = tokio::spawn(network_loop::run(engine, cmd_rx, Arc::clone(&callbacks), event_tx));
        let dispatch_handle =
            tokio::spawn(run_event_dispatch(event_rx, Arc::clone(&pending), Arc::clone(&connected)));

        Self {
            commands: cmd_tx,
            callbacks,
            tokens,
            pending,
            connected,
            tasks: Arc::new(Mutex::new(Some((loop_handle, dispatch_handle)))),
        }
    }

    /// Registers every callback at once, matching Paho's `setCallbacks`:
    /// any field left `None` leaves that callback unset (or clears a
    /// previously-registered one, for a handle reused across reconnects).
    pub fn set_callbacks(&self, callbacks: CallbackSet) {
        if let Some(f) = callbacks.message_arrived {
            self.callbacks.set_message_arrived(f);
        }
        if let Some(f) = callbacks.connection_lost {
            self.callbacks.set_connection_lost(f);
        }
        if let Some(f) = callbacks.delivery_complete {
            self.callbacks.set_delivery_complete(f);
        }
        if let Some(f) = callbacks.disconnected {
            self.callbacks.set_disconnected(f);
        }
    }

    /// Registers a callback fired on every successful (re)connect,
    /// distinct from the one-shot completion of a particular `connect()`
    /// call (Paho's `MQTTAsync_setConnected`).
    pub fn set_connected(&self, f: impl Fn(bool, &crate::connect_options::BrokerUrl) + Send + Sync + 'static) {
        self.callbacks.set_connected(f);
    }

    /// Registers the MQTT5 enhanced/re-authentication continuation callback
    /// (spec SPEC_FULL 4.E.2): called with the reason code and properties of
    /// an incoming AUTH packet, returning the reason code and properties to
    /// send back, or `None` to send nothing.
    pub fn set_auth_continuation(
        &self,
        f: impl Fn(ReasonCode, &Properties) -> Option<(ReasonCode, Properties)> + Send + Sync + 'static,
    ) {
        self.callbacks.set_auth_continuation(f);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn next_token(&self) -> Token {
        self.tokens.next()
    }

    fn submit(&self, command: EngineCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| ClientError::Disconnected)
    }

    #[must_use]
    pub fn connect(&self) -> Token {
        let token = self.next_token();
        *self.pending.pending_connect.lock().unwrap() = Some(token);
        self.pending.register(token);
        let _ = self.submit(EngineCommand::Connect);
        token
    }

    #[must_use]
    pub fn disconnect(&self, timeout: Duration) -> Token {
        let token = self.next_token();
        *self.pending.pending_disconnect.lock().unwrap() = Some(token);
        self.pending.register(token);
        let _ = self.submit(EngineCommand::Disconnect { timeout });
        token
    }

    /// Raw-payload publish (spec section 4.G, `send`).
    #[must_use]
    pub fn send(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS, retain: bool) -> Token {
        self.send_message(Message::new(topic, payload, qos).with_retain(retain))
    }

    /// Structured publish (spec section 4.G, `sendMessage`). QoS 0 has no
    /// acknowledgement to wait for, so its token completes the instant the
    /// send is handed to the loop rather than waiting on an event that will
    /// never arrive.
    #[must_use]
    pub fn send_message(&self, message: Message) -> Token {
        let token = self.next_token();
        self.pending.register(token);
        let submitted = self.submit(EngineCommand::Publish {
            token,
            topic: message.topic,
            payload: message.payload,
            qos: message.qos,
            retain: message.retain,
            properties: message.properties,
        });
        match submitted {
            Ok(()) if message.qos == QoS::AtMostOnce => self.pending.resolve(token, Ok(())),
            Ok(()) => {}
            Err(e) => self.pending.resolve(token, Err(OperationFailure { message: e.to_string(), reason_code: None })),
        }
        token
    }

    #[must_use]
    pub fn subscribe(&self, filter: impl Into<String>, qos: QoS) -> Token {
        match SubscribeTopic::new(&filter.into(), qos) {
            Ok(topic) => self.subscribe_many(vec![topic]),
            Err(e) => {
                let token = self.next_token();
                self.pending.register(token);
                self.pending.resolve(token, Err(OperationFailure { message: e.to_string(), reason_code: None }));
                token
            }
        }
    }

    #[must_use]
    pub fn subscribe_many(&self, topics: Vec<SubscribeTopic>) -> Token {
        let token = self.next_token();
        self.pending.register(token);
        if let Err(e) = self.submit(EngineCommand::Subscribe { token, topics }) {
            self.pending.resolve(token, Err(OperationFailure { message: e.to_string(), reason_code: None }));
        }
        token
    }

    #[must_use]
    pub fn unsubscribe(&self, filter: impl Into<String>) -> Token {
        self.unsubscribe_many(vec![filter.into()])
    }

    #[must_use]
    pub fn unsubscribe_many(&self, filters: Vec<String>) -> Token {
        let token = self.next_token();
        self.pending.register(token);
        if let Err(e) = self.submit(EngineCommand::Unsubscribe { token, filters }) {
            self.pending.resolve(token, Err(OperationFailure { message: e.to_string(), reason_code: None }));
        }
        token
    }

    /// Blocks the caller (spec section 4.G) until `token`'s completion
    /// arrives or `timeout` elapses. Each token may only be waited on once;
    /// a second call for the same token returns `InvalidArgument`.
    pub async fn wait_for_completion(&self, token: Token, timeout: Duration) -> Result<WaitOutcome> {
        let rx = self
            .pending
            .take_receiver(token)
            .ok_or_else(|| ClientError::InvalidArgument(format!("token {token} is unknown or already awaited")))?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(completion)) => Ok(WaitOutcome::Done(completion)),
            Ok(Err(_)) => Err(ClientError::OperationCanceled),
            Err(_) => Ok(WaitOutcome::Timeout),
        }
    }

    /// Tokens whose completion hasn't arrived yet.
    #[must_use]
    pub fn pending_tokens(&self) -> Vec<Token> {
        self.pending.outstanding()
    }

    /// Tears the client down: closes the command channel (ending the
    /// network loop, which then drops its transport) and waits for both
    /// background tasks to exit. Spec section 3: "Destroyed only after the
    /// network loop has released the client."
    pub async fn destroy(self) {
        let tasks = self.tasks.lock().unwrap().take();
        drop(self.commands);
        if let Some((loop_handle, dispatch_handle)) = tasks {
            let _ = loop_handle.await;
            let _ = dispatch_handle.await;
        }
    }
}

/// Batch form of the individual `Callbacks` setters, matching Paho's
/// `setCallbacks(MqttCallback)` taking one object instead of N registration
/// calls. `connected`/`connect_failed` are intentionally absent here: they
/// complete a specific `connect()` token instead (see `wait_for_completion`).
#[derive(Default)]
pub struct CallbackSet {
    pub message_arrived: Option<Box<dyn Fn(&str, &[u8], QoS, bool) -> bool + Send + Sync>>,
    pub connection_lost: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub delivery_complete: Option<Box<dyn Fn(Token) + Send + Sync>>,
    pub disconnected: Option<Box<dyn Fn() + Send + Sync>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    fn options(client_id: &str) -> ConnectOptions {
        let mut options = ConnectOptions::new(client_id).unwrap();
        options.set_automatic_reconnect(false);
        options
    }

    #[tokio::test]
    async fn connect_with_no_urls_fails_and_resolves_its_token() {
        let client = AsyncClient::create(options("client-1"), Arc::new(MemoryStore::new()));
        let token = client.connect();
        match client.wait_for_completion(token, Duration::from_secs(1)).await.unwrap() {
            WaitOutcome::Done(Err(_)) => {}
            other => panic!("expected a failed completion, got {other:?}"),
        }
        assert!(!client.is_connected());
        client.destroy().await;
    }

    #[tokio::test]
    async fn qos0_send_completes_without_waiting_on_the_broker() {
        let client = AsyncClient::create(options("client-2"), Arc::new(MemoryStore::new()));
        let token = client.send("t", b"hi".to_vec(), QoS::AtMostOnce, false);
        match client.wait_for_completion(token, Duration::from_millis(200)).await.unwrap() {
            WaitOutcome::Done(Ok(())) => {}
            other => panic!("expected immediate success, got {other:?}"),
        }
        client.destroy().await;
    }

    #[tokio::test]
    async fn waiting_twice_on_the_same_token_is_rejected() {
        let client = AsyncClient::create(options("client-3"), Arc::new(MemoryStore::new()));
        let token = client.send("t", b"hi".to_vec(), QoS::AtMostOnce, false);
        client.wait_for_completion(token, Duration::from_millis(200)).await.unwrap();
        assert!(client.wait_for_completion(token, Duration::from_millis(200)).await.is_err());
        client.destroy().await;
    }

    #[tokio::test]
    async fn pending_tokens_reports_an_unresolved_connect() {
        // Registration happens synchronously inside `connect()`, before the
        // command even reaches the loop task, so the token is observable
        // immediately without needing the loop to make any progress.
        let client = AsyncClient::create(options("client-4"), Arc::new(MemoryStore::new()));
        let token = client.connect();
        assert!(client.pending_tokens().contains(&token));
        client.destroy().await;
    }

    #[tokio::test]
    async fn subscribe_with_invalid_filter_fails_instead_of_panicking() {
        // "#" is only legal alone and as the last level; here it is neither.
        let client = AsyncClient::create(options("client-5"), Arc::new(MemoryStore::new()));
        let token = client.subscribe("a/#/b", QoS::AtLeastOnce);
        match client.wait_for_completion(token, Duration::from_millis(200)).await.unwrap() {
            WaitOutcome::Done(Err(_)) => {}
            other => panic!("expected a failed completion, got {other:?}"),
        }
        client.destroy().await;
    }
}
