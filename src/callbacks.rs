// Callback registry (spec section 4.G; DESIGN NOTES "cyclic callback
// references"). Modeled as the client owning this registry rather than each
// callback closure owning the client, so there is no reference cycle to
// break: the network loop and the public handle both hold an `Arc` to the
// same registry and look things up by call, never by a back-pointer into
// `AsyncClient`.
//
// Dispatch is inline on the network loop thread (spec section 5, the
// default mode): `message_arrived` in particular must run there, since its
// return value gates whether PUBACK/PUBCOMP is sent at all.

use std::sync::RwLock;

use codec::{Properties, QoS, ReasonCode};

use crate::connect_options::BrokerUrl;
use crate::token::Token;

type ConnectedFn = Box<dyn Fn(bool, &BrokerUrl) + Send + Sync>;
type ConnectFailedFn = Box<dyn Fn(&str) + Send + Sync>;
type ConnectionLostFn = Box<dyn Fn(&str) + Send + Sync>;
/// Returns `true` to accept the message (ack it) or `false` to hold it
/// unacknowledged, per spec section 4.E: "User callback refusal of QoS>0
/// inbound: do not acknowledge; the broker will redeliver."
type MessageArrivedFn = Box<dyn Fn(&str, &[u8], QoS, bool) -> bool + Send + Sync>;
type DeliveryCompleteFn = Box<dyn Fn(Token) + Send + Sync>;
type OperationFailedFn = Box<dyn Fn(Token, &str) + Send + Sync>;
type DisconnectedFn = Box<dyn Fn() + Send + Sync>;
/// MQTT5 enhanced/re-authentication continuation (SPEC_FULL 4.E.2): given
/// the reason code and properties (authentication method/data) of an
/// incoming AUTH packet, returns the reason code and properties of the AUTH
/// packet to send back, or `None` to send nothing (the engine has no way to
/// decide this itself — it is specific to whatever auth method the caller
/// negotiated in CONNECT).
type AuthContinuationFn = Box<dyn Fn(ReasonCode, &Properties) -> Option<(ReasonCode, Properties)> + Send + Sync>;

#[derive(Default)]
struct Slots {
    connected: Option<ConnectedFn>,
    connect_failed: Option<ConnectFailedFn>,
    connection_lost: Option<ConnectionLostFn>,
    message_arrived: Option<MessageArrivedFn>,
    delivery_complete: Option<DeliveryCompleteFn>,
    operation_failed: Option<OperationFailedFn>,
    disconnected: Option<DisconnectedFn>,
    auth_continuation: Option<AuthContinuationFn>,
}

/// Empty by default: a client with no registered callbacks still runs
/// correctly, it just has no one to tell. `message_arrived` defaults to
/// accepting every message, matching "PUBACK/PUBCOMP unless told otherwise."
#[derive(Default)]
pub struct Callbacks(RwLock<Slots>);

impl Callbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, f: impl Fn(bool, &BrokerUrl) + Send + Sync + 'static) {
        self.0.write().unwrap().connected = Some(Box::new(f));
    }

    pub fn set_connect_failed(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.0.write().unwrap().connect_failed = Some(Box::new(f));
    }

    pub fn set_connection_lost(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.0.write().unwrap().connection_lost = Some(Box::new(f));
    }

    pub fn set_message_arrived(&self, f: impl Fn(&str, &[u8], QoS, bool) -> bool + Send + Sync + 'static) {
        self.0.write().unwrap().message_arrived = Some(Box::new(f));
    }

    pub fn set_delivery_complete(&self, f: impl Fn(Token) + Send + Sync + 'static) {
        self.0.write().unwrap().delivery_complete = Some(Box::new(f));
    }

    pub fn set_operation_failed(&self, f: impl Fn(Token, &str) + Send + Sync + 'static) {
        self.0.write().unwrap().operation_failed = Some(Box::new(f));
    }

    pub fn set_disconnected(&self, f: impl Fn() + Send + Sync + 'static) {
        self.0.write().unwrap().disconnected = Some(Box::new(f));
    }

    pub fn set_auth_continuation(
        &self,
        f: impl Fn(ReasonCode, &Properties) -> Option<(ReasonCode, Properties)> + Send + Sync + 'static,
    ) {
        self.0.write().unwrap().auth_continuation = Some(Box::new(f));
    }

    pub(crate) fn on_connected(&self, session_present: bool, server_url: &BrokerUrl) {
        if let Some(f) = &self.0.read().unwrap().connected {
            f(session_present, server_url);
        }
    }

    pub(crate) fn on_connect_failed(&self, error: &str) {
        if let Some(f) = &self.0.read().unwrap().connect_failed {
            f(error);
        }
    }

    pub(crate) fn on_connection_lost(&self, error: &str) {
        if let Some(f) = &self.0.read().unwrap().connection_lost {
            f(error);
        }
    }

    #[must_use]
    pub(crate) fn on_message_arrived(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> bool {
        match &self.0.read().unwrap().message_arrived {
            Some(f) => f(topic, payload, qos, retain),
            None => true,
        }
    }

    pub(crate) fn on_delivery_complete(&self, token: Token) {
        if let Some(f) = &self.0.read().unwrap().delivery_complete {
            f(token);
        }
    }

    pub(crate) fn on_operation_failed(&self, token: Token, error: &str) {
        if let Some(f) = &self.0.read().unwrap().operation_failed {
            f(token, error);
        }
    }

    pub(crate) fn on_disconnected(&self) {
        if let Some(f) = &self.0.read().unwrap().disconnected {
            f();
        }
    }

    /// Without a registered callback, there is nothing further to send —
    /// matches an auth method that never needs re-authentication.
    #[must_use]
    pub(crate) fn on_auth_continuation(
        &self,
        reason_code: ReasonCode,
        properties: &Properties,
    ) -> Option<(ReasonCode, Properties)> {
        self.0.read().unwrap().auth_continuation.as_ref().and_then(|f| f(reason_code, properties))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn message_arrived_defaults_to_accept() {
        let callbacks = Callbacks::new();
        assert!(callbacks.on_message_arrived("t", b"x", QoS::AtLeastOnce, false));
    }

    #[test]
    fn registered_callback_overrides_default() {
        let callbacks = Callbacks::new();
        let seen = Arc::new(AtomicBool::new(false));
        let seen_clone = Arc::clone(&seen);
        callbacks.set_message_arrived(move |_, _, _, _| {
            seen_clone.store(true, Ordering::SeqCst);
            false
        });
        assert!(!callbacks.on_message_arrived("t", b"x", QoS::AtMostOnce, false));
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn auth_continuation_defaults_to_nothing_to_send() {
        let callbacks = Callbacks::new();
        assert!(callbacks.on_auth_continuation(ReasonCode::ContinueAuthentication, &Properties::new()).is_none());
    }

    #[test]
    fn registered_auth_continuation_supplies_the_response() {
        let callbacks = Callbacks::new();
        callbacks.set_auth_continuation(|_reason_code, _properties| {
            Some((ReasonCode::ContinueAuthentication, Properties::new()))
        });
        let response = callbacks.on_auth_continuation(ReasonCode::ContinueAuthentication, &Properties::new());
        assert!(matches!(response, Some((ReasonCode::ContinueAuthentication, _))));
    }
}
