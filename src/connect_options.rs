// Connection parameters (SPEC_FULL Component H / "Configuration"), a plain
// builder struct in the shape of `ruo::connect_options::ConnectOptions`,
// extended with the HA URL list, retry bounds and MQTT 5 fields the
// distilled spec's connection lifecycle state machine depends on.

use std::time::Duration;

use codec::{ProtocolVersion, QoS};

use crate::error::{ClientError, Result};

/// One entry of the connect URL list (spec section 6: "A connect operation
/// accepts a list of URLs; the engine tries them in order on each (re)connect
/// attempt").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl Scheme {
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Tcp => 1883,
            Self::Tls => 8883,
            Self::Ws => 80,
            Self::Wss => 443,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Path component, used only by the Ws/Wss schemes.
    pub path: String,
}

impl std::fmt::Display for BrokerUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self.scheme {
            Scheme::Tcp => "tcp",
            Scheme::Tls => "tls",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        };
        write!(f, "{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

impl BrokerUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme_str, rest) = url
            .split_once("://")
            .ok_or_else(|| ClientError::InvalidArgument(format!("missing scheme in {url:?}")))?;
        let scheme = match scheme_str {
            "tcp" | "mqtt" => Scheme::Tcp,
            "tls" | "ssl" | "mqtts" => Scheme::Tls,
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            other => {
                return Err(ClientError::InvalidArgument(format!("unknown scheme {other:?}")))
            }
        };
        let (authority, path) = rest.split_once('/').map_or((rest, ""), |(a, p)| (a, p));
        let (host, port) = match authority.split_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| ClientError::InvalidArgument(format!("bad port in {url:?}")))?;
                (h.to_string(), port)
            }
            None => (authority.to_string(), scheme.default_port()),
        };
        if host.is_empty() {
            return Err(ClientError::InvalidArgument(format!("missing host in {url:?}")));
        }
        Ok(Self { scheme, host, port, path: format!("/{path}") })
    }
}

#[derive(Clone, Debug)]
pub struct WillOptions {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    /// v5 only; ignored on 3.1/3.1.1.
    pub delay_interval: u32,
}

#[derive(Clone, Debug)]
pub struct ConnectOptions {
    urls: Vec<BrokerUrl>,
    client_id: String,
    protocol_version: ProtocolVersion,
    clean_start: bool,
    keep_alive: Duration,
    connect_timeout: Duration,
    disconnect_timeout: Duration,
    min_retry_interval: Duration,
    max_retry_interval: Duration,
    automatic_reconnect: bool,
    receive_maximum: u16,
    username: Option<String>,
    password: Option<Vec<u8>>,
    will: Option<WillOptions>,
    session_expiry_interval: u32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            client_id: String::new(),
            protocol_version: ProtocolVersion::V3_11,
            clean_start: true,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            disconnect_timeout: Duration::from_secs(10),
            min_retry_interval: Duration::from_secs(1),
            max_retry_interval: Duration::from_secs(120),
            automatic_reconnect: true,
            receive_maximum: 65535,
            username: None,
            password: None,
            will: None,
            session_expiry_interval: 0,
        }
    }
}

impl ConnectOptions {
    pub fn new(client_id: &str) -> Result<Self> {
        if client_id.is_empty() || client_id.len() > u16::MAX as usize {
            return Err(ClientError::InvalidArgument("client id length out of range".to_string()));
        }
        Ok(Self { client_id: client_id.to_string(), ..Self::default() })
    }

    pub fn add_url(&mut self, url: &str) -> Result<&mut Self> {
        self.urls.push(BrokerUrl::parse(url)?);
        Ok(self)
    }

    #[must_use]
    pub fn urls(&self) -> &[BrokerUrl] {
        &self.urls
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_protocol_version(&mut self, protocol_version: ProtocolVersion) -> &mut Self {
        self.protocol_version = protocol_version;
        self
    }

    #[must_use]
    pub const fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn set_clean_start(&mut self, clean_start: bool) -> &mut Self {
        self.clean_start = clean_start;
        self
    }

    #[must_use]
    pub const fn clean_start(&self) -> bool {
        self.clean_start
    }

    /// A persistent session is one where the client asks the broker to keep
    /// state across reconnects: `clean_start == false`.
    #[must_use]
    pub const fn is_persistent_session(&self) -> bool {
        !self.clean_start
    }

    pub fn set_keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn set_disconnect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.disconnect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn disconnect_timeout(&self) -> Duration {
        self.disconnect_timeout
    }

    pub fn set_retry_bounds(&mut self, min: Duration, max: Duration) -> &mut Self {
        self.min_retry_interval = min;
        self.max_retry_interval = max;
        self
    }

    #[must_use]
    pub const fn min_retry_interval(&self) -> Duration {
        self.min_retry_interval
    }

    #[must_use]
    pub const fn max_retry_interval(&self) -> Duration {
        self.max_retry_interval
    }

    pub fn set_automatic_reconnect(&mut self, enabled: bool) -> &mut Self {
        self.automatic_reconnect = enabled;
        self
    }

    #[must_use]
    pub const fn automatic_reconnect(&self) -> bool {
        self.automatic_reconnect
    }

    pub fn set_receive_maximum(&mut self, receive_maximum: u16) -> &mut Self {
        self.receive_maximum = receive_maximum.max(1);
        self
    }

    #[must_use]
    pub const fn receive_maximum(&self) -> u16 {
        self.receive_maximum
    }

    pub fn set_credentials(&mut self, username: &str, password: Option<&[u8]>) -> &mut Self {
        self.username = Some(username.to_string());
        self.password = password.map(<[u8]>::to_vec);
        self
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }

    pub fn set_will(&mut self, will: Option<WillOptions>) -> &mut Self {
        self.will = will;
        self
    }

    #[must_use]
    pub const fn will(&self) -> Option<&WillOptions> {
        self.will.as_ref()
    }

    pub fn set_session_expiry_interval(&mut self, seconds: u32) -> &mut Self {
        self.session_expiry_interval = seconds;
        self
    }

    #[must_use]
    pub const fn session_expiry_interval(&self) -> u32 {
        self.session_expiry_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_with_explicit_port() {
        let url = BrokerUrl::parse("tls://broker.example.com:8884/mqtt").unwrap();
        assert_eq!(url.scheme, Scheme::Tls);
        assert_eq!(url.host, "broker.example.com");
        assert_eq!(url.port, 8884);
    }

    #[test]
    fn applies_scheme_default_port() {
        let url = BrokerUrl::parse("tcp://broker.example.com").unwrap();
        assert_eq!(url.port, 1883);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(BrokerUrl::parse("ftp://broker.example.com").is_err());
    }

    #[test]
    fn clean_start_toggles_persistence() {
        let mut opts = ConnectOptions::new("client-1").unwrap();
        assert!(!opts.is_persistent_session());
        opts.set_clean_start(false);
        assert!(opts.is_persistent_session());
    }
}
