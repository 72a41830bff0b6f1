// MQTT client library. The public surface is `AsyncClient` (spec section
// 4.G) plus the configuration, persistence and error types it takes as
// arguments; everything else (`engine`, `network_loop`, `state`, `wire`) is
// internal machinery the network loop drives on the client's behalf.

mod callbacks;
mod client;
mod connect_options;
mod engine;
mod error;
mod logging;
mod network_loop;
mod persistence;
mod state;
mod token;
mod transport;
mod wire;

pub use callbacks::Callbacks;
pub use client::{AsyncClient, CallbackSet, Message, OperationFailure, WaitOutcome};
pub use connect_options::{BrokerUrl, ConnectOptions, WillOptions};
pub use engine::{CallbackEvent, EngineCommand};
pub use error::{ClientError, Result};
pub use persistence::{Direction, FileStore, MemoryStore, PersistenceStore};
pub use token::{Token, TokenAllocator};

pub use codec::{Properties, ProtocolVersion, QoS, ReasonCode, SubscribeTopic};
