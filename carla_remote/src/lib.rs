//! Client-side synchronization layer for a remote audio host.
//!
//! [`RemoteClient`] owns the connection state machine, a normalized
//! [`EntityStore`] built from inbound host messages, and a
//! [`MutationTracker`] that correlates outbound commands with host responses
//! and reverts optimistic writes the host rejects. The socket itself sits
//! behind the [`Transport`] trait; [`WsTransport`] is the WebSocket adapter.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod router;
pub mod store;
pub mod tracker;
pub mod transport;

pub use client::{ClientEvent, RemoteClient};
pub use config::ClientConfig;
pub use controller::ConnectionStatus;
pub use error::{ClientError, ConfigError, TransportError};
pub use store::{EntityStore, EngineValue, Parameter, PatchbayConnection, Plugin, StoreSnapshot};
pub use tracker::{MutationTracker, Resolution};
pub use transport::{Transport, TransportEvent, WsTransport};

pub use carla_protocol as protocol;
