use crate::controller::ConnectionStatus;
use carla_protocol::PacketError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("transport closed")]
    Closed,
    #[error(transparent)]
    Encode(#[from] PacketError),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected (status: {0})")]
    NotConnected(ConnectionStatus),
    #[error("correlation ids exhausted; reconnect with a new client")]
    IdsExhausted,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?}")]
    InvalidVar { var: &'static str, value: String },
    #[error("invalid host address: {0}")]
    InvalidAddress(#[from] url::ParseError),
}
