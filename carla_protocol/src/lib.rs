//! Wire contract between a remote-control client and the audio host.
//!
//! Messages are OSC: an address string plus an ordered, typed argument list.
//! Inbound (host -> client) messages are decoded through a fixed schema table
//! in [`inbound`]; outbound commands are built in [`outbound`].

pub mod inbound;
pub mod outbound;
pub mod packet;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use inbound::{
    Callback, CallbackAction, CustomData, DecodeError, EngineRuntime, InboundEvent,
    InternalParams, MidiProgram, ParameterMetadata, ParameterRanges, ParameterRuntime, Peaks,
    PluginCounts, PluginDescriptor, PortCounts, ProgramCounts,
};
pub use outbound::Command;
pub use packet::PacketError;
pub use rosc::{OscMessage, OscType};

/// Address prefix shared by every control message.
pub const CTRL_PREFIX: &str = "/ctrl/";

/// Default OSC path of the host instance; per-plugin messages go to `/{target}/{id}/...`.
pub const DEFAULT_TARGET_NAME: &str = "Carla";

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(pub u32);

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u32);

/// Tag carried as the leading argument of tracked commands and echoed in `/ctrl/resp`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(pub i32);

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One side of a patchbay link.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub plugin: PluginId,
    pub port: u32,
}

impl PortRef {
    pub fn new(plugin: u32, port: u32) -> Self {
        Self {
            plugin: PluginId(plugin),
            port,
        }
    }
}

/// Key of a patchbay connection.
///
/// Canonical ids look like `src:srcPort>tgt:tgtPort`, but the host may also
/// refer to a connection by a bare number, so the id is kept as an opaque string.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn between(source: PortRef, target: PortRef) -> Self {
        Self(format!(
            "{}:{}>{}:{}",
            source.plugin.0, source.port, target.plugin.0, target.port
        ))
    }

    pub fn raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn endpoints(&self) -> Result<ConnectionEnds, ConnectionIdError> {
        self.0.parse()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed form of a canonical connection id.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionEnds {
    pub source: PortRef,
    pub target: PortRef,
}

impl ConnectionEnds {
    pub fn id(&self) -> ConnectionId {
        ConnectionId::between(self.source, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed connection id {0:?} (expected src:port>tgt:port)")]
pub struct ConnectionIdError(pub String);

impl FromStr for ConnectionEnds {
    type Err = ConnectionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConnectionIdError(s.to_string());
        let (src, tgt) = s.split_once('>').ok_or_else(bad)?;
        let source = parse_port_ref(src).ok_or_else(bad)?;
        let target = parse_port_ref(tgt).ok_or_else(bad)?;
        Ok(Self { source, target })
    }
}

fn parse_port_ref(s: &str) -> Option<PortRef> {
    let (plugin, port) = s.trim().split_once(':')?;
    Some(PortRef::new(
        plugin.trim().parse().ok()?,
        port.trim().parse().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_parses_canonical_form() {
        let ends: ConnectionEnds = "1:0>2:3".parse().unwrap();
        assert_eq!(ends.source, PortRef::new(1, 0));
        assert_eq!(ends.target, PortRef::new(2, 3));
        assert_eq!(ends.id().as_str(), "1:0>2:3");
    }

    #[test]
    fn connection_id_rejects_garbage() {
        for bad in ["", "1:0", "1>2", "a:0>2:0", "1:0>2:x", "1:0:2>3:4", "-1:0>2:0"] {
            assert!(bad.parse::<ConnectionEnds>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn raw_ids_do_not_need_to_parse() {
        let id = ConnectionId::raw("17");
        assert!(id.endpoints().is_err());
        assert_eq!(id.to_string(), "17");
    }
}
