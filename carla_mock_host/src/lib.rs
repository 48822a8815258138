//! A stand-in audio host that speaks the remote-control protocol over
//! WebSocket. A network thread owns the socket; [`MainLoop`] owns the engine
//! and is ticked by whoever embeds it.

pub mod engine;
mod main_loop;
mod net;
mod protocol;

pub use engine::{Engine, EngineError, CATALOG};
pub use main_loop::MainLoop;
pub use net::{NetError, NetworkThread};
pub use protocol::{InboundMsg, OutboundMsg, INBOUND_CAP, OUTBOUND_CAP};
