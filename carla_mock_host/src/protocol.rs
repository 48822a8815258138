use carla_protocol::{InboundEvent, OscMessage};
use std::net::SocketAddr;

pub const INBOUND_CAP: usize = 256;
pub const OUTBOUND_CAP: usize = 1024;

/// Network thread -> main loop.
pub enum InboundMsg {
    ClientConnected { socket_addr: SocketAddr },
    ClientDisconnected,
    Message { msg: OscMessage },
}

/// Main loop -> network thread. `event` is host-to-client traffic.
pub enum OutboundMsg {
    Send { event: InboundEvent },
}
