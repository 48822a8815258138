//! Binary framing: one OSC packet per transport frame.

use rosc::{OscMessage, OscPacket};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("osc encode failed: {0}")]
    Encode(String),
    #[error("osc decode failed: {0}")]
    Decode(String),
}

pub fn encode(msg: &OscMessage) -> Result<Vec<u8>, PacketError> {
    rosc::encoder::encode(&OscPacket::Message(msg.clone()))
        .map_err(|e| PacketError::Encode(format!("{e:?}")))
}

/// Decodes one frame; bundles are flattened depth-first, in order.
pub fn decode(bytes: &[u8]) -> Result<Vec<OscMessage>, PacketError> {
    let (_rest, packet) =
        rosc::decoder::decode_udp(bytes).map_err(|e| PacketError::Decode(format!("{e:?}")))?;
    let mut out = Vec::new();
    flatten(packet, &mut out);
    Ok(out)
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(m) => out.push(m),
        OscPacket::Bundle(b) => {
            for p in b.content {
                flatten(p, out);
            }
        }
    }
}
