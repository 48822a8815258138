//! Transport seam and the WebSocket adapter.
//!
//! Each `open` starts a new session with its own event receiver, so events
//! from a previous session can never reach the client once it has moved on.

use crate::error::TransportError;
use carla_protocol::{packet, OscMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Closed,
    Error(String),
    Message(OscMessage),
}

pub trait Transport {
    /// Starts connecting. Progress and inbound messages arrive on the returned receiver.
    fn open(&mut self, url: &Url) -> mpsc::UnboundedReceiver<TransportEvent>;

    /// Queues one message. Never waits for the peer.
    fn send(&mut self, msg: OscMessage) -> Result<(), TransportError>;

    /// Safe to call repeatedly and when nothing is open.
    fn close(&mut self);
}

enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

struct Session {
    out_tx: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

/// WebSocket client; one binary frame per OSC packet.
///
/// `open` spawns a task on the current tokio runtime.
#[derive(Default)]
pub struct WsTransport {
    session: Option<Session>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &Url) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.close();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(url.clone(), out_rx, event_tx));

        self.session = Some(Session { out_tx, task });
        event_rx
    }

    fn send(&mut self, msg: OscMessage) -> Result<(), TransportError> {
        let session = self.session.as_ref().ok_or(TransportError::NotOpen)?;
        if session.task.is_finished() {
            return Err(TransportError::Closed);
        }
        let bytes = packet::encode(&msg)?;
        session
            .out_tx
            .send(Outgoing::Frame(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if session.out_tx.send(Outgoing::Close).is_err() {
                session.task.abort();
            }
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run(
    url: Url,
    mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let socket = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            let _ = events.send(TransportEvent::Error(format!("connect {url}: {e}")));
            return;
        }
    };
    debug!(%url, "websocket open");
    let _ = events.send(TransportEvent::Opened);

    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            out = out_rx.recv() => {
                match out {
                    Some(Outgoing::Frame(bytes)) => {
                        if let Err(e) = write.send(Message::Binary(bytes.into())).await {
                            let _ = events.send(TransportEvent::Error(format!("send: {e}")));
                            return;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = write.close().await;
                        let _ = events.send(TransportEvent::Closed);
                        return;
                    }
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => match packet::decode(&data) {
                        Ok(messages) => {
                            for msg in messages {
                                if events.send(TransportEvent::Message(msg)).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping undecodable frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events.send(TransportEvent::Closed);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = events.send(TransportEvent::Error(format!("receive: {e}")));
                        return;
                    }
                }
            }
        }
    }
}
