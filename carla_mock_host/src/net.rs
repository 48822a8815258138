use crate::protocol::{InboundMsg, OutboundMsg};
use carla_protocol::{packet, InboundEvent};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
}

struct ActiveClient {
    ws: tungstenite::WebSocket<TcpStream>,
    socket_addr: SocketAddr,
}

pub struct NetworkThread {
    listen_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkThread {
    /// Binds `addr` (port 0 picks a free port) and starts serving one client at a time.
    pub fn spawn_with_addr(
        addr: &str,
        in_tx: Sender<InboundMsg>,
        out_rx: Receiver<OutboundMsg>,
    ) -> Result<Self, NetError> {
        let bind_err = |source| NetError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        let listen_addr = listener.local_addr().map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join_handle =
            thread::spawn(move || run_server(listener, in_tx, out_rx, shutdown_for_thread));
        info!(%listen_addr, "mock host listening");

        Ok(Self {
            listen_addr,
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server(
    listener: TcpListener,
    in_tx: Sender<InboundMsg>,
    out_rx: Receiver<OutboundMsg>,
    shutdown: Arc<AtomicBool>,
) {
    let mut active: Option<ActiveClient> = None;

    while !shutdown.load(Ordering::Relaxed) {
        // Single-client policy: a new connection replaces the old one.
        loop {
            match listener.accept() {
                Ok((stream, socket_addr)) => {
                    let _ = stream.set_nonblocking(false);
                    let _ = stream.set_nodelay(true);
                    let _ = stream.set_read_timeout(Some(Duration::from_millis(30)));
                    let _ = stream.set_write_timeout(Some(Duration::from_millis(200)));

                    let ws = match tungstenite::accept(stream) {
                        Ok(ws) => ws,
                        Err(e) => {
                            warn!(error = %e, "ws handshake failed");
                            continue;
                        }
                    };

                    if let Some(mut prev) = active.take() {
                        debug!(addr = %prev.socket_addr, "replacing client");
                        let _ = prev.ws.close(None);
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }

                    if in_tx
                        .try_send(InboundMsg::ClientConnected { socket_addr })
                        .is_err()
                    {
                        let mut ws = ws;
                        let _ = send_event(
                            &mut ws,
                            &InboundEvent::HostExitError {
                                reason: "host busy".to_string(),
                            },
                        );
                        let _ = ws.close(None);
                        continue;
                    }

                    info!(addr = %socket_addr, "client connected");
                    active = Some(ActiveClient { ws, socket_addr });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "ws accept failed");
                    break;
                }
            }
        }

        // Outbound: drain queued messages. Without a client they are discarded.
        loop {
            match out_rx.try_recv() {
                Ok(OutboundMsg::Send { event }) => {
                    let Some(client) = active.as_mut() else { continue };
                    if send_event(&mut client.ws, &event).is_err() {
                        let _ = client.ws.close(None);
                        active = None;
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        // Inbound: read at most one frame per loop (timeouts keep the loop moving).
        if let Some(client) = active.as_mut() {
            match client.ws.read() {
                Ok(msg) => {
                    if handle_inbound(&in_tx, client, msg).is_err() {
                        let _ = client.ws.close(None);
                        active = None;
                        let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                    }
                }
                Err(tungstenite::Error::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    debug!(error = %e, "client gone");
                    active = None;
                    let _ = in_tx.try_send(InboundMsg::ClientDisconnected);
                }
            }
        } else {
            thread::sleep(Duration::from_millis(10));
        }
    }

    if let Some(mut client) = active {
        let _ = client.ws.close(None);
        let _ = client.ws.flush();
    }
}

fn handle_inbound(
    in_tx: &Sender<InboundMsg>,
    client: &mut ActiveClient,
    msg: Message,
) -> Result<(), ()> {
    let bytes = match msg {
        Message::Binary(b) => b,
        Message::Ping(payload) => {
            let _ = client.ws.send(Message::Pong(payload));
            return Ok(());
        }
        Message::Close(_) => return Err(()),
        Message::Text(_) | Message::Pong(_) | Message::Frame(_) => return Ok(()),
    };

    let messages = match packet::decode(&bytes) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "dropping undecodable frame");
            return Ok(());
        }
    };

    for msg in messages {
        if in_tx.try_send(InboundMsg::Message { msg }).is_err() {
            warn!("main loop busy, dropping client message");
        }
    }
    Ok(())
}

fn send_event(ws: &mut tungstenite::WebSocket<TcpStream>, event: &InboundEvent) -> Result<(), ()> {
    let bytes = packet::encode(&event.to_message()).map_err(|_| ())?;
    ws.send(Message::Binary(bytes.into())).map_err(|_| ())
}
