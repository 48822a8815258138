use crate::engine::{self, Engine, EngineError};
use crate::protocol::{InboundMsg, OutboundMsg};
use carla_protocol::{Command, CorrelationId, InboundEvent, DEFAULT_TARGET_NAME};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const RUNTIME_INTERVAL: Duration = Duration::from_millis(1000);

/// Host side of the protocol. Owns the engine; driven by [`MainLoop::tick`].
pub struct MainLoop {
    inbound_rx: Receiver<InboundMsg>,
    outbound_tx: Sender<OutboundMsg>,
    engine: Engine,
    target_name: String,
    client_connected: bool,
    started: Instant,
    last_runtime: Option<Instant>,
}

impl MainLoop {
    pub fn new(inbound_rx: Receiver<InboundMsg>, outbound_tx: Sender<OutboundMsg>) -> Self {
        Self {
            inbound_rx,
            outbound_tx,
            engine: Engine::new(),
            target_name: DEFAULT_TARGET_NAME.to_string(),
            client_connected: false,
            started: Instant::now(),
            last_runtime: None,
        }
    }

    pub fn with_target_name(mut self, name: &str) -> Self {
        self.target_name = name.trim_matches('/').to_string();
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn tick(&mut self) {
        loop {
            match self.inbound_rx.try_recv() {
                Ok(InboundMsg::ClientConnected { socket_addr }) => {
                    info!(%socket_addr, plugins = self.engine.plugin_count(), "client registered");
                    self.client_connected = true;
                    self.last_runtime = None;
                    for event in self.engine.full_dump() {
                        self.send(event);
                    }
                }
                Ok(InboundMsg::ClientDisconnected) => {
                    self.client_connected = false;
                }
                Ok(InboundMsg::Message { msg }) => match Command::from_message(&msg, &self.target_name) {
                    Some((cid, command)) => self.apply(cid, command),
                    None => debug!(addr = %msg.addr, "ignoring message"),
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        self.publish_runtime();
    }

    /// Tells the client the host is going away.
    pub fn announce_exit(&mut self, error: Option<String>) {
        let event = match error {
            Some(reason) => InboundEvent::HostExitError { reason },
            None => InboundEvent::HostExit,
        };
        self.send(event);
    }

    fn apply(&mut self, cid: CorrelationId, command: Command) {
        debug!(%cid, command = command.name(), "applying");
        let result = match command {
            Command::AddPlugin { identifier } => self
                .engine
                .add_plugin(&identifier)
                .map(|id| self.engine.plugin_events(id)),
            Command::RemovePlugin { plugin } => self.engine.remove_plugin(plugin).map(|dropped| {
                let mut events: Vec<InboundEvent> = dropped.iter().map(engine::ports_disconnected).collect();
                events.push(engine::plugin_removed(plugin));
                events
            }),
            Command::ConnectPorts { source, target } => self
                .engine
                .connect(source, target)
                .map(|id| vec![engine::ports_connected(&id)]),
            Command::DisconnectPorts { connection } => self
                .engine
                .disconnect(&connection)
                .map(|()| vec![engine::ports_disconnected(&connection)]),
            Command::RefreshPatchbay => Ok(self.engine.connection_events()),
            Command::SetParameterValue {
                plugin,
                param,
                value,
            } => self
                .engine
                .set_parameter(plugin, param, value)
                .map(|stored| vec![engine::parameter_changed(plugin, param, stored)]),
        };

        let error = match result {
            Ok(events) => {
                for event in events {
                    self.send(event);
                }
                None
            }
            Err(e) => Some(e),
        };
        self.respond(cid, error);
    }

    fn respond(&mut self, cid: CorrelationId, error: Option<EngineError>) {
        if let Some(e) = &error {
            debug!(%cid, error = %e, "command failed");
        }
        self.send(InboundEvent::Response {
            correlation_id: cid,
            error: error.map(|e| e.to_string()),
        });
    }

    fn publish_runtime(&mut self) {
        if !self.client_connected {
            return;
        }
        let now = Instant::now();
        if self
            .last_runtime
            .is_some_and(|last| now.duration_since(last) < RUNTIME_INTERVAL)
        {
            return;
        }
        self.last_runtime = Some(now);
        let elapsed = now.duration_since(self.started).as_secs_f64();
        let rt = self.engine.runtime(elapsed);
        self.send_periodic(InboundEvent::EngineRuntime(rt));
        for peaks in self.engine.peaks(elapsed) {
            self.send_periodic(peaks);
        }
    }

    /// Queues a dump, effect or response message. A full queue drops it
    /// with a warning; the client will see a missing response as pending.
    fn send(&mut self, event: InboundEvent) {
        match self.outbound_tx.try_send(OutboundMsg::Send { event }) {
            Ok(()) => {}
            Err(TrySendError::Full(OutboundMsg::Send { event })) => {
                warn!(addr = %event.to_message().addr, "outbound queue full, dropping message");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Runtime and peak updates; the next interval replaces them.
    fn send_periodic(&mut self, event: InboundEvent) {
        let _ = self.outbound_tx.try_send(OutboundMsg::Send { event });
    }
}
