use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::controller::{ConnectionController, ConnectionStatus, Signal, StatusChange, Step};
use crate::error::ClientError;
use crate::router::{self, Routed};
use crate::store::{EntityStore, ParameterUpdate};
use crate::tracker::{MutationTracker, Resolution, Snapshot};
use crate::transport::{Transport, TransportEvent};
use carla_protocol::{Command, ConnectionId, CorrelationId, ParamId, PluginId, PortRef};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use url::Url;

/// Notifications for observers. Delivered over a bounded broadcast channel.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    StatusChanged {
        from: ConnectionStatus,
        to: ConnectionStatus,
    },
    CommandConfirmed {
        id: CorrelationId,
        command: Command,
    },
    CommandRolledBack {
        id: CorrelationId,
        command: Command,
        error: String,
    },
    /// The command never reached the host; its optimistic effect was reverted.
    CommandFailed {
        id: CorrelationId,
        command: Command,
        error: String,
    },
    CommandRejected {
        command: Command,
        status: ConnectionStatus,
    },
    UnknownResponse {
        id: CorrelationId,
        error: Option<String>,
    },
}

/// Protocol client: owns the store, the tracker and one transport.
///
/// All state changes happen on `&mut self`, one inbound event at a time.
pub struct RemoteClient<T: Transport> {
    config: ClientConfig,
    transport: T,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    controller: ConnectionController,
    store: EntityStore,
    tracker: MutationTracker,
    observers: broadcast::Sender<ClientEvent>,
}

impl<T: Transport> RemoteClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let (observers, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            transport,
            events: None,
            controller: ConnectionController::new(),
            store: EntityStore::new(),
            tracker: MutationTracker::new(),
            observers,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn status(&self) -> &ConnectionStatus {
        self.controller.status()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Number of commands still waiting for a host response.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.observers.subscribe()
    }

    /// Connects to the configured host.
    pub fn connect(&mut self) {
        let url = self.config.ws_url();
        self.open(url);
    }

    /// Connects to another host without changing the rest of the configuration.
    /// An address that does not form a valid URL puts the client in `Error`.
    pub fn connect_to(&mut self, host: &str, port: u16) {
        let url = ClientConfig {
            host: host.to_string(),
            port,
            ..self.config.clone()
        }
        .ws_url();
        self.open(url);
    }

    /// Drops any current session and starts a new one.
    fn open(&mut self, url: Result<Url, ConfigError>) {
        self.transport.close();
        self.events = None;
        self.apply_signal(Signal::Connect);
        match url {
            Ok(url) => {
                info!(%url, "connecting");
                self.events = Some(self.transport.open(&url));
            }
            Err(e) => {
                warn!(error = %e, "cannot connect");
                self.apply_signal(Signal::Failed(e.to_string()));
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.transport.close();
        self.events = None;
        self.apply_signal(Signal::Disconnect);
    }

    /// Waits for the next transport event and applies it.
    ///
    /// Returns `false` once there is no live session to wait on.
    pub async fn pump(&mut self) -> bool {
        let Some(rx) = self.events.as_mut() else {
            return false;
        };
        let next = rx.recv().await;
        match next {
            Some(event) => {
                self.handle_transport_event(event);
                true
            }
            None => {
                self.events = None;
                self.apply_signal(Signal::Closed);
                false
            }
        }
    }

    /// Applies every transport event that is already queued, without waiting.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.handle_transport_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.apply_signal(Signal::Opened),
            TransportEvent::Closed => {
                self.events = None;
                self.apply_signal(Signal::Closed);
            }
            TransportEvent::Error(reason) => {
                warn!(%reason, "transport error");
                self.transport.close();
                self.events = None;
                self.apply_signal(Signal::Failed(reason));
            }
            TransportEvent::Message(msg) => {
                match router::route_message(&msg, &mut self.store, &mut self.tracker) {
                    Routed::Applied | Routed::Dropped => {}
                    Routed::Resolved(resolution) => self.publish_resolution(resolution),
                    Routed::HostExit => {
                        info!("host is shutting down");
                        self.transport.close();
                        self.events = None;
                        self.apply_signal(Signal::HostExit);
                    }
                    Routed::HostExitError(reason) => {
                        warn!(%reason, "host exited with error");
                        self.transport.close();
                        self.events = None;
                        self.apply_signal(Signal::HostExitError(reason));
                    }
                }
            }
        }
    }

    /// Asks the host to instantiate a plugin. The store changes only when the
    /// host announces the new plugin.
    pub fn add_plugin(&mut self, identifier: &str) -> Result<CorrelationId, ClientError> {
        self.submit(Command::AddPlugin {
            identifier: identifier.to_string(),
        })
    }

    /// Removes the plugin locally right away; restored if the host refuses.
    pub fn remove_plugin(&mut self, plugin: PluginId) -> Result<CorrelationId, ClientError> {
        self.submit(Command::RemovePlugin { plugin })
    }

    /// Not optimistic: the connection appears when the host confirms it via callback.
    pub fn connect_ports(
        &mut self,
        source_plugin: u32,
        source_port: u32,
        target_plugin: u32,
        target_port: u32,
    ) -> Result<CorrelationId, ClientError> {
        self.submit(Command::ConnectPorts {
            source: PortRef::new(source_plugin, source_port),
            target: PortRef::new(target_plugin, target_port),
        })
    }

    pub fn disconnect_ports(&mut self, connection: &ConnectionId) -> Result<CorrelationId, ClientError> {
        self.submit(Command::DisconnectPorts {
            connection: connection.clone(),
        })
    }

    pub fn set_parameter_value(
        &mut self,
        plugin: PluginId,
        param: ParamId,
        value: f32,
    ) -> Result<CorrelationId, ClientError> {
        self.submit(Command::SetParameterValue {
            plugin,
            param,
            value,
        })
    }

    /// Re-requests the full patchbay state.
    pub fn refresh(&mut self) -> Result<CorrelationId, ClientError> {
        self.submit(Command::RefreshPatchbay)
    }

    fn submit(&mut self, command: Command) -> Result<CorrelationId, ClientError> {
        let status = self.controller.status().clone();
        if !status.is_connected() {
            debug!(command = command.name(), %status, "rejecting command");
            self.publish(ClientEvent::CommandRejected {
                command,
                status: status.clone(),
            });
            return Err(ClientError::NotConnected(status));
        }

        let Some(id) = self.tracker.allocate() else {
            warn!(command = command.name(), "out of correlation ids");
            return Err(ClientError::IdsExhausted);
        };
        let snapshot = self.apply_optimistic(&command);
        self.tracker.track(id, command.clone(), snapshot);
        let msg = command.to_message(&self.config.target_name, id);

        if let Err(e) = self.transport.send(msg) {
            warn!(%id, command = command.name(), error = %e, "send failed, reverting");
            self.tracker.rollback(id, &mut self.store);
            self.publish(ClientEvent::CommandFailed {
                id,
                command,
                error: e.to_string(),
            });
            let reason = e.to_string();
            self.transport.close();
            self.events = None;
            self.apply_signal(Signal::Failed(reason));
            return Err(e.into());
        }

        debug!(%id, command = command.name(), "sent");
        Ok(id)
    }

    fn apply_optimistic(&mut self, command: &Command) -> Snapshot {
        match command {
            Command::RemovePlugin { plugin } => self
                .store
                .remove_plugin(*plugin)
                .map_or(Snapshot::Nothing, Snapshot::RemovedPlugin),
            Command::DisconnectPorts { connection } => self
                .store
                .remove_connection(connection)
                .map_or(Snapshot::Nothing, Snapshot::RemovedConnection),
            Command::SetParameterValue {
                plugin,
                param,
                value,
            } => {
                let prior = self.store.parameter(*plugin, *param).and_then(|p| p.value);
                self.store
                    .merge_parameter(*plugin, *param, &ParameterUpdate::Value(*value));
                Snapshot::ParameterValue {
                    plugin: *plugin,
                    param: *param,
                    prior,
                }
            }
            Command::AddPlugin { .. } | Command::ConnectPorts { .. } | Command::RefreshPatchbay => {
                Snapshot::Nothing
            }
        }
    }

    fn apply_signal(&mut self, signal: Signal) {
        let Step {
            change,
            refresh,
            invalidate,
        } = self.controller.handle(signal);

        if invalidate {
            let dropped = self.tracker.clear();
            self.store.clear();
            if dropped > 0 {
                warn!(dropped, "abandoning pending commands");
            }
        }
        if let Some(StatusChange { from, to }) = change {
            info!(%from, %to, "status changed");
            self.publish(ClientEvent::StatusChanged { from, to });
        }
        if refresh {
            let _ = self.submit(Command::RefreshPatchbay);
        }
    }

    fn publish_resolution(&mut self, resolution: Resolution) {
        let event = match resolution {
            Resolution::Confirmed(m) => ClientEvent::CommandConfirmed {
                id: m.id,
                command: m.command,
            },
            Resolution::RolledBack { mutation, error } => ClientEvent::CommandRolledBack {
                id: mutation.id,
                command: mutation.command,
                error,
            },
            Resolution::Unknown { id, error } => ClientEvent::UnknownResponse { id, error },
        };
        self.publish(event);
    }

    fn publish(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.observers.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use carla_protocol::inbound::{address, ACTION_PORTS_CONNECTED};
    use carla_protocol::{Callback, InboundEvent, OscMessage, OscType, PluginDescriptor};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Wire {
        sent: Vec<OscMessage>,
        opens: usize,
        urls: Vec<String>,
        closes: usize,
        fail_sends: bool,
        feed: Option<mpsc::UnboundedSender<TransportEvent>>,
    }

    #[derive(Clone, Default)]
    struct MemoryTransport(Rc<RefCell<Wire>>);

    impl Transport for MemoryTransport {
        fn open(&mut self, url: &Url) -> mpsc::UnboundedReceiver<TransportEvent> {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut wire = self.0.borrow_mut();
            wire.opens += 1;
            wire.urls.push(url.to_string());
            wire.feed = Some(tx);
            rx
        }

        fn send(&mut self, msg: OscMessage) -> Result<(), TransportError> {
            let mut wire = self.0.borrow_mut();
            if wire.fail_sends {
                return Err(TransportError::Closed);
            }
            wire.sent.push(msg);
            Ok(())
        }

        fn close(&mut self) {
            let mut wire = self.0.borrow_mut();
            wire.closes += 1;
            wire.feed = None;
        }
    }

    fn connected() -> (RemoteClient<MemoryTransport>, MemoryTransport) {
        let wire = MemoryTransport::default();
        let mut client = RemoteClient::new(ClientConfig::default(), wire.clone());
        client.connect();
        client.handle_transport_event(TransportEvent::Opened);
        (client, wire)
    }

    fn respond(client: &mut RemoteClient<MemoryTransport>, id: CorrelationId, error: &str) {
        let msg = InboundEvent::Response {
            correlation_id: id,
            error: (!error.is_empty()).then(|| error.to_string()),
        }
        .to_message();
        client.handle_transport_event(TransportEvent::Message(msg));
    }

    fn deliver(client: &mut RemoteClient<MemoryTransport>, event: InboundEvent) {
        client.handle_transport_event(TransportEvent::Message(event.to_message()));
    }

    fn last_sent(wire: &MemoryTransport) -> OscMessage {
        wire.0.borrow().sent.last().cloned().unwrap()
    }

    fn seed_plugin(client: &mut RemoteClient<MemoryTransport>, id: u32) {
        deliver(
            client,
            InboundEvent::PluginDescriptor(PluginDescriptor {
                plugin: PluginId(id),
                name: format!("plugin {id}"),
                ..PluginDescriptor::default()
            }),
        );
        deliver(
            client,
            InboundEvent::ParameterValue {
                plugin: PluginId(id),
                param: ParamId(0),
                value: 0.5,
            },
        );
    }

    #[test]
    fn open_sends_exactly_one_refresh() {
        let (mut client, wire) = connected();
        assert!(client.status().is_connected());
        {
            let w = wire.0.borrow();
            assert_eq!(w.sent.len(), 1);
            assert_eq!(w.sent[0].addr, "/ctrl/patchbay_refresh");
            assert_eq!(w.sent[0].args, vec![OscType::Int(1)]);
        }
        assert_eq!(client.pending(), 1);

        client.handle_transport_event(TransportEvent::Opened);
        assert_eq!(wire.0.borrow().sent.len(), 1);

        respond(&mut client, CorrelationId(1), "");
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn connect_uses_the_configured_url() {
        let wire = MemoryTransport::default();
        let mut client = RemoteClient::new(ClientConfig::default(), wire.clone());
        client.connect();
        client.connect_to("::1", 9000);
        assert_eq!(
            wire.0.borrow().urls,
            vec!["ws://127.0.0.1:22752/".to_string(), "ws://[::1]:9000/".to_string()]
        );
        assert_eq!(client.status(), &ConnectionStatus::Connecting);
    }

    #[test]
    fn invalid_address_fails_without_opening() {
        let wire = MemoryTransport::default();
        let mut client = RemoteClient::new(ClientConfig::default(), wire.clone());
        client.connect_to("not a host", 1);
        assert!(matches!(client.status(), ConnectionStatus::Error(_)));
        assert_eq!(wire.0.borrow().opens, 0);
    }

    #[test]
    fn commands_are_refused_unless_connected() {
        let wire = MemoryTransport::default();
        let mut client = RemoteClient::new(ClientConfig::default(), wire.clone());
        let mut observer = client.subscribe();

        let err = client.add_plugin("lv2:x").unwrap_err();
        assert!(matches!(err, ClientError::NotConnected(ConnectionStatus::Idle)));
        assert!(wire.0.borrow().sent.is_empty());
        assert_eq!(client.pending(), 0);
        assert!(matches!(
            observer.try_recv(),
            Ok(ClientEvent::CommandRejected { .. })
        ));

        client.connect();
        assert!(client.remove_plugin(PluginId(1)).is_err());
        assert!(wire.0.borrow().sent.is_empty());
    }

    #[test]
    fn exhausted_ids_refuse_without_touching_state() {
        let (mut client, wire) = connected();
        respond(&mut client, CorrelationId(1), "");
        seed_plugin(&mut client, 1);
        client.tracker = MutationTracker::starting_at(i32::MAX);

        let last = client.remove_plugin(PluginId(1)).unwrap();
        assert_eq!(last, CorrelationId(i32::MAX));
        let sent = wire.0.borrow().sent.len();

        let err = client
            .set_parameter_value(PluginId(2), ParamId(0), 0.9)
            .unwrap_err();
        assert!(matches!(err, ClientError::IdsExhausted));
        assert!(client.store().parameter(PluginId(2), ParamId(0)).is_none());
        assert_eq!(wire.0.borrow().sent.len(), sent);
        assert_eq!(client.pending(), 1);

        respond(&mut client, last, "busy");
        assert_eq!(client.store().plugin(PluginId(1)).unwrap().name, "plugin 1");
    }

    #[test]
    fn set_value_is_optimistic_and_rolls_back_on_error() {
        let (mut client, wire) = connected();
        seed_plugin(&mut client, 2);

        let id = client
            .set_parameter_value(PluginId(2), ParamId(0), 0.9)
            .unwrap();
        assert_eq!(last_sent(&wire).addr, "/Carla/2/set_parameter_value");
        assert_eq!(
            client.store().parameter(PluginId(2), ParamId(0)).unwrap().value,
            Some(0.9)
        );

        respond(&mut client, id, "parameter is read-only");
        assert_eq!(
            client.store().parameter(PluginId(2), ParamId(0)).unwrap().value,
            Some(0.5)
        );

        let id = client
            .set_parameter_value(PluginId(2), ParamId(0), 0.7)
            .unwrap();
        respond(&mut client, id, "");
        assert_eq!(
            client.store().parameter(PluginId(2), ParamId(0)).unwrap().value,
            Some(0.7)
        );
    }

    #[test]
    fn connect_ports_waits_for_callback() {
        let (mut client, wire) = connected();
        let id = client.connect_ports(1, 0, 2, 0).unwrap();
        assert_eq!(
            last_sent(&wire).args,
            vec![
                OscType::Int(id.0),
                OscType::Int(1),
                OscType::Int(0),
                OscType::Int(2),
                OscType::Int(0)
            ]
        );
        assert_eq!(client.store().connections().count(), 0);

        let connected_cb = InboundEvent::Callback(Callback {
            action: ACTION_PORTS_CONNECTED,
            text: "1:0>2:0".into(),
            ..Callback::default()
        });
        deliver(&mut client, connected_cb.clone());
        assert_eq!(client.store().connections().count(), 1);
        deliver(&mut client, connected_cb);
        assert_eq!(client.store().connections().count(), 1);
        respond(&mut client, id, "");
        assert_eq!(client.store().connections().count(), 1);
    }

    #[test]
    fn remove_plugin_is_restored_on_error() {
        let (mut client, _wire) = connected();
        seed_plugin(&mut client, 5);

        let id = client.remove_plugin(PluginId(5)).unwrap();
        assert!(client.store().plugin(PluginId(5)).is_none());

        respond(&mut client, id, "cannot remove while rendering");
        assert_eq!(client.store().plugin(PluginId(5)).unwrap().name, "plugin 5");
        assert_eq!(client.store().parameters_of(PluginId(5)).count(), 1);
    }

    #[test]
    fn disconnect_ports_is_restored_on_error() {
        let (mut client, _wire) = connected();
        deliver(
            &mut client,
            InboundEvent::Callback(Callback {
                action: ACTION_PORTS_CONNECTED,
                text: "1:0>2:0".into(),
                ..Callback::default()
            }),
        );
        let conn = ConnectionId::raw("1:0>2:0");

        let id = client.disconnect_ports(&conn).unwrap();
        assert!(client.store().connection(&conn).is_none());
        respond(&mut client, id, "no such connection");
        assert!(client.store().connection(&conn).is_some());
    }

    #[test]
    fn send_failure_reverts_and_reports() {
        let (mut client, wire) = connected();
        seed_plugin(&mut client, 1);
        let mut observer = client.subscribe();
        wire.0.borrow_mut().fail_sends = true;

        let err = client
            .set_parameter_value(PluginId(1), ParamId(0), 0.1)
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(TransportError::Closed)));
        assert_eq!(client.pending(), 0);
        assert!(matches!(client.status(), ConnectionStatus::Error(_)));
        assert!(matches!(
            observer.try_recv(),
            Ok(ClientEvent::CommandFailed { .. })
        ));
    }

    #[test]
    fn unknown_response_is_harmless() {
        let (mut client, _wire) = connected();
        seed_plugin(&mut client, 1);
        let before = client.store().snapshot();
        let mut observer = client.subscribe();

        respond(&mut client, CorrelationId(999), "whatever");
        assert_eq!(client.store().snapshot(), before);
        assert!(matches!(
            observer.try_recv(),
            Ok(ClientEvent::UnknownResponse { .. })
        ));
    }

    #[test]
    fn leaving_connected_clears_everything_but_the_id_counter() {
        let (mut client, wire) = connected();
        seed_plugin(&mut client, 1);
        client.add_plugin("lv2:x").unwrap();
        assert_eq!(client.pending(), 2);

        client.handle_transport_event(TransportEvent::Closed);
        assert_eq!(client.status(), &ConnectionStatus::Disconnected);
        assert_eq!(client.pending(), 0);
        assert!(client.store().is_empty());

        client.connect();
        client.handle_transport_event(TransportEvent::Opened);
        let refresh = last_sent(&wire);
        assert_eq!(refresh.addr, "/ctrl/patchbay_refresh");
        assert_eq!(refresh.args, vec![OscType::Int(3)]);
        assert_eq!(wire.0.borrow().opens, 2);
    }

    #[test]
    fn host_exit_disconnects() {
        let (mut client, wire) = connected();
        let mut observer = client.subscribe();
        client.handle_transport_event(TransportEvent::Message(OscMessage {
            addr: address::EXIT.to_string(),
            args: vec![],
        }));
        assert_eq!(client.status(), &ConnectionStatus::Disconnected);
        assert!(wire.0.borrow().feed.is_none());
        assert_eq!(
            observer.try_recv().unwrap(),
            ClientEvent::StatusChanged {
                from: ConnectionStatus::Connected,
                to: ConnectionStatus::Disconnected
            }
        );
    }

    #[test]
    fn transport_error_is_terminal_until_reconnect() {
        let (mut client, _wire) = connected();
        client.handle_transport_event(TransportEvent::Error("connection reset".into()));
        assert_eq!(
            client.status(),
            &ConnectionStatus::Error("connection reset".into())
        );
        client.handle_transport_event(TransportEvent::Opened);
        assert!(!client.status().is_connected());
        assert!(client.refresh().is_err());
    }

    #[tokio::test]
    async fn pump_applies_queued_events_in_order() {
        let wire = MemoryTransport::default();
        let mut client = RemoteClient::new(ClientConfig::default(), wire.clone());
        client.connect();
        let feed = wire.0.borrow().feed.clone().unwrap();
        feed.send(TransportEvent::Opened).unwrap();
        feed.send(TransportEvent::Message(
            InboundEvent::ParameterValue {
                plugin: PluginId(1),
                param: ParamId(0),
                value: 0.25,
            }
            .to_message(),
        ))
        .unwrap();

        assert!(client.pump().await);
        assert!(client.status().is_connected());
        assert_eq!(client.drain(), 1);
        assert_eq!(
            client.store().parameter(PluginId(1), ParamId(0)).unwrap().value,
            Some(0.25)
        );

        drop(feed);
        wire.0.borrow_mut().feed = None;
        assert!(!client.pump().await);
        assert_eq!(client.status(), &ConnectionStatus::Disconnected);
    }
}
