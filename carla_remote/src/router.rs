use crate::store::{self, EntityStore, ParameterUpdate};
use crate::tracker::{MutationTracker, Resolution};
use carla_protocol::{CallbackAction, InboundEvent, OscMessage};
use tracing::{debug, trace, warn};

/// Outcome of routing one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Applied,
    Resolved(Resolution),
    HostExit,
    HostExitError(String),
    /// Unknown address, decode failure, or a callback this client does not act on.
    Dropped,
}

/// Decodes `msg` and applies it. Never panics; bad input becomes `Dropped`.
pub fn route_message(msg: &OscMessage, store: &mut EntityStore, tracker: &mut MutationTracker) -> Routed {
    match InboundEvent::decode(msg) {
        Ok(Some(event)) => route(event, store, tracker),
        Ok(None) => {
            trace!(addr = %msg.addr, "ignoring unknown address");
            Routed::Dropped
        }
        Err(e) => {
            warn!(error = %e, "dropping malformed message");
            Routed::Dropped
        }
    }
}

pub fn route(event: InboundEvent, store: &mut EntityStore, tracker: &mut MutationTracker) -> Routed {
    debug!(?event, "routing");
    match event {
        InboundEvent::PluginDescriptor(d) => store.upsert_descriptor(&d),
        InboundEvent::PortCounts { plugin, counts } => store.set_port_counts(plugin, counts),
        InboundEvent::ProgramCounts { plugin, counts } => store.set_program_counts(plugin, counts),
        InboundEvent::PluginCounts { plugin, counts } => store.set_plugin_counts(plugin, counts),
        InboundEvent::ProgramName {
            plugin,
            index,
            name,
        } => {
            if !store.set_program_name(plugin, index, name) {
                trace!(%plugin, index, "program index past count");
            }
        }
        InboundEvent::MidiProgram {
            plugin,
            index,
            program,
        } => {
            if !store.set_midi_program(plugin, index, program) {
                trace!(%plugin, index, "midi program index past count");
            }
        }
        InboundEvent::CustomData {
            plugin,
            index,
            data,
        } => {
            if !store.set_custom_data(plugin, index, data) {
                trace!(%plugin, index, "custom data index past count");
            }
        }
        InboundEvent::InternalParams { plugin, params } => store.set_internal_params(plugin, params),
        InboundEvent::Peaks { plugin, peaks } => store.set_peaks(plugin, peaks),
        InboundEvent::ParameterMetadata {
            plugin,
            param,
            metadata,
        } => store.merge_parameter(plugin, param, &ParameterUpdate::Metadata(metadata)),
        InboundEvent::ParameterRuntime {
            plugin,
            param,
            runtime,
        } => store.merge_parameter(plugin, param, &ParameterUpdate::Runtime(runtime)),
        InboundEvent::ParameterRanges {
            plugin,
            param,
            ranges,
        } => store.merge_parameter(plugin, param, &ParameterUpdate::Ranges(ranges)),
        InboundEvent::ParameterValue {
            plugin,
            param,
            value,
        } => store.merge_parameter(plugin, param, &ParameterUpdate::Value(value)),
        InboundEvent::Callback(cb) => {
            let Some(action) = cb.interpret() else {
                trace!(action = cb.action, text = %cb.text, "dropping malformed callback");
                return Routed::Dropped;
            };
            return apply_callback(action, store);
        }
        InboundEvent::Response {
            correlation_id,
            error,
        } => return Routed::Resolved(tracker.resolve(correlation_id, error.as_deref(), store)),
        InboundEvent::EngineRuntime(rt) => {
            store.replace_engine_info(store::engine_info_from_runtime(&rt))
        }
        InboundEvent::HostExit => return Routed::HostExit,
        InboundEvent::HostExitError { reason } => return Routed::HostExitError(reason),
    }
    Routed::Applied
}

fn apply_callback(action: CallbackAction, store: &mut EntityStore) -> Routed {
    match action {
        CallbackAction::PluginAdded { plugin, name } => store.ensure_plugin(plugin, &name),
        CallbackAction::PluginRemoved(plugin) => {
            store.remove_plugin(plugin);
        }
        CallbackAction::PortsConnected(ends) => {
            if !store.insert_connection(ends.into()) {
                trace!(connection = %ends.id(), "connection already known");
            }
        }
        CallbackAction::PortsDisconnected(id) => {
            store.remove_connection(&id);
        }
        CallbackAction::ParameterValueChanged {
            plugin,
            param,
            value,
        } => store.merge_parameter(plugin, param, &ParameterUpdate::Value(value)),
        CallbackAction::Other(code) => {
            trace!(code, "ignoring callback");
            return Routed::Dropped;
        }
    }
    Routed::Applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use carla_protocol::inbound::{address, ACTION_PLUGIN_REMOVED, ACTION_PORTS_CONNECTED, ACTION_PORTS_DISCONNECTED};
    use carla_protocol::{Callback, ConnectionId, OscType, ParamId, PluginId};

    fn cb(action: i32, int1: i32, text: &str) -> InboundEvent {
        InboundEvent::Callback(Callback {
            action,
            int1,
            text: text.to_string(),
            ..Callback::default()
        })
    }

    #[test]
    fn descriptor_then_ports_scenario() {
        let mut store = EntityStore::new();
        let mut tracker = MutationTracker::new();
        let info = OscMessage {
            addr: address::INFO.to_string(),
            args: vec![
                OscType::Int(1),
                OscType::Int(0),
                OscType::Int(0),
                OscType::Int(0),
                OscType::Int(0),
                OscType::Int(0),
                OscType::Int(0),
                OscType::String("mda Delay".into()),
                OscType::String(String::new()),
                OscType::String(String::new()),
                OscType::String(String::new()),
                OscType::String(String::new()),
                OscType::String(String::new()),
                OscType::String(String::new()),
            ],
        };
        let ports = OscMessage {
            addr: address::PORTS.to_string(),
            args: [1, 2, 2, 0, 0, 0, 0, 0].into_iter().map(OscType::Int).collect(),
        };

        assert_eq!(route_message(&info, &mut store, &mut tracker), Routed::Applied);
        assert_eq!(route_message(&ports, &mut store, &mut tracker), Routed::Applied);

        assert_eq!(store.plugins().count(), 1);
        let p = store.plugin(PluginId(1)).unwrap();
        assert_eq!(p.name, "mda Delay");
        assert_eq!(p.ports.unwrap().audio_ins, 2);
        assert_eq!(p.ports.unwrap().audio_outs, 2);
    }

    #[test]
    fn malformed_and_unknown_messages_are_dropped() {
        let mut store = EntityStore::new();
        let mut tracker = MutationTracker::new();
        let short = OscMessage {
            addr: address::PARAM_VALUE.to_string(),
            args: vec![OscType::Int(1)],
        };
        let unknown = OscMessage {
            addr: "/ctrl/note_on".to_string(),
            args: vec![],
        };
        assert_eq!(route_message(&short, &mut store, &mut tracker), Routed::Dropped);
        assert_eq!(route_message(&unknown, &mut store, &mut tracker), Routed::Dropped);
        assert!(store.is_empty());
    }

    #[test]
    fn plugin_removed_callback_cascades() {
        let mut store = EntityStore::new();
        let mut tracker = MutationTracker::new();
        store.ensure_plugin(PluginId(3), "x");
        store.merge_parameter(PluginId(3), ParamId(0), &ParameterUpdate::Value(0.1));

        route(cb(ACTION_PLUGIN_REMOVED, 3, ""), &mut store, &mut tracker);
        assert!(store.plugin(PluginId(3)).is_none());
        assert_eq!(store.parameters_of(PluginId(3)).count(), 0);

        assert_eq!(route(cb(ACTION_PLUGIN_REMOVED, 3, ""), &mut store, &mut tracker), Routed::Applied);
    }

    #[test]
    fn plugin_removed_callback_clears_records_without_descriptor() {
        let mut store = EntityStore::new();
        let mut tracker = MutationTracker::new();
        route(
            InboundEvent::ParameterValue {
                plugin: PluginId(9),
                param: ParamId(0),
                value: 0.3,
            },
            &mut store,
            &mut tracker,
        );
        route(cb(ACTION_PORTS_CONNECTED, 0, "9:1>0:0"), &mut store, &mut tracker);
        assert!(store.plugin(PluginId(9)).is_none());

        route(cb(ACTION_PLUGIN_REMOVED, 9, ""), &mut store, &mut tracker);
        assert_eq!(store.parameters_of(PluginId(9)).count(), 0);
        assert_eq!(store.connections().count(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn connect_callbacks_add_once_and_ignore_garbage() {
        let mut store = EntityStore::new();
        let mut tracker = MutationTracker::new();
        route(cb(ACTION_PORTS_CONNECTED, 0, "1:0>2:0"), &mut store, &mut tracker);
        route(cb(ACTION_PORTS_CONNECTED, 0, "1:0>2:0"), &mut store, &mut tracker);
        assert_eq!(store.connections().count(), 1);

        assert_eq!(
            route(cb(ACTION_PORTS_CONNECTED, 0, "garbage"), &mut store, &mut tracker),
            Routed::Dropped
        );
        assert_eq!(store.connections().count(), 1);

        route(cb(ACTION_PORTS_DISCONNECTED, 0, "1:0>2:0"), &mut store, &mut tracker);
        assert!(store.connection(&ConnectionId::raw("1:0>2:0")).is_none());
    }

    #[test]
    fn program_and_custom_data_messages_land_on_the_plugin() {
        let mut store = EntityStore::new();
        let mut tracker = MutationTracker::new();
        let count = OscMessage {
            addr: address::COUNTS.to_string(),
            args: [4, 2, 0, 1, 0, -1].into_iter().map(OscType::Int).collect(),
        };
        let prog = OscMessage {
            addr: address::PROGRAM_NAME.to_string(),
            args: vec![OscType::Int(4), OscType::Int(1), OscType::String("Hall".into())],
        };
        let cdata = OscMessage {
            addr: address::CUSTOM_DATA.to_string(),
            args: vec![
                OscType::Int(4),
                OscType::Int(0),
                OscType::String("string".into()),
                OscType::String("mode".into()),
                OscType::String("wide".into()),
            ],
        };
        let peaks = OscMessage {
            addr: address::PEAKS.to_string(),
            args: vec![
                OscType::Int(4),
                OscType::Float(0.5),
                OscType::Float(0.5),
                OscType::Float(0.25),
                OscType::Float(0.25),
            ],
        };

        for m in [&count, &prog, &cdata, &peaks] {
            assert_eq!(route_message(m, &mut store, &mut tracker), Routed::Applied);
        }

        let p = store.plugin(PluginId(4)).unwrap();
        assert_eq!(p.program_names.get(&1).map(String::as_str), Some("Hall"));
        assert_eq!(p.custom_data[&0].value, "wide");
        assert_eq!(p.current_program, Some(0));
        assert_eq!(p.peaks.unwrap().out_left, 0.25);
    }

    #[test]
    fn exit_messages_surface_to_the_owner() {
        let mut store = EntityStore::new();
        let mut tracker = MutationTracker::new();
        assert_eq!(route(InboundEvent::HostExit, &mut store, &mut tracker), Routed::HostExit);
        assert_eq!(
            route(
                InboundEvent::HostExitError {
                    reason: "xrun storm".into()
                },
                &mut store,
                &mut tracker
            ),
            Routed::HostExitError("xrun storm".into())
        );
    }
}
