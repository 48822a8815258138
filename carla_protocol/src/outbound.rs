//! Client -> host commands.

use crate::{ConnectionId, CorrelationId, ParamId, PluginId, PortRef, CTRL_PREFIX};
use rosc::{OscMessage, OscType};
use serde::{Deserialize, Serialize};

pub mod address {
    pub const ADD_PLUGIN: &str = "/ctrl/add_plugin";
    pub const REMOVE_PLUGIN: &str = "/ctrl/remove_plugin";
    pub const PATCHBAY_CONNECT: &str = "/ctrl/patchbay_connect";
    pub const PATCHBAY_DISCONNECT: &str = "/ctrl/patchbay_disconnect";
    pub const PATCHBAY_REFRESH: &str = "/ctrl/patchbay_refresh";
    pub const SET_PARAMETER_VALUE: &str = "set_parameter_value";
}

/// Plugin type/binary sent when adding by identifier; the host resolves the rest.
const ANY_PLUGIN_TYPE: i32 = -1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    AddPlugin {
        identifier: String,
    },
    RemovePlugin {
        plugin: PluginId,
    },
    ConnectPorts {
        source: PortRef,
        target: PortRef,
    },
    DisconnectPorts {
        connection: ConnectionId,
    },
    RefreshPatchbay,
    SetParameterValue {
        plugin: PluginId,
        param: ParamId,
        value: f32,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddPlugin { .. } => "add_plugin",
            Command::RemovePlugin { .. } => "remove_plugin",
            Command::ConnectPorts { .. } => "patchbay_connect",
            Command::DisconnectPorts { .. } => "patchbay_disconnect",
            Command::RefreshPatchbay => "patchbay_refresh",
            Command::SetParameterValue { .. } => "set_parameter_value",
        }
    }

    /// Builds the wire message. `target_name` is the host's OSC path used for
    /// per-plugin messages; the correlation id always leads the arguments.
    pub fn to_message(&self, target_name: &str, cid: CorrelationId) -> OscMessage {
        let tag = OscType::Int(cid.0);
        let (addr, args) = match self {
            Command::AddPlugin { identifier } => (
                address::ADD_PLUGIN.to_string(),
                vec![
                    tag,
                    OscType::Int(ANY_PLUGIN_TYPE),
                    OscType::String(String::new()),
                    OscType::String(String::new()),
                    OscType::String(identifier.clone()),
                    OscType::String(String::new()),
                    OscType::String(identifier.clone()),
                ],
            ),
            Command::RemovePlugin { plugin } => (
                address::REMOVE_PLUGIN.to_string(),
                vec![tag, OscType::Int(plugin.0 as i32)],
            ),
            Command::ConnectPorts { source, target } => (
                address::PATCHBAY_CONNECT.to_string(),
                vec![
                    tag,
                    OscType::Int(source.plugin.0 as i32),
                    OscType::Int(source.port as i32),
                    OscType::Int(target.plugin.0 as i32),
                    OscType::Int(target.port as i32),
                ],
            ),
            Command::DisconnectPorts { connection } => (
                address::PATCHBAY_DISCONNECT.to_string(),
                vec![tag, OscType::String(connection.as_str().to_string())],
            ),
            Command::RefreshPatchbay => (address::PATCHBAY_REFRESH.to_string(), vec![tag]),
            Command::SetParameterValue {
                plugin,
                param,
                value,
            } => (
                format!(
                    "/{}/{}/{}",
                    target_name.trim_matches('/'),
                    plugin.0,
                    address::SET_PARAMETER_VALUE
                ),
                vec![tag, OscType::Int(param.0 as i32), OscType::Float(*value)],
            ),
        };
        OscMessage { addr, args }
    }

    /// Host-side parse of a client command. Returns `None` for anything that
    /// is not a well-formed command addressed to `target_name`.
    pub fn from_message(msg: &OscMessage, target_name: &str) -> Option<(CorrelationId, Command)> {
        let int = |i: usize| match msg.args.get(i)? {
            OscType::Int(v) => Some(*v),
            OscType::Long(v) => i32::try_from(*v).ok(),
            OscType::Float(v) => Some(*v as i32),
            _ => None,
        };
        let id = |i: usize| u32::try_from(int(i)?).ok();
        let text = |i: usize| match msg.args.get(i)? {
            OscType::String(s) => Some(s.clone()),
            _ => None,
        };
        let cid = CorrelationId(int(0)?);

        let command = if let Some(name) = msg.addr.strip_prefix(CTRL_PREFIX) {
            match name {
                "add_plugin" => Command::AddPlugin {
                    identifier: text(6).or_else(|| text(4))?,
                },
                "remove_plugin" => Command::RemovePlugin {
                    plugin: PluginId(id(1)?),
                },
                "patchbay_connect" => Command::ConnectPorts {
                    source: PortRef::new(id(1)?, id(2)?),
                    target: PortRef::new(id(3)?, id(4)?),
                },
                "patchbay_disconnect" => Command::DisconnectPorts {
                    connection: ConnectionId::raw(text(1).or_else(|| int(1).map(|v| v.to_string()))?),
                },
                "patchbay_refresh" => Command::RefreshPatchbay,
                _ => return None,
            }
        } else {
            let rest = msg.addr.strip_prefix('/')?;
            let (target, rest) = rest.split_once('/')?;
            let (plugin, method) = rest.split_once('/')?;
            if target != target_name.trim_matches('/') || method != address::SET_PARAMETER_VALUE {
                return None;
            }
            let value = match msg.args.get(2)? {
                OscType::Float(v) => *v,
                OscType::Double(v) => *v as f32,
                OscType::Int(v) => *v as f32,
                _ => return None,
            };
            Command::SetParameterValue {
                plugin: PluginId(plugin.parse().ok()?),
                param: ParamId(id(1)?),
                value,
            }
        };
        Some((cid, command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_plugin_wire_shape() {
        let msg = Command::AddPlugin {
            identifier: "lv2:mda-delay".into(),
        }
        .to_message("Carla", CorrelationId(3));
        assert_eq!(msg.addr, "/ctrl/add_plugin");
        assert_eq!(
            msg.args,
            vec![
                OscType::Int(3),
                OscType::Int(-1),
                OscType::String(String::new()),
                OscType::String(String::new()),
                OscType::String("lv2:mda-delay".into()),
                OscType::String(String::new()),
                OscType::String("lv2:mda-delay".into()),
            ]
        );
    }

    #[test]
    fn set_parameter_value_goes_to_plugin_path() {
        let cmd = Command::SetParameterValue {
            plugin: PluginId(2),
            param: ParamId(4),
            value: 0.5,
        };
        let msg = cmd.to_message("Carla", CorrelationId(9));
        assert_eq!(msg.addr, "/Carla/2/set_parameter_value");
        assert_eq!(
            msg.args,
            vec![OscType::Int(9), OscType::Int(4), OscType::Float(0.5)]
        );
        assert_eq!(
            Command::from_message(&msg, "Carla"),
            Some((CorrelationId(9), cmd))
        );
        assert_eq!(Command::from_message(&msg, "Other"), None);
    }

    #[test]
    fn host_side_parse_of_connect_and_disconnect() {
        let connect = Command::ConnectPorts {
            source: PortRef::new(1, 0),
            target: PortRef::new(2, 0),
        };
        let msg = connect.to_message("Carla", CorrelationId(1));
        assert_eq!(msg.addr, "/ctrl/patchbay_connect");
        assert_eq!(Command::from_message(&msg, "Carla"), Some((CorrelationId(1), connect)));

        let disconnect = Command::DisconnectPorts {
            connection: ConnectionId::raw("1:0>2:0"),
        };
        let msg = disconnect.to_message("Carla", CorrelationId(2));
        assert_eq!(msg.args[1], OscType::String("1:0>2:0".into()));
        assert_eq!(Command::from_message(&msg, "Carla"), Some((CorrelationId(2), disconnect)));
    }

    #[test]
    fn malformed_commands_are_rejected() {
        let no_args = OscMessage {
            addr: address::REMOVE_PLUGIN.to_string(),
            args: vec![OscType::Int(1)],
        };
        assert_eq!(Command::from_message(&no_args, "Carla"), None);

        let unknown = OscMessage {
            addr: "/ctrl/transport_play".to_string(),
            args: vec![OscType::Int(1)],
        };
        assert_eq!(Command::from_message(&unknown, "Carla"), None);
    }
}
