//! In-memory rack: a handful of built-in plugin types, their parameter
//! values, and the audio connections between them.

use carla_protocol::inbound::{
    ACTION_PLUGIN_ADDED, ACTION_PLUGIN_REMOVED, ACTION_PORTS_CONNECTED, ACTION_PORTS_DISCONNECTED,
};
use carla_protocol::{
    Callback, ConnectionEnds, ConnectionId, CustomData, EngineRuntime, InboundEvent,
    InternalParams, MidiProgram, ParamId, ParameterMetadata, ParameterRanges, ParameterRuntime,
    Peaks, PluginCounts, PluginDescriptor, PluginId, PortCounts, PortRef, ProgramCounts,
};
use std::collections::BTreeMap;
use thiserror::Error;

const SAMPLE_RATE: f64 = 48_000.0;
const PLUGIN_TYPE_INTERNAL: i32 = 1;
const PARAMETER_INPUT: i32 = 1;
const CUSTOM_DATA_TYPE_STRING: &str = "http://kxstudio.sf.net/ns/carla/string";

pub struct ParamTemplate {
    pub name: &'static str,
    pub unit: &'static str,
    pub default: f32,
    pub min: f32,
    pub max: f32,
}

pub struct PluginTemplate {
    pub identifier: &'static str,
    pub name: &'static str,
    pub label: &'static str,
    pub maker: &'static str,
    pub category: i32,
    pub unique_id: i64,
    pub audio_ins: u32,
    pub audio_outs: u32,
    pub params: &'static [ParamTemplate],
    pub programs: &'static [&'static str],
}

const fn param(name: &'static str, unit: &'static str, default: f32, min: f32, max: f32) -> ParamTemplate {
    ParamTemplate {
        name,
        unit,
        default,
        min,
        max,
    }
}

pub const CATALOG: &[PluginTemplate] = &[
    PluginTemplate {
        identifier: "mda-delay",
        name: "mda Delay",
        label: "mdaDelay",
        maker: "mda",
        category: 2,
        unique_id: 0x6d64_4479,
        audio_ins: 2,
        audio_outs: 2,
        params: &[
            param("L Delay", "ms", 0.5, 0.0, 1.0),
            param("R Delay", "%L", 0.27, 0.0, 1.0),
            param("Feedback", "%", 0.7, 0.0, 1.0),
            param("Fb Tone", "Lo <> Hi", 0.5, 0.0, 1.0),
            param("FX Mix", "%", 0.33, 0.0, 1.0),
        ],
        programs: &["Init", "Slapback", "Long Tail"],
    },
    PluginTemplate {
        identifier: "mda-ambience",
        name: "mda Ambience",
        label: "mdaAmbience",
        maker: "mda",
        category: 2,
        unique_id: 0x6d64_416d,
        audio_ins: 2,
        audio_outs: 2,
        params: &[
            param("Size", "m", 0.7, 0.0, 1.0),
            param("HF Damp", "%", 0.7, 0.0, 1.0),
            param("Mix", "%", 0.9, 0.0, 1.0),
            param("Output", "dB", 0.5, 0.0, 1.0),
        ],
        programs: &["Init", "Room"],
    },
    PluginTemplate {
        identifier: "audio-gain",
        name: "Audio Gain",
        label: "audiogain",
        maker: "falkTX",
        category: 6,
        unique_id: 0,
        audio_ins: 1,
        audio_outs: 1,
        params: &[param("Gain", "", 1.0, 0.0, 4.0)],
        programs: &[],
    },
];

pub fn find_template(identifier: &str) -> Option<&'static PluginTemplate> {
    CATALOG.iter().find(|t| t.identifier == identifier)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown plugin identifier {0:?}")]
    UnknownIdentifier(String),
    #[error("plugin {0} not found")]
    UnknownPlugin(PluginId),
    #[error("plugin {plugin} has no parameter {param}")]
    UnknownParameter { plugin: PluginId, param: ParamId },
    #[error("port {port} does not exist on plugin {plugin}")]
    InvalidPort { plugin: PluginId, port: u32 },
    #[error("{0} is already connected")]
    AlreadyConnected(ConnectionId),
    #[error("connection {0} not found")]
    UnknownConnection(ConnectionId),
    #[error("value {0} is not finite")]
    NonFinite(f32),
}

pub struct HostedPlugin {
    pub id: PluginId,
    pub template: &'static PluginTemplate,
    pub values: Vec<f32>,
}

#[derive(Default)]
pub struct Engine {
    plugins: BTreeMap<PluginId, HostedPlugin>,
    connections: BTreeMap<ConnectionId, ConnectionEnds>,
    next_id: u32,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin(&self, id: PluginId) -> Option<&HostedPlugin> {
        self.plugins.get(&id)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn add_plugin(&mut self, identifier: &str) -> Result<PluginId, EngineError> {
        let template = find_template(identifier)
            .ok_or_else(|| EngineError::UnknownIdentifier(identifier.to_string()))?;
        let id = PluginId(self.next_id);
        self.next_id += 1;
        self.plugins.insert(
            id,
            HostedPlugin {
                id,
                template,
                values: template.params.iter().map(|p| p.default).collect(),
            },
        );
        Ok(id)
    }

    /// Returns the connections that went away with the plugin.
    pub fn remove_plugin(&mut self, id: PluginId) -> Result<Vec<ConnectionId>, EngineError> {
        self.plugins
            .remove(&id)
            .ok_or(EngineError::UnknownPlugin(id))?;
        let dropped: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, e)| e.source.plugin == id || e.target.plugin == id)
            .map(|(k, _)| k.clone())
            .collect();
        for k in &dropped {
            self.connections.remove(k);
        }
        Ok(dropped)
    }

    pub fn connect(&mut self, source: PortRef, target: PortRef) -> Result<ConnectionId, EngineError> {
        self.check_port(source, |t| t.audio_outs)?;
        self.check_port(target, |t| t.audio_ins)?;
        let ends = ConnectionEnds { source, target };
        let id = ends.id();
        if self.connections.contains_key(&id) {
            return Err(EngineError::AlreadyConnected(id));
        }
        self.connections.insert(id.clone(), ends);
        Ok(id)
    }

    pub fn disconnect(&mut self, id: &ConnectionId) -> Result<(), EngineError> {
        self.connections
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::UnknownConnection(id.clone()))
    }

    /// Stores the value clamped to the parameter range and returns what was stored.
    pub fn set_parameter(&mut self, plugin: PluginId, param: ParamId, value: f32) -> Result<f32, EngineError> {
        if !value.is_finite() {
            return Err(EngineError::NonFinite(value));
        }
        let hosted = self
            .plugins
            .get_mut(&plugin)
            .ok_or(EngineError::UnknownPlugin(plugin))?;
        let index = param.0 as usize;
        let (Some(tpl), Some(slot)) = (hosted.template.params.get(index), hosted.values.get_mut(index)) else {
            return Err(EngineError::UnknownParameter { plugin, param });
        };
        *slot = value.clamp(tpl.min, tpl.max);
        Ok(*slot)
    }

    fn check_port(&self, port: PortRef, count: fn(&PluginTemplate) -> u32) -> Result<(), EngineError> {
        let hosted = self
            .plugins
            .get(&port.plugin)
            .ok_or(EngineError::UnknownPlugin(port.plugin))?;
        if port.port >= count(hosted.template) {
            return Err(EngineError::InvalidPort {
                plugin: port.plugin,
                port: port.port,
            });
        }
        Ok(())
    }

    /// Everything a client needs to know about one plugin, in announcement order.
    pub fn plugin_events(&self, id: PluginId) -> Vec<InboundEvent> {
        let Some(hosted) = self.plugins.get(&id) else {
            return Vec::new();
        };
        let t = hosted.template;
        let mut out = vec![
            plugin_added(id, t.name),
            InboundEvent::PluginDescriptor(PluginDescriptor {
                plugin: id,
                plugin_type: PLUGIN_TYPE_INTERNAL,
                category: t.category,
                hints: 0,
                unique_id: t.unique_id,
                options_available: 0,
                options_enabled: 0,
                name: t.name.to_string(),
                filename: String::new(),
                icon_name: "plugin".to_string(),
                real_name: t.name.to_string(),
                label: t.label.to_string(),
                maker: t.maker.to_string(),
                copyright: "GPL".to_string(),
            }),
            InboundEvent::PortCounts {
                plugin: id,
                counts: PortCounts {
                    audio_ins: t.audio_ins,
                    audio_outs: t.audio_outs,
                    param_total: t.params.len() as u32,
                    ..PortCounts::default()
                },
            },
            InboundEvent::ProgramCounts {
                plugin: id,
                counts: ProgramCounts {
                    programs: t.programs.len() as u32,
                    midi_programs: t.programs.len() as u32,
                },
            },
            InboundEvent::PluginCounts {
                plugin: id,
                counts: PluginCounts {
                    programs: t.programs.len() as u32,
                    midi_programs: t.programs.len() as u32,
                    custom_data: 1,
                    current_program: if t.programs.is_empty() { -1 } else { 0 },
                    current_midi_program: if t.programs.is_empty() { -1 } else { 0 },
                },
            },
            InboundEvent::InternalParams {
                plugin: id,
                params: InternalParams {
                    active: true,
                    dry_wet: 1.0,
                    volume: 1.0,
                    balance_left: -1.0,
                    balance_right: 1.0,
                    panning: 0.0,
                    ctrl_channel: -1,
                },
            },
        ];

        for (index, name) in t.programs.iter().enumerate() {
            out.push(InboundEvent::ProgramName {
                plugin: id,
                index: index as u32,
                name: name.to_string(),
            });
        }
        for (index, name) in t.programs.iter().enumerate() {
            out.push(InboundEvent::MidiProgram {
                plugin: id,
                index: index as u32,
                program: MidiProgram {
                    bank: 0,
                    program: index as u32,
                    name: name.to_string(),
                },
            });
        }
        out.push(InboundEvent::CustomData {
            plugin: id,
            index: 0,
            data: CustomData {
                data_type: CUSTOM_DATA_TYPE_STRING.to_string(),
                key: "identifier".to_string(),
                value: t.identifier.to_string(),
            },
        });

        for (index, (p, value)) in t.params.iter().zip(&hosted.values).enumerate() {
            let param = ParamId(index as u32);
            out.push(InboundEvent::ParameterMetadata {
                plugin: id,
                param,
                metadata: ParameterMetadata {
                    name: p.name.to_string(),
                    unit: p.unit.to_string(),
                    comment: String::new(),
                    group_name: String::new(),
                },
            });
            out.push(InboundEvent::ParameterRuntime {
                plugin: id,
                param,
                runtime: ParameterRuntime {
                    param_type: PARAMETER_INPUT,
                    hints: 0,
                    midi_channel: 0,
                    mapped_control_index: -1,
                    mapped_minimum: p.min,
                    mapped_maximum: p.max,
                    value: *value,
                },
            });
            let span = p.max - p.min;
            out.push(InboundEvent::ParameterRanges {
                plugin: id,
                param,
                ranges: ParameterRanges {
                    default: p.default,
                    minimum: p.min,
                    maximum: p.max,
                    step: span / 100.0,
                    step_small: span / 1000.0,
                    step_large: span / 10.0,
                },
            });
            out.push(InboundEvent::ParameterValue {
                plugin: id,
                param,
                value: *value,
            });
        }
        out
    }

    pub fn connection_events(&self) -> Vec<InboundEvent> {
        self.connections.keys().map(ports_connected).collect()
    }

    pub fn full_dump(&self) -> Vec<InboundEvent> {
        let mut out: Vec<InboundEvent> = self
            .plugins
            .keys()
            .flat_map(|id| self.plugin_events(*id))
            .collect();
        out.extend(self.connection_events());
        out
    }

    /// Synthetic meter levels, one set per plugin; outputs follow the mean
    /// parameter value so changes are visible.
    pub fn peaks(&self, elapsed_secs: f64) -> Vec<InboundEvent> {
        let wobble = ((elapsed_secs * 2.0).sin() * 0.5 + 0.5) as f32;
        self.plugins
            .values()
            .map(|hosted| {
                let mean = if hosted.values.is_empty() {
                    0.0
                } else {
                    hosted.values.iter().sum::<f32>() / hosted.values.len() as f32
                };
                let input = 0.2 + 0.6 * wobble;
                let output = (input * mean).min(1.0);
                InboundEvent::Peaks {
                    plugin: hosted.id,
                    peaks: Peaks {
                        in_left: input,
                        in_right: input,
                        out_left: output,
                        out_right: output,
                    },
                }
            })
            .collect()
    }

    pub fn runtime(&self, elapsed_secs: f64) -> EngineRuntime {
        let bpm = 120.0_f32;
        let beats = elapsed_secs * f64::from(bpm) / 60.0;
        EngineRuntime {
            load: 1.5 + self.plugins.len() as f32 * 0.8,
            xruns: 0,
            playing: true,
            frame: (elapsed_secs * SAMPLE_RATE) as i64,
            bar: (beats / 4.0) as i32 + 1,
            beat: (beats % 4.0) as i32 + 1,
            tick: ((beats.fract()) * 1920.0) as i32,
            bpm,
        }
    }
}

fn callback(action: i32, int1: i32, int2: i32, float: f32, text: &str) -> InboundEvent {
    InboundEvent::Callback(Callback {
        action,
        int1,
        int2,
        int3: 0,
        float,
        text: text.to_string(),
    })
}

pub fn plugin_added(id: PluginId, name: &str) -> InboundEvent {
    callback(ACTION_PLUGIN_ADDED, id.0 as i32, 0, 0.0, name)
}

pub fn plugin_removed(id: PluginId) -> InboundEvent {
    callback(ACTION_PLUGIN_REMOVED, id.0 as i32, 0, 0.0, "")
}

pub fn ports_connected(id: &ConnectionId) -> InboundEvent {
    callback(ACTION_PORTS_CONNECTED, 0, 0, 0.0, id.as_str())
}

pub fn ports_disconnected(id: &ConnectionId) -> InboundEvent {
    callback(ACTION_PORTS_DISCONNECTED, 0, 0, 0.0, id.as_str())
}

pub fn parameter_changed(plugin: PluginId, param: ParamId, value: f32) -> InboundEvent {
    callback(
        carla_protocol::inbound::ACTION_PARAMETER_VALUE_CHANGED,
        plugin.0 as i32,
        param.0 as i32,
        value,
        "",
    )
}
