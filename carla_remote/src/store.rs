//! Normalized entity model fed by inbound host messages.
//!
//! The store knows nothing about the network. Every operation is a total
//! function of (state, input); applying the same upsert twice leaves the same
//! state.

use carla_protocol::{
    ConnectionEnds, ConnectionId, CustomData, EngineRuntime, InternalParams, MidiProgram, ParamId,
    ParameterMetadata, ParameterRanges, ParameterRuntime, Peaks, PluginCounts, PluginDescriptor,
    PluginId, PortCounts, PortRef, ProgramCounts,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Plugin {
    pub id: PluginId,
    pub name: String,
    pub plugin_type: i32,
    pub category: i32,
    pub hints: u32,
    pub unique_id: i64,
    pub options_available: u32,
    pub options_enabled: u32,
    pub filename: String,
    pub icon_name: String,
    pub real_name: String,
    pub label: String,
    pub maker: String,
    pub copyright: String,
    pub ports: Option<PortCounts>,
    pub programs: Option<ProgramCounts>,
    pub custom_data_count: Option<u32>,
    /// `-1` when no program is selected.
    pub current_program: Option<i32>,
    pub current_midi_program: Option<i32>,
    pub program_names: BTreeMap<u32, String>,
    pub midi_programs: BTreeMap<u32, MidiProgram>,
    pub custom_data: BTreeMap<u32, CustomData>,
    pub internal: Option<InternalParams>,
    pub peaks: Option<Peaks>,
}

impl Plugin {
    pub fn new(id: PluginId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    fn apply_descriptor(&mut self, d: &PluginDescriptor) {
        self.name.clone_from(&d.name);
        self.plugin_type = d.plugin_type;
        self.category = d.category;
        self.hints = d.hints;
        self.unique_id = d.unique_id;
        self.options_available = d.options_available;
        self.options_enabled = d.options_enabled;
        self.filename.clone_from(&d.filename);
        self.icon_name.clone_from(&d.icon_name);
        self.real_name.clone_from(&d.real_name);
        self.label.clone_from(&d.label);
        self.maker.clone_from(&d.maker);
        self.copyright.clone_from(&d.copyright);
    }

    /// Drops table entries at or beyond the new counts.
    fn apply_program_counts(&mut self, counts: ProgramCounts) {
        self.program_names.retain(|i, _| *i < counts.programs);
        self.midi_programs.retain(|i, _| *i < counts.midi_programs);
        self.programs = Some(counts);
    }

    fn apply_custom_data_count(&mut self, count: u32) {
        self.custom_data.retain(|i, _| *i < count);
        self.custom_data_count = Some(count);
    }

    fn accepts_program(&self, index: u32) -> bool {
        self.programs.map_or(true, |c| index < c.programs)
    }

    fn accepts_midi_program(&self, index: u32) -> bool {
        self.programs.map_or(true, |c| index < c.midi_programs)
    }
}

/// Parameter state accumulated from up to four message kinds. `None` means
/// the field has not been reported yet. Runtime and value messages both carry
/// `value`; whichever arrives last wins.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Parameter {
    pub plugin: PluginId,
    pub id: ParamId,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub comment: Option<String>,
    pub group_name: Option<String>,
    pub param_type: Option<i32>,
    pub hints: Option<u32>,
    pub midi_channel: Option<i32>,
    pub mapped_control_index: Option<i32>,
    pub mapped_minimum: Option<f32>,
    pub mapped_maximum: Option<f32>,
    pub default: Option<f32>,
    pub minimum: Option<f32>,
    pub maximum: Option<f32>,
    pub step: Option<f32>,
    pub step_small: Option<f32>,
    pub step_large: Option<f32>,
    pub value: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterUpdate {
    Metadata(ParameterMetadata),
    Runtime(ParameterRuntime),
    Ranges(ParameterRanges),
    Value(f32),
}

impl Parameter {
    pub fn new(plugin: PluginId, id: ParamId) -> Self {
        Self {
            plugin,
            id,
            ..Self::default()
        }
    }

    fn merge(&mut self, update: &ParameterUpdate) {
        match update {
            ParameterUpdate::Metadata(m) => {
                self.name = Some(m.name.clone());
                self.unit = Some(m.unit.clone());
                self.comment = Some(m.comment.clone());
                self.group_name = Some(m.group_name.clone());
            }
            ParameterUpdate::Runtime(r) => {
                self.param_type = Some(r.param_type);
                self.hints = Some(r.hints);
                self.midi_channel = Some(r.midi_channel);
                self.mapped_control_index = Some(r.mapped_control_index);
                self.mapped_minimum = Some(r.mapped_minimum);
                self.mapped_maximum = Some(r.mapped_maximum);
                self.value = Some(r.value);
            }
            ParameterUpdate::Ranges(r) => {
                self.default = Some(r.default);
                self.minimum = Some(r.minimum);
                self.maximum = Some(r.maximum);
                self.step = Some(r.step);
                self.step_small = Some(r.step_small);
                self.step_large = Some(r.step_large);
            }
            ParameterUpdate::Value(v) => self.value = Some(*v),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PatchbayConnection {
    pub id: ConnectionId,
    pub source: PortRef,
    pub target: PortRef,
    pub source_port_name: Option<String>,
    pub target_port_name: Option<String>,
}

impl From<ConnectionEnds> for PatchbayConnection {
    fn from(ends: ConnectionEnds) -> Self {
        Self {
            id: ends.id(),
            source: ends.source,
            target: ends.target,
            source_port_name: None,
            target_port_name: None,
        }
    }
}

impl PatchbayConnection {
    pub fn touches(&self, plugin: PluginId) -> bool {
        self.source.plugin == plugin || self.target.plugin == plugin
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum EngineValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

pub type EngineInfo = BTreeMap<String, EngineValue>;

pub fn engine_info_from_runtime(rt: &EngineRuntime) -> EngineInfo {
    BTreeMap::from([
        ("load".to_string(), EngineValue::Float(f64::from(rt.load))),
        ("xruns".to_string(), EngineValue::Int(i64::from(rt.xruns))),
        ("playing".to_string(), EngineValue::Bool(rt.playing)),
        ("frame".to_string(), EngineValue::Int(rt.frame)),
        ("bar".to_string(), EngineValue::Int(i64::from(rt.bar))),
        ("beat".to_string(), EngineValue::Int(i64::from(rt.beat))),
        ("tick".to_string(), EngineValue::Int(i64::from(rt.tick))),
        ("bpm".to_string(), EngineValue::Float(f64::from(rt.bpm))),
    ])
}

/// Everything taken out by [`EntityStore::remove_plugin`], enough to put it back.
/// `plugin` is `None` when only parameters or connections were known.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedPlugin {
    pub plugin: Option<Plugin>,
    pub parameters: Vec<Parameter>,
    pub connections: Vec<PatchbayConnection>,
}

#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    plugins: BTreeMap<PluginId, Plugin>,
    parameters: BTreeMap<(PluginId, ParamId), Parameter>,
    connections: BTreeMap<ConnectionId, PatchbayConnection>,
    engine: EngineInfo,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin(&self, id: PluginId) -> Option<&Plugin> {
        self.plugins.get(&id)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.values()
    }

    pub fn parameter(&self, plugin: PluginId, param: ParamId) -> Option<&Parameter> {
        self.parameters.get(&(plugin, param))
    }

    pub fn parameters_of(&self, plugin: PluginId) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .range((plugin, ParamId(0))..=(plugin, ParamId(u32::MAX)))
            .map(|(_, p)| p)
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&PatchbayConnection> {
        self.connections.get(id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &PatchbayConnection> {
        self.connections.values()
    }

    pub fn engine_info(&self) -> &EngineInfo {
        &self.engine
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
            && self.parameters.is_empty()
            && self.connections.is_empty()
            && self.engine.is_empty()
    }

    fn plugin_entry(&mut self, id: PluginId) -> &mut Plugin {
        self.plugins.entry(id).or_insert_with(|| Plugin::new(id))
    }

    pub fn upsert_descriptor(&mut self, descriptor: &PluginDescriptor) {
        self.plugin_entry(descriptor.plugin).apply_descriptor(descriptor);
    }

    /// Registers a plugin announced by name only; a later descriptor fills the rest.
    pub fn ensure_plugin(&mut self, id: PluginId, name: &str) {
        let plugin = self.plugin_entry(id);
        if plugin.name.is_empty() {
            plugin.name = name.to_string();
        }
    }

    pub fn set_port_counts(&mut self, id: PluginId, counts: PortCounts) {
        self.plugin_entry(id).ports = Some(counts);
    }

    pub fn set_program_counts(&mut self, id: PluginId, counts: ProgramCounts) {
        self.plugin_entry(id).apply_program_counts(counts);
    }

    pub fn set_plugin_counts(&mut self, id: PluginId, counts: PluginCounts) {
        let plugin = self.plugin_entry(id);
        plugin.apply_program_counts(ProgramCounts {
            programs: counts.programs,
            midi_programs: counts.midi_programs,
        });
        plugin.apply_custom_data_count(counts.custom_data);
        plugin.current_program = Some(counts.current_program);
        plugin.current_midi_program = Some(counts.current_midi_program);
    }

    /// Ignored when `index` is past a known program count.
    pub fn set_program_name(&mut self, id: PluginId, index: u32, name: String) -> bool {
        let plugin = self.plugin_entry(id);
        if !plugin.accepts_program(index) {
            return false;
        }
        plugin.program_names.insert(index, name);
        true
    }

    pub fn set_midi_program(&mut self, id: PluginId, index: u32, program: MidiProgram) -> bool {
        let plugin = self.plugin_entry(id);
        if !plugin.accepts_midi_program(index) {
            return false;
        }
        plugin.midi_programs.insert(index, program);
        true
    }

    pub fn set_custom_data(&mut self, id: PluginId, index: u32, data: CustomData) -> bool {
        let plugin = self.plugin_entry(id);
        if plugin.custom_data_count.is_some_and(|n| index >= n) {
            return false;
        }
        plugin.custom_data.insert(index, data);
        true
    }

    pub fn set_peaks(&mut self, id: PluginId, peaks: Peaks) {
        self.plugin_entry(id).peaks = Some(peaks);
    }

    pub fn set_internal_params(&mut self, id: PluginId, params: InternalParams) {
        self.plugin_entry(id).internal = Some(params);
    }

    /// Non-destructive upsert: creates the parameter with empty fields if
    /// needed and overwrites only the fields carried by `update`.
    pub fn merge_parameter(&mut self, plugin: PluginId, param: ParamId, update: &ParameterUpdate) {
        self.parameters
            .entry((plugin, param))
            .or_insert_with(|| Parameter::new(plugin, param))
            .merge(update);
    }

    pub fn clear_parameter_value(&mut self, plugin: PluginId, param: ParamId) {
        if let Some(p) = self.parameters.get_mut(&(plugin, param)) {
            p.value = None;
        }
    }

    /// Removes the plugin, its parameters and every connection touching it,
    /// whether or not a plugin record exists. Returns `None` if there was
    /// nothing to remove.
    pub fn remove_plugin(&mut self, id: PluginId) -> Option<RemovedPlugin> {
        let plugin = self.plugins.remove(&id);

        let keys: Vec<_> = self.parameters_of(id).map(|p| (p.plugin, p.id)).collect();
        let parameters: Vec<_> = keys
            .into_iter()
            .filter_map(|k| self.parameters.remove(&k))
            .collect();

        let mut connections = Vec::new();
        self.connections.retain(|_, c| {
            if c.touches(id) {
                connections.push(c.clone());
                false
            } else {
                true
            }
        });

        if plugin.is_none() && parameters.is_empty() && connections.is_empty() {
            return None;
        }
        Some(RemovedPlugin {
            plugin,
            parameters,
            connections,
        })
    }

    pub fn restore_plugin(&mut self, removed: RemovedPlugin) {
        if let Some(plugin) = removed.plugin {
            self.plugins.insert(plugin.id, plugin);
        }
        for p in removed.parameters {
            self.parameters.insert((p.plugin, p.id), p);
        }
        for c in removed.connections {
            self.connections.insert(c.id.clone(), c);
        }
    }

    /// Returns `false` if a connection with the same id already exists.
    pub fn insert_connection(&mut self, connection: PatchbayConnection) -> bool {
        if self.connections.contains_key(&connection.id) {
            return false;
        }
        self.connections.insert(connection.id.clone(), connection);
        true
    }

    pub fn remove_connection(&mut self, id: &ConnectionId) -> Option<PatchbayConnection> {
        self.connections.remove(id)
    }

    pub fn replace_engine_info(&mut self, info: EngineInfo) {
        self.engine = info;
    }

    pub fn clear(&mut self) {
        self.plugins.clear();
        self.parameters.clear();
        self.connections.clear();
        self.engine.clear();
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            plugins: self
                .plugins()
                .map(|p| PluginSnapshot {
                    plugin: p.clone(),
                    parameters: self.parameters_of(p.id).cloned().collect(),
                })
                .collect(),
            orphan_parameters: self
                .parameters
                .values()
                .filter(|p| !self.plugins.contains_key(&p.plugin))
                .cloned()
                .collect(),
            connections: self.connections().cloned().collect(),
            engine: self.engine.clone(),
        }
    }
}

/// Serializable copy of the store for printing.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub plugins: Vec<PluginSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orphan_parameters: Vec<Parameter>,
    pub connections: Vec<PatchbayConnection>,
    pub engine: EngineInfo,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PluginSnapshot {
    #[serde(flatten)]
    pub plugin: Plugin,
    pub parameters: Vec<Parameter>,
}
