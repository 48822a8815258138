//! Host -> client messages.
//!
//! Every known address has one [`Schema`] entry listing the argument kinds it
//! expects and the constructor for its [`InboundEvent`]. Decoding validates
//! arity and argument kinds before anything is built; unknown addresses decode
//! to `Ok(None)` so newer hosts can add messages without breaking old clients.

use crate::{ConnectionEnds, ConnectionId, CorrelationId, ParamId, PluginId};
use rosc::{OscMessage, OscType};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod address {
    pub const INFO: &str = "/ctrl/info";
    pub const PORTS: &str = "/ctrl/ports";
    pub const PROGRAM_COUNT: &str = "/ctrl/pcount";
    pub const COUNTS: &str = "/ctrl/count";
    pub const PROGRAM_NAME: &str = "/ctrl/prog";
    pub const MIDI_PROGRAM: &str = "/ctrl/mprog";
    pub const CUSTOM_DATA: &str = "/ctrl/cdata";
    pub const INTERNAL_PARAMS: &str = "/ctrl/iparams";
    pub const PARAM_INFO: &str = "/ctrl/paramInfo";
    pub const PARAM_DATA: &str = "/ctrl/paramData";
    pub const PARAM_RANGES: &str = "/ctrl/paramRanges";
    pub const PARAM_VALUE: &str = "/ctrl/paramVal";
    /// Short form of `PARAM_VALUE` sent by some hosts on the realtime path.
    pub const PARAM_VALUE_SHORT: &str = "/ctrl/param";
    pub const PEAKS: &str = "/ctrl/peaks";
    pub const CALLBACK: &str = "/ctrl/cb";
    pub const RESPONSE: &str = "/ctrl/resp";
    pub const RUNTIME: &str = "/ctrl/runtime";
    pub const EXIT: &str = "/ctrl/exit";
    pub const EXIT_ERROR: &str = "/ctrl/exit-error";
}

pub const ACTION_PLUGIN_ADDED: i32 = 1;
pub const ACTION_PLUGIN_REMOVED: i32 = 2;
pub const ACTION_PORTS_CONNECTED: i32 = 3;
pub const ACTION_PORTS_DISCONNECTED: i32 = 4;
pub const ACTION_PARAMETER_VALUE_CHANGED: i32 = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("{address}: expected at least {expected} arguments, got {got}")]
    Arity {
        address: String,
        expected: usize,
        got: usize,
    },
    #[error("{address}: argument {index} should be {expected}, got {got}")]
    ArgType {
        address: String,
        index: usize,
        expected: ArgKind,
        got: String,
    },
    #[error("{address}: argument {index} out of range ({value})")]
    OutOfRange {
        address: String,
        index: usize,
        value: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Int,
    Long,
    Float,
    Flag,
    Text,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArgKind::Int => "int",
            ArgKind::Long => "long",
            ArgKind::Float => "float",
            ArgKind::Flag => "flag",
            ArgKind::Text => "string",
        };
        f.write_str(s)
    }
}

impl ArgKind {
    /// Numbers coerce freely between int/long/float/bool; strings never do.
    fn accepts(self, arg: &OscType) -> bool {
        match self {
            ArgKind::Text => matches!(arg, OscType::String(_)),
            ArgKind::Int | ArgKind::Long | ArgKind::Float | ArgKind::Flag => {
                numeric(arg).is_some()
            }
        }
    }
}

fn numeric(arg: &OscType) -> Option<f64> {
    match arg {
        OscType::Int(v) => Some(f64::from(*v)),
        OscType::Long(v) => Some(*v as f64),
        OscType::Float(v) => Some(f64::from(*v)),
        OscType::Double(v) => Some(*v),
        OscType::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn type_name(arg: &OscType) -> String {
    let name = match arg {
        OscType::Int(_) => "int",
        OscType::Long(_) => "long",
        OscType::Float(_) => "float",
        OscType::Double(_) => "double",
        OscType::Bool(_) => "bool",
        OscType::String(_) => "string",
        OscType::Blob(_) => "blob",
        OscType::Nil => "nil",
        _ => "other",
    };
    name.to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PluginDescriptor {
    pub plugin: PluginId,
    pub plugin_type: i32,
    pub category: i32,
    pub hints: u32,
    pub unique_id: i64,
    pub options_available: u32,
    pub options_enabled: u32,
    pub name: String,
    pub filename: String,
    pub icon_name: String,
    pub real_name: String,
    pub label: String,
    pub maker: String,
    pub copyright: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortCounts {
    pub audio_ins: u32,
    pub audio_outs: u32,
    pub midi_ins: u32,
    pub midi_outs: u32,
    pub cv_ins: u32,
    pub cv_outs: u32,
    pub param_total: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramCounts {
    pub programs: u32,
    pub midi_programs: u32,
}

/// Program, MIDI program and custom-data counts plus the current selections.
/// `-1` means nothing is selected.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PluginCounts {
    pub programs: u32,
    pub midi_programs: u32,
    pub custom_data: u32,
    pub current_program: i32,
    pub current_midi_program: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct MidiProgram {
    pub bank: u32,
    pub program: u32,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomData {
    pub data_type: String,
    pub key: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Peaks {
    pub in_left: f32,
    pub in_right: f32,
    pub out_left: f32,
    pub out_right: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct InternalParams {
    pub active: bool,
    pub dry_wet: f32,
    pub volume: f32,
    pub balance_left: f32,
    pub balance_right: f32,
    pub panning: f32,
    pub ctrl_channel: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ParameterMetadata {
    pub name: String,
    pub unit: String,
    pub comment: String,
    pub group_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ParameterRuntime {
    pub param_type: i32,
    pub hints: u32,
    pub midi_channel: i32,
    pub mapped_control_index: i32,
    pub mapped_minimum: f32,
    pub mapped_maximum: f32,
    pub value: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ParameterRanges {
    pub default: f32,
    pub minimum: f32,
    pub maximum: f32,
    pub step: f32,
    pub step_small: f32,
    pub step_large: f32,
}

/// Generic engine callback: an action code plus a loosely-typed payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Callback {
    pub action: i32,
    pub int1: i32,
    pub int2: i32,
    pub int3: i32,
    pub float: f32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    PluginAdded { plugin: PluginId, name: String },
    PluginRemoved(PluginId),
    PortsConnected(ConnectionEnds),
    PortsDisconnected(ConnectionId),
    ParameterValueChanged {
        plugin: PluginId,
        param: ParamId,
        value: f32,
    },
    Other(i32),
}

impl Callback {
    /// Interprets the payload for the action codes this client understands.
    ///
    /// Returns `None` when the payload is malformed for its action code
    /// (negative ids, unparseable connection ids); such callbacks are dropped.
    pub fn interpret(&self) -> Option<CallbackAction> {
        let id = |v: i32| u32::try_from(v).ok();
        match self.action {
            ACTION_PLUGIN_ADDED => Some(CallbackAction::PluginAdded {
                plugin: PluginId(id(self.int1)?),
                name: self.text.clone(),
            }),
            ACTION_PLUGIN_REMOVED => Some(CallbackAction::PluginRemoved(PluginId(id(self.int1)?))),
            ACTION_PORTS_CONNECTED => self.text.parse().ok().map(CallbackAction::PortsConnected),
            ACTION_PORTS_DISCONNECTED => {
                let connection = match self.text.parse::<ConnectionEnds>() {
                    Ok(ends) => ends.id(),
                    Err(_) if !self.text.trim().is_empty() => ConnectionId::raw(self.text.trim()),
                    Err(_) => ConnectionId::raw(self.int1.to_string()),
                };
                Some(CallbackAction::PortsDisconnected(connection))
            }
            ACTION_PARAMETER_VALUE_CHANGED => Some(CallbackAction::ParameterValueChanged {
                plugin: PluginId(id(self.int1)?),
                param: ParamId(id(self.int2)?),
                value: self.float,
            }),
            other => Some(CallbackAction::Other(other)),
        }
    }
}

/// Periodic engine status; lands in the engine-info bag.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineRuntime {
    pub load: f32,
    pub xruns: i32,
    pub playing: bool,
    pub frame: i64,
    pub bar: i32,
    pub beat: i32,
    pub tick: i32,
    pub bpm: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    PluginDescriptor(PluginDescriptor),
    PortCounts {
        plugin: PluginId,
        counts: PortCounts,
    },
    ProgramCounts {
        plugin: PluginId,
        counts: ProgramCounts,
    },
    PluginCounts {
        plugin: PluginId,
        counts: PluginCounts,
    },
    ProgramName {
        plugin: PluginId,
        index: u32,
        name: String,
    },
    MidiProgram {
        plugin: PluginId,
        index: u32,
        program: MidiProgram,
    },
    CustomData {
        plugin: PluginId,
        index: u32,
        data: CustomData,
    },
    InternalParams {
        plugin: PluginId,
        params: InternalParams,
    },
    ParameterMetadata {
        plugin: PluginId,
        param: ParamId,
        metadata: ParameterMetadata,
    },
    ParameterRuntime {
        plugin: PluginId,
        param: ParamId,
        runtime: ParameterRuntime,
    },
    ParameterRanges {
        plugin: PluginId,
        param: ParamId,
        ranges: ParameterRanges,
    },
    ParameterValue {
        plugin: PluginId,
        param: ParamId,
        value: f32,
    },
    Peaks {
        plugin: PluginId,
        peaks: Peaks,
    },
    Callback(Callback),
    Response {
        correlation_id: CorrelationId,
        error: Option<String>,
    },
    EngineRuntime(EngineRuntime),
    HostExit,
    HostExitError {
        reason: String,
    },
}

/// Positional view over a message's arguments with coercing accessors.
struct Args<'a> {
    address: &'a str,
    values: &'a [OscType],
}

impl<'a> Args<'a> {
    fn at(&self, index: usize) -> Result<&'a OscType, DecodeError> {
        self.values.get(index).ok_or_else(|| DecodeError::Arity {
            address: self.address.to_string(),
            expected: index + 1,
            got: self.values.len(),
        })
    }

    fn mismatch(&self, index: usize, expected: ArgKind, got: &OscType) -> DecodeError {
        DecodeError::ArgType {
            address: self.address.to_string(),
            index,
            expected,
            got: type_name(got),
        }
    }

    fn out_of_range(&self, index: usize, value: i64) -> DecodeError {
        DecodeError::OutOfRange {
            address: self.address.to_string(),
            index,
            value,
        }
    }

    fn long(&self, index: usize) -> Result<i64, DecodeError> {
        match self.at(index)? {
            OscType::Long(v) => Ok(*v),
            OscType::Int(v) => Ok(i64::from(*v)),
            other => numeric(other)
                .map(|v| v as i64)
                .ok_or_else(|| self.mismatch(index, ArgKind::Long, other)),
        }
    }

    fn int(&self, index: usize) -> Result<i32, DecodeError> {
        let v = self.long(index).map_err(|e| match e {
            DecodeError::ArgType { got, .. } => DecodeError::ArgType {
                address: self.address.to_string(),
                index,
                expected: ArgKind::Int,
                got,
            },
            other => other,
        })?;
        i32::try_from(v).map_err(|_| self.out_of_range(index, v))
    }

    fn count(&self, index: usize) -> Result<u32, DecodeError> {
        let v = self.int(index)?;
        u32::try_from(v).map_err(|_| self.out_of_range(index, i64::from(v)))
    }

    fn bits(&self, index: usize) -> Result<u32, DecodeError> {
        Ok(self.int(index)? as u32)
    }

    fn plugin(&self, index: usize) -> Result<PluginId, DecodeError> {
        self.count(index).map(PluginId)
    }

    fn param(&self, index: usize) -> Result<ParamId, DecodeError> {
        self.count(index).map(ParamId)
    }

    fn float(&self, index: usize) -> Result<f32, DecodeError> {
        let arg = self.at(index)?;
        numeric(arg)
            .map(|v| v as f32)
            .ok_or_else(|| self.mismatch(index, ArgKind::Float, arg))
    }

    fn flag(&self, index: usize) -> Result<bool, DecodeError> {
        let arg = self.at(index)?;
        numeric(arg)
            .map(|v| v != 0.0)
            .ok_or_else(|| self.mismatch(index, ArgKind::Flag, arg))
    }

    fn text(&self, index: usize) -> Result<String, DecodeError> {
        match self.at(index)? {
            OscType::String(s) => Ok(s.clone()),
            other => Err(self.mismatch(index, ArgKind::Text, other)),
        }
    }
}

type Build = fn(&Args<'_>) -> Result<InboundEvent, DecodeError>;

struct Schema {
    address: &'static str,
    args: &'static [ArgKind],
    build: Build,
}

use ArgKind::{Flag, Float, Int, Long, Text};

const SCHEMAS: &[Schema] = &[
    Schema {
        address: address::INFO,
        args: &[Int, Int, Int, Int, Long, Int, Int, Text, Text, Text, Text, Text, Text, Text],
        build: build_info,
    },
    Schema {
        address: address::PORTS,
        args: &[Int, Int, Int, Int, Int, Int, Int, Int],
        build: build_ports,
    },
    Schema {
        address: address::PROGRAM_COUNT,
        args: &[Int, Int, Int],
        build: build_program_count,
    },
    Schema {
        address: address::COUNTS,
        args: &[Int, Int, Int, Int, Int, Int],
        build: build_counts,
    },
    Schema {
        address: address::PROGRAM_NAME,
        args: &[Int, Int, Text],
        build: |a| {
            Ok(InboundEvent::ProgramName {
                plugin: a.plugin(0)?,
                index: a.count(1)?,
                name: a.text(2)?,
            })
        },
    },
    Schema {
        address: address::MIDI_PROGRAM,
        args: &[Int, Int, Int, Int, Text],
        build: |a| {
            Ok(InboundEvent::MidiProgram {
                plugin: a.plugin(0)?,
                index: a.count(1)?,
                program: MidiProgram {
                    bank: a.count(2)?,
                    program: a.count(3)?,
                    name: a.text(4)?,
                },
            })
        },
    },
    Schema {
        address: address::CUSTOM_DATA,
        args: &[Int, Int, Text, Text, Text],
        build: |a| {
            Ok(InboundEvent::CustomData {
                plugin: a.plugin(0)?,
                index: a.count(1)?,
                data: CustomData {
                    data_type: a.text(2)?,
                    key: a.text(3)?,
                    value: a.text(4)?,
                },
            })
        },
    },
    Schema {
        address: address::INTERNAL_PARAMS,
        args: &[Int, Flag, Float, Float, Float, Float, Float, Int],
        build: build_internal_params,
    },
    Schema {
        address: address::PARAM_INFO,
        args: &[Int, Int, Text, Text, Text, Text],
        build: build_param_info,
    },
    Schema {
        address: address::PARAM_DATA,
        args: &[Int, Int, Int, Int, Int, Int, Float, Float, Float],
        build: build_param_data,
    },
    Schema {
        address: address::PARAM_RANGES,
        args: &[Int, Int, Float, Float, Float, Float, Float, Float],
        build: build_param_ranges,
    },
    Schema {
        address: address::PARAM_VALUE,
        args: &[Int, Int, Float],
        build: build_param_value,
    },
    Schema {
        address: address::PARAM_VALUE_SHORT,
        args: &[Int, Int, Float],
        build: build_param_value,
    },
    Schema {
        address: address::PEAKS,
        args: &[Int, Float, Float, Float, Float],
        build: |a| {
            Ok(InboundEvent::Peaks {
                plugin: a.plugin(0)?,
                peaks: Peaks {
                    in_left: a.float(1)?,
                    in_right: a.float(2)?,
                    out_left: a.float(3)?,
                    out_right: a.float(4)?,
                },
            })
        },
    },
    Schema {
        address: address::CALLBACK,
        args: &[Int, Int, Int, Int, Float, Text],
        build: build_callback,
    },
    Schema {
        address: address::RESPONSE,
        args: &[Int, Text],
        build: build_response,
    },
    Schema {
        address: address::RUNTIME,
        args: &[Float, Int, Flag, Long, Int, Int, Int, Float],
        build: build_runtime,
    },
    Schema {
        address: address::EXIT,
        args: &[],
        build: |_| Ok(InboundEvent::HostExit),
    },
    Schema {
        address: address::EXIT_ERROR,
        args: &[Text],
        build: |a| {
            Ok(InboundEvent::HostExitError {
                reason: a.text(0)?,
            })
        },
    },
];

fn build_info(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::PluginDescriptor(PluginDescriptor {
        plugin: a.plugin(0)?,
        plugin_type: a.int(1)?,
        category: a.int(2)?,
        hints: a.bits(3)?,
        unique_id: a.long(4)?,
        options_available: a.bits(5)?,
        options_enabled: a.bits(6)?,
        name: a.text(7)?,
        filename: a.text(8)?,
        icon_name: a.text(9)?,
        real_name: a.text(10)?,
        label: a.text(11)?,
        maker: a.text(12)?,
        copyright: a.text(13)?,
    }))
}

fn build_ports(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::PortCounts {
        plugin: a.plugin(0)?,
        counts: PortCounts {
            audio_ins: a.count(1)?,
            audio_outs: a.count(2)?,
            midi_ins: a.count(3)?,
            midi_outs: a.count(4)?,
            cv_ins: a.count(5)?,
            cv_outs: a.count(6)?,
            param_total: a.count(7)?,
        },
    })
}

fn build_program_count(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::ProgramCounts {
        plugin: a.plugin(0)?,
        counts: ProgramCounts {
            programs: a.count(1)?,
            midi_programs: a.count(2)?,
        },
    })
}

fn build_counts(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::PluginCounts {
        plugin: a.plugin(0)?,
        counts: PluginCounts {
            programs: a.count(1)?,
            midi_programs: a.count(2)?,
            custom_data: a.count(3)?,
            current_program: a.int(4)?,
            current_midi_program: a.int(5)?,
        },
    })
}

fn build_internal_params(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::InternalParams {
        plugin: a.plugin(0)?,
        params: InternalParams {
            active: a.flag(1)?,
            dry_wet: a.float(2)?,
            volume: a.float(3)?,
            balance_left: a.float(4)?,
            balance_right: a.float(5)?,
            panning: a.float(6)?,
            ctrl_channel: a.int(7)?,
        },
    })
}

fn build_param_info(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::ParameterMetadata {
        plugin: a.plugin(0)?,
        param: a.param(1)?,
        metadata: ParameterMetadata {
            name: a.text(2)?,
            unit: a.text(3)?,
            comment: a.text(4)?,
            group_name: a.text(5)?,
        },
    })
}

fn build_param_data(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::ParameterRuntime {
        plugin: a.plugin(0)?,
        param: a.param(1)?,
        runtime: ParameterRuntime {
            param_type: a.int(2)?,
            hints: a.bits(3)?,
            midi_channel: a.int(4)?,
            mapped_control_index: a.int(5)?,
            mapped_minimum: a.float(6)?,
            mapped_maximum: a.float(7)?,
            value: a.float(8)?,
        },
    })
}

fn build_param_ranges(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::ParameterRanges {
        plugin: a.plugin(0)?,
        param: a.param(1)?,
        ranges: ParameterRanges {
            default: a.float(2)?,
            minimum: a.float(3)?,
            maximum: a.float(4)?,
            step: a.float(5)?,
            step_small: a.float(6)?,
            step_large: a.float(7)?,
        },
    })
}

fn build_param_value(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::ParameterValue {
        plugin: a.plugin(0)?,
        param: a.param(1)?,
        value: a.float(2)?,
    })
}

fn build_callback(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::Callback(Callback {
        action: a.int(0)?,
        int1: a.int(1)?,
        int2: a.int(2)?,
        int3: a.int(3)?,
        float: a.float(4)?,
        text: a.text(5)?,
    }))
}

fn build_response(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    let error = a.text(1)?;
    Ok(InboundEvent::Response {
        correlation_id: CorrelationId(a.int(0)?),
        error: (!error.is_empty()).then_some(error),
    })
}

fn build_runtime(a: &Args<'_>) -> Result<InboundEvent, DecodeError> {
    Ok(InboundEvent::EngineRuntime(EngineRuntime {
        load: a.float(0)?,
        xruns: a.int(1)?,
        playing: a.flag(2)?,
        frame: a.long(3)?,
        bar: a.int(4)?,
        beat: a.int(5)?,
        tick: a.int(6)?,
        bpm: a.float(7)?,
    }))
}

/// Returns true if `address` is one of the inbound messages this client understands.
pub fn is_known_address(address: &str) -> bool {
    SCHEMAS.iter().any(|s| s.address == address)
}

impl InboundEvent {
    /// Decodes one message. `Ok(None)` means the address is not in the table.
    ///
    /// Trailing arguments beyond the schema are ignored.
    pub fn decode(msg: &OscMessage) -> Result<Option<Self>, DecodeError> {
        let Some(schema) = SCHEMAS.iter().find(|s| s.address == msg.addr) else {
            return Ok(None);
        };

        if msg.args.len() < schema.args.len() {
            return Err(DecodeError::Arity {
                address: msg.addr.clone(),
                expected: schema.args.len(),
                got: msg.args.len(),
            });
        }

        for (index, (kind, arg)) in schema.args.iter().zip(&msg.args).enumerate() {
            if !kind.accepts(arg) {
                return Err(DecodeError::ArgType {
                    address: msg.addr.clone(),
                    index,
                    expected: *kind,
                    got: type_name(arg),
                });
            }
        }

        let args = Args {
            address: &msg.addr,
            values: &msg.args,
        };
        (schema.build)(&args).map(Some)
    }

    /// Encodes the event the way a host puts it on the wire.
    pub fn to_message(&self) -> OscMessage {
        let (addr, args) = match self {
            InboundEvent::PluginDescriptor(d) => (
                address::INFO,
                vec![
                    id_arg(d.plugin.0),
                    OscType::Int(d.plugin_type),
                    OscType::Int(d.category),
                    OscType::Int(d.hints as i32),
                    OscType::Long(d.unique_id),
                    OscType::Int(d.options_available as i32),
                    OscType::Int(d.options_enabled as i32),
                    OscType::String(d.name.clone()),
                    OscType::String(d.filename.clone()),
                    OscType::String(d.icon_name.clone()),
                    OscType::String(d.real_name.clone()),
                    OscType::String(d.label.clone()),
                    OscType::String(d.maker.clone()),
                    OscType::String(d.copyright.clone()),
                ],
            ),
            InboundEvent::PortCounts { plugin, counts } => (
                address::PORTS,
                vec![
                    id_arg(plugin.0),
                    id_arg(counts.audio_ins),
                    id_arg(counts.audio_outs),
                    id_arg(counts.midi_ins),
                    id_arg(counts.midi_outs),
                    id_arg(counts.cv_ins),
                    id_arg(counts.cv_outs),
                    id_arg(counts.param_total),
                ],
            ),
            InboundEvent::ProgramCounts { plugin, counts } => (
                address::PROGRAM_COUNT,
                vec![
                    id_arg(plugin.0),
                    id_arg(counts.programs),
                    id_arg(counts.midi_programs),
                ],
            ),
            InboundEvent::PluginCounts { plugin, counts } => (
                address::COUNTS,
                vec![
                    id_arg(plugin.0),
                    id_arg(counts.programs),
                    id_arg(counts.midi_programs),
                    id_arg(counts.custom_data),
                    OscType::Int(counts.current_program),
                    OscType::Int(counts.current_midi_program),
                ],
            ),
            InboundEvent::ProgramName {
                plugin,
                index,
                name,
            } => (
                address::PROGRAM_NAME,
                vec![id_arg(plugin.0), id_arg(*index), OscType::String(name.clone())],
            ),
            InboundEvent::MidiProgram {
                plugin,
                index,
                program,
            } => (
                address::MIDI_PROGRAM,
                vec![
                    id_arg(plugin.0),
                    id_arg(*index),
                    id_arg(program.bank),
                    id_arg(program.program),
                    OscType::String(program.name.clone()),
                ],
            ),
            InboundEvent::CustomData {
                plugin,
                index,
                data,
            } => (
                address::CUSTOM_DATA,
                vec![
                    id_arg(plugin.0),
                    id_arg(*index),
                    OscType::String(data.data_type.clone()),
                    OscType::String(data.key.clone()),
                    OscType::String(data.value.clone()),
                ],
            ),
            InboundEvent::InternalParams { plugin, params } => (
                address::INTERNAL_PARAMS,
                vec![
                    id_arg(plugin.0),
                    OscType::Float(if params.active { 1.0 } else { 0.0 }),
                    OscType::Float(params.dry_wet),
                    OscType::Float(params.volume),
                    OscType::Float(params.balance_left),
                    OscType::Float(params.balance_right),
                    OscType::Float(params.panning),
                    OscType::Float(params.ctrl_channel as f32),
                ],
            ),
            InboundEvent::ParameterMetadata {
                plugin,
                param,
                metadata,
            } => (
                address::PARAM_INFO,
                vec![
                    id_arg(plugin.0),
                    id_arg(param.0),
                    OscType::String(metadata.name.clone()),
                    OscType::String(metadata.unit.clone()),
                    OscType::String(metadata.comment.clone()),
                    OscType::String(metadata.group_name.clone()),
                ],
            ),
            InboundEvent::ParameterRuntime {
                plugin,
                param,
                runtime,
            } => (
                address::PARAM_DATA,
                vec![
                    id_arg(plugin.0),
                    id_arg(param.0),
                    OscType::Int(runtime.param_type),
                    OscType::Int(runtime.hints as i32),
                    OscType::Int(runtime.midi_channel),
                    OscType::Int(runtime.mapped_control_index),
                    OscType::Float(runtime.mapped_minimum),
                    OscType::Float(runtime.mapped_maximum),
                    OscType::Float(runtime.value),
                ],
            ),
            InboundEvent::ParameterRanges {
                plugin,
                param,
                ranges,
            } => (
                address::PARAM_RANGES,
                vec![
                    id_arg(plugin.0),
                    id_arg(param.0),
                    OscType::Float(ranges.default),
                    OscType::Float(ranges.minimum),
                    OscType::Float(ranges.maximum),
                    OscType::Float(ranges.step),
                    OscType::Float(ranges.step_small),
                    OscType::Float(ranges.step_large),
                ],
            ),
            InboundEvent::ParameterValue {
                plugin,
                param,
                value,
            } => (
                address::PARAM_VALUE,
                vec![id_arg(plugin.0), id_arg(param.0), OscType::Float(*value)],
            ),
            InboundEvent::Peaks { plugin, peaks } => (
                address::PEAKS,
                vec![
                    id_arg(plugin.0),
                    OscType::Float(peaks.in_left),
                    OscType::Float(peaks.in_right),
                    OscType::Float(peaks.out_left),
                    OscType::Float(peaks.out_right),
                ],
            ),
            InboundEvent::Callback(cb) => (
                address::CALLBACK,
                vec![
                    OscType::Int(cb.action),
                    OscType::Int(cb.int1),
                    OscType::Int(cb.int2),
                    OscType::Int(cb.int3),
                    OscType::Float(cb.float),
                    OscType::String(cb.text.clone()),
                ],
            ),
            InboundEvent::Response {
                correlation_id,
                error,
            } => (
                address::RESPONSE,
                vec![
                    OscType::Int(correlation_id.0),
                    OscType::String(error.clone().unwrap_or_default()),
                ],
            ),
            InboundEvent::EngineRuntime(rt) => (
                address::RUNTIME,
                vec![
                    OscType::Float(rt.load),
                    OscType::Int(rt.xruns),
                    OscType::Int(i32::from(rt.playing)),
                    OscType::Long(rt.frame),
                    OscType::Int(rt.bar),
                    OscType::Int(rt.beat),
                    OscType::Int(rt.tick),
                    OscType::Float(rt.bpm),
                ],
            ),
            InboundEvent::HostExit => (address::EXIT, Vec::new()),
            InboundEvent::HostExitError { reason } => {
                (address::EXIT_ERROR, vec![OscType::String(reason.clone())])
            }
        };
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }
}

fn id_arg(v: u32) -> OscType {
    OscType::Int(v as i32)
}
