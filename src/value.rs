//! Normalized attribute values and the attribute decode registry.
//!
//! Remote devices expose attributes of statically-unknown type (enum codes,
//! state labels, string arrays, scalars). Everything read from a device or
//! delivered in a change event is normalized into the [`AttrValue`] tagged
//! union so wait conditions can compare values without caring how the
//! transport encoded them. The [`AttrCodec`] registry maps well-known
//! attribute names to dedicated decoders; unknown attributes fall back to a
//! generic JSON decode.

use crate::error::{SyncError, SyncResult};
use crate::states::{DeviceState, HealthState, ObsState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A normalized attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Boolean attribute
    Bool(bool),
    /// Integer attribute
    Int(i64),
    /// Floating point attribute
    Float(f64),
    /// String attribute
    Str(String),
    /// Operational device state (`State`)
    State(DeviceState),
    /// Observation state (`obsState`)
    Obs(ObsState),
    /// Health roll-up (`healthState`)
    Health(HealthState),
    /// String array (e.g. `longRunningCommandResult`, `assignedResources`)
    StrArray(Vec<String>),
    /// Integer array
    IntArray(Vec<i64>),
}

impl AttrValue {
    /// Compare two values the way wait conditions do.
    ///
    /// Scalars compare by equality. Array-typed values are reduced with an
    /// "all elements equal" check rather than identity. A plain string
    /// matches a state-typed value by case-insensitive name, so a target
    /// supplied as `"IDLE"` matches [`ObsState::Idle`].
    pub fn matches(&self, other: &AttrValue) -> bool {
        use AttrValue::*;
        match (self, other) {
            (StrArray(a), StrArray(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
            }
            (IntArray(a), IntArray(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
            }
            (Str(s), Obs(o)) | (Obs(o), Str(s)) => s.eq_ignore_ascii_case(o.name()),
            (Str(s), State(d)) | (State(d), Str(s)) => s.eq_ignore_ascii_case(d.name()),
            (Str(s), Health(h)) | (Health(h), Str(s)) => s.eq_ignore_ascii_case(h.name()),
            (Int(i), Obs(o)) | (Obs(o), Int(i)) => *i == o.code(),
            (a, b) => a == b,
        }
    }

    /// Extract as a display string where possible.
    pub fn as_str(&self) -> Option<String> {
        match self {
            AttrValue::Str(s) => Some(s.clone()),
            AttrValue::State(d) => Some(d.name().to_string()),
            AttrValue::Obs(o) => Some(o.name().to_string()),
            AttrValue::Health(h) => Some(h.name().to_string()),
            _ => None,
        }
    }

    /// Extract as an observation state where possible.
    pub fn as_obs_state(&self) -> Option<ObsState> {
        match self {
            AttrValue::Obs(o) => Some(*o),
            AttrValue::Int(i) => ObsState::from_code(*i),
            AttrValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::State(d) => f.write_str(d.name()),
            AttrValue::Obs(o) => f.write_str(o.name()),
            AttrValue::Health(h) => f.write_str(h.name()),
            AttrValue::StrArray(a) => write!(f, "{a:?}"),
            AttrValue::IntArray(a) => write!(f, "{a:?}"),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<DeviceState> for AttrValue {
    fn from(value: DeviceState) -> Self {
        AttrValue::State(value)
    }
}

impl From<ObsState> for AttrValue {
    fn from(value: ObsState) -> Self {
        AttrValue::Obs(value)
    }
}

impl From<HealthState> for AttrValue {
    fn from(value: HealthState) -> Self {
        AttrValue::Health(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        AttrValue::StrArray(value)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(value: Vec<i64>) -> Self {
        AttrValue::IntArray(value)
    }
}

/// Decoder from a raw JSON attribute reading to a normalized value.
pub type DecodeFn = fn(&serde_json::Value) -> SyncResult<AttrValue>;

/// Registry of attribute-name → decoder, keyed case-insensitively.
///
/// Replaces reflective "inspect the type at runtime" access with an explicit
/// table. [`AttrCodec::tmc_default`] pre-registers the attributes the wait
/// core is normally pointed at.
pub struct AttrCodec {
    decoders: HashMap<String, DecodeFn>,
}

impl AttrCodec {
    /// Empty registry with only the generic fallback.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry pre-loaded for the standard TMC attribute set.
    pub fn tmc_default() -> Self {
        let mut codec = Self::new();
        codec.register("obsState", decode_obs_state);
        codec.register("State", decode_device_state);
        codec.register("telescopeState", decode_device_state);
        codec.register("healthState", decode_health_state);
        codec.register("longRunningCommandResult", decode_str_array);
        codec.register("assignedResources", decode_str_array);
        codec
    }

    /// Register (or replace) a decoder for an attribute name.
    pub fn register(&mut self, attribute: &str, decode: DecodeFn) {
        self.decoders.insert(attribute.to_ascii_lowercase(), decode);
    }

    /// Decode a raw reading for the named attribute.
    pub fn decode(&self, attribute: &str, raw: &serde_json::Value) -> SyncResult<AttrValue> {
        match self.decoders.get(&attribute.to_ascii_lowercase()) {
            Some(decode) => decode(raw),
            None => decode_generic(attribute, raw),
        }
    }
}

impl Default for AttrCodec {
    fn default() -> Self {
        Self::tmc_default()
    }
}

fn decode_error(attribute: &str, raw: &serde_json::Value) -> SyncError {
    SyncError::AttributeDecode {
        attribute: attribute.to_string(),
        reason: format!("unexpected value {raw}"),
    }
}

fn decode_obs_state(raw: &serde_json::Value) -> SyncResult<AttrValue> {
    let state = match raw {
        serde_json::Value::Number(n) => n.as_i64().and_then(ObsState::from_code),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    };
    state
        .map(AttrValue::Obs)
        .ok_or_else(|| decode_error("obsState", raw))
}

fn decode_device_state(raw: &serde_json::Value) -> SyncResult<AttrValue> {
    match raw {
        serde_json::Value::String(s) => s
            .parse::<DeviceState>()
            .map(AttrValue::State)
            .map_err(|_| decode_error("State", raw)),
        _ => Err(decode_error("State", raw)),
    }
}

fn decode_health_state(raw: &serde_json::Value) -> SyncResult<AttrValue> {
    let state = match raw {
        serde_json::Value::Number(n) => n.as_i64().and_then(HealthState::from_code),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    };
    state
        .map(AttrValue::Health)
        .ok_or_else(|| decode_error("healthState", raw))
}

fn decode_str_array(raw: &serde_json::Value) -> SyncResult<AttrValue> {
    match raw {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => Ok(s.clone()),
                other => Ok(other.to_string()),
            })
            .collect::<SyncResult<Vec<_>>>()
            .map(AttrValue::StrArray),
        serde_json::Value::String(s) => Ok(AttrValue::StrArray(vec![s.clone()])),
        _ => Err(decode_error("longRunningCommandResult", raw)),
    }
}

fn decode_generic(attribute: &str, raw: &serde_json::Value) -> SyncResult<AttrValue> {
    match raw {
        serde_json::Value::Bool(b) => Ok(AttrValue::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(AttrValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(AttrValue::Float(f))
            } else {
                Err(decode_error(attribute, raw))
            }
        }
        serde_json::Value::String(s) => Ok(AttrValue::Str(s.clone())),
        serde_json::Value::Array(items) => {
            if items.iter().all(serde_json::Value::is_i64) {
                Ok(AttrValue::IntArray(
                    items.iter().filter_map(serde_json::Value::as_i64).collect(),
                ))
            } else {
                decode_str_array(raw)
            }
        }
        _ => Err(decode_error(attribute, raw)),
    }
}
