//! State enumerations shared across the TMC control tree.
//!
//! Every subarray-like device exposes an `obsState` attribute, every device
//! exposes `State` and `healthState`. The numeric codes match the wire-level
//! enum values delivered in change events, so decoders can normalize either
//! the integer or the string form to the same variant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Observation state of a subarray-like device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i64)]
pub enum ObsState {
    /// No resources assigned
    Empty = 0,
    /// Resource assignment in progress
    Resourcing = 1,
    /// Resources assigned, not configured
    Idle = 2,
    /// Configuration in progress
    Configuring = 3,
    /// Configured and ready to scan
    Ready = 4,
    /// Scan in progress
    Scanning = 5,
    /// Abort in progress
    Aborting = 6,
    /// Aborted, resources still assigned
    Aborted = 7,
    /// ObsReset in progress
    Resetting = 8,
    /// Unrecoverable observation fault
    Fault = 9,
    /// Restart in progress
    Restarting = 10,
}

impl ObsState {
    /// All variants, indexed by wire code.
    pub const ALL: [ObsState; 11] = [
        ObsState::Empty,
        ObsState::Resourcing,
        ObsState::Idle,
        ObsState::Configuring,
        ObsState::Ready,
        ObsState::Scanning,
        ObsState::Aborting,
        ObsState::Aborted,
        ObsState::Resetting,
        ObsState::Fault,
        ObsState::Restarting,
    ];

    /// Canonical upper-case name as used in test expectations.
    pub fn name(self) -> &'static str {
        match self {
            ObsState::Empty => "EMPTY",
            ObsState::Resourcing => "RESOURCING",
            ObsState::Idle => "IDLE",
            ObsState::Configuring => "CONFIGURING",
            ObsState::Ready => "READY",
            ObsState::Scanning => "SCANNING",
            ObsState::Aborting => "ABORTING",
            ObsState::Aborted => "ABORTED",
            ObsState::Resetting => "RESETTING",
            ObsState::Fault => "FAULT",
            ObsState::Restarting => "RESTARTING",
        }
    }

    /// Wire-level enum code.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Decode from a wire-level enum code.
    pub fn from_code(code: i64) -> Option<ObsState> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }
}

impl fmt::Display for ObsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObsState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown obsState '{s}'"))
    }
}

/// Operational state of a device (the Tango-style `State` attribute).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    /// Device is powered on and operational
    On,
    /// Device is powered off
    Off,
    /// Device is in low-power standby
    Standby,
    /// Device is initialising
    Init,
    /// Device reported a fault
    Fault,
    /// Device raised an alarm
    Alarm,
    /// Device is moving (dish-type devices)
    Moving,
    /// Device is administratively disabled
    Disable,
    /// State could not be determined
    Unknown,
}

impl DeviceState {
    /// All variants.
    pub const ALL: [DeviceState; 9] = [
        DeviceState::On,
        DeviceState::Off,
        DeviceState::Standby,
        DeviceState::Init,
        DeviceState::Fault,
        DeviceState::Alarm,
        DeviceState::Moving,
        DeviceState::Disable,
        DeviceState::Unknown,
    ];

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            DeviceState::On => "ON",
            DeviceState::Off => "OFF",
            DeviceState::Standby => "STANDBY",
            DeviceState::Init => "INIT",
            DeviceState::Fault => "FAULT",
            DeviceState::Alarm => "ALARM",
            DeviceState::Moving => "MOVING",
            DeviceState::Disable => "DISABLE",
            DeviceState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown device state '{s}'"))
    }
}

/// Health roll-up reported by the `healthState` attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i64)]
pub enum HealthState {
    /// Functioning normally
    Ok = 0,
    /// Functioning with reduced capability
    Degraded = 1,
    /// Not functioning
    Failed = 2,
    /// Health could not be determined
    Unknown = 3,
}

impl HealthState {
    /// All variants, indexed by wire code.
    pub const ALL: [HealthState; 4] = [
        HealthState::Ok,
        HealthState::Degraded,
        HealthState::Failed,
        HealthState::Unknown,
    ];

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            HealthState::Ok => "OK",
            HealthState::Degraded => "DEGRADED",
            HealthState::Failed => "FAILED",
            HealthState::Unknown => "UNKNOWN",
        }
    }

    /// Decode from a wire-level enum code.
    pub fn from_code(code: i64) -> Option<HealthState> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HealthState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown healthState '{s}'"))
    }
}
