//! Harness configuration.
//!
//! Two concerns live here, both resolved once at startup instead of being
//! read ad hoc mid-test:
//!
//! - [`SyncSettings`]: which telescope is targeted, which subsystems are
//!   simulated, and which wait backend to use. Loaded from an optional TOML
//!   file merged with the conventional environment variables
//!   (`TELESCOPE`, `SDP_SIMULATION_ENABLED`, `CSP_SIMULATION_ENABLED`,
//!   `MCCS_SIMULATION_ENABLED`).
//! - [`Topology`]: the role → device-name table, passed to callers by
//!   dependency injection rather than living as import-time globals.
//!
//! Timeout budgets derive from the simulation flags via
//! [`SyncSettings::timeout_profile`]; real subsystems get longer budgets
//! than simulated ones.

use crate::condition::WaitStrategy;
use crate::error::SyncResult;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Target telescope variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Telescope {
    /// SKA Mid (dish-based)
    Mid,
    /// SKA Low (MCCS-based)
    Low,
}

impl<'de> Deserialize<'de> for Telescope {
    /// Accepts the deployment-name spellings seen in the wild
    /// (`low`, `SKA-low`, `ska_low`, ...); anything else is Mid.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        if name.to_ascii_lowercase().contains("low") {
            Ok(Self::Low)
        } else {
            Ok(Self::Mid)
        }
    }
}

/// Resolved harness settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Telescope variant under test
    pub telescope: Telescope,
    /// SDP is a simulator rather than the real subsystem
    #[serde(deserialize_with = "flag")]
    pub sdp_simulated: bool,
    /// CSP is a simulator rather than the real subsystem
    #[serde(deserialize_with = "flag")]
    pub csp_simulated: bool,
    /// MCCS is a simulator rather than the real subsystem
    #[serde(deserialize_with = "flag")]
    pub mccs_simulated: bool,
    /// Wait backend used by [`crate::waiter::Waiter`]
    pub strategy: WaitStrategy,
}

/// Boolean accepting the environment spellings: `true`/`1`/`yes` in any
/// case are truthy, everything else is false.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct FlagVisitor;

    impl serde::de::Visitor<'_> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a boolean, an integer, or a true/1/yes string")
        }

        fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<bool, E> {
            Ok(matches!(
                v.to_ascii_lowercase().as_str(),
                "true" | "1" | "yes"
            ))
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            telescope: Telescope::Mid,
            sdp_simulated: true,
            csp_simulated: true,
            mccs_simulated: true,
            strategy: WaitStrategy::default(),
        }
    }
}

impl SyncSettings {
    /// Load settings: defaults, then `tmc-sync.toml` if present, then the
    /// environment.
    pub fn load() -> SyncResult<Self> {
        Self::load_from(Path::new("tmc-sync.toml"))
    }

    /// Load settings from a specific TOML file merged with the environment.
    ///
    /// One provider chain: defaults, then the TOML file, then the
    /// conventional environment variables mapped onto the same keys.
    pub fn load_from(path: &Path) -> SyncResult<Self> {
        let env = Env::raw().filter_map(|key| {
            match key.as_str().to_ascii_uppercase().as_str() {
                "TELESCOPE" => Some("telescope".into()),
                "SDP_SIMULATION_ENABLED" => Some("sdp_simulated".into()),
                "CSP_SIMULATION_ENABLED" => Some("csp_simulated".into()),
                "MCCS_SIMULATION_ENABLED" => Some("mccs_simulated".into()),
                _ => None,
            }
        });
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(env)
            .extract()?;
        debug!(?settings, "settings resolved");
        Ok(settings)
    }

    /// Derive the timeout budgets implied by the simulation flags.
    pub fn timeout_profile(&self) -> TimeoutProfile {
        let mut profile = TimeoutProfile::default();
        if !self.csp_simulated || !self.sdp_simulated {
            profile.obs_state = profile.obs_state.max(Duration::from_secs(120));
            profile.command_result = profile.command_result.max(Duration::from_secs(120));
        }
        // A real MCCS is by far the slowest participant.
        if !self.mccs_simulated {
            profile.telescope_state = Duration::from_secs(100);
            profile.obs_state = Duration::from_secs(300);
            profile.command_result = Duration::from_secs(300);
        }
        profile
    }
}

/// Timeout budgets for the common wait categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutProfile {
    /// Budget for telescope State/telescopeState convergence
    #[serde(with = "humantime_serde")]
    pub telescope_state: Duration,
    /// Budget for obsState convergence
    #[serde(with = "humantime_serde")]
    pub obs_state: Duration,
    /// Budget for longRunningCommandResult delivery
    #[serde(with = "humantime_serde")]
    pub command_result: Duration,
    /// Polling resolution
    #[serde(with = "humantime_serde")]
    pub resolution: Duration,
}

impl Default for TimeoutProfile {
    fn default() -> Self {
        Self {
            telescope_state: Duration::from_secs(30),
            obs_state: Duration::from_secs(60),
            command_result: Duration::from_secs(60),
            resolution: Duration::from_millis(100),
        }
    }
}

/// Role → device-name table for one deployment.
///
/// All fields are optional so callers wire only what a deployment actually
/// has; scenario setup skips absent roles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Central node
    pub central_node: Option<String>,
    /// TMC subarray nodes
    pub subarray_nodes: Vec<String>,
    /// CSP master / controller
    pub csp_master: Option<String>,
    /// SDP master / controller
    pub sdp_master: Option<String>,
    /// MCCS controller (Low only)
    pub mccs_master: Option<String>,
    /// CSP subarrays
    pub csp_subarrays: Vec<String>,
    /// SDP subarrays
    pub sdp_subarrays: Vec<String>,
    /// MCCS subarrays (Low only)
    pub mccs_subarrays: Vec<String>,
    /// Dish leaf nodes (Mid only)
    pub dish_leaf_nodes: Vec<String>,
}

impl Topology {
    /// Conventional Mid deployment names.
    pub fn mid() -> Self {
        Self {
            central_node: Some("ska_mid/tm_central/central_node".into()),
            subarray_nodes: vec!["ska_mid/tm_subarray_node/1".into()],
            csp_master: Some("mid-csp/elt/master".into()),
            sdp_master: Some("mid-sdp/elt/master".into()),
            mccs_master: None,
            csp_subarrays: vec!["mid-csp/elt/subarray_01".into()],
            sdp_subarrays: vec!["mid-sdp/elt/subarray_1".into()],
            mccs_subarrays: vec![],
            dish_leaf_nodes: vec![
                "ska_mid/tm_leaf_node/d0001".into(),
                "ska_mid/tm_leaf_node/d0002".into(),
                "ska_mid/tm_leaf_node/d0003".into(),
                "ska_mid/tm_leaf_node/d0004".into(),
            ],
        }
    }

    /// Conventional Low deployment names.
    pub fn low() -> Self {
        Self {
            central_node: Some("ska_low/tm_central/central_node".into()),
            subarray_nodes: vec!["ska_low/tm_subarray_node/1".into()],
            csp_master: Some("low-csp/control/0".into()),
            sdp_master: Some("low-sdp/control/0".into()),
            mccs_master: Some("low-mccs/control/control".into()),
            csp_subarrays: vec!["low-csp/subarray/01".into()],
            sdp_subarrays: vec!["low-sdp/subarray/01".into()],
            mccs_subarrays: vec!["low-mccs/subarray/01".into()],
            dish_leaf_nodes: vec![],
        }
    }

    /// Defaults for a telescope variant.
    pub fn for_telescope(telescope: Telescope) -> Self {
        match telescope {
            Telescope::Mid => Self::mid(),
            Telescope::Low => Self::low(),
        }
    }
}
