use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete configuration for the autonomy core. One instance is shared
/// by cognition, guidance and the trajectory monitor; `input_parameters`
/// replaces it wholesale.
///
/// Angles are degrees, distances meters, speeds m/s, times seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    // Vehicle sizing
    pub min_hs: f64,
    pub max_hs: f64,
    pub min_vs: f64,
    pub max_vs: f64,
    /// Commanded turn rate used for kinematic plan repair (deg/s).
    pub turn_rate: f64,

    // Guidance
    pub capture_radius_scaling: f64,
    pub guidance_radius_scaling: f64,
    pub turnrate_gain: f64,
    /// Flight path angle used on linear climb segments (deg).
    pub climb_angle: f64,
    /// Vertical band within which the proportional climb law applies (m).
    pub vertical_climb_delta: f64,
    pub climb_rate_gain: f64,
    pub max_capture_radius: f64,
    pub min_capture_radius: f64,
    pub yaw_forward: bool,
    pub maintain_eta: bool,
    pub climb_speed: f64,
    pub horizontal_accel: f64,
    pub vertical_accel: f64,

    // DAA / cognition
    /// Single digit selects one resolution dimension; a multi-digit
    /// numeral is a most-significant-first priority list.
    pub resolution_type: i32,
    /// Well clear radius (m).
    pub dthr: f64,
    /// Well clear height (m).
    pub zthr: f64,
    pub allowed_xtrack_deviation: f64,
    /// Minimum time a traffic resolution stays engaged (s).
    pub persistence_time: f64,
    pub lookahead_time: f64,
    pub plan_lookahead_time: f64,
    #[serde(rename = "return2NextWP")]
    pub return2_next_wp: bool,
    #[serde(rename = "returnVector")]
    pub return_vector: bool,
    pub verify_plan_conflict: bool,
    /// When false, cognition observes but never commands maneuvers.
    pub active: bool,

    // Fences / planner contract
    pub obstacle_buffer: f64,
    pub dubins_wellclear_radius: f64,
    pub dubins_wellclear_height: f64,

    /// Event name to scheduler priority. Missing entries fall back to
    /// the built-in defaults.
    pub priorities: BTreeMap<String, i32>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            min_hs: 0.5,
            max_hs: 20.0,
            min_vs: -5.0,
            max_vs: 5.0,
            turn_rate: 20.0,
            capture_radius_scaling: 1.5,
            guidance_radius_scaling: 1.5,
            turnrate_gain: 0.5,
            climb_angle: 15.0,
            vertical_climb_delta: 10.0,
            climb_rate_gain: 0.5,
            max_capture_radius: 10.0,
            min_capture_radius: 1.5,
            yaw_forward: false,
            maintain_eta: false,
            climb_speed: 2.0,
            horizontal_accel: 1.0,
            vertical_accel: 1.0,
            resolution_type: 2,
            dthr: 30.0,
            zthr: 1000.0,
            allowed_xtrack_deviation: 1000.0,
            persistence_time: 5.0,
            lookahead_time: 20.0,
            plan_lookahead_time: 10.0,
            return2_next_wp: true,
            return_vector: false,
            verify_plan_conflict: false,
            active: true,
            obstacle_buffer: 10.0,
            dubins_wellclear_radius: 30.0,
            dubins_wellclear_height: 20.0,
            priorities: default_priorities(),
        }
    }
}

impl Parameters {
    /// Scheduler priority for a named event, falling back to the
    /// built-in defaults for events the configuration does not mention.
    pub fn priority(&self, event: &str) -> i32 {
        self.priorities
            .get(event)
            .copied()
            .or_else(|| default_priorities().get(event).copied())
            .unwrap_or(1)
    }
}

fn default_priorities() -> BTreeMap<String, i32> {
    [
        ("Takeoff", 1),
        ("NominalDeparture", 1),
        ("PrimaryPlanComplete", 2),
        ("SecondaryPlanComplete", 2),
        ("RtlPlanComplete", 2),
        ("Replanning", 3),
        ("FlightPlanDeviation", 3),
        ("Merging", 4),
        ("FenceConflict", 4),
        ("Rtl", 4),
        ("TrafficConflict1", 5),
        ("TrafficConflict2", 5),
        ("TrafficConflict3", 6),
        ("Ditching", 7),
        ("TODReached", 8),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
