use crate::geom::{Position, Velocity};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Severity attached to a status message. Numeric levels follow the
/// downlink convention: lower is more severe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Alert,
    Warning,
    Error,
    Notice,
    Info,
}

/// Output command produced by cognition, consumed by guidance or the
/// host transport.
#[derive(Debug, Display, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Direct velocity setpoint in north/east/up components (m/s).
    Velocity { vn: f64, ve: f64, vu: f64 },
    /// Fly directly to a point at the given speed.
    P2P { point: Position, speed: f64 },
    /// Change the ground speed on the named plan. `hold` keeps the new
    /// speed for all remaining legs instead of only the current one.
    SpeedChange { plan_id: String, speed: f64, hold: bool },
    /// Change the altitude on the named plan. `hold` applies the change
    /// to all remaining waypoints.
    AltChange { plan_id: String, altitude: f64, hold: bool },
    Takeoff,
    Land,
    /// Ask the external planner for a ditch site.
    Ditch,
    /// Activate the named plan starting at the given waypoint index.
    FpChange {
        plan_id: String,
        wp_index: usize,
        next_feasible_wp: usize,
    },
    /// Ask the external path planner for a new plan between two states.
    FpRequest {
        plan_id: String,
        from_position: Position,
        to_position: Position,
        from_velocity: Velocity,
        to_velocity: Velocity,
    },
    Status { severity: Severity, text: String },
}
