use crate::geom::Position;
use serde::{Deserialize, Serialize};

/// Track-channel trajectory change point annotation.
///
/// `Bot` opens a turn segment with a signed radius (positive = right
/// turn) and the turn-center position. `EotBot` closes one turn and opens
/// the next at the same waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum TrackTcp {
    #[default]
    None,
    Bot {
        radius: f64,
        center: Position,
    },
    Mot,
    Eot,
    EotBot {
        radius: f64,
        center: Position,
    },
}

/// Ground-speed-channel trajectory change point annotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum GsTcp {
    #[default]
    None,
    Bgs {
        accel: f64,
    },
    Egs,
}

/// Vertical-speed-channel trajectory change point annotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum VsTcp {
    #[default]
    None,
    Bvs {
        accel: f64,
    },
    Evs,
}

/// A navigation point: position, scheduled time of arrival and three
/// independent TCP channels, plus a free-text info label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: Position,
    pub time: f64,
    pub track_tcp: TrackTcp,
    pub gs_tcp: GsTcp,
    pub vs_tcp: VsTcp,
    pub info: String,
}

impl Waypoint {
    pub fn new(position: Position, time: f64) -> Self {
        Self {
            position,
            time,
            track_tcp: TrackTcp::None,
            gs_tcp: GsTcp::None,
            vs_tcp: VsTcp::None,
            info: String::new(),
        }
    }

    /// True if this waypoint opens a turn segment.
    pub fn is_bot(&self) -> bool {
        matches!(self.track_tcp, TrackTcp::Bot { .. } | TrackTcp::EotBot { .. })
    }

    /// True if this waypoint closes a turn segment.
    pub fn is_eot(&self) -> bool {
        matches!(self.track_tcp, TrackTcp::Eot | TrackTcp::EotBot { .. })
    }

    pub fn is_mot(&self) -> bool { matches!(self.track_tcp, TrackTcp::Mot) }

    /// Signed turn radius if this waypoint opens a turn.
    pub fn turn_radius(&self) -> Option<f64> {
        match self.track_tcp {
            TrackTcp::Bot { radius, .. } | TrackTcp::EotBot { radius, .. } => Some(radius),
            _ => None,
        }
    }

    /// Turn-center position if this waypoint opens a turn.
    pub fn turn_center(&self) -> Option<Position> {
        match self.track_tcp {
            TrackTcp::Bot { center, .. } | TrackTcp::EotBot { center, .. } => Some(center),
            _ => None,
        }
    }
}
