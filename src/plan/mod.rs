//! Flight plan model: typed waypoint sequences with track, ground-speed
//! and vertical-speed trajectory change points.

pub mod repair;
pub mod waypoint;


pub use waypoint::{GsTcp, TrackTcp, VsTcp, Waypoint};

use crate::geom::{Position, Projection, Velocity, turn_delta, wrap_rad};
use strum_macros::Display;

/// Validation failures rejected at plan-input time.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    EmptyPlan,
    NonMonotonicTimes { index: usize },
    UnclosedTurn { index: usize },
    InvalidTurnInterior { index: usize },
    ZeroRadiusTurn { index: usize },
}

/// An ordered sequence of waypoints with a unique id.
///
/// Invariants enforced on construction: times are monotonically
/// non-decreasing, every BOT is closed by an EOT before the next BOT, and
/// only MOT/EOT typed waypoints appear inside a turn segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    id: String,
    points: Vec<Waypoint>,
}

impl Plan {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            points: Vec::new(),
        }
    }

    /// Builds a validated plan from a waypoint list.
    pub fn from_waypoints(
        id: impl Into<String>,
        points: Vec<Waypoint>,
    ) -> Result<Self, PlanError> {
        let plan = Self {
            id: id.into(),
            points,
        };
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<(), PlanError> {
        if self.points.is_empty() {
            return Err(PlanError::EmptyPlan);
        }
        let mut in_turn = false;
        for (i, wp) in self.points.iter().enumerate() {
            if i > 0 && wp.time < self.points[i - 1].time {
                return Err(PlanError::NonMonotonicTimes { index: i });
            }
            if in_turn {
                if !(wp.is_mot() || wp.is_eot()) {
                    return Err(PlanError::InvalidTurnInterior { index: i });
                }
                if wp.is_eot() {
                    in_turn = false;
                }
            }
            if wp.is_bot() {
                if wp.turn_radius().is_some_and(|r| r.abs() < 1e-6) {
                    return Err(PlanError::ZeroRadiusTurn { index: i });
                }
                in_turn = true;
            }
        }
        if in_turn {
            return Err(PlanError::UnclosedTurn {
                index: self.points.len() - 1,
            });
        }
        Ok(())
    }

    pub fn id(&self) -> &str { &self.id }

    pub fn set_id(&mut self, id: impl Into<String>) { self.id = id.into(); }

    pub fn len(&self) -> usize { self.points.len() }

    pub fn is_empty(&self) -> bool { self.points.is_empty() }

    pub fn point(&self, i: usize) -> &Waypoint { &self.points[i] }

    pub fn points(&self) -> &[Waypoint] { &self.points }

    /// Appends a plain waypoint (no TCP annotations).
    pub fn add(&mut self, position: Position, time: f64) {
        self.points.push(Waypoint::new(position, time));
    }

    pub fn add_waypoint(&mut self, wp: Waypoint) { self.points.push(wp); }

    /// Position of waypoint `i`, clamped to the plan length.
    pub fn pos(&self, i: usize) -> Position {
        self.points[i.min(self.points.len() - 1)].position
    }

    pub fn time(&self, i: usize) -> f64 { self.points[i.min(self.points.len() - 1)].time }

    pub fn first_time(&self) -> f64 { self.points.first().map_or(0.0, |wp| wp.time) }

    pub fn last_time(&self) -> f64 { self.points.last().map_or(0.0, |wp| wp.time) }

    pub fn last_point(&self) -> &Waypoint { self.points.last().expect("plan is never empty") }

    pub fn is_bot(&self, i: usize) -> bool { self.points.get(i).is_some_and(Waypoint::is_bot) }

    pub fn is_eot(&self, i: usize) -> bool { self.points.get(i).is_some_and(Waypoint::is_eot) }

    pub fn is_mot(&self, i: usize) -> bool { self.points.get(i).is_some_and(Waypoint::is_mot) }

    /// True if the plan carries no track TCPs at all.
    pub fn is_linear(&self) -> bool {
        self.points.iter().all(|wp| matches!(wp.track_tcp, TrackTcp::None))
    }

    /// Index of the nearest turn-opening waypoint at or before `i`.
    pub fn prev_bot(&self, i: usize) -> Option<usize> {
        (0..=i.min(self.points.len() - 1)).rev().find(|&j| self.points[j].is_bot())
    }

    /// Index of the nearest track TCP strictly before `i`.
    pub fn prev_trk_tcp(&self, i: usize) -> Option<usize> {
        (0..i.min(self.points.len())).rev().find(|&j| self.points[j].is_bot() || self.points[j].is_eot())
    }

    /// Replaces the altitude of waypoint `i`.
    pub fn set_alt(&mut self, i: usize, alt: f64) {
        if let Some(wp) = self.points.get_mut(i) {
            wp.position = wp.position.mk_alt(alt);
        }
    }

    /// True if the leg ending at waypoint `i` lies on a turn arc.
    pub fn in_turn_segment(&self, i: usize) -> bool {
        if i == 0 || i >= self.points.len() {
            return false;
        }
        self.points[i].is_mot() || (self.points[i].is_eot() && !self.points[i].is_bot())
            || self.points[i - 1].is_bot()
            || self.points[i - 1].is_mot()
    }

    /// Shifts the times of all waypoints from `start` onwards by `delta`
    /// seconds.
    pub fn time_shift(&mut self, start: usize, delta: f64) {
        for wp in self.points.iter_mut().skip(start) {
            wp.time += delta;
        }
    }

    pub fn set_time(&mut self, i: usize, time: f64) {
        if let Some(wp) = self.points.get_mut(i) {
            wp.time = time;
        }
    }

    /// Ground distance of the leg from waypoint `i` to `i+1`, following
    /// the turn arc where one is defined.
    pub fn leg_distance(&self, i: usize) -> f64 {
        if i + 1 >= self.points.len() {
            return 0.0;
        }
        let a = &self.points[i];
        let b = &self.points[i + 1];
        if self.in_turn_segment(i + 1) {
            if let Some(bot) = self.prev_bot(i) {
                let center = self.points[bot].turn_center().expect("BOT carries a center");
                let radius = self.points[bot].turn_radius().expect("BOT carries a radius").abs();
                let proj = Projection::new(center);
                let va = proj.project(&a.position).vect2();
                let vb = proj.project(&b.position).vect2();
                let angle = wrap_rad(va.trk() - vb.trk()).min(wrap_rad(vb.trk() - va.trk()));
                return radius * angle;
            }
        }
        a.position.distance_h(&b.position)
    }

    /// Ground distance along the plan between waypoints `i` and `j`.
    pub fn path_distance(&self, i: usize, j: usize) -> f64 {
        (i..j.min(self.points.len() - 1)).map(|k| self.leg_distance(k)).sum()
    }

    /// Total ground distance along the plan.
    pub fn total_distance(&self) -> f64 { self.path_distance(0, self.points.len() - 1) }

    /// Ground speed on the leg into waypoint `i`.
    pub fn gs_in(&self, i: usize) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let i = i.clamp(1, self.points.len() - 1);
        let dt = self.points[i].time - self.points[i - 1].time;
        if dt < 1e-6 {
            return 0.0;
        }
        self.leg_distance(i - 1) / dt
    }

    /// Ground speed on the leg out of waypoint `i`.
    pub fn gs_out(&self, i: usize) -> f64 {
        if i + 1 < self.points.len() { self.gs_in(i + 1) } else { self.gs_in(i) }
    }

    /// Track on the leg into waypoint `i` (radians).
    pub fn trk_in(&self, i: usize) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let i = i.clamp(1, self.points.len() - 1);
        self.points[i - 1].position.track(&self.points[i].position)
    }

    /// Track on the leg out of waypoint `i` (radians).
    pub fn trk_out(&self, i: usize) -> f64 {
        if i + 1 < self.points.len() {
            self.points[i].position.track(&self.points[i + 1].position)
        } else {
            self.trk_in(i)
        }
    }

    /// Vertical speed on the leg into waypoint `i`.
    pub fn vs_in(&self, i: usize) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let i = i.clamp(1, self.points.len() - 1);
        let dt = self.points[i].time - self.points[i - 1].time;
        if dt < 1e-6 {
            return 0.0;
        }
        (self.points[i].position.alt() - self.points[i - 1].position.alt()) / dt
    }

    /// Vertical speed on the leg out of waypoint `i`.
    pub fn vs_out(&self, i: usize) -> f64 {
        if i + 1 < self.points.len() { self.vs_in(i + 1) } else { self.vs_in(i) }
    }

    /// Velocity leaving waypoint `i` (track/gs/vs of the outgoing leg).
    pub fn velocity_out(&self, i: usize) -> Velocity {
        Velocity::make_trk_gs_vs(
            self.trk_out(i).to_degrees(),
            self.gs_out(i),
            self.vs_out(i),
        )
    }

    /// Index of the segment containing time `t`, if any.
    pub fn segment_at(&self, t: f64) -> Option<usize> {
        if self.points.len() < 2 || t < self.first_time() || t > self.last_time() {
            return None;
        }
        (0..self.points.len() - 1)
            .find(|&i| t >= self.points[i].time && t <= self.points[i + 1].time)
    }

    /// Interpolated position on the plan at time `t`, clamped to the plan
    /// ends.
    pub fn position_at(&self, t: f64) -> Position {
        if t <= self.first_time() {
            return self.points[0].position;
        }
        let Some(i) = self.segment_at(t) else {
            return self.last_point().position;
        };
        let a = &self.points[i];
        let b = &self.points[i + 1];
        let dt = b.time - a.time;
        if dt < 1e-6 {
            return a.position;
        }
        let f = (t - a.time) / dt;
        Position::new(
            a.position.lat() + f * (b.position.lat() - a.position.lat()),
            a.position.lon() + f * (b.position.lon() - a.position.lon()),
            a.position.alt() + f * (b.position.alt() - a.position.alt()),
        )
    }

    /// Closest point to `pos` on the segment into waypoint `next_wp`.
    pub fn nearest_point_on_leg(&self, next_wp: usize, pos: &Position) -> Position {
        if self.points.len() < 2 {
            return self.points[0].position;
        }
        let next_wp = next_wp.clamp(1, self.points.len() - 1);
        let a = self.points[next_wp - 1].position;
        let b = self.points[next_wp].position;
        let dist = a.distance_h(&b);
        if dist < 1e-3 {
            return a;
        }
        let proj = Projection::new(a);
        let ab = proj.project(&b).vect2();
        let ap = proj.project(pos).vect2();
        let f = (ap.dot(ab) / ab.norm_sq()).clamp(0.0, 1.0);
        a.linear_dist_2d(a.track(&b), f * dist)
    }

    /// Returns a copy of this plan under a new id.
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.id = id.into();
        copy
    }
}

/// Perpendicular cross-track distance of `pos` from the segment
/// `prev_wp` → `next_wp`, with the normalized longitudinal progress in
/// the second tuple slot.
pub fn xtrack_distance(prev_wp: &Position, next_wp: &Position, pos: &Position) -> (f64, f64) {
    let proj = Projection::new(*prev_wp);
    let ab = proj.project(next_wp).vect2();
    let ac = proj.project(pos).vect2();
    let dist_ab = ab.norm();
    if dist_ab < 1e-6 {
        return (ac.norm(), 1.0);
    }
    let perp = ac.dot(ab.perp_l().hat()).abs();
    let along = ac.dot(ab.hat()) / dist_ab;
    (perp, along)
}

/// Heading (degrees) that intercepts the segment `prev_wp` → `next_wp`
/// from `pos` by steering at the nearest point on the leg.
pub fn intercept_heading(prev_wp: &Position, next_wp: &Position, pos: &Position) -> f64 {
    let (_, along) = xtrack_distance(prev_wp, next_wp, pos);
    let dist = prev_wp.distance_h(next_wp);
    let target = if dist < 1e-3 {
        *prev_wp
    } else {
        prev_wp.linear_dist_2d(prev_wp.track(next_wp), along.clamp(0.0, 1.0) * dist)
    };
    pos.track(&target).to_degrees()
}

/// Angular progress of `pos` through the turn from `bot` to `eot` around
/// `center`, as (traversed, total) angles in the turn direction.
pub fn turn_progress(
    bot: &Position,
    eot: &Position,
    center: &Position,
    signed_radius: f64,
    pos: &Position,
) -> (f64, f64) {
    let proj = Projection::new(*center);
    let trk1 = proj.project(bot).vect2().trk();
    let trk2 = proj.project(eot).vect2().trk();
    let trk3 = proj.project(pos).vect2().trk();
    let dir: i8 = if signed_radius > 0.0 { 1 } else { -1 };
    let total = wrap_rad(turn_delta(trk1, trk2, dir));
    let mut traversed = wrap_rad(turn_delta(trk1, trk3, dir));
    if traversed >= std::f64::consts::PI * 1.5 {
        // Turns never span more than half a revolution past the entry.
        traversed = 0.0;
    }
    (traversed, total)
}
