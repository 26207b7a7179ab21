//! Trajectory monitor: a stateless query service over the stored plans,
//! fences and traffic that predicts impending violations, finds the next
//! feasible waypoint ahead and checks line-of-sight to the goal.

#[cfg(test)]
mod tests;

use crate::geom::{Polygon, Position, Projection, Vect2, Vect3, Velocity};
use crate::params::Parameters;
use crate::plan::{Plan, PlanError, Waypoint, repair, xtrack_distance};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use strum_macros::Display;

static SECONDARY_PLAN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Plan\d+$").expect("static pattern"));

/// Projection horizon for state-based traffic (s).
const TRAFFIC_PROJECTION_TIME: f64 = 1000.0;
/// Plan projections are skipped once the ownship is further than this
/// from the flown leg (m).
const MAX_PROJECTION_OFFSET: f64 = 50.0;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FenceType {
    KeepIn,
    KeepOut,
}

/// A fence volume with its conflict semantics.
#[derive(Debug, Clone)]
pub struct Fence {
    pub id: usize,
    pub fence_type: FenceType,
    pub polygon: Polygon,
}

/// A state-based traffic track with its observation time and the
/// provider's uncertainty vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficState {
    pub callsign: String,
    pub source: String,
    pub position: Position,
    pub velocity: Velocity,
    pub time: f64,
    pub pos_uncertainty: [f64; 6],
    pub vel_uncertainty: [f64; 6],
}

/// Result record of one `monitor_trajectory` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryMonitorData {
    pub fence_conflict: bool,
    pub traffic_conflict: bool,
    pub time_to_fence_violation: f64,
    pub time_to_traffic_violation: f64,
    pub next_wp: usize,
    pub next_feasible_wp: usize,
    pub line_of_sight_to_goal: bool,
    /// Offsets from the queried (active) plan: cross track, normalized
    /// leg progress, signed time offset (positive = ahead of schedule).
    pub plan_offsets: [f64; 3],
    /// Offsets from the nominal plan.
    pub nominal_offsets: [f64; 3],
}

impl Default for TrajectoryMonitorData {
    fn default() -> Self {
        Self {
            fence_conflict: false,
            traffic_conflict: false,
            time_to_fence_violation: f64::INFINITY,
            time_to_traffic_violation: f64::INFINITY,
            next_wp: 0,
            next_feasible_wp: 0,
            line_of_sight_to_goal: true,
            plan_offsets: [0.0; 3],
            nominal_offsets: [0.0; 3],
        }
    }
}

/// Stores plans, fences and traffic, and answers trajectory queries.
/// The query itself mutates nothing.
pub struct TrajectoryMonitor {
    flight_plans: Vec<Plan>,
    fence_list: Vec<Fence>,
    traffic_list: BTreeMap<String, TrafficState>,
    traffic_plans: Vec<Plan>,
    wellclear_dist_h: f64,
    wellclear_dist_v: f64,
}

impl TrajectoryMonitor {
    pub fn new(params: &Parameters) -> Self {
        Self {
            flight_plans: Vec::new(),
            fence_list: Vec::new(),
            traffic_list: BTreeMap::new(),
            traffic_plans: Vec::new(),
            wellclear_dist_h: params.dubins_wellclear_radius,
            wellclear_dist_v: params.dubins_wellclear_height,
        }
    }

    pub fn set_parameters(&mut self, params: &Parameters) {
        self.wellclear_dist_h = params.dubins_wellclear_radius;
        self.wellclear_dist_v = params.dubins_wellclear_height;
    }

    pub fn input_geofence_data(
        &mut self,
        fence_type: FenceType,
        id: usize,
        floor: f64,
        ceiling: f64,
        vertices: Vec<Position>,
    ) {
        self.fence_list.push(Fence {
            id,
            fence_type,
            polygon: Polygon::new(vertices, floor, ceiling),
        });
    }

    pub fn clear_fences(&mut self) { self.fence_list.clear(); }

    pub fn fences(&self) -> &[Fence] { &self.fence_list }

    /// Stores or replaces a state-based traffic track. Returns the
    /// number of known tracks.
    pub fn input_traffic(&mut self, traffic: TrafficState) -> usize {
        self.traffic_list.insert(traffic.callsign.clone(), traffic);
        self.traffic_list.len()
    }

    /// Stores or replaces an intent plan for a traffic vehicle.
    pub fn input_traffic_plan(&mut self, plan: Plan) {
        self.traffic_plans.retain(|tp| tp.id() != plan.id());
        self.traffic_plans.push(plan);
    }

    /// Stores or replaces a flight plan. Plan0 also seeds the "Plan+"
    /// concatenation used for projections over detours.
    pub fn input_flight_plan(
        &mut self,
        plan_id: &str,
        waypoints: Vec<Waypoint>,
        init_heading: f64,
        do_repair: bool,
        repair_turn_rate: f64,
    ) -> Result<(), PlanError> {
        let mut fp = Plan::from_waypoints(plan_id, waypoints)?;
        if do_repair {
            fp = repair::make_kinematic(&fp, init_heading, repair_turn_rate);
        }
        self.flight_plans.retain(|p| p.id() != plan_id);
        if plan_id == "Plan0" {
            self.flight_plans.retain(|p| p.id() != "Plan+");
            self.flight_plans.push(fp.with_id("Plan+"));
        }
        self.flight_plans.push(fp);
        Ok(())
    }

    pub fn get_plan(&self, plan_id: &str) -> Option<&Plan> {
        self.flight_plans.iter().find(|fp| fp.id() == plan_id)
    }

    pub fn total_waypoints(&self, plan_id: &str) -> usize {
        self.get_plan(plan_id).map_or(0, Plan::len)
    }

    /// Time-shifts the named plan from waypoint `ind` onwards.
    pub fn set_plan_offset(&mut self, plan_id: &str, ind: usize, offset: f64) {
        if let Some(fp) = self.flight_plans.iter_mut().find(|fp| fp.id() == plan_id) {
            fp.time_shift(ind, offset);
        }
    }

    /// Rebuilds "Plan+" as `plan_a` followed by the tail of `plan_b`.
    /// With a negative `index`, the join point is found by matching the
    /// last waypoint of `plan_a` inside `plan_b`.
    pub fn combine_plan(&mut self, plan_a: &str, plan_b: &str, index: i32) {
        let Some(fp1) = self.get_plan(plan_a).cloned() else {
            return;
        };
        let Some(fp2) = self.get_plan(plan_b).cloned() else {
            return;
        };
        let mut combined = fp1.with_id("Plan+");
        let last = fp1.last_point().position;

        let mut start = if index > 0 { index as usize } else { usize::MAX };
        if start == usize::MAX {
            for i in 0..fp2.len() {
                let p = fp2.pos(i);
                if p.distance_h(&last) + p.distance_v(&last) < 1e-3 {
                    start = i + 1;
                    break;
                }
            }
        }
        if start == usize::MAX {
            start = fp2.len();
        }

        for i in start.max(1)..fp2.len() {
            let delta = fp2.time(i) - fp2.time(i - 1);
            let time = combined.last_point().time + delta;
            let mut wp = fp2.point(i).clone();
            wp.time = time;
            combined.add_waypoint(wp);
        }

        self.flight_plans.retain(|p| p.id() != "Plan+");
        self.flight_plans.push(combined);
    }

    pub fn clear_all_plans(&mut self) {
        self.flight_plans.clear();
        self.clear_fences();
    }

    /// Offsets of the current pose from the leg into `next_wp` of the
    /// named plan: cross-track distance, normalized longitudinal
    /// progress and signed time offset (positive = ahead of schedule).
    /// Turn legs measure against the arc instead of the chord.
    pub fn compute_plan_offsets(
        &self,
        plan_id: &str,
        next_wp: usize,
        pos: &Position,
        _vel: &Velocity,
        time_at_pos: f64,
    ) -> [f64; 3] {
        let Some(fp) = self.get_plan(plan_id) else {
            return [0.0, 1.0, 0.0];
        };
        if fp.len() < 2 {
            return [0.0, 1.0, 0.0];
        }
        let next_wp = next_wp.clamp(1, fp.len() - 1);
        let pos_a = fp.pos(next_wp - 1);
        let pos_b = fp.pos(next_wp);

        if (fp.is_mot(next_wp) || fp.is_eot(next_wp)) && fp.prev_bot(next_wp - 1).is_some() {
            let bot = fp.prev_bot(next_wp - 1).expect("checked above");
            let center = fp.point(bot).turn_center().expect("BOT carries a center");
            let radius = fp.point(bot).turn_radius().expect("BOT carries a radius");
            let (traversed, total) =
                crate::plan::turn_progress(&pos_a, &pos_b, &center, radius, pos);
            let turn_rate = fp.gs_in(next_wp) / radius.abs();
            let time_remaining_turn = if turn_rate > 1e-6 {
                (total - traversed).abs() / turn_rate
            } else {
                0.0
            };
            let actual_time_remaining = fp.time(next_wp) - time_at_pos;
            [
                pos.distance_h(&center) - radius.abs(),
                if total > 1e-6 { traversed / total } else { 1.0 },
                actual_time_remaining - time_remaining_turn,
            ]
        } else {
            let (perp, along) = xtrack_distance(&pos_a, &pos_b, pos);
            let dist_ab = pos_a.distance_h(&pos_b);
            let gs = (fp.gs_out(next_wp - 1) + fp.gs_in(next_wp)) / 2.0;
            let expected_time_at_pos = fp.time(next_wp - 1)
                + if gs > 1e-3 { along * dist_ab / gs } else { 0.0 };
            [perp, along, expected_time_at_pos - time_at_pos]
        }
    }

    /// True if the 3D segment from `start` to `end` crosses no fence
    /// face.
    pub fn check_line_of_sight(&self, start: &Position, end: &Position) -> bool {
        let projection = Projection::new(*start);
        let pos_a = projection.project(start);
        let pos_b = projection.project(end);
        !self.fence_list.iter().any(|fence| {
            fence.polygon.poly3d(&projection).intersects_segment(pos_a, pos_b)
        })
    }

    /// Predicts fence and traffic violations along the active plan,
    /// finds the next feasible waypoint on the nominal plan and checks
    /// line-of-sight to it. Side-effect free.
    ///
    /// `next_wp1` indexes the nominal plan, `next_wp2` the active plan.
    pub fn monitor_trajectory(
        &self,
        time: f64,
        plan_id: &str,
        pos: &Position,
        vel: &Velocity,
        next_wp1: usize,
        next_wp2: usize,
    ) -> TrajectoryMonitorData {
        // Secondary plans are projected against the Plan+ concatenation
        // so the detour plus the remaining mission is covered.
        let plan_id = if plan_id != "Plan0" && SECONDARY_PLAN_ID.is_match(plan_id) {
            "Plan+"
        } else {
            plan_id
        };

        let mut data = TrajectoryMonitorData {
            next_wp: next_wp2,
            ..TrajectoryMonitorData::default()
        };
        let Some(fp) = self.get_plan(plan_id) else {
            return data;
        };
        let projection = Projection::new(fp.pos(0));

        data.plan_offsets = self.compute_plan_offsets(plan_id, next_wp2, pos, vel, time);
        if self.get_plan("Plan0").is_some() {
            data.nominal_offsets = self.compute_plan_offsets("Plan0", next_wp1, pos, vel, time);
        }
        // Shift the clock by the time offset so predictions compare
        // against a schedule-aligned plan.
        let corrected_time = time + data.plan_offsets[2];

        let mut gf_times: Vec<f64> = Vec::new();
        let mut tf_times: Vec<f64> = Vec::new();

        if data.plan_offsets[0] < MAX_PROJECTION_OFFSET {
            let locpos = projection.project(pos);
            for fence in &self.fence_list {
                let local_poly = fence.polygon.poly3d(&projection);
                match fence.fence_type {
                    FenceType::KeepIn => {
                        let mut conflict = !local_poly.contains(locpos);
                        if conflict {
                            gf_times.push(0.0);
                        }
                        // Projected violation only counts if the plan
                        // itself is outside at the predicted time.
                        let eps = 0.5;
                        let t = local_poly.time_to_edge_crossing(locpos, vel) + eps;
                        if fp.segment_at(corrected_time + t).is_some() {
                            let pos_on_plan = fp.position_at(corrected_time + t);
                            let q_pos = projection.project(&pos_on_plan);
                            let proj_conflict = !local_poly.contains(q_pos)
                                || local_poly.distance_to_edge(q_pos.vect2()) < 2.0;
                            if proj_conflict {
                                conflict = true;
                                gf_times.push(t);
                            }
                        }
                        data.fence_conflict |= conflict;
                    }
                    FenceType::KeepOut => {
                        let mut conflict = local_poly.contains(locpos);
                        if conflict {
                            gf_times.push(0.0);
                        }
                        if let Some(t) =
                            plan_polygon_entry_time(fp, &local_poly, &projection, corrected_time)
                        {
                            conflict = true;
                            gf_times.push(t - corrected_time);
                        }
                        data.fence_conflict |= conflict;
                    }
                }
            }

            for tp in &self.traffic_plans {
                if let Some(t_in) = plan_pair_conflict_time(
                    fp,
                    tp,
                    &projection,
                    time,
                    fp.last_time(),
                    self.wellclear_dist_h,
                    self.wellclear_dist_v,
                ) {
                    tf_times.push(t_in - corrected_time);
                    data.traffic_conflict = true;
                }
            }

            for tf in self.traffic_list.values() {
                let time_a = tf.time + data.plan_offsets[2];
                let time_b = time_a + TRAFFIC_PROJECTION_TIME;
                let pos_b = tf.position.linear_est(&tf.velocity, TRAFFIC_PROJECTION_TIME);
                let mut tp = Plan::new("traffic");
                tp.add(tf.position, time_a);
                tp.add(pos_b, time_b);
                if let Some(t_in) = plan_pair_conflict_time(
                    fp,
                    &tp,
                    &projection,
                    corrected_time,
                    fp.last_time(),
                    self.wellclear_dist_h,
                    self.wellclear_dist_v,
                ) {
                    tf_times.push(t_in - corrected_time);
                    data.traffic_conflict = true;
                }
            }
        }

        gf_times.sort_by(f64::total_cmp);
        tf_times.sort_by(f64::total_cmp);

        data.next_feasible_wp = self.next_feasible_waypoint(
            next_wp1,
            corrected_time,
            tf_times.first().copied(),
            data.plan_offsets[0],
            vel,
            &projection,
        );

        if !self.flight_plans.is_empty() {
            data.line_of_sight_to_goal = if plan_id == "Plan+" || plan_id == "Plan0" {
                match self.get_plan("Plan0") {
                    Some(fp0) => self.check_line_of_sight(pos, &fp0.pos(data.next_feasible_wp)),
                    None => true,
                }
            } else {
                self.check_line_of_sight(pos, &fp.last_point().position)
            };
        }

        data.time_to_fence_violation = gf_times.first().copied().unwrap_or(f64::INFINITY);
        data.time_to_traffic_violation = tf_times.first().copied().unwrap_or(f64::INFINITY);
        data
    }

    /// Walks the nominal plan forward from `next_wp` until a waypoint is
    /// found that is fence-clear, reachable after the predicted traffic
    /// violation, outside any turn interior and followed by a leg long
    /// enough to capture.
    fn next_feasible_waypoint(
        &self,
        next_wp: usize,
        corrected_time: f64,
        first_traffic_violation: Option<f64>,
        plan_offset: f64,
        vel: &Velocity,
        projection: &Projection,
    ) -> usize {
        let Some(fp) = self.get_plan("Plan0") else {
            return next_wp;
        };
        let max_wp = fp.len();
        let mut findex = next_wp;
        while findex < max_wp {
            if let Some(t_in) = first_traffic_violation {
                if fp.time(findex) < corrected_time + t_in && plan_offset < MAX_PROJECTION_OFFSET {
                    findex += 1;
                    continue;
                }
            }
            if fp.is_bot(findex) || fp.is_mot(findex) {
                findex += 1;
                continue;
            }
            if !fp.is_eot(findex) {
                if let Some(j) = fp.prev_trk_tcp(findex) {
                    if fp.point(j).is_bot() && !fp.point(j).is_eot() {
                        findex += 1;
                        continue;
                    }
                }
            }
            // The following leg must allow capture at the current speed.
            let segdist = fp.path_distance(findex, findex + 1);
            if findex + 1 < max_wp && segdist < vel.gs() * 3.0 {
                findex += 1;
                continue;
            }
            if self.waypoint_fence_conflict(fp.pos(findex), projection) {
                findex += 1;
                continue;
            }
            break;
        }
        findex.min(max_wp - 1)
    }

    fn waypoint_fence_conflict(&self, wp: Position, projection: &Projection) -> bool {
        let locpos = projection.project(&wp);
        self.fence_list.iter().any(|fence| {
            let poly = fence.polygon.poly3d(projection);
            match fence.fence_type {
                FenceType::KeepIn => !poly.contains(locpos),
                FenceType::KeepOut => poly.contains(locpos),
            }
        })
    }
}

/// Earliest time at which the remainder of `fp` (from `from_time`)
/// enters the polygon, if it does.
fn plan_polygon_entry_time(
    fp: &Plan,
    poly: &crate::geom::Poly3D,
    projection: &Projection,
    from_time: f64,
) -> Option<f64> {
    let mut best: Option<f64> = None;
    for i in 0..fp.len().saturating_sub(1) {
        let t0 = fp.time(i).max(from_time);
        let t1 = fp.time(i + 1);
        if t1 <= t0 {
            continue;
        }
        let p0 = projection.project(&fp.position_at(t0));
        let p1 = projection.project(&fp.position_at(t1));
        let entry = if poly.contains(p0) {
            Some(t0)
        } else {
            segment_polygon_entry(poly, p0, p1).map(|frac| t0 + frac * (t1 - t0))
        };
        if let Some(t) = entry {
            best = Some(best.map_or(t, |b: f64| b.min(t)));
        }
    }
    best
}

/// Fraction along the segment `p0`→`p1` of the earliest crossing into
/// the polygon, if any.
fn segment_polygon_entry(poly: &crate::geom::Poly3D, p0: Vect3, p1: Vect3) -> Option<f64> {
    let mut best: Option<f64> = None;
    let r = p1.vect2() - p0.vect2();
    for (a, b) in poly.edges() {
        let s = b - a;
        let denom = r.cross(s);
        if denom.abs() < f64::EPSILON {
            continue;
        }
        let qp = a - p0.vect2();
        let t = qp.cross(s) / denom;
        let u = qp.cross(r) / denom;
        if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
            continue;
        }
        let z = p0.z + t * (p1.z - p0.z);
        if z < poly.floor() || z > poly.ceiling() {
            continue;
        }
        best = Some(best.map_or(t, |b: f64| b.min(t)));
    }
    best
}

/// Earliest well-clear violation time between two timed plans, checked
/// pairwise over their overlapping segments. Both plans are treated as
/// piecewise-linear trajectories; the relative motion within a segment
/// pair is linear, so the horizontal closest approach solves in closed
/// form.
fn plan_pair_conflict_time(
    fp: &Plan,
    tp: &Plan,
    projection: &Projection,
    t_start: f64,
    t_end: f64,
    dthr: f64,
    zthr: f64,
) -> Option<f64> {
    let mut best: Option<f64> = None;
    for i in 0..fp.len().saturating_sub(1) {
        for j in 0..tp.len().saturating_sub(1) {
            let w0 = fp.time(i).max(tp.time(j)).max(t_start);
            let w1 = fp.time(i + 1).min(tp.time(j + 1)).min(t_end);
            if w1 <= w0 + 1e-9 {
                continue;
            }
            let dt = w1 - w0;
            let p0 = projection.project(&fp.position_at(w0));
            let p1 = projection.project(&fp.position_at(w1));
            let q0 = projection.project(&tp.position_at(w0));
            let q1 = projection.project(&tp.position_at(w1));
            let rel0 = p0 - q0;
            let rel1 = p1 - q1;
            let relv = (rel1 - rel0) * (1.0 / dt);

            let Some((h0, h1)) = horizontal_violation_window(rel0.vect2(), relv.vect2(), dthr, dt)
            else {
                continue;
            };
            let Some((v0, v1)) = vertical_violation_window(rel0.z, relv.z, zthr, dt) else {
                continue;
            };
            let lo = h0.max(v0);
            let hi = h1.min(v1);
            if lo <= hi {
                let t = w0 + lo;
                best = Some(best.map_or(t, |b: f64| b.min(t)));
            }
        }
    }
    best
}

/// Window within `[0, dt]` where the horizontal separation stays below
/// `dthr`, given linear relative motion.
fn horizontal_violation_window(rel0: Vect2, relv: Vect2, dthr: f64, dt: f64) -> Option<(f64, f64)> {
    let a = relv.norm_sq();
    let b = 2.0 * rel0.dot(relv);
    let c = rel0.norm_sq() - dthr * dthr;
    if a < 1e-12 {
        return if c <= 0.0 { Some((0.0, dt)) } else { None };
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let r0 = (-b - sq) / (2.0 * a);
    let r1 = (-b + sq) / (2.0 * a);
    let lo = r0.max(0.0);
    let hi = r1.min(dt);
    if lo <= hi { Some((lo, hi)) } else { None }
}

/// Window within `[0, dt]` where the vertical separation stays below
/// `zthr`, given linear relative motion.
fn vertical_violation_window(rel0: f64, relv: f64, zthr: f64, dt: f64) -> Option<(f64, f64)> {
    if relv.abs() < 1e-9 {
        return if rel0.abs() <= zthr { Some((0.0, dt)) } else { None };
    }
    let r0 = (-zthr - rel0) / relv;
    let r1 = (zthr - rel0) / relv;
    let (lo, hi) = if r0 <= r1 { (r0, r1) } else { (r1, r0) };
    let lo = lo.max(0.0);
    let hi = hi.min(dt);
    if lo <= hi { Some((lo, hi)) } else { None }
}
