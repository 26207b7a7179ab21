//! The guidance loop: turns the active plan or vector command into a 3D
//! velocity setpoint once per tick, including kinematic plan following
//! with turn arcs and in-flight speed/altitude/ETA edits.

#[cfg(test)]
mod tests;

use crate::geom::{Position, Projection, Vect3, Velocity, turn_delta, turn_dir, wrap_deg};
use crate::params::Parameters;
use crate::plan::{Plan, PlanError, Waypoint, repair};
use num::clamp;
use std::collections::HashMap;
use strum_macros::Display;

/// Id of the internal clone carrying a speed edit.
const SPEED_CHANGE_PLAN: &str = "PlanSpeedChange";
/// Id of the internal clone carrying an altitude edit.
const ALT_CHANGE_PLAN: &str = "PlanAltChange";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuidanceMode {
    Flightplan,
    Point2Point,
    Vector,
    Takeoff,
    Land,
    SpeedChange,
    AltChange,
    #[default]
    Noop,
}

/// Snapshot of the guidance outputs after a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct GuidanceOutput {
    pub mode: GuidanceMode,
    /// Id of the plan being tracked. Internal speed/alt edit clones
    /// report the original plan id so cognition's waypoint bookkeeping
    /// stays valid.
    pub active_plan: String,
    pub next_wp: Option<usize>,
    pub wp_reached: bool,
    pub dist_h2_wp: f64,
    pub dist_v2_wp: f64,
    pub xtrack_dev: f64,
    pub target: Option<Position>,
    /// The velocity setpoint (track, ground speed, vertical speed).
    pub vel_cmd: Velocity,
    pub yaw_forward: bool,
}

/// Single-threaded guidance core. Owns its own plan store; cognition
/// talks to it through the mode/edit mutators.
pub struct Guidance {
    plan_list: Vec<Plan>,
    next_wp_id: HashMap<String, usize>,
    active_plan_id: String,
    prev_plan: String,
    current_pos: Position,
    current_ground_speed: Velocity,
    current_airspeed: Velocity,
    output_cmd: Velocity,
    mode: GuidanceMode,
    curr_time: f64,
    wp_reached: bool,
    eta_control: bool,
    in_turn: bool,
    dist_h2_next_wp: f64,
    dist_v2_next_wp: f64,
    xtrack_dist: f64,
    wind: Velocity,
    params: Parameters,
}

impl Guidance {
    pub fn new(params: Parameters) -> Self {
        Self {
            plan_list: Vec::new(),
            next_wp_id: HashMap::new(),
            active_plan_id: String::new(),
            prev_plan: String::new(),
            current_pos: Position::default(),
            current_ground_speed: Velocity::zero(),
            current_airspeed: Velocity::zero(),
            output_cmd: Velocity::zero(),
            mode: GuidanceMode::Noop,
            curr_time: 0.0,
            wp_reached: false,
            eta_control: false,
            in_turn: false,
            dist_h2_next_wp: f64::INFINITY,
            dist_v2_next_wp: f64::INFINITY,
            xtrack_dist: 0.0,
            wind: Velocity::zero(),
            params,
        }
    }

    pub fn set_guidance_params(&mut self, params: &Parameters) { self.params = params.clone(); }

    pub fn set_aircraft_state(&mut self, pos: Position, ground_speed: Velocity) {
        self.current_pos = pos;
        self.current_ground_speed = ground_speed;
    }

    /// Wind given as the direction it blows from (degrees) and speed.
    pub fn set_wind_data(&mut self, wind_from: f64, wind_speed: f64) {
        self.wind = Velocity::make_trk_gs_vs(wind_from + 180.0, wind_speed, 0.0);
        let air = self.current_ground_speed.vect2() - self.wind.vect2();
        self.current_airspeed = Velocity::new(air.y, air.x, self.current_ground_speed.vs());
    }

    pub fn wind_gs(&self) -> f64 { self.wind.gs() }

    pub fn mode(&self) -> GuidanceMode { self.mode }

    pub fn get_plan(&self, plan_id: &str) -> Option<&Plan> {
        self.plan_list.iter().find(|fp| fp.id() == plan_id)
    }

    fn get_plan_mut(&mut self, plan_id: &str) -> Option<&mut Plan> {
        self.plan_list.iter_mut().find(|fp| fp.id() == plan_id)
    }

    /// Stores or replaces a plan, optionally converting a linear plan to
    /// a kinematic one at the given turn rate.
    pub fn input_flightplan_data(
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
        self.plan_list.retain(|p| p.id() != plan_id);
        self.plan_list.push(fp);
        self.next_wp_id.insert(plan_id.to_string(), 1);
        Ok(())
    }

    /// Switches guidance mode. For plan modes, `next_wp == 0` re-bases
    /// the plan times onto the current clock (required when maintaining
    /// ETA) before engaging at the first leg.
    pub fn set_guidance_mode(
        &mut self,
        mode: GuidanceMode,
        plan_id: &str,
        next_wp: usize,
        eta: bool,
    ) {
        self.mode = mode;
        self.eta_control = eta;
        self.in_turn = false;
        if matches!(mode, GuidanceMode::Vector | GuidanceMode::Land) {
            return;
        }
        let curr_time = self.curr_time;
        let Some(fp) = self.get_plan_mut(plan_id) else {
            return;
        };
        let engage_wp = if next_wp == 0 {
            let diff = curr_time - fp.first_time();
            fp.time_shift(0, diff);
            1
        } else {
            next_wp
        };
        self.active_plan_id = plan_id.to_string();
        self.next_wp_id.insert(plan_id.to_string(), engage_wp);
        let fp = self.get_plan(plan_id).expect("just stored");
        if let Some(prev_tcp) = fp.prev_trk_tcp(engage_wp) {
            if fp.point(prev_tcp).is_bot() {
                self.in_turn = true;
            }
        }
    }

    /// Forwarded velocity command for VECTOR mode, clamped to the speed
    /// envelope.
    pub fn set_velocity_commands(&mut self, inputs: &Velocity) {
        let wind_gs = self.wind.gs();
        let gs = clamp(
            inputs.gs(),
            self.params.min_hs + wind_gs,
            self.params.max_hs + wind_gs,
        );
        self.output_cmd = inputs.mk_gs(gs);
    }

    /// Requests a speed change on the leg into `wp_id` of the named
    /// plan (negative `wp_id`: the leg currently being flown). The edit
    /// lives in a "PlanSpeedChange" clone; asking for the plan's own
    /// speed reverts to the original plan.
    pub fn change_waypoint_speed(&mut self, plan_id: &str, wp_id: i32, value: f64) {
        self.prev_plan = plan_id.to_string();
        let Some(fp) = self.get_plan(plan_id) else {
            return;
        };
        let wp_prev = if wp_id > 0 {
            wp_id as usize - 1
        } else {
            self.next_wp_id.get(plan_id).copied().unwrap_or(1).saturating_sub(1)
        };
        let new_ind = wp_prev + 1;

        // No clone when the requested speed already matches the plan.
        if (value - fp.gs_in(new_ind)).abs() < 1e-3 {
            self.active_plan_id = plan_id.to_string();
            self.next_wp_id.insert(plan_id.to_string(), new_ind);
            return;
        }

        let mut fp2 = fp.with_id(SPEED_CHANGE_PLAN);
        let mut prev_time = fp.time(new_ind - 1);
        for i in new_ind..fp2.len() {
            let old_time = fp2.time(i);
            let dist = fp2.path_distance(i - 1, i);
            let new_time = prev_time + dist / value;
            fp2.time_shift(i, new_time - old_time);
            prev_time = new_time;
        }

        self.plan_list.retain(|p| p.id() != SPEED_CHANGE_PLAN);
        self.plan_list.push(fp2);
        self.active_plan_id = SPEED_CHANGE_PLAN.to_string();
        self.next_wp_id.insert(SPEED_CHANGE_PLAN.to_string(), new_ind);
    }

    /// Requests an altitude change at `wp_id` (negative: current leg),
    /// applied to one waypoint or the whole remaining plan. The edit
    /// lives in a "PlanAltChange" clone; a vanishing delta reverts to
    /// the original plan.
    pub fn change_waypoint_alt(&mut self, plan_id: &str, wp_id: i32, value: f64, update_all: bool) {
        self.prev_plan = plan_id.to_string();
        let Some(fp) = self.get_plan(plan_id) else {
            return;
        };
        let wp_prev = if wp_id > 0 {
            wp_id as usize - 1
        } else {
            self.next_wp_id.get(plan_id).copied().unwrap_or(1).saturating_sub(1)
        };
        let new_ind = wp_prev + 1;

        let diff_alt = value - fp.pos(new_ind).alt();
        if diff_alt.abs() < 1e-4 {
            self.active_plan_id = plan_id.to_string();
            self.next_wp_id.insert(plan_id.to_string(), new_ind);
            return;
        }

        let mut fp2 = fp.with_id(ALT_CHANGE_PLAN);
        for i in new_ind..fp2.len() {
            let alt = fp2.pos(i).alt() + diff_alt;
            fp2.set_alt(i, alt);
            if !update_all {
                break;
            }
        }

        self.plan_list.retain(|p| p.id() != ALT_CHANGE_PLAN);
        self.plan_list.push(fp2);
        self.active_plan_id = ALT_CHANGE_PLAN.to_string();
        self.next_wp_id.insert(ALT_CHANGE_PLAN.to_string(), new_ind);
    }

    /// Moves the scheduled time of arrival at `wp_id`, shifting the
    /// whole suffix when `update_all` is set.
    pub fn change_waypoint_eta(&mut self, plan_id: &str, wp_id: usize, value: f64, update_all: bool) {
        if wp_id == 0 {
            return;
        }
        let Some(fp) = self.get_plan_mut(plan_id) else {
            return;
        };
        let delta = value - fp.time(wp_id);
        if update_all {
            fp.time_shift(wp_id, delta);
        } else {
            fp.set_time(wp_id, value);
        }
    }

    /// One guidance tick. Produces the velocity setpoint for the active
    /// mode and advances waypoint bookkeeping.
    pub fn run(&mut self, time: f64) -> GuidanceMode {
        self.curr_time = time;
        match self.mode {
            GuidanceMode::Flightplan | GuidanceMode::Point2Point => {
                if self.get_plan(&self.active_plan_id).is_some() {
                    self.compute_plan_guidance();
                }
                // A "<BOD>" info tag marks the beginning of descent.
                let next_wp = self.next_wp_id.get(&self.active_plan_id).copied().unwrap_or(0);
                if next_wp > 1 {
                    if let Some(fp) = self.get_plan(&self.active_plan_id) {
                        if next_wp - 1 < fp.len() && fp.point(next_wp - 1).info == "<BOD>" {
                            self.mode = GuidanceMode::Land;
                        }
                    }
                }
            }
            GuidanceMode::Land => {
                // Altitude-capture descent onto the final waypoint.
                let touchdown = self
                    .get_plan(&self.active_plan_id)
                    .map(|fp| (fp.last_point().position, fp.len()));
                if let Some((last_pos, len)) = touchdown {
                    let trk = self.current_pos.track(&last_pos).to_degrees();
                    let gs = 0.1 * self.current_pos.distance_h(&last_pos);
                    let vs = (0.5 * (last_pos.alt() - self.current_pos.alt()))
                        .max(self.params.min_vs);
                    self.output_cmd = Velocity::make_trk_gs_vs(trk, gs, vs);
                    if self.current_pos.distance_v(&last_pos) < 1.0 {
                        self.next_wp_id.insert(self.active_plan_id.clone(), len);
                    }
                }
            }
            // VECTOR forwards externally provided commands; TAKEOFF is
            // handled by the autopilot.
            GuidanceMode::Vector
            | GuidanceMode::Takeoff
            | GuidanceMode::SpeedChange
            | GuidanceMode::AltChange
            | GuidanceMode::Noop => {}
        }
        self.mode
    }

    pub fn get_output(&self) -> GuidanceOutput {
        let mut output = GuidanceOutput {
            mode: self.mode,
            active_plan: String::new(),
            next_wp: None,
            wp_reached: self.wp_reached,
            dist_h2_wp: self.dist_h2_next_wp,
            dist_v2_wp: self.dist_v2_next_wp,
            xtrack_dev: self.xtrack_dist,
            target: None,
            vel_cmd: self.output_cmd,
            yaw_forward: self.params.yaw_forward,
        };
        if let Some(fp) = self.get_plan(&self.active_plan_id) {
            // Internal edit clones still fly the original track over the
            // ground; report the previous id for cognition bookkeeping.
            output.active_plan =
                if self.active_plan_id == ALT_CHANGE_PLAN || self.active_plan_id == SPEED_CHANGE_PLAN {
                    self.prev_plan.clone()
                } else {
                    self.active_plan_id.clone()
                };
            let next_wp = self.next_wp_id.get(&self.active_plan_id).copied().unwrap_or(0);
            output.next_wp = Some(next_wp);
            output.target = Some(fp.pos(next_wp.min(fp.len() - 1)));
        }
        output
    }

    // ---- internal laws ----

    fn next_wp(&self) -> usize {
        self.next_wp_id.get(&self.active_plan_id).copied().unwrap_or(0)
    }

    /// Reference ground speed for the current leg.
    fn compute_speed(&mut self, fp: &Plan) -> f64 {
        let next_wp = self.next_wp();
        let next_pos = fp.point(next_wp.min(fp.len() - 1));

        self.eta_control = self.params.maintain_eta;
        // Transient edits and the ditch descent fly on stored speeds.
        if self.active_plan_id == SPEED_CHANGE_PLAN
            || self.active_plan_id == ALT_CHANGE_PLAN
            || self.active_plan_id == "DitchPath"
        {
            self.eta_control = false;
        }

        let wind_gs = self.wind.gs();
        let min_speed = self.params.min_hs + wind_gs;
        let max_speed = self.params.max_hs + wind_gs;
        if self.eta_control {
            let dist_h = self.current_pos.distance_h(&next_pos.position);
            let time_diff = next_pos.time - self.curr_time;
            let new_speed = if dist_h > 0.5 && time_diff > 0.001 {
                dist_h / time_diff
            } else {
                // Running late: catch up at the envelope limit.
                max_speed
            };
            clamp(new_speed, min_speed, max_speed)
        } else {
            let ref_speed = fp.gs_in(next_wp);
            if ref_speed <= min_speed {
                let dist_h = self.current_pos.distance_h(&next_pos.position);
                if ref_speed < 1e-3 && dist_h > 3.0 && self.params.min_hs < 1e-3 {
                    1.0
                } else {
                    min_speed
                }
            } else if ref_speed >= max_speed {
                max_speed
            } else {
                ref_speed
            }
        }
    }

    /// Reference climb rate for the current leg.
    fn compute_climb_rate(&self, fp: &Plan, speed_ref: f64) -> f64 {
        let next_wp = self.next_wp().min(fp.len() - 1);
        let prev_wp_pos = fp.pos(next_wp.saturating_sub(1));
        let next_wp_pos = fp.pos(next_wp);
        let delta_alt_ref = next_wp_pos.alt() - prev_wp_pos.alt();
        let delta_h = next_wp_pos.alt() - self.current_pos.alt();

        let climb_segment = delta_alt_ref.abs() > 1e-5;
        let mut fp_angle = self.params.climb_angle.to_radians();
        if delta_h < 0.0 {
            fp_angle = -fp_angle;
        }

        let climbrate = if delta_h.abs() > self.params.vertical_climb_delta {
            if self.params.maintain_eta {
                // Track the planned altitude profile at the current
                // clock rather than slewing at the limits.
                let plan_alt = fp.position_at(self.curr_time).alt();
                (plan_alt - self.current_pos.alt()) * self.params.climb_rate_gain
            } else if fp.is_linear() {
                if fp_angle.abs() < std::f64::consts::FRAC_PI_2
                    && speed_ref > 1e-3
                    && climb_segment
                {
                    // speed_ref is the adjacent side, climb rate the
                    // opposite side of the flight path angle.
                    fp_angle.tan() * speed_ref
                } else if delta_h > 0.0 {
                    self.params.max_vs
                } else {
                    self.params.min_vs
                }
            } else {
                fp.vs_in(next_wp)
            }
        } else {
            delta_h * self.params.climb_rate_gain
        };

        clamp(climbrate, self.params.min_vs, self.params.max_vs)
    }

    /// Reference heading: geometric turn law while inside a turn
    /// segment, the line-of-sight circle law otherwise.
    fn compute_new_heading(&mut self, fp: &Plan, speed_ref: &mut f64) -> f64 {
        let next_wp = self.next_wp() % fp.len();
        let guidance_radius =
            (self.current_ground_speed.gs() * self.params.guidance_radius_scaling).max(1.0);

        if next_wp > 1 {
            if fp.is_bot(next_wp - 1) {
                self.in_turn = true;
            } else if fp.is_eot(next_wp - 1) {
                self.in_turn = false;
            }
        } else {
            self.in_turn = false;
        }
        if fp.is_linear() {
            self.in_turn = false;
        }

        if self.in_turn {
            if let Some(bot) = fp.prev_bot(next_wp.saturating_sub(1)) {
                return self.turn_heading(fp, bot, next_wp, speed_ref);
            }
            self.in_turn = false;
        }

        let (_, target) = self.offset_position_on_plan(fp, next_wp, guidance_radius);
        wrap_deg(self.current_pos.track(&target).to_degrees())
    }

    /// Geometric turn law: steer along the tangent of the turn circle,
    /// corrected for radial error.
    fn turn_heading(&self, fp: &Plan, bot: usize, next_wp: usize, speed_ref: &mut f64) -> f64 {
        let center = fp.point(bot).turn_center().expect("BOT carries a center");
        let turn_radius = fp.point(bot).turn_radius().expect("BOT carries a radius");
        let turn_direction: f64 = if turn_radius > 0.0 { 1.0 } else { -1.0 };

        let proj = Projection::new(center);
        let trk1 = proj.project(&fp.pos(next_wp - 1)).vect2().trk();
        let trk2 = proj.project(&fp.pos(next_wp)).vect2().trk();
        let trk3 = proj.project(&self.current_pos).vect2().trk();

        // Tangent heading at the current radial.
        let current_ideal_trk = trk3 + turn_direction * std::f64::consts::FRAC_PI_2;

        if self.eta_control {
            let dir = if turn_direction > 0.0 { 1 } else { -1 };
            let turn_target_delta = turn_delta(trk1, trk2, dir);
            let mut turn_current_delta = turn_delta(trk1, trk3, dir);
            if turn_current_delta >= std::f64::consts::PI * 1.5 {
                turn_current_delta = 0.0;
            }
            let mut turn_rate = fp.gs_in(next_wp) / turn_radius.abs();
            let time_remaining_turn = if turn_rate > 1e-6 {
                ((turn_target_delta - turn_current_delta) / turn_rate).abs()
            } else {
                0.0
            };
            let actual_time_remaining = fp.time(next_wp) - self.curr_time;
            if actual_time_remaining < time_remaining_turn {
                turn_rate *= 1.3;
            } else {
                turn_rate *= 0.9;
            }
            *speed_ref = self.params.max_hs.min(turn_radius.abs() * turn_rate);
        }

        let dist2center = self.current_pos.distance_h(&center);
        // 0 on the arc, negative inside the turn, positive outside.
        let offset = dist2center / turn_radius.abs() - 1.0;
        let add_turn = (offset * self.params.turnrate_gain).min(std::f64::consts::FRAC_PI_4);

        let output = if turn_radius > 0.0 {
            current_ideal_trk + add_turn
        } else {
            current_ideal_trk - add_turn
        };
        wrap_deg(output.to_degrees())
    }

    /// Line-of-sight circle law: pick the point on the current leg the
    /// vehicle should steer towards. Returns the perpendicular deviation
    /// and the target point.
    fn offset_position_on_plan(
        &self,
        fp: &Plan,
        next_wp: usize,
        guidance_radius: f64,
    ) -> (f64, Position) {
        let next_wp = next_wp.clamp(1, fp.len() - 1);
        let xtrk_dev = guidance_radius;

        let proj_at_a = Projection::new(fp.pos(next_wp - 1));
        let ab = proj_at_a.project(&fp.pos(next_wp));
        let ap = proj_at_a.project(&self.current_pos);

        let dist_ab = ab.norm2d();
        let dist_ap = ap.norm2d();
        let dist_pb = (ab - ap).norm2d();

        if dist_ab < 1e-3 {
            return (0.0, self.current_pos);
        }

        let projection = ap.dot2d(ab) / (dist_ab * dist_ab);
        let closest_point = ab * projection;
        let deviation = (closest_point - ap).norm2d();

        let proj_at_pos = Projection::new(self.current_pos);
        let wp_a = proj_at_pos.project(&fp.pos(next_wp - 1));
        let wp_b = proj_at_pos.project(&fp.pos(next_wp));

        let target = if dist_pb <= guidance_radius {
            fp.pos(next_wp)
        } else if dist_ap <= guidance_radius {
            let v = circle_segment_intersection(wp_a, wp_b, guidance_radius);
            proj_at_pos.inverse(v).mk_alt(fp.pos(next_wp).alt())
        } else if projection <= 0.0 {
            fp.pos(next_wp - 1)
        } else if projection >= 1.0 {
            fp.pos(next_wp)
        } else if deviation < xtrk_dev {
            let v = circle_segment_intersection(wp_a, wp_b, guidance_radius);
            proj_at_pos.inverse(v).mk_alt(fp.pos(next_wp).alt())
        } else {
            proj_at_a.inverse(closest_point).mk_alt(fp.pos(next_wp).alt())
        };

        (deviation, target)
    }

    /// Rate limits and saturations applied to the raw references.
    fn filter_command(&self, fp: &Plan, ref_heading: f64, ref_speed: &mut f64) {
        let ownship_gs = self.current_ground_speed.gs();
        let gs_range = self.params.max_hs - self.params.min_hs;

        // Sharp turns on linear plans get a speed reduction so the
        // vehicle can actually make the corner.
        if fp.is_linear() {
            let ownship_heading = self.current_ground_speed.trk();
            let dir = turn_dir(ownship_heading, ref_heading.to_radians());
            let turn_angle =
                turn_delta(ownship_heading, ref_heading.to_radians(), dir).to_degrees();
            if turn_angle.abs() > 60.0 && *ref_speed > self.params.min_hs + gs_range * 0.25 {
                *ref_speed = (*ref_speed / 4.0).max(self.params.min_hs);
            }
        }

        if self.dist_h2_next_wp < 1e-3 {
            *ref_speed = 0.0;
        }

        // Low-pass the ground speed when the requested change exceeds
        // half the speed range. Vertical speed passes unfiltered.
        let n_gs = if (*ref_speed - ownship_gs).abs() > gs_range / 2.0 { 0.3 } else { 1.0 };
        *ref_speed = (1.0 - n_gs) * ownship_gs + n_gs * *ref_speed;
    }

    /// Approach-precision check: dot product of the current velocity
    /// with the vector to the waypoint. Non-negative while approaching.
    fn approach_precision(&self, waypoint: &Position) -> f64 {
        let proj = Projection::new(self.current_pos);
        let to_wp = proj.project(waypoint).vect2().hat();
        let vhat = self.current_ground_speed.vect2().hat();
        vhat.dot(to_wp)
    }

    fn check_waypoint_arrival(&mut self, fp: &Plan) {
        let next_wp = self.next_wp();
        let waypoint = fp.pos(next_wp.min(fp.len() - 1));
        let curr_speed = self.current_ground_speed.gs();

        self.dist_h2_next_wp = self.current_pos.distance_h(&waypoint);
        self.dist_v2_next_wp = self.current_pos.distance_v(&waypoint);

        let capture_radius = clamp(
            curr_speed * self.params.capture_radius_scaling,
            self.params.min_capture_radius,
            self.params.max_capture_radius,
        );

        let approach_prec = self.approach_precision(&waypoint);
        let alt_reached = self.dist_v2_next_wp <= self.params.vertical_climb_delta;

        if self.dist_h2_next_wp <= capture_radius
            && alt_reached
            && (approach_prec >= 0.0 || curr_speed < 0.5)
        {
            self.wp_reached = true;
            self.next_wp_id.insert(self.active_plan_id.clone(), next_wp + 1);
        } else {
            self.wp_reached = false;
        }
    }

    fn compute_plan_guidance(&mut self) {
        let fp = self
            .get_plan(&self.active_plan_id)
            .expect("caller checked the plan exists")
            .clone();
        let next_wp = self.next_wp();
        if next_wp >= fp.len() {
            self.wp_reached = true;
            self.output_cmd = Velocity::zero();
            return;
        }

        let mut speed_ref = self.compute_speed(&fp);
        let new_heading = self.compute_new_heading(&fp, &mut speed_ref);
        let climb_rate = self.compute_climb_rate(&fp, speed_ref);

        self.xtrack_dist = self.offset_position_on_plan(&fp, next_wp, 1.0).0;
        self.filter_command(&fp, new_heading, &mut speed_ref);

        self.output_cmd = Velocity::make_trk_gs_vs(new_heading, speed_ref, climb_rate);
        self.check_waypoint_arrival(&fp);
    }
}

/// Intersection of a circle of radius `r` centered on the origin with
/// the line through `wp_a` and `wp_b`; of the up-to-two solutions the
/// one closer to `wp_b` is returned. Falls back to `wp_b` when the
/// circle misses the line.
fn circle_segment_intersection(wp_a: Vect3, wp_b: Vect3, r: f64) -> Vect3 {
    let (x1, y1, x2, y2);
    if (wp_b.x - wp_a.x).abs() > 1e-2 {
        let m = (wp_b.y - wp_a.y) / (wp_b.x - wp_a.x);
        let c = wp_a.y - wp_a.x * m;
        let aq = 1.0 + m * m;
        let bq = 2.0 * m * c;
        let cq = c * c - r * r;
        let discr = bq * bq - 4.0 * aq * cq;
        if discr < 0.0 {
            return wp_b;
        }
        let discr_sqrt = discr.sqrt();
        x1 = (-bq - discr_sqrt) / (2.0 * aq);
        x2 = (-bq + discr_sqrt) / (2.0 * aq);
        y1 = m * x1 + c;
        y2 = m * x2 + c;
    } else {
        x1 = wp_a.x;
        x2 = x1;
        if r > x1.abs() {
            y1 = (r * r - x1 * x1).sqrt();
            y2 = -y1;
        } else {
            y1 = wp_a.y;
            y2 = wp_b.y;
        }
    }

    let p1 = Vect3::new(x1, y1, 0.0);
    let p2 = Vect3::new(x2, y2, 0.0);
    if p1.distance_h(wp_b) < p2.distance_h(wp_b) { p1 } else { p2 }
}
