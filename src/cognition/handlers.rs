//! Concrete event handlers. Each one steps through the scheduler's
//! initialize/execute/terminate lifecycle and communicates exclusively
//! through the cognition command queue; none of them block.

use super::commands::Severity;
use super::event_manager::{EventHandler, HandlerCtx, HandlerResult};
use super::state::{CognitionState, RequestState, ResolutionType, TakeoffStatus};
use super::triggers::primary_plan_completion_trigger;
use crate::{log, warn};
use itertools::Itertools;

type Ctx<'a> = HandlerCtx<'a, CognitionState>;

fn conflict_traffic_list(state: &CognitionState) -> String {
    state.conflict_traffics.iter().filter(|id| !id.is_empty()).join(", ")
}

/// Polls the plan store for the response to an outstanding path request
/// and promotes the protocol to RESPONDED when the plan shows up.
fn poll_path_request(state: &mut CognitionState, plan_id: &str) {
    if state.path_request == RequestState::Processing && state.get_plan(plan_id).is_some() {
        state.path_request = RequestState::Responded;
    }
}

/// Activates the nominal mission plan at its current next waypoint.
pub struct EngageNominalPlan;

impl EventHandler<CognitionState> for EngageNominalPlan {
    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Engage nominal plan");
        let plan_id = ctx.state.mission_plan.clone();
        let next_wp = ctx.state.next_wp_index(&plan_id);
        ctx.state.set_guidance_flight_plan(&plan_id, next_wp);
        ctx.state.ic_ready = true;
        if ctx.state.mission_start > 0 {
            ctx.state.mission_start = -1;
        }
        HandlerResult::Success
    }
}

/// Commands takeoff and waits for the host's confirmation.
pub struct TakeoffPhaseHandler {
    takeoff_start_time: f64,
}

impl TakeoffPhaseHandler {
    /// Restart takeoff if no confirmation arrives within this window (s).
    const CONFIRMATION_TIMEOUT: f64 = 5.0;

    pub fn new() -> Self { Self { takeoff_start_time: 0.0 } }
}

impl EventHandler<CognitionState> for TakeoffPhaseHandler {
    fn initialize(&mut self, ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Takeoff phase");
        ctx.state.commands.push_back(super::commands::Command::Takeoff);
        ctx.state.mission_start = -1;
        ctx.state.takeoff_state = TakeoffStatus::InProgress;
        self.takeoff_start_time = ctx.state.utc_time;
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        if ctx.state.takeoff_state == TakeoffStatus::Complete {
            HandlerResult::Success
        } else if ctx.state.utc_time - self.takeoff_start_time > Self::CONFIRMATION_TIMEOUT {
            warn!("Takeoff failed. Restarting takeoff");
            HandlerResult::Reset
        } else {
            HandlerResult::InProgress
        }
    }

    fn terminate(&mut self, ctx: &mut Ctx) -> HandlerResult {
        if ctx.state.takeoff_state == TakeoffStatus::Complete {
            let mission_plan = ctx.state.mission_plan.clone();
            ctx.state.next_wp_id.insert(mission_plan, 1);
            ctx.spawn("Departure", Box::new(EngageNominalPlan));
        }
        HandlerResult::Success
    }
}

/// Closed-loop vectoring back to the mission using velocity commands
/// only.
pub struct Vector2Mission {
    target: crate::geom::Position,
    gs: f64,
}

impl Vector2Mission {
    pub fn new() -> Self {
        Self {
            target: crate::geom::Position::default(),
            gs: 0.0,
        }
    }
}

impl EventHandler<CognitionState> for Vector2Mission {
    fn initialize(&mut self, ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Vector to mission");
        let state = &mut *ctx.state;
        self.gs = state.velocity.gs();
        if state.parameters.return2_next_wp {
            if state.mission_plan == "Plan0" {
                let next_feasible = state.next_feasible_wp_id;
                state.next_wp_id.insert(state.mission_plan.clone(), next_feasible);
            }
            let index = state.next_wp_index(&state.mission_plan);
            let Some(fp) = state.get_plan(&state.mission_plan) else {
                return HandlerResult::Shutdown;
            };
            self.target = fp.pos(index);
        } else {
            self.target = state.clst_point;
        }
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        let state = &mut *ctx.state;
        let trk_ref = state.position.track(&self.target).to_degrees();
        // Proportional altitude-rate control towards the target.
        let vs = (0.1 * (self.target.alt() - state.position.alt())).clamp(-2.5, 2.5);
        let dist = state.position.distance_h(&self.target);
        let trk_current = state.velocity.compass_deg();

        let diff = (360.0 + (trk_current - trk_ref).abs()) % 360.0;
        let trk_cmd = if diff >= 45.0 {
            if state.right_turn_conflict {
                trk_current - 2.0
            } else if state.left_turn_conflict {
                trk_current + 2.0
            } else {
                trk_ref
            }
        } else {
            trk_ref
        };

        // Speed reduction near the target to facilitate capture.
        if dist < 200.0 {
            self.gs = self.gs.min(dist * 0.25);
        }

        state.set_guidance_vel_cmd(trk_cmd, self.gs, vs);

        if dist < (2.5 * self.gs).max(10.0) {
            HandlerResult::Success
        } else {
            HandlerResult::InProgress
        }
    }

    fn terminate(&mut self, ctx: &mut Ctx) -> HandlerResult {
        ctx.spawn("", Box::new(EngageNominalPlan));
        HandlerResult::Success
    }
}

/// Requests a detour plan back to the mission and activates it once the
/// planner responds.
pub struct ReturnToMission;

impl EventHandler<CognitionState> for ReturnToMission {
    fn initialize(&mut self, ctx: &mut Ctx) -> HandlerResult {
        if primary_plan_completion_trigger(ctx.state) {
            return HandlerResult::Shutdown;
        }
        if !ctx.state.parameters.active {
            return HandlerResult::Shutdown;
        }

        log!("Handler | Return to mission");
        let state = &mut *ctx.state;
        state.num_sec_paths += 1;
        let path_name = format!("Plan{}", state.num_sec_paths);

        let position_a = state.position;
        let velocity_a = state.velocity;

        let (position_b, velocity_b) = if state.parameters.return2_next_wp {
            if state.mission_plan == "Plan0" {
                let next_feasible = state.next_feasible_wp_id;
                state.next_wp_id.insert(state.mission_plan.clone(), next_feasible);
            }
            let index = state.next_wp_index(&state.mission_plan);
            let Some(fp) = state.get_plan(&state.mission_plan) else {
                return HandlerResult::Shutdown;
            };
            (fp.pos(index), fp.velocity_out(index.min(fp.len() - 1)))
        } else {
            let index = state.next_wp_index(&state.mission_plan);
            let Some(fp) = state.get_plan(&state.mission_plan) else {
                return HandlerResult::Shutdown;
            };
            let vel = crate::geom::Velocity::make_trk_gs_vs(
                fp.trk_in(index).to_degrees(),
                fp.gs_in(index),
                fp.vs_in(index),
            );
            (state.clst_point, vel)
        };

        state.find_new_path(&path_name, position_a, velocity_a, position_b, velocity_b);
        state.send_status(Severity::Notice, "IC:Computing secondary path");
        state.path_request = RequestState::Processing;
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        let path_name = format!("Plan{}", ctx.state.num_sec_paths);
        if ctx.state.path_request == RequestState::Responded {
            ctx.state.path_request = RequestState::Nil;
            ctx.state.set_guidance_flight_plan(&path_name, 1);
            HandlerResult::Success
        } else {
            poll_path_request(ctx.state, &path_name);
            HandlerResult::InProgress
        }
    }
}

/// Variant of [`ReturnToMission`] that always plans to the next feasible
/// waypoint reported by the trajectory monitor.
pub struct ReturnToNextFeasibleWP;

impl EventHandler<CognitionState> for ReturnToNextFeasibleWP {
    fn initialize(&mut self, ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Return to next feasible WP");
        if primary_plan_completion_trigger(ctx.state) {
            return HandlerResult::Shutdown;
        }
        if !ctx.state.parameters.active {
            return HandlerResult::Shutdown;
        }

        let state = &mut *ctx.state;
        if state.mission_plan == "Plan0" {
            let next_feasible = state.next_feasible_wp_id;
            state.next_wp_id.insert(state.mission_plan.clone(), next_feasible);
        }
        let index = state.next_wp_index(&state.mission_plan);
        log!("Status | {} | Return to next feasible waypoint {index}", state.call_sign);

        state.num_sec_paths += 1;
        let path_name = format!("Plan{}", state.num_sec_paths);
        let Some(fp) = state.get_plan(&state.mission_plan) else {
            return HandlerResult::Shutdown;
        };
        let position_b = fp.pos(index);
        let velocity_b = fp.velocity_out(index.min(fp.len() - 1));
        let position_a = state.position;
        let velocity_a = state.velocity;

        state.find_new_path(&path_name, position_a, velocity_a, position_b, velocity_b);
        state.send_status(Severity::Notice, "IC:Computing secondary path");
        state.path_request = RequestState::Processing;
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        let path_name = format!("Plan{}", ctx.state.num_sec_paths);
        if ctx.state.path_request == RequestState::Responded {
            ctx.state.path_request = RequestState::Nil;
            ctx.state.set_guidance_flight_plan(&path_name, 1);
            // Line-of-sight status is refreshed by the next trajectory
            // monitor record.
            ctx.state.line_of_sight_to_goal_prev = true;
            HandlerResult::Success
        } else {
            poll_path_request(ctx.state, &path_name);
            HandlerResult::InProgress
        }
    }
}

/// Commands the landing sequence.
pub struct LandPhaseHandler;

impl EventHandler<CognitionState> for LandPhaseHandler {
    fn initialize(&mut self, _ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Land phase");
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        ctx.state.send_status(Severity::Notice, "IC: Landing");
        ctx.state.commands.push_back(super::commands::Command::Land);
        ctx.state.mission_start = -2;
        ctx.state.active_plan_id = None;
        log!("Flight phases | LANDING -> IDLE");
        HandlerResult::Success
    }
}

/// Resolves a traffic conflict in the dimension selected by
/// `resolution_type`, then dispatches the configured return-to-mission
/// strategy.
pub struct TrafficConflictHandler {
    start_time: f64,
}

impl TrafficConflictHandler {
    pub fn new() -> Self { Self { start_time: 0.0 } }
}

impl EventHandler<CognitionState> for TrafficConflictHandler {
    fn initialize(&mut self, ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Traffic conflict");
        let state = &mut *ctx.state;
        state.resolution_start_speed = state.velocity.gs();
        state.prev_res_speed = state.resolution_start_speed;
        state.prev_res_track = state.hdg;
        state.prev_res_alt = state.position.alt();
        state.prev_res_vspeed = state.velocity.vs();
        state.preferred_speed = state.prev_res_speed;
        state.preferred_track = state.prev_res_track;
        state.preferred_alt = state.prev_res_alt;
        state.traffic_conflict_start_time = state.utc_time;

        state.res_type = state.get_resolution_type();

        if !state.valid_resolution[state.res_type.dim()] {
            return HandlerResult::Shutdown;
        }

        let against = conflict_traffic_list(state);
        match state.res_type {
            ResolutionType::Speed => {
                log!("Status | {} | Resolving traffic conflict with speed resolution against {against}", ctx.event());
            }
            ResolutionType::Altitude => {
                log!("Status | {} | Resolving traffic conflict with altitude resolution against {against}", ctx.event());
            }
            ResolutionType::Track => {
                log!("Status | {} | Resolving traffic conflict with track resolution against {against}", ctx.event());
            }
            ResolutionType::VerticalSpeed => {
                log!("Status | {} | Resolving traffic conflict with vertical speed resolution against {against}", ctx.event());
            }
            _ => {}
        }

        if !ctx.state.parameters.active {
            return HandlerResult::Shutdown;
        }
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        let state = &mut *ctx.state;
        let mut resolution = state.res_type;

        // With track, speed and vs all in recovery there is no room for
        // a combined resolution.
        if state.recovery[ResolutionType::Track.dim()]
            && state.recovery[ResolutionType::Speed.dim()]
            && state.recovery[ResolutionType::VerticalSpeed.dim()]
            && resolution == ResolutionType::Combined
        {
            resolution = ResolutionType::Track;
        }

        if state.mission_plan == "Plan0" {
            let next_feasible = state.next_feasible_wp_id;
            state.next_wp_id.insert(state.mission_plan.clone(), next_feasible);
        }
        let index = state.next_wp_index(&state.mission_plan);
        let Some(fp) = state.get_plan(&state.mission_plan) else {
            return HandlerResult::Shutdown;
        };
        let target = fp.pos(index);

        match resolution {
            ResolutionType::Speed => {
                if (state.preferred_speed - state.prev_res_speed).abs() >= 0.1 {
                    if let Some(active_id) = state.active_plan_id.clone() {
                        let speed = state.preferred_speed;
                        state.set_guidance_speed_cmd(&active_id, speed, false);
                    }
                    state.prev_res_speed = state.preferred_speed;
                }
                state.return_safe = state.compute_target_feasibility(target);
            }

            ResolutionType::Altitude => {
                let mut alt_pref = state.preferred_alt;
                if state.tod_altitude > 0.0 {
                    alt_pref = state.tod_altitude;
                }
                let new_target_alt = (alt_pref - state.prev_res_alt).abs() > 1e-3;
                let prev_target_reached = (state.position.alt() - state.prev_res_alt).abs() < 10.0;
                // A new resolution is only commanded once the previous
                // target altitude has been reached, to avoid oscillation.
                if (new_target_alt && prev_target_reached) || state.new_alt_conflict {
                    state.new_alt_conflict = false;
                    if let Some(active_id) = state.active_plan_id.clone() {
                        state.set_guidance_alt_cmd(&active_id, alt_pref, true);
                    }
                    state.prev_res_alt = alt_pref;
                }
                state.return_safe = state.compute_target_feasibility(target);
            }

            ResolutionType::Track => {
                let speed = state.resolution_start_speed;
                let track = state.preferred_track;
                state.set_guidance_vel_cmd(track, speed, 0.0);
                state.prev_res_track = state.preferred_track;
                state.return_safe = state.compute_target_feasibility(target);
                if !state.parameters.return2_next_wp {
                    let clst = state.clst_point;
                    state.return_safe &= state.compute_target_feasibility(clst);
                    state.closest_point_feasible = state.return_safe;
                }
            }

            ResolutionType::VerticalSpeed => {
                let speed = state.resolution_start_speed;
                let hdg = state.hdg;
                let res_up = state.res_v_up;
                let res_down = state.res_v_down;
                // Prefer the up resolution, then the down resolution;
                // level flight wins over either when it is available.
                if res_up.is_finite() {
                    if res_up >= 1e-3 {
                        state.set_guidance_vel_cmd(hdg, speed, -res_up);
                        state.prev_res_vspeed = res_up;
                    } else {
                        state.set_guidance_vel_cmd(hdg, speed, 0.0);
                        state.prev_res_vspeed = 0.0;
                    }
                } else if res_down.is_finite() {
                    if res_down <= -1e-3 {
                        state.set_guidance_vel_cmd(hdg, speed, -res_down);
                        state.prev_res_vspeed = res_down;
                    } else {
                        state.set_guidance_vel_cmd(hdg, speed, 0.0);
                        state.prev_res_vspeed = 0.0;
                    }
                } else {
                    let vs = state.prev_res_vspeed;
                    state.set_guidance_vel_cmd(hdg, speed, vs);
                }
                state.return_safe = state.vs_bands_num == 0;
            }

            ResolutionType::Combined => {
                let mut out_track = state.preferred_track;
                let mut out_speed = state.preferred_speed;
                let mut out_vs = state.preferred_vspeed;
                if state.recovery[ResolutionType::Track.dim()] {
                    out_track = state.velocity.compass_deg();
                }
                if state.recovery[ResolutionType::Speed.dim()] {
                    out_speed = state.velocity.gs();
                }
                if state.recovery[ResolutionType::VerticalSpeed.dim()] {
                    out_vs = state.velocity.vs();
                }
                state.set_guidance_vel_cmd(out_track, out_speed, out_vs);
                state.return_safe = state.compute_target_feasibility(target);
            }

            ResolutionType::Search | ResolutionType::Ditch => {}
        }

        // Resolved only once the conflict clears and the return to the
        // target is safe.
        if state.traffic_conflict || !state.return_safe {
            HandlerResult::InProgress
        } else {
            self.start_time = state.utc_time;
            HandlerResult::Success
        }
    }

    fn terminate(&mut self, ctx: &mut Ctx) -> HandlerResult {
        let persistence = ctx.state.parameters.persistence_time;
        if ctx.state.utc_time - self.start_time < persistence {
            return HandlerResult::InProgress;
        }
        let Some(plan_id) = ctx.state.active_plan_id.clone() else {
            return HandlerResult::Success;
        };
        match ctx.state.res_type {
            ResolutionType::Speed => {
                // Restore the nominal leg speed before re-engaging.
                let speed = ctx.state.resolution_start_speed;
                ctx.state.set_guidance_speed_cmd(&plan_id, speed, false);
                let next_wp = ctx.state.next_wp_index(&plan_id);
                ctx.state.set_guidance_flight_plan(&plan_id, next_wp);
                log!("Handler | Engage nominal plan");
            }
            ResolutionType::Altitude => {
                let next_wp = ctx.state.next_wp_index(&plan_id);
                if let Some(fp) = ctx.state.get_plan(&plan_id) {
                    let alt = fp.pos(next_wp).alt();
                    if (ctx.state.prev_res_alt - alt).abs() > 1e-3 {
                        ctx.state.set_guidance_alt_cmd(&plan_id, alt, true);
                        ctx.state.prev_res_alt = alt;
                        ctx.state.set_guidance_flight_plan(&plan_id, next_wp);
                        log!("Handler | Engage nominal plan");
                    }
                }
            }
            _ => {
                if ctx.state.parameters.return_vector {
                    let child_priority = ctx.priority() - 0.6;
                    ctx.spawn_with_priority(
                        "PostTrafficConflict",
                        Box::new(Vector2Mission::new()),
                        child_priority,
                    );
                } else {
                    ctx.spawn("PostTrafficConflict", Box::new(ReturnToMission));
                }
            }
        }
        let against = conflict_traffic_list(ctx.state);
        ctx.state.send_status(Severity::Notice, "IC:traffic conflict resolved");
        log!("Resolved | Traffic conflict resolved against {against}");
        ctx.state.conflict_traffics.clear();
        HandlerResult::Success
    }
}

/// Tracks an ongoing merge so other handlers stay quiet meanwhile.
pub struct MergingHandler {
    merging_speed_change: bool,
}

impl MergingHandler {
    pub fn new() -> Self { Self { merging_speed_change: false } }
}

impl EventHandler<CognitionState> for MergingHandler {
    fn initialize(&mut self, _ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Merging");
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        match ctx.state.merging_active {
            0 | 2 => HandlerResult::Success,
            3 => {
                self.merging_speed_change = true;
                HandlerResult::InProgress
            }
            _ => HandlerResult::InProgress,
        }
    }

    fn terminate(&mut self, ctx: &mut Ctx) -> HandlerResult {
        // Re-engage the mission plan if the merge changed speeds.
        if self.merging_speed_change {
            let plan_id = ctx.state.mission_plan.clone();
            let next_wp = ctx.state.next_wp_index(&plan_id);
            ctx.state.set_guidance_flight_plan(&plan_id, next_wp);
        }
        log!("Flight phases | MERGING -> CRUISE");
        HandlerResult::Success
    }
}

/// Asks the external planner for a ditch site.
pub struct RequestDitchSite;

impl EventHandler<CognitionState> for RequestDitchSite {
    fn initialize(&mut self, _ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Request ditch site");
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        ctx.state.set_ditch_site_request_cmd();
        log!("Status | Sending ditch request signal");
        HandlerResult::Success
    }
}

/// Plans a path to the top-of-descent point above the ditch site and
/// follows it.
pub struct ProceedToDitchSite;

impl EventHandler<CognitionState> for ProceedToDitchSite {
    fn initialize(&mut self, ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Proceed to ditch site");
        let state = &mut *ctx.state;
        let position_a = state.position.mk_alt(state.tod_altitude);
        // TOD sits one TOD-altitude short of the site, assuming a 45°
        // descent on the final leg.
        let trk = state.ditch_site.track(&position_a);
        let position_b =
            state.ditch_site.linear_dist_2d(trk, state.tod_altitude).mk_alt(state.tod_altitude);
        let trk_goal = position_a.track(&position_b).to_degrees();
        let velocity_a = state.velocity;
        let velocity_b = crate::geom::Velocity::make_trk_gs_vs(trk_goal, 3.0, 0.0);
        state.find_new_path("DitchPath", position_a, velocity_a, position_b, velocity_b);
        state.send_status(Severity::Notice, "IC:Computing ditch path");
        state.path_request = RequestState::Processing;
        state.ditch = false;
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        if ctx.state.path_request == RequestState::Responded {
            ctx.state.path_request = RequestState::Nil;
            ctx.state.set_guidance_flight_plan("DitchPath", 1);
            ctx.state.mission_plan = "DitchPath".to_string();
            HandlerResult::Success
        } else {
            poll_path_request(ctx.state, "DitchPath");
            HandlerResult::InProgress
        }
    }
}

/// After the top of descent: fly point-to-point down to the ditch site,
/// then hand over to the land phase.
pub struct ProceedFromTODtoLand;

impl ProceedFromTODtoLand {
    /// Final approach speed to the ditch site (m/s).
    const DITCH_APPROACH_SPEED: f64 = 1.5;
}

impl EventHandler<CognitionState> for ProceedFromTODtoLand {
    fn initialize(&mut self, ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Proceed from TOD to land");
        log!("Status | Reached TOD, proceeding to land");
        let site = ctx.state.ditch_site;
        ctx.state.top_of_descent = true;
        ctx.state.p2p_complete = false;
        ctx.state.set_guidance_p2p(site, Self::DITCH_APPROACH_SPEED);
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        if ctx.state.ditch {
            // A repeated ditch signal mid-approach means the current
            // site is infeasible; yield to the ditching event.
            HandlerResult::Success
        } else if ctx.state.p2p_complete {
            ctx.state.active_plan_id = None;
            HandlerResult::Success
        } else {
            HandlerResult::InProgress
        }
    }

    fn terminate(&mut self, ctx: &mut Ctx) -> HandlerResult {
        log!("Status | Execute land handler");
        ctx.spawn("PostTODtoLand", Box::new(LandPhaseHandler));
        HandlerResult::Success
    }
}

/// Requests a path back to the launch point and activates it.
pub struct ReturnToLaunch;

impl EventHandler<CognitionState> for ReturnToLaunch {
    fn initialize(&mut self, ctx: &mut Ctx) -> HandlerResult {
        log!("Handler | Return to launch");
        let state = &mut *ctx.state;
        state.rtl = false;
        let position_a = state.position;
        let position_b = state.launch_point.mk_alt(state.position.alt());
        let trk_goal = position_a.track(&position_b).to_degrees();
        let velocity_a = state.velocity;
        let velocity_b = crate::geom::Velocity::make_trk_gs_vs(trk_goal, 3.0, 0.0);
        state.find_new_path("RtlPath", position_a, velocity_a, position_b, velocity_b);
        state.send_status(Severity::Notice, "IC:Computing RTL path");
        state.path_request = RequestState::Processing;
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut Ctx) -> HandlerResult {
        if ctx.state.path_request == RequestState::Responded {
            ctx.state.path_request = RequestState::Nil;
            ctx.state.set_guidance_flight_plan("RtlPath", 1);
            ctx.state.mission_plan = "RtlPath".to_string();
            HandlerResult::Success
        } else {
            poll_path_request(ctx.state, "RtlPath");
            HandlerResult::InProgress
        }
    }
}
