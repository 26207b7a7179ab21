//! Cognition: the priority-driven decision core. Ingests fused state,
//! schedules event handlers and emits guidance commands.

pub mod commands;
pub mod event_manager;
pub mod handlers;
pub mod state;
pub mod triggers;

#[cfg(test)]
mod tests;

pub use commands::{Command, Severity};
pub use event_manager::{EventManager, ExecState, HandlerResult};
pub use state::{Band, BandRegion, BandSet, CognitionState, RequestState, ResolutionType, TakeoffStatus};

use crate::geom::{Position, Velocity};
use crate::monitor::{FenceType, TrajectoryMonitorData};
use crate::params::Parameters;
use crate::plan::{Plan, PlanError, Waypoint, repair, xtrack_distance};
use crate::{error, log};
use handlers::{
    EngageNominalPlan, LandPhaseHandler, MergingHandler, ProceedFromTODtoLand, ProceedToDitchSite,
    RequestDitchSite, ReturnToLaunch, ReturnToMission, ReturnToNextFeasibleWP,
    TakeoffPhaseHandler, TrafficConflictHandler,
};
use triggers::SEARCH_DIGIT;

/// Current geofence conflict summary delivered by the fence monitor.
#[derive(Debug, Clone, Default)]
pub struct GeofenceConflict {
    pub num_conflicts: usize,
    pub conflict_types: Vec<FenceType>,
    pub recovery_position: Position,
}

/// Resolution dimension indices into the conflict/recovery arrays.
const SPEED_DIM: usize = 0;
const ALT_DIM: usize = 1;
const TRACK_DIM: usize = 2;
const VS_DIM: usize = 3;

/// The cognition core: fused state plus the event scheduler.
pub struct Cognition {
    pub state: CognitionState,
    event_mng: EventManager<CognitionState>,
}

impl Cognition {
    pub fn new(call_sign: &str) -> Self {
        let mut cog = Self {
            state: CognitionState::new(call_sign),
            event_mng: EventManager::new(),
        };
        cog.initialize_event_handlers();
        cog
    }

    /// Resets the event framework and the mutable state, keeping the
    /// configured parameters.
    pub fn reset(&mut self) {
        let params = self.state.parameters.clone();
        let call_sign = self.state.call_sign.clone();
        self.state = CognitionState::new(&call_sign);
        self.state.parameters = params;
        self.event_mng.reset();
        self.initialize_event_handlers();
    }

    /// Registers every event with its priority, trigger and handler
    /// factory. Registration order fixes the monitor-pass order.
    fn initialize_event_handlers(&mut self) {
        let p = &self.state.parameters;

        // Nominal mission events
        self.event_mng.add_event_handler(
            "Takeoff",
            p.priority("Takeoff"),
            triggers::takeoff_trigger,
            Some(|| Box::new(TakeoffPhaseHandler::new())),
        );
        self.event_mng.add_event_handler(
            "NominalDeparture",
            p.priority("NominalDeparture"),
            triggers::nominal_departure_trigger,
            Some(|| Box::new(EngageNominalPlan)),
        );
        self.event_mng.add_event_handler(
            "PrimaryPlanComplete",
            p.priority("PrimaryPlanComplete"),
            triggers::primary_plan_completion_trigger,
            Some(|| Box::new(LandPhaseHandler)),
        );
        self.event_mng.add_event_handler(
            "FlightReplan",
            p.priority("Replanning"),
            triggers::flight_replan_trigger,
            Some(|| Box::new(ReturnToNextFeasibleWP)),
        );
        self.event_mng.add_event_handler(
            "Merging",
            p.priority("Merging"),
            triggers::merging_activity_trigger,
            Some(|| Box::new(MergingHandler::new())),
        );
        self.event_mng.add_event_handler(
            "SecondaryPlanComplete",
            p.priority("SecondaryPlanComplete"),
            triggers::secondary_plan_completion_trigger,
            Some(|| Box::new(EngageNominalPlan)),
        );
        self.event_mng.add_event_handler(
            "RtlPlanComplete",
            p.priority("RtlPlanComplete"),
            triggers::rtl_plan_completion_trigger,
            Some(|| Box::new(LandPhaseHandler)),
        );

        // Conflict events
        self.event_mng.add_event_handler(
            "FenceConflict",
            p.priority("FenceConflict"),
            triggers::fence_conflict_trigger,
            Some(|| Box::new(ReturnToNextFeasibleWP)),
        );
        self.event_mng.add_event_handler(
            "Rtl",
            p.priority("Rtl"),
            triggers::rtl_trigger,
            Some(|| Box::new(ReturnToLaunch)),
        );
        self.event_mng.add_event_handler(
            "TrafficConflict1",
            p.priority("TrafficConflict1"),
            triggers::traffic_conflict_vector_res_trigger,
            Some(|| Box::new(TrafficConflictHandler::new())),
        );
        self.event_mng.add_event_handler(
            "TrafficConflict2",
            p.priority("TrafficConflict2"),
            triggers::traffic_conflict_path_res_trigger,
            Some(|| Box::new(ReturnToMission)),
        );
        self.event_mng.add_event_handler(
            "FlightPlanDeviation",
            p.priority("FlightPlanDeviation"),
            triggers::flightplan_deviation_trigger,
            Some(|| Box::new(ReturnToMission)),
        );

        // Ditching events
        self.event_mng.add_event_handler(
            "TrafficConflict3",
            p.priority("TrafficConflict3"),
            triggers::traffic_conflict_ditch_trigger,
            Some(|| Box::new(RequestDitchSite)),
        );
        self.event_mng.add_event_handler(
            "Ditching",
            p.priority("Ditching"),
            triggers::ditching_trigger,
            Some(|| Box::new(ProceedToDitchSite)),
        );
        self.event_mng.add_event_handler(
            "TODReached",
            p.priority("TODReached"),
            triggers::ditch_site_tod_trigger,
            Some(|| Box::new(ProceedFromTODtoLand)),
        );
    }

    // ---- input surface ----

    pub fn input_vehicle_state(&mut self, pos: Position, vel: Velocity, heading: f64) {
        self.state.position = pos;
        self.state.velocity = vel;
        self.state.hdg = heading;
        self.state.speed = vel.gs();
    }

    pub fn input_wind(&mut self, wind_from: f64, wind_speed: f64) {
        self.state.wind = Velocity::make_trk_gs_vs(wind_from + 180.0, wind_speed, 0.0);
    }

    /// Stores or replaces a flight plan. Invalid plans are rejected, not
    /// stored, and reported on the status stream.
    pub fn input_flight_plan_data(
        &mut self,
        plan_id: &str,
        waypoints: Vec<Waypoint>,
        init_heading: f64,
        do_repair: bool,
        repair_turn_rate: f64,
    ) -> Result<(), PlanError> {
        let fp = match Plan::from_waypoints(plan_id, waypoints) {
            Ok(fp) => {
                if do_repair {
                    repair::make_kinematic(&fp, init_heading, repair_turn_rate)
                } else {
                    fp
                }
            }
            Err(e) => {
                error!("Rejecting plan {plan_id}: {e}");
                self.state.send_status(Severity::Error, &format!("IC:invalid plan {plan_id}: {e}"));
                return Err(e);
            }
        };

        let first_time = fp.first_time();
        let origin = fp.pos(0);
        let start_speed = fp.gs_in(1);
        self.state.flight_plans.retain(|p| p.id() != plan_id);
        self.state.flight_plans.push(fp);
        self.state.next_wp_id.insert(plan_id.to_string(), 1);
        if plan_id == "Plan0" {
            self.state.primary_fp_received = true;
            self.state.scenario_time = first_time;
            self.state.launch_point = origin;
        }
        self.state.resolution_start_speed = start_speed;
        Ok(())
    }

    /// Feeds a trajectory monitor record. Projections are ignored when
    /// the reported cross-track offset says the vehicle is no longer on
    /// the projected leg.
    pub fn input_trajectory_monitor_data(&mut self, data: &TrajectoryMonitorData) {
        self.state.time_to_fence_violation = data.time_to_fence_violation;
        self.state.time_to_traffic_violation_plan = data.time_to_traffic_violation;
        self.state.plan_projected_fence_conflict = data.fence_conflict;
        self.state.plan_projected_traffic_conflict = data.traffic_conflict;
        self.state.next_feasible_wp_id = data.next_feasible_wp;
        self.state.line_of_sight_to_goal_prev = self.state.line_of_sight_to_goal;
        self.state.line_of_sight_to_goal = data.line_of_sight_to_goal;

        if data.plan_offsets[0] > 10.0 {
            self.state.plan_projected_traffic_conflict = false;
            self.state.plan_projected_fence_conflict = false;
        }
    }

    /// Replaces the configuration. Event priorities are re-registered
    /// when no handler is mid-flight.
    pub fn input_parameters(&mut self, params: Parameters) {
        self.state.parameters = params;
        if self.event_mng.active_handlers() == 0 {
            self.event_mng.reset();
            self.initialize_event_handlers();
        }
    }

    pub fn input_ditch_status(&mut self, ditch_site: Position, tod_altitude: f64, ditch_requested: bool) {
        self.state.ditch_site = ditch_site;
        self.state.tod_altitude = tod_altitude;
        self.state.ditch = ditch_requested;
    }

    pub fn input_merge_status(&mut self, merge_status: u8) {
        self.state.merging_active = merge_status;
    }

    /// Arms or clears an operator return-to-launch request.
    pub fn input_return_to_launch(&mut self, requested: bool) {
        self.state.rtl = requested;
    }

    pub fn input_traffic_alert(&mut self, callsign: &str, alert: i32) {
        self.state.traffic_alerts.insert(callsign.to_string(), alert);
        if alert > 0 {
            self.state.conflict_traffics.insert(callsign.to_string());
        } else {
            self.state.conflict_traffics.remove(callsign);
        }
    }

    pub fn input_track_bands(&mut self, bands: BandSet) {
        self.state.utc_time = bands.time;
        self.state.recovery[TRACK_DIM] = bands.recovery;
        if bands.current_conflict {
            self.state.all_traffic_conflicts[TRACK_DIM] = true;
            self.state.preferred_track = if bands.res_preferred.is_finite() {
                bands.res_preferred
            } else {
                self.state.prev_res_track
            };
        } else {
            self.state.all_traffic_conflicts[TRACK_DIM] = false;
            self.state.preferred_track = self.state.prev_res_track;
        }
        self.state.valid_resolution[TRACK_DIM] = self.track_resolution_valid(&bands);
        self.state.track_bands = bands;
    }

    /// A full-circle single conflict band leaves no track resolution.
    fn track_resolution_valid(&self, bands: &BandSet) -> bool {
        if bands.recovery {
            return !bands.current_conflict;
        }
        if !bands.current_conflict {
            return true;
        }
        if !bands.res_preferred.is_finite() {
            return false;
        }
        !(bands.bands.len() == 1
            && bands.bands[0].min < 1e-3
            && bands.bands[0].max > 359.999)
    }

    pub fn input_speed_bands(&mut self, mut bands: BandSet) {
        self.state.recovery[SPEED_DIM] = bands.recovery;
        if bands.current_conflict {
            self.state.all_traffic_conflicts[SPEED_DIM] = true;
            // Nudge the commanded speed past the band edge so numerical
            // noise cannot re-trigger the conflict.
            let fac = if (bands.res_preferred - bands.res_down).abs() < 1e-3 {
                0.99
            } else {
                1.01
            };
            if bands.res_preferred.is_finite() {
                self.state.preferred_speed = bands.res_preferred * fac;
                bands.res_preferred *= fac;
            }
        } else {
            self.state.all_traffic_conflicts[SPEED_DIM] = false;
            self.state.preferred_speed = self.state.prev_res_speed;
        }
        self.state.valid_resolution[SPEED_DIM] =
            !bands.current_conflict || (bands.res_preferred.is_finite() && !bands.recovery);
        self.state.speed_bands = bands;
    }

    pub fn input_alt_bands(&mut self, bands: BandSet) {
        self.state.recovery[ALT_DIM] = bands.recovery;
        if bands.current_conflict {
            self.state.all_traffic_conflicts[ALT_DIM] = true;
            self.state.preferred_alt = if bands.res_preferred.is_finite() {
                bands.res_preferred
            } else {
                self.state.prev_res_alt
            };
        } else {
            self.state.all_traffic_conflicts[ALT_DIM] = false;
            self.state.preferred_alt = self.state.prev_res_alt;
        }
        self.state.time_to_traffic_violation_in = bands.time_to_violation.0;
        self.state.time_to_traffic_violation_out = bands.time_to_violation.1;
        self.state.valid_resolution[ALT_DIM] =
            !bands.current_conflict || (bands.res_preferred.is_finite() && !bands.recovery);
        self.state.alt_bands = bands;
    }

    pub fn input_vs_bands(&mut self, bands: BandSet) {
        self.state.recovery[VS_DIM] = bands.recovery;
        self.state.res_v_up = bands.res_up;
        self.state.res_v_down = bands.res_down;
        self.state.vs_bands_num = bands.bands.len();
        if bands.current_conflict {
            self.state.all_traffic_conflicts[VS_DIM] = true;
        } else {
            self.state.all_traffic_conflicts[VS_DIM] = false;
        }
        if bands.res_preferred.is_finite() {
            self.state.preferred_vspeed = bands.res_preferred;
            self.state.prev_res_vspeed = bands.res_preferred;
        } else {
            self.state.preferred_vspeed = self.state.prev_res_vspeed;
        }
        self.state.valid_resolution[VS_DIM] = !bands.recovery
            && (bands.res_preferred.is_finite()
                || bands.res_up.is_finite()
                || bands.res_down.is_finite());
        self.state.vs_bands = bands;
    }

    pub fn input_geofence_conflict_data(&mut self, conflict: &GeofenceConflict) {
        if conflict.num_conflicts > 0 {
            match conflict.conflict_types.first() {
                Some(FenceType::KeepIn) => self.state.keep_in_conflict = true,
                Some(FenceType::KeepOut) => self.state.keep_out_conflict = true,
                None => {}
            }
            self.state.recovery_position = conflict.recovery_position;
        } else {
            self.state.keep_in_conflict = false;
            self.state.keep_out_conflict = false;
        }
    }

    /// Host acknowledgement of a waypoint arrival. The reserved plan ids
    /// "P2P", "Takeoff" and "PlanM" feed the corresponding phase flags.
    pub fn reached_waypoint(&mut self, plan_id: &str, wp_reached_id: usize) {
        log!("Wp reached | plan: {plan_id}, wp: {wp_reached_id}");
        match plan_id {
            "P2P" => self.state.p2p_complete = true,
            "Takeoff" => self.state.takeoff_state = TakeoffStatus::Complete,
            "PlanM" => {
                self.state.next_wp_id.insert("PlanM".to_string(), wp_reached_id + 1);
                if wp_reached_id + 1 >= self.state.total_waypoints("PlanM") {
                    self.state.merging_active = 2;
                }
            }
            _ => {
                let next_wp_id = wp_reached_id + 1;
                let leg_speed = self
                    .state
                    .get_plan(plan_id)
                    .map(|fp| fp.gs_in(next_wp_id.min(fp.len() - 1)));
                if let Some(gs) = leg_speed {
                    self.state.active_plan_id = Some(plan_id.to_string());
                    self.state.next_wp_id.insert(plan_id.to_string(), next_wp_id);
                    self.state.resolution_start_speed = gs;
                }
            }
        }
    }

    /// Arms the mission. `value == 0` delays the start until the plan's
    /// scheduled first time plus `delay`; `value > 0` starts at that
    /// waypoint immediately.
    pub fn start_mission(&mut self, value: i32, delay: f64) {
        self.state.mission_start = value;
        self.state.scenario_time += delay;
        if self.state.get_plan("Plan0").is_some() {
            self.state.active_plan_id = Some("Plan0".to_string());
            if delay > 0.0 {
                if let Some(fp) = self.state.get_plan_mut("Plan0") {
                    fp.time_shift(0, delay);
                }
            }
        }
    }

    /// Next queued output command.
    pub fn get_cognition_output(&mut self) -> Option<Command> {
        self.state.commands.pop_front()
    }

    /// Drains the whole command queue.
    pub fn drain_commands(&mut self) -> Vec<Command> {
        self.state.commands.drain(..).collect()
    }

    /// One cognition tick: refresh the fused conflict flags, run the
    /// monitor pass, then one handler step.
    pub fn run(&mut self, time: f64) {
        self.state.utc_time = time;
        self.refresh_fused_flags();
        self.event_mng.run(&mut self.state);
    }

    /// Name of the handler currently at the head of the scheduler, if
    /// any. Doubles as the tick status code.
    pub fn active_event(&mut self) -> Option<String> { self.event_mng.current_event() }

    /// Execution state of the handler bound to a registered event.
    pub fn exec_state_of(&self, event: &str) -> Option<ExecState> {
        self.event_mng.exec_state_of(event)
    }

    /// Pre-monitor pass: derives the fused flags the triggers read so
    /// the triggers themselves stay pure.
    fn refresh_fused_flags(&mut self) {
        // Cross-track deviation from the active leg and the closest
        // point on the nominal plan.
        if let Some(fp) = self.state.active_plan() {
            if fp.len() >= 2 {
                let next_wp = self.state.next_wp_index(fp.id()).clamp(1, fp.len() - 1);
                let prev = fp.pos(next_wp - 1);
                let next = fp.pos(next_wp);
                let (perp, _) = xtrack_distance(&prev, &next, &self.state.position);
                self.state.xtrack_deviation = perp;
                self.state.xtrack_conflict = perp > self.state.parameters.allowed_xtrack_deviation;
            }
        }
        if let Some(fp) = self.state.get_plan("Plan0") {
            let next_wp = self.state.next_wp_index("Plan0");
            let clst = fp.nearest_point_on_leg(next_wp.max(1), &self.state.position);
            self.state.clst_point = clst;
        }

        // Fused traffic conflict flag.
        let daa_conflict = self.state.all_traffic_conflicts.iter().any(|&c| c);
        let mut conflict;
        if self.state.parameters.resolution_type == SEARCH_DIGIT {
            conflict = daa_conflict && self.state.plan_projected_traffic_conflict;
            // Conflicts the DAA provider has not flagged yet but the
            // plan projection makes imminent.
            if !conflict
                && self.state.plan_projected_traffic_conflict
                && self.state.time_to_traffic_violation_plan
                    < self.state.parameters.plan_lookahead_time
            {
                conflict = true;
            }
        } else {
            conflict = daa_conflict;
            if self.state.parameters.verify_plan_conflict {
                conflict = conflict && self.state.plan_projected_traffic_conflict;
            }
        }
        self.state.traffic_conflict = conflict && self.state.ic_ready;
    }
}
