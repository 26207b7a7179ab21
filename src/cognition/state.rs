use super::commands::{Command, Severity};
use crate::geom::{Position, Velocity, wrap_deg};
use crate::log;
use crate::params::Parameters;
use crate::plan::Plan;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use strum_macros::Display;

/// Conflict severity of a DAA band interval.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BandRegion {
    #[default]
    None,
    Far,
    Mid,
    Near,
    Recovery,
}

impl BandRegion {
    /// True for intervals the ownship must stay out of.
    pub fn is_conflict(self) -> bool { !matches!(self, BandRegion::None | BandRegion::Recovery) }
}

/// One advisory interval of a control dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub region: BandRegion,
    pub min: f64,
    pub max: f64,
}

/// DAA advisory bands for one dimension (track, ground speed, altitude
/// or vertical speed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSet {
    pub time: f64,
    pub bands: Vec<Band>,
    pub current_conflict: bool,
    /// Preferred resolution value; NaN when the provider has none.
    pub res_preferred: f64,
    pub res_up: f64,
    pub res_down: f64,
    pub recovery: bool,
    /// (time in to violation, time out of violation).
    pub time_to_violation: (f64, f64),
}

impl Default for BandSet {
    fn default() -> Self {
        Self {
            time: 0.0,
            bands: Vec::new(),
            current_conflict: false,
            res_preferred: f64::NAN,
            res_up: f64::NAN,
            res_down: f64::NAN,
            recovery: false,
            time_to_violation: (f64::INFINITY, f64::INFINITY),
        }
    }
}

/// Resolution dimension, selectable by a single configuration digit.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionType {
    Speed,
    Altitude,
    Track,
    VerticalSpeed,
    Search,
    Ditch,
    Combined,
}

impl ResolutionType {
    pub fn from_digit(d: i32) -> Self {
        match d {
            0 => ResolutionType::Speed,
            1 => ResolutionType::Altitude,
            3 => ResolutionType::VerticalSpeed,
            4 => ResolutionType::Search,
            5 => ResolutionType::Ditch,
            6 => ResolutionType::Combined,
            _ => ResolutionType::Track,
        }
    }

    /// Index into the four-dimension conflict/recovery arrays. Only
    /// meaningful for the four maneuver dimensions.
    pub fn dim(self) -> usize {
        match self {
            ResolutionType::Speed => 0,
            ResolutionType::Altitude => 1,
            ResolutionType::Track => 2,
            ResolutionType::VerticalSpeed => 3,
            _ => 0,
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum TakeoffStatus {
    #[default]
    Inactive,
    InProgress,
    Complete,
}

/// Request protocol state for path planning and ditch-site requests.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Nil,
    Processing,
    Responded,
}

/// The fused decision-making state: latest inputs, plan bookkeeping,
/// resolution memory, request protocol and the outgoing command queue.
/// Constructed at boot, mutated only by the cognition tick and the input
/// surface.
pub struct CognitionState {
    pub utc_time: f64,
    pub call_sign: String,
    /// Id of the nominal mission plan ("Plan0" until a ditch or RTL
    /// rebases the mission).
    pub mission_plan: String,
    pub launch_point: Position,
    pub parameters: Parameters,
    /// True once the vehicle is established on a plan.
    pub ic_ready: bool,

    pub flight_plans: Vec<Plan>,
    pub active_plan_id: Option<String>,
    pub next_wp_id: HashMap<String, usize>,

    pub next_feasible_wp_id: usize,
    pub closest_point_feasible: bool,
    pub res_type: ResolutionType,

    pub primary_fp_received: bool,
    /// Recovery flag per dimension (speed, altitude, track, vs).
    pub recovery: [bool; 4],
    /// Valid-resolution flag per dimension.
    pub valid_resolution: [bool; 4],
    pub scenario_time: f64,
    pub time_to_traffic_violation_in: f64,
    pub time_to_traffic_violation_out: f64,
    /// Traffic violation time predicted by the trajectory monitor.
    pub time_to_traffic_violation_plan: f64,
    pub time_to_fence_violation: f64,
    pub xtrack_deviation: f64,

    pub position: Position,
    pub velocity: Velocity,
    pub hdg: f64,
    pub speed: f64,
    pub wind: Velocity,

    pub keep_in_conflict: bool,
    pub keep_out_conflict: bool,
    pub recovery_position: Position,
    /// Closest point on the nominal plan.
    pub clst_point: Position,
    pub line_of_sight_to_goal: bool,
    pub line_of_sight_to_goal_prev: bool,

    pub traffic_conflict: bool,
    pub all_traffic_conflicts: [bool; 4],
    pub new_alt_conflict: bool,
    pub traffic_conflict_start_time: f64,
    pub plan_projected_traffic_conflict: bool,
    pub plan_projected_fence_conflict: bool,
    pub xtrack_conflict: bool,

    pub return_safe: bool,
    pub resolution_start_speed: f64,
    pub preferred_track: f64,
    pub preferred_speed: f64,
    pub preferred_alt: f64,
    pub preferred_vspeed: f64,
    pub res_v_up: f64,
    pub res_v_down: f64,
    pub vs_bands_num: usize,

    pub conflict_traffics: BTreeSet<String>,
    pub traffic_alerts: HashMap<String, i32>,

    pub prev_res_speed: f64,
    pub prev_res_alt: f64,
    pub prev_res_track: f64,
    pub prev_res_vspeed: f64,

    pub track_bands: BandSet,
    pub speed_bands: BandSet,
    pub alt_bands: BandSet,
    pub vs_bands: BandSet,

    pub ditch_site: Position,
    pub tod_altitude: f64,
    pub ditch: bool,
    pub reset_ditch: bool,
    pub end_ditch: bool,
    /// External return-to-launch request.
    pub rtl: bool,

    pub left_turn_conflict: bool,
    pub right_turn_conflict: bool,

    pub takeoff_state: TakeoffStatus,
    pub path_request: RequestState,

    /// Mission arming: -1 undecided, 0 delayed start, > 0 immediate.
    pub mission_start: i32,
    pub p2p_complete: bool,
    pub top_of_descent: bool,

    /// 0 inactive, 1 merging, 2 complete, 3 speed adjust needed.
    pub merging_active: u8,
    /// Monotonic counter naming secondary paths ("Plan<N>").
    pub num_sec_paths: u16,

    pub commands: VecDeque<Command>,
}

impl CognitionState {
    pub fn new(call_sign: &str) -> Self {
        Self {
            utc_time: 0.0,
            call_sign: call_sign.to_string(),
            mission_plan: "Plan0".to_string(),
            launch_point: Position::default(),
            parameters: Parameters::default(),
            ic_ready: false,
            flight_plans: Vec::new(),
            active_plan_id: None,
            next_wp_id: HashMap::new(),
            next_feasible_wp_id: 0,
            closest_point_feasible: false,
            res_type: ResolutionType::Track,
            primary_fp_received: false,
            recovery: [false; 4],
            valid_resolution: [true; 4],
            scenario_time: 0.0,
            time_to_traffic_violation_in: f64::INFINITY,
            time_to_traffic_violation_out: f64::INFINITY,
            time_to_traffic_violation_plan: f64::INFINITY,
            time_to_fence_violation: f64::INFINITY,
            xtrack_deviation: 0.0,
            position: Position::default(),
            velocity: Velocity::zero(),
            hdg: 0.0,
            speed: 0.0,
            wind: Velocity::zero(),
            keep_in_conflict: false,
            keep_out_conflict: false,
            recovery_position: Position::default(),
            clst_point: Position::default(),
            line_of_sight_to_goal: true,
            line_of_sight_to_goal_prev: true,
            traffic_conflict: false,
            all_traffic_conflicts: [false; 4],
            new_alt_conflict: false,
            traffic_conflict_start_time: 0.0,
            plan_projected_traffic_conflict: false,
            plan_projected_fence_conflict: false,
            xtrack_conflict: false,
            return_safe: true,
            resolution_start_speed: 0.0,
            preferred_track: f64::NAN,
            preferred_speed: f64::NAN,
            preferred_alt: f64::NAN,
            preferred_vspeed: f64::NAN,
            res_v_up: f64::NAN,
            res_v_down: f64::NAN,
            vs_bands_num: 0,
            conflict_traffics: BTreeSet::new(),
            traffic_alerts: HashMap::new(),
            prev_res_speed: 0.0,
            prev_res_alt: 0.0,
            prev_res_track: 0.0,
            prev_res_vspeed: 0.0,
            track_bands: BandSet::default(),
            speed_bands: BandSet::default(),
            alt_bands: BandSet::default(),
            vs_bands: BandSet::default(),
            ditch_site: Position::default(),
            tod_altitude: 0.0,
            ditch: false,
            reset_ditch: false,
            end_ditch: false,
            rtl: false,
            left_turn_conflict: false,
            right_turn_conflict: false,
            takeoff_state: TakeoffStatus::Inactive,
            path_request: RequestState::Nil,
            mission_start: -1,
            p2p_complete: false,
            top_of_descent: false,
            merging_active: 0,
            num_sec_paths: 0,
            commands: VecDeque::new(),
        }
    }

    pub fn get_plan(&self, plan_id: &str) -> Option<&Plan> {
        self.flight_plans.iter().find(|fp| fp.id() == plan_id)
    }

    pub fn get_plan_mut(&mut self, plan_id: &str) -> Option<&mut Plan> {
        self.flight_plans.iter_mut().find(|fp| fp.id() == plan_id)
    }

    pub fn active_plan(&self) -> Option<&Plan> {
        self.active_plan_id.as_deref().and_then(|id| self.get_plan(id))
    }

    pub fn total_waypoints(&self, plan_id: &str) -> usize {
        self.get_plan(plan_id).map_or(0, Plan::len)
    }

    pub fn next_wp_index(&self, plan_id: &str) -> usize {
        self.next_wp_id.get(plan_id).copied().unwrap_or(0)
    }

    /// Position of the next waypoint on the given plan, clamped to the
    /// final waypoint once the plan is complete.
    pub fn next_wp_pos(&self, plan_id: &str) -> Option<Position> {
        let fp = self.get_plan(plan_id)?;
        Some(fp.pos(self.next_wp_index(plan_id)))
    }

    /// Velocity leaving the next waypoint on the given plan.
    pub fn next_wp_velocity(&self, plan_id: &str) -> Option<Velocity> {
        let fp = self.get_plan(plan_id)?;
        Some(fp.velocity_out(self.next_wp_index(plan_id).min(fp.len() - 1)))
    }

    /// True once every waypoint of the plan has been visited.
    pub fn plan_complete(&self, plan_id: &str) -> bool {
        self.get_plan(plan_id).is_some_and(|fp| self.next_wp_index(plan_id) >= fp.len())
    }

    // ---- command queue constructors ----

    /// Enqueue a velocity command given track (degrees), ground speed
    /// and vertical speed.
    pub fn set_guidance_vel_cmd(&mut self, track: f64, gs: f64, vs: f64) {
        let trk = track.to_radians();
        self.commands.push_back(Command::Velocity {
            vn: gs * trk.cos(),
            ve: gs * trk.sin(),
            vu: vs,
        });
    }

    pub fn set_guidance_speed_cmd(&mut self, plan_id: &str, speed: f64, hold: bool) {
        self.commands.push_back(Command::SpeedChange {
            plan_id: plan_id.to_string(),
            speed,
            hold,
        });
    }

    pub fn set_guidance_alt_cmd(&mut self, plan_id: &str, alt: f64, hold: bool) {
        self.commands.push_back(Command::AltChange {
            plan_id: plan_id.to_string(),
            altitude: alt,
            hold,
        });
    }

    /// Activates the named plan at `wp_index` and informs guidance.
    pub fn set_guidance_flight_plan(&mut self, plan_id: &str, wp_index: usize) {
        self.active_plan_id = Some(plan_id.to_string());
        self.next_wp_id.insert(plan_id.to_string(), wp_index);
        self.commands.push_back(Command::FpChange {
            plan_id: plan_id.to_string(),
            wp_index,
            next_feasible_wp: self.next_feasible_wp_id,
        });
        log!("Guidance flightplan change, plan: {plan_id}, wp: {wp_index}");
    }

    pub fn set_guidance_p2p(&mut self, point: Position, speed: f64) {
        self.commands.push_back(Command::P2P { point, speed });
    }

    pub fn set_land_cmd(&mut self) { self.commands.push_back(Command::Land); }

    pub fn set_ditch_site_request_cmd(&mut self) { self.commands.push_back(Command::Ditch); }

    pub fn send_status(&mut self, severity: Severity, text: &str) {
        self.commands.push_back(Command::Status {
            severity,
            text: text.to_string(),
        });
    }

    /// Enqueue a request for a new plan between two states.
    pub fn find_new_path(
        &mut self,
        plan_id: &str,
        position_a: Position,
        velocity_a: Velocity,
        position_b: Position,
        velocity_b: Velocity,
    ) {
        self.commands.push_back(Command::FpRequest {
            plan_id: plan_id.to_string(),
            from_position: position_a,
            to_position: position_b,
            from_velocity: velocity_a,
            to_velocity: velocity_b,
        });
        log!("Computing secondary path: {plan_id}");
    }

    // ---- resolution selection and feasibility ----

    /// Decodes the `resolution_type` parameter. A single digit picks one
    /// dimension. A multi-digit numeral is a most-significant-first
    /// priority list: the first dimension with an active conflict and a
    /// valid non-recovery resolution wins, otherwise the list head.
    pub fn get_resolution_type(&self) -> ResolutionType {
        let mut res_type = self.parameters.resolution_type;
        if res_type < 9 {
            return ResolutionType::from_digit(res_type);
        }
        let mut res_priority = [0usize; 4];
        for i in (0..4).rev() {
            if i > 0 {
                let fac = 10i32.pow(i as u32);
                res_priority[3 - i as usize] = (res_type / fac).min(3) as usize;
                res_type %= fac;
            } else {
                res_priority[3] = (res_type % 10).min(3) as usize;
            }
        }

        for &dim in &res_priority {
            if !self.all_traffic_conflicts[dim] {
                continue;
            }
            if self.valid_resolution[dim] {
                return dim_to_resolution(dim);
            }
        }
        dim_to_resolution(res_priority[0])
    }

    /// Feasibility of steering for `target` under the current bands.
    /// Always false until the persistence time has elapsed since the
    /// conflict began. Updates the left/right turn-conflict flags as a
    /// side observation.
    pub fn compute_target_feasibility(&mut self, target: Position) -> bool {
        let newtrk = self.position.track(&target).to_degrees();
        let oldtrk = self.velocity.compass_deg();

        if self.utc_time - self.traffic_conflict_start_time <= self.parameters.persistence_time {
            return false;
        }

        let mut right_conflict = false;
        let mut left_conflict = false;
        for band in &self.track_bands.bands {
            if !band.region.is_conflict() {
                continue;
            }
            let (right, left) = check_turn_conflict(band.min, band.max, newtrk, oldtrk);
            right_conflict |= right;
            left_conflict |= left;
        }
        self.right_turn_conflict = right_conflict;
        self.left_turn_conflict = left_conflict;
        let right_turn = crate::geom::turn_dir(oldtrk.to_radians(), newtrk.to_radians()) > 0;
        if right_turn && right_conflict || !right_turn && left_conflict {
            return false;
        }

        // Speed bands are checked against the planned speed at the next
        // feasible waypoint on the nominal plan.
        if let Some(fp) = self.get_plan("Plan0") {
            let ref_speed = fp.gs_in(self.next_feasible_wp_id);
            for band in &self.speed_bands.bands {
                if band.region.is_conflict() && ref_speed >= band.min && ref_speed <= band.max {
                    return false;
                }
            }
        }

        let target_alt = target.alt();
        for band in &self.alt_bands.bands {
            if band.region.is_conflict() && target_alt >= band.min && target_alt <= band.max {
                return false;
            }
        }
        true
    }
}

fn dim_to_resolution(dim: usize) -> ResolutionType {
    match dim {
        0 => ResolutionType::Speed,
        1 => ResolutionType::Altitude,
        3 => ResolutionType::VerticalSpeed,
        _ => ResolutionType::Track,
    }
}

/// Does turning from `old_heading` to `new_heading` sweep through the
/// band `[low, high]` (degrees)? Returns the conflict flag for a right
/// and for a left turn separately.
pub fn check_turn_conflict(low: f64, high: f64, new_heading: f64, old_heading: f64) -> (bool, bool) {
    let low = wrap_deg(low);
    let high = wrap_deg(high);
    let new_heading = wrap_deg(new_heading);
    let old_heading = wrap_deg(old_heading);

    let in_band = |h: f64| -> bool {
        if low <= high { h >= low && h <= high } else { h >= low || h <= high }
    };
    if in_band(new_heading) || in_band(old_heading) {
        return (true, true);
    }

    let sweep_crosses = |delta: f64, dir: f64| -> bool {
        // Walk the arc in 1 degree steps; bands are coarse enough.
        let mut t = 0.0;
        while t <= delta {
            if in_band(wrap_deg(old_heading + dir * t)) {
                return true;
            }
            t += 1.0;
        }
        false
    };
    let delta_right = wrap_deg(new_heading - old_heading);
    let delta_left = wrap_deg(old_heading - new_heading);
    (sweep_crosses(delta_right, 1.0), sweep_crosses(delta_left, -1.0))
}
