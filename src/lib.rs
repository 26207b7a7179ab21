//! On-board autonomy core for small unmanned aircraft: a priority-driven
//! cognition scheduler, a tick-driven guidance loop and a trajectory
//! monitor, glued together by [`AutonomyCore`].
//!
//! The core is deterministic and single-threaded. One logical task calls
//! [`AutonomyCore::run`] on every periodic tick; no operation suspends,
//! blocks or spawns threads.

#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]

pub mod cognition;
pub mod geom;
pub mod guidance;
pub mod logger;
pub mod monitor;
pub mod params;
pub mod plan;

use cognition::{Cognition, Command};
use geom::{Position, Velocity};
use guidance::{Guidance, GuidanceMode, GuidanceOutput};
use monitor::TrajectoryMonitor;
use params::Parameters;
use plan::{PlanError, Waypoint};
use std::collections::VecDeque;

/// The assembled decision-and-guidance pipeline.
///
/// Per-tick ordering: inputs are visible to the tick, cognition runs its
/// monitor pass then one handler step, every produced command is applied
/// to guidance (mode changes, plan edits) and mirrored on the host
/// output queue, then guidance produces the velocity setpoint. Waypoint
/// arrivals detected by guidance are acknowledged back into cognition on
/// the same tick.
pub struct AutonomyCore {
    pub cognition: Cognition,
    pub guidance: Guidance,
    pub traj_monitor: TrajectoryMonitor,
    out_queue: VecDeque<Command>,
}

impl AutonomyCore {
    pub fn new(call_sign: &str, params: Parameters) -> Self {
        let mut cognition = Cognition::new(call_sign);
        cognition.input_parameters(params.clone());
        Self {
            cognition,
            guidance: Guidance::new(params.clone()),
            traj_monitor: TrajectoryMonitor::new(&params),
            out_queue: VecDeque::new(),
        }
    }

    pub fn input_parameters(&mut self, params: Parameters) {
        self.guidance.set_guidance_params(&params);
        self.traj_monitor.set_parameters(&params);
        self.cognition.input_parameters(params);
    }

    pub fn input_vehicle_state(&mut self, pos: Position, vel: Velocity, heading: f64) {
        self.cognition.input_vehicle_state(pos, vel, heading);
        self.guidance.set_aircraft_state(pos, vel);
    }

    pub fn input_wind(&mut self, wind_from: f64, wind_speed: f64) {
        self.cognition.input_wind(wind_from, wind_speed);
        self.guidance.set_wind_data(wind_from, wind_speed);
    }

    /// Distributes a plan to all three subsystems. The plan is validated
    /// once; a rejection is reported on the cognition status stream.
    pub fn input_flight_plan_data(
        &mut self,
        plan_id: &str,
        waypoints: Vec<Waypoint>,
        init_heading: f64,
        repair: bool,
        repair_turn_rate: f64,
    ) -> Result<(), PlanError> {
        self.cognition.input_flight_plan_data(
            plan_id,
            waypoints.clone(),
            init_heading,
            repair,
            repair_turn_rate,
        )?;
        self.guidance
            .input_flightplan_data(plan_id, waypoints.clone(), init_heading, repair, repair_turn_rate)
            .expect("validated by cognition");
        self.traj_monitor
            .input_flight_plan(plan_id, waypoints, init_heading, repair, repair_turn_rate)
            .expect("validated by cognition");
        Ok(())
    }

    /// Queries the trajectory monitor against the active plan and feeds
    /// the record into cognition.
    pub fn run_trajectory_monitor(&mut self, time: f64) {
        let Some(active_id) = self.cognition.state.active_plan_id.clone() else {
            return;
        };
        let pos = self.cognition.state.position;
        let vel = self.cognition.state.velocity;
        let next_wp1 = self.cognition.state.next_wp_index("Plan0");
        let next_wp2 = self.cognition.state.next_wp_index(&active_id);
        let data =
            self.traj_monitor.monitor_trajectory(time, &active_id, &pos, &vel, next_wp1, next_wp2);
        self.cognition.input_trajectory_monitor_data(&data);
    }

    /// One full tick: cognition first, command delegation, guidance
    /// second. Returns the guidance output snapshot.
    pub fn run(&mut self, time: f64) -> GuidanceOutput {
        self.cognition.run(time);

        while let Some(cmd) = self.cognition.get_cognition_output() {
            self.apply_command(&cmd);
            self.out_queue.push_back(cmd);
        }

        self.guidance.run(time);
        let output = self.guidance.get_output();

        // Close the waypoint progress loop within the tick.
        if output.wp_reached && !output.active_plan.is_empty() {
            if let Some(next_wp) = output.next_wp {
                self.cognition.reached_waypoint(&output.active_plan, next_wp.saturating_sub(1));
            }
        }
        output
    }

    /// Commands produced since the last drain, in emission order. The
    /// host transport is expected to drain this between ticks.
    pub fn drain_output(&mut self) -> Vec<Command> { self.out_queue.drain(..).collect() }

    fn apply_command(&mut self, cmd: &Command) {
        let maintain_eta = self.cognition.state.parameters.maintain_eta;
        match cmd {
            Command::FpChange { plan_id, wp_index, .. } => {
                self.guidance.set_guidance_mode(
                    GuidanceMode::Flightplan,
                    plan_id,
                    *wp_index,
                    maintain_eta,
                );
            }
            Command::SpeedChange { plan_id, speed, .. } => {
                self.guidance.change_waypoint_speed(plan_id, -1, *speed);
            }
            Command::AltChange { plan_id, altitude, hold } => {
                self.guidance.change_waypoint_alt(plan_id, -1, *altitude, *hold);
            }
            Command::Velocity { vn, ve, vu } => {
                self.guidance.set_guidance_mode(GuidanceMode::Vector, "", 0, false);
                self.guidance.set_velocity_commands(&Velocity::new(*vn, *ve, *vu));
            }
            Command::P2P { point, speed } => {
                let pos = self.cognition.state.position;
                let dist = pos.distance_h(point);
                let dt = if *speed > 1e-3 { dist / speed } else { 0.0 };
                let now = self.cognition.state.utc_time;
                let wps = vec![Waypoint::new(pos, now), Waypoint::new(*point, now + dt)];
                if self.guidance.input_flightplan_data("P2P", wps, 0.0, false, 0.0).is_ok() {
                    self.guidance.set_guidance_mode(GuidanceMode::Point2Point, "P2P", 1, false);
                }
            }
            Command::Takeoff => {
                self.guidance.set_guidance_mode(GuidanceMode::Takeoff, "", 0, false);
            }
            Command::Land => {
                self.guidance.set_guidance_mode(GuidanceMode::Land, "", 0, false);
            }
            // Planner requests, ditch requests and status messages are
            // for the host transport only.
            Command::FpRequest { .. } | Command::Ditch | Command::Status { .. } => {}
        }
    }
}
