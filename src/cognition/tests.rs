use super::event_manager::{EventHandler, EventManager, ExecState, HandlerCtx, HandlerResult, HeapSet};
use super::*;
use crate::geom::{Position, Velocity};
use crate::monitor::TrajectoryMonitorData;
use crate::plan::Waypoint;

fn nominal_waypoints() -> Vec<Waypoint> {
    let p0 = Position::new(38.0, -76.0, 50.0);
    let p1 = p0.linear_dist_2d(0.0, 1000.0);
    let p2 = p1.linear_dist_2d(0.0, 1000.0);
    vec![
        Waypoint::new(p0, 0.0),
        Waypoint::new(p1, 100.0),
        Waypoint::new(p2, 200.0),
    ]
}

/// Cognition established on Plan0, cruising northbound at 10 m/s.
fn engaged_cognition() -> Cognition {
    let mut cog = Cognition::new("TEST1");
    cog.input_flight_plan_data("Plan0", nominal_waypoints(), 0.0, false, 0.0).unwrap();
    cog.input_vehicle_state(
        Position::new(38.0, -76.0, 50.0),
        Velocity::make_trk_gs_vs(0.0, 10.0, 0.0),
        0.0,
    );
    cog.start_mission(1, 0.0);
    for t in 0..5 {
        cog.run(f64::from(t));
    }
    assert!(cog.state.ic_ready, "engagement should have completed");
    cog.drain_commands();
    cog
}

fn conflict_band(preferred: f64) -> BandSet {
    BandSet {
        current_conflict: true,
        res_preferred: preferred,
        bands: vec![Band {
            region: BandRegion::Near,
            min: 350.0,
            max: 20.0,
        }],
        ..BandSet::default()
    }
}

// ---- heapset ----

#[test]
fn test_heapset_ordering_and_membership() {
    let mut hs: HeapSet<u32> = HeapSet::new();
    hs.push(1, 3.0);
    hs.push(2, 5.0);
    hs.push(3, 1.0);
    assert!(hs.contains(&2));
    assert_eq!(hs.top(), Some(2));
    assert_eq!(hs.pop(), Some(2));
    assert_eq!(hs.pop(), Some(1));
    assert_eq!(hs.pop(), Some(3));
    assert_eq!(hs.pop(), None);
    assert!(hs.is_empty());
}

#[test]
fn test_heapset_ties_resolve_to_earliest_insertion() {
    let mut hs: HeapSet<u32> = HeapSet::new();
    hs.push(7, 2.0);
    hs.push(8, 2.0);
    assert_eq!(hs.top(), Some(7));
}

#[test]
fn test_heapset_repush_supersedes() {
    let mut hs: HeapSet<u32> = HeapSet::new();
    hs.push(1, 2.0);
    hs.push(2, 2.5);
    assert_eq!(hs.top(), Some(2));
    // Boosting key 1 past key 2 changes the head.
    hs.push(1, 3.0);
    assert_eq!(hs.top(), Some(1));
    assert_eq!(hs.len(), 2);
    assert_eq!(hs.pop(), Some(1));
    assert_eq!(hs.pop(), Some(2));
}

// ---- scheduler ----

#[derive(Default)]
struct SchedState {
    a_active: bool,
    b_active: bool,
    a_holds: bool,
    log: Vec<String>,
}

struct Recorder {
    name: &'static str,
    hold: bool,
}

impl EventHandler<SchedState> for Recorder {
    fn initialize(&mut self, ctx: &mut HandlerCtx<SchedState>) -> HandlerResult {
        ctx.state.log.push(format!("{} init", self.name));
        HandlerResult::Success
    }

    fn execute(&mut self, ctx: &mut HandlerCtx<SchedState>) -> HandlerResult {
        ctx.state.log.push(format!("{} exec", self.name));
        if self.hold && ctx.state.a_holds {
            HandlerResult::InProgress
        } else {
            HandlerResult::Success
        }
    }
}

fn sched_manager() -> EventManager<SchedState> {
    let mut mng: EventManager<SchedState> = EventManager::new();
    mng.add_event_handler(
        "A",
        3,
        |s: &SchedState| s.a_active,
        Some(|| {
            Box::new(Recorder {
                name: "A",
                hold: true,
            })
        }),
    );
    mng.add_event_handler(
        "B",
        5,
        |s: &SchedState| s.b_active,
        Some(|| {
            Box::new(Recorder {
                name: "B",
                hold: false,
            })
        }),
    );
    mng
}

#[test]
fn test_priority_respected_on_simultaneous_triggers() {
    let mut mng = sched_manager();
    let mut state = SchedState {
        a_active: true,
        b_active: true,
        ..SchedState::default()
    };
    for _ in 0..10 {
        mng.run(&mut state);
        state.b_active = false;
    }
    let a_init = state.log.iter().position(|l| l == "A init");
    let b_init = state.log.iter().position(|l| l == "B init").expect("B must run");
    if let Some(a) = a_init {
        assert!(b_init < a, "higher priority event must initialize first: {:?}", state.log);
    }
}

#[test]
fn test_preemption_marks_running_handler_done() {
    let mut mng = sched_manager();
    let mut state = SchedState {
        a_active: true,
        a_holds: true,
        ..SchedState::default()
    };
    mng.run(&mut state); // A: NOOP -> INITIALIZE
    mng.run(&mut state); // A: EXECUTE (in progress)
    assert_eq!(mng.exec_state_of("A"), Some(ExecState::Execute));

    state.b_active = true;
    mng.run(&mut state); // monitor pass preempts A, handler pass runs B
    assert_eq!(mng.exec_state_of("A"), Some(ExecState::Done), "preempted without terminate");
    assert_eq!(mng.exec_state_of("B"), Some(ExecState::Execute));
    assert!(state.log.contains(&"B init".to_string()));
}

#[test]
fn test_stale_trigger_drops_handler_before_initialize() {
    let mut mng = sched_manager();
    let mut state = SchedState {
        a_active: true,
        ..SchedState::default()
    };
    mng.run_event_monitors(&mut state);
    assert_eq!(mng.active_handlers(), 1);
    // Trigger gone by the time the handler pass looks at it.
    state.a_active = false;
    mng.run_event_handlers(&mut state);
    assert_eq!(mng.active_handlers(), 0);
    assert!(state.log.is_empty(), "initialize must not run on a stale trigger");
}

// ---- scenarios ----

#[test]
fn test_takeoff_then_cruise() {
    let mut cog = Cognition::new("TEST1");
    let p0 = Position::new(38.0, -76.0, 50.0);
    let p1 = Position::new(38.001, -76.0, 50.0);
    cog.input_flight_plan_data(
        "Plan0",
        vec![Waypoint::new(p0, 0.0), Waypoint::new(p1, 100.0)],
        0.0,
        false,
        0.0,
    )
    .unwrap();
    cog.input_vehicle_state(Position::new(38.0, -76.0, 0.0), Velocity::zero(), 0.0);
    cog.start_mission(0, 0.0);

    cog.run(0.0);
    let cmds = cog.drain_commands();
    assert!(
        matches!(cmds.first(), Some(Command::Takeoff)),
        "first tick must command takeoff, got {cmds:?}"
    );
    assert_eq!(cog.state.takeoff_state, TakeoffStatus::InProgress);

    // Host confirms the takeoff.
    cog.reached_waypoint("Takeoff", 0);
    for t in 1..=6 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    let engaged = cmds.iter().any(|c| {
        matches!(c, Command::FpChange { plan_id, wp_index, .. } if plan_id == "Plan0" && *wp_index == 1)
    });
    assert!(engaged, "expected FpChange to Plan0 wp 1, got {cmds:?}");
    assert!(cog.state.ic_ready);
}

#[test]
fn test_takeoff_retries_after_timeout() {
    let mut cog = Cognition::new("TEST1");
    let p0 = Position::new(38.0, -76.0, 50.0);
    let p1 = Position::new(38.001, -76.0, 50.0);
    cog.input_flight_plan_data(
        "Plan0",
        vec![Waypoint::new(p0, 0.0), Waypoint::new(p1, 100.0)],
        0.0,
        false,
        0.0,
    )
    .unwrap();
    cog.start_mission(0, 0.0);

    cog.run(0.0);
    cog.drain_commands();
    // No confirmation for longer than the 5 s window: the handler
    // resets and commands takeoff again.
    for t in 1..=8 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    assert!(
        cmds.iter().any(|c| matches!(c, Command::Takeoff)),
        "expected a takeoff retry, got {cmds:?}"
    );
}

#[test]
fn test_track_resolution_round_trip() {
    let mut cog = engaged_cognition();
    cog.input_trajectory_monitor_data(&TrajectoryMonitorData {
        next_feasible_wp: 2,
        ..TrajectoryMonitorData::default()
    });

    let mut bands = conflict_band(30.0);
    bands.time = 10.0;
    cog.input_track_bands(bands);

    cog.run(10.0); // activate + initialize
    cog.run(11.0); // execute: velocity command
    let cmds = cog.drain_commands();
    let vel = cmds.iter().find_map(|c| match c {
        Command::Velocity { vn, ve, vu } => Some((*vn, *ve, *vu)),
        _ => None,
    });
    let (vn, ve, vu) = vel.expect("expected a velocity command");
    assert!((vn - 10.0 * 30f64.to_radians().cos()).abs() < 1e-6);
    assert!((ve - 10.0 * 30f64.to_radians().sin()).abs() < 1e-6);
    assert!(vu.abs() < 1e-9);

    // Conflict clears; after the persistence window the handler hands
    // over to the return-to-mission child.
    cog.input_track_bands(BandSet::default());
    for t in 20..=35 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    let requested = cmds.iter().any(|c| {
        matches!(c, Command::FpRequest { plan_id, .. } if plan_id == "Plan1")
    });
    assert!(requested, "expected a return path request, got {cmds:?}");
    assert_eq!(cog.state.path_request, RequestState::Processing);

    // Planner responds; the detour is engaged.
    cog.input_flight_plan_data("Plan1", nominal_waypoints(), 0.0, false, 0.0).unwrap();
    for t in 36..=38 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    let engaged = cmds.iter().any(|c| {
        matches!(c, Command::FpChange { plan_id, wp_index, .. } if plan_id == "Plan1" && *wp_index == 1)
    });
    assert!(engaged, "expected FpChange to Plan1, got {cmds:?}");
}

#[test]
fn test_speed_resolution_round_trip() {
    let mut cog = engaged_cognition();
    let mut params = cog.state.parameters.clone();
    params.resolution_type = 0; // SPEED
    cog.input_parameters(params);
    cog.input_trajectory_monitor_data(&TrajectoryMonitorData {
        next_feasible_wp: 2,
        ..TrajectoryMonitorData::default()
    });

    let preferred = 10.0 * 0.95;
    let mut bands = conflict_band(preferred);
    bands.bands = vec![Band {
        region: BandRegion::Near,
        min: 9.8,
        max: 30.0,
    }];
    bands.res_down = preferred; // slowing down
    bands.time = 10.0;
    cog.input_speed_bands(bands);

    cog.run(10.0);
    cog.run(11.0);
    let cmds = cog.drain_commands();
    let slow = cmds.iter().find_map(|c| match c {
        Command::SpeedChange { plan_id, speed, hold } => Some((plan_id.clone(), *speed, *hold)),
        _ => None,
    });
    let (plan_id, speed, hold) = slow.expect("expected a speed change");
    assert_eq!(plan_id, "Plan0");
    assert!((speed - preferred * 0.99).abs() < 1e-9, "slow-down nudge factor is 0.99");
    assert!(!hold);

    // Conflict clears: nominal speed restored, then the plan re-engaged.
    cog.input_speed_bands(BandSet::default());
    for t in 20..=35 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    let restore = cmds.iter().position(|c| {
        matches!(c, Command::SpeedChange { plan_id, speed, .. } if plan_id == "Plan0" && (*speed - 10.0).abs() < 0.2)
    });
    let reengage = cmds.iter().position(|c| {
        matches!(c, Command::FpChange { plan_id, .. } if plan_id == "Plan0")
    });
    assert!(restore.is_some(), "expected nominal speed restore, got {cmds:?}");
    assert!(reengage.is_some(), "expected plan re-engage, got {cmds:?}");
    assert!(restore.unwrap() < reengage.unwrap(), "speed restore precedes re-engage");
}

#[test]
fn test_fence_projected_conflict_replans() {
    let mut cog = engaged_cognition();
    cog.input_trajectory_monitor_data(&TrajectoryMonitorData {
        fence_conflict: true,
        time_to_fence_violation: 8.0,
        next_feasible_wp: 2,
        ..TrajectoryMonitorData::default()
    });

    cog.run(10.0);
    cog.run(11.0);
    let cmds = cog.drain_commands();
    let request = cmds.iter().find_map(|c| match c {
        Command::FpRequest {
            plan_id,
            from_position,
            to_position,
            ..
        } => Some((plan_id.clone(), *from_position, *to_position)),
        _ => None,
    });
    let (plan_id, from, to) = request.expect("expected a path request");
    assert_eq!(plan_id, "Plan1");
    assert!(from.distance_h(&cog.state.position) < 1.0);
    let goal = cog.state.get_plan("Plan0").unwrap().pos(2);
    assert!(to.distance_h(&goal) < 1.0);
    assert_eq!(cog.state.path_request, RequestState::Processing);

    cog.input_flight_plan_data("Plan1", nominal_waypoints(), 0.0, false, 0.0).unwrap();
    for t in 12..=14 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    let engaged = cmds.iter().any(|c| {
        matches!(c, Command::FpChange { plan_id, wp_index, .. } if plan_id == "Plan1" && *wp_index == 1)
    });
    assert!(engaged, "expected FpChange to Plan1, got {cmds:?}");
}

#[test]
fn test_ditch_sequence() {
    let mut cog = engaged_cognition();
    let site = Position::new(38.01, -76.01, 0.0);
    cog.input_ditch_status(site, 30.0, true);

    cog.run(10.0);
    cog.run(11.0);
    let cmds = cog.drain_commands();
    assert!(
        cmds.iter().any(|c| matches!(c, Command::FpRequest { plan_id, .. } if plan_id == "DitchPath")),
        "expected a ditch path request, got {cmds:?}"
    );
    assert!(!cog.state.ditch, "ditch request is consumed");

    // Planner responds with the path to the top of descent.
    let tod = site.linear_dist_2d(0.0, 30.0).mk_alt(30.0);
    cog.input_flight_plan_data(
        "DitchPath",
        vec![
            Waypoint::new(cog.state.position.mk_alt(30.0), 20.0),
            Waypoint::new(tod, 120.0),
        ],
        0.0,
        false,
        0.0,
    )
    .unwrap();
    for t in 12..=15 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    assert!(
        cmds.iter().any(|c| matches!(c, Command::FpChange { plan_id, wp_index, .. } if plan_id == "DitchPath" && *wp_index == 1)),
        "expected the ditch path engaged, got {cmds:?}"
    );
    assert_eq!(cog.state.mission_plan, "DitchPath");

    // TOD reached: point-to-point descent to the site.
    cog.reached_waypoint("DitchPath", 1);
    for t in 16..=18 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    let p2p = cmds.iter().find_map(|c| match c {
        Command::P2P { point, speed } => Some((*point, *speed)),
        _ => None,
    });
    let (point, speed) = p2p.expect("expected a P2P command");
    assert!(point.distance_h(&site) < 1.0);
    assert!((speed - 1.5).abs() < 1e-9);

    // Arrival at the site: land.
    cog.reached_waypoint("P2P", 1);
    for t in 19..=23 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    assert!(
        cmds.iter().any(|c| matches!(c, Command::Land)),
        "expected the land command, got {cmds:?}"
    );
}

#[test]
fn test_scheduler_determinism() {
    let run_script = |cog: &mut Cognition| -> Vec<Command> {
        cog.input_trajectory_monitor_data(&TrajectoryMonitorData {
            next_feasible_wp: 2,
            ..TrajectoryMonitorData::default()
        });
        let mut bands = conflict_band(30.0);
        bands.time = 10.0;
        cog.input_track_bands(bands);
        let mut cmds = Vec::new();
        for t in 10..=30 {
            cog.run(f64::from(t));
            cmds.extend(cog.drain_commands());
            if t == 15 {
                cog.input_track_bands(BandSet::default());
            }
        }
        cmds
    };
    let mut cog1 = engaged_cognition();
    let mut cog2 = engaged_cognition();
    assert_eq!(run_script(&mut cog1), run_script(&mut cog2));
}

#[test]
fn test_resolution_type_priority_list() {
    let mut cog = engaged_cognition();
    let mut params = cog.state.parameters.clone();
    params.resolution_type = 3210; // vs > track > alt > speed
    cog.input_parameters(params);

    // Only the track dimension is in conflict with a valid resolution.
    cog.state.all_traffic_conflicts = [false, false, true, false];
    cog.state.valid_resolution = [true, true, true, true];
    assert_eq!(cog.state.get_resolution_type(), ResolutionType::Track);

    // Track conflicted but without a valid resolution: fall through to
    // the next conflicted dimension.
    cog.state.all_traffic_conflicts = [true, false, true, false];
    cog.state.valid_resolution = [true, true, false, true];
    assert_eq!(cog.state.get_resolution_type(), ResolutionType::Speed);

    // Nothing qualifies: the list head wins.
    cog.state.all_traffic_conflicts = [false, false, false, false];
    assert_eq!(cog.state.get_resolution_type(), ResolutionType::VerticalSpeed);

    // Single digit picks directly.
    let mut params = cog.state.parameters.clone();
    params.resolution_type = 1;
    cog.input_parameters(params);
    assert_eq!(cog.state.get_resolution_type(), ResolutionType::Altitude);
}

#[test]
fn test_conflict_without_valid_resolution_still_triggers() {
    let mut cog = engaged_cognition();
    cog.input_trajectory_monitor_data(&TrajectoryMonitorData {
        next_feasible_wp: 2,
        ..TrajectoryMonitorData::default()
    });

    // Track dimension in recovery: conflicted, but no usable resolution.
    let mut bands = conflict_band(30.0);
    bands.time = 10.0;
    bands.recovery = true;
    cog.input_track_bands(bands);
    assert!(!cog.state.valid_resolution[2]);

    cog.run(10.0);
    // The trigger fires on the conflict alone; the handler is the one
    // that declines for lack of a usable resolution.
    assert!(cog.state.traffic_conflict);
    assert!(triggers::traffic_conflict_vector_res_trigger(&cog.state));
    assert_eq!(cog.exec_state_of("TrafficConflict1"), None, "handler shut down on initialize");

    cog.run(11.0);
    let cmds = cog.drain_commands();
    assert!(
        !cmds.iter().any(|c| matches!(c, Command::Velocity { .. })),
        "no maneuver may be commanded without a valid resolution, got {cmds:?}"
    );
}

#[test]
fn test_invalid_plan_rejected_with_status() {
    let mut cog = Cognition::new("TEST1");
    let p0 = Position::new(38.0, -76.0, 50.0);
    let wps = vec![Waypoint::new(p0, 10.0), Waypoint::new(p0.linear_dist_2d(0.0, 500.0), 5.0)];
    assert!(cog.input_flight_plan_data("Plan0", wps, 0.0, false, 0.0).is_err());
    assert!(cog.state.get_plan("Plan0").is_none(), "invalid plan must not be stored");
    let cmds = cog.drain_commands();
    assert!(
        cmds.iter().any(|c| matches!(c, Command::Status { severity: Severity::Error, .. })),
        "expected an error status, got {cmds:?}"
    );
}

#[test]
fn test_autonomy_core_pipeline() {
    use crate::AutonomyCore;
    use crate::guidance::GuidanceMode;
    use crate::params::Parameters;

    let mut core = AutonomyCore::new("TEST1", Parameters::default());
    core.input_flight_plan_data("Plan0", nominal_waypoints(), 0.0, false, 0.0).unwrap();
    core.input_vehicle_state(
        Position::new(38.0, -76.0, 50.0),
        Velocity::make_trk_gs_vs(0.0, 10.0, 0.0),
        0.0,
    );
    core.cognition.start_mission(1, 0.0);

    let mut output = core.run(0.0);
    for t in 1..=3 {
        output = core.run(f64::from(t));
    }

    // Cognition engaged the plan; guidance tracks it northbound.
    assert_eq!(output.mode, GuidanceMode::Flightplan);
    assert_eq!(output.active_plan, "Plan0");
    let trk = output.vel_cmd.compass_deg();
    assert!(trk < 5.0 || trk > 355.0, "expected a northbound setpoint, got {trk}");
    assert!((output.vel_cmd.gs() - 10.0).abs() < 0.5);

    let cmds = core.drain_output();
    assert!(
        cmds.iter().any(|c| matches!(c, Command::FpChange { plan_id, .. } if plan_id == "Plan0")),
        "host sees the flightplan change too, got {cmds:?}"
    );
}

#[test]
fn test_rtl_request_plans_to_launch_point() {
    let mut cog = engaged_cognition();
    cog.input_return_to_launch(true);
    cog.run(10.0);
    cog.run(11.0);
    let cmds = cog.drain_commands();
    assert!(
        cmds.iter().any(|c| matches!(c, Command::FpRequest { plan_id, .. } if plan_id == "RtlPath")),
        "expected an RTL path request, got {cmds:?}"
    );
    cog.input_flight_plan_data(
        "RtlPath",
        vec![
            Waypoint::new(cog.state.position, 20.0),
            Waypoint::new(cog.state.launch_point.mk_alt(50.0), 120.0),
        ],
        0.0,
        false,
        0.0,
    )
    .unwrap();
    for t in 12..=14 {
        cog.run(f64::from(t));
    }
    let cmds = cog.drain_commands();
    assert!(
        cmds.iter().any(|c| matches!(c, Command::FpChange { plan_id, .. } if plan_id == "RtlPath")),
        "expected the RTL path engaged, got {cmds:?}"
    );
    assert_eq!(cog.state.mission_plan, "RtlPath");
}
