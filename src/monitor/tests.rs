use super::*;
use crate::geom::Position;
use crate::params::Parameters;
use crate::plan::Waypoint;

const START: Position = Position::new(38.0, -76.0, 50.0);

fn monitor() -> TrajectoryMonitor { TrajectoryMonitor::new(&Parameters::default()) }

/// Plan heading due east: waypoints every 1000 m at 10 m/s.
fn eastbound_waypoints(legs: usize) -> Vec<Waypoint> {
    (0..=legs)
        .map(|i| {
            let pos = START.linear_dist_2d(90f64.to_radians(), 1000.0 * i as f64);
            Waypoint::new(pos, 100.0 * i as f64)
        })
        .collect()
}

fn square_vertices(center: Position, half_side: f64) -> Vec<Position> {
    [(1.0, 1.0), (1.0, -1.0), (-1.0, -1.0), (-1.0, 1.0)]
        .iter()
        .map(|(e, n)| {
            center
                .linear_dist_2d(90f64.to_radians(), half_side * e)
                .linear_dist_2d(0.0, half_side * n)
        })
        .collect()
}

#[test]
fn test_plan_offsets_linear_leg() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(2), 0.0, false, 0.0).unwrap();

    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    // Halfway down the first leg, 100 m left of track, on schedule.
    let pos = START.linear_dist_2d(90f64.to_radians(), 500.0).linear_dist_2d(0.0, 100.0);
    let offsets = tm.compute_plan_offsets("Plan0", 1, &pos, &vel, 50.0);
    assert!((offsets[0] - 100.0).abs() < 1.0, "cross-track, got {}", offsets[0]);
    assert!((offsets[1] - 0.5).abs() < 0.01, "leg progress, got {}", offsets[1]);
    assert!(offsets[2].abs() < 1.0, "on schedule, got {}", offsets[2]);

    // Same point reached 10 s early: positive offset (ahead of plan).
    let offsets = tm.compute_plan_offsets("Plan0", 1, &pos, &vel, 40.0);
    assert!((offsets[2] - 10.0).abs() < 1.0, "ahead of schedule, got {}", offsets[2]);
}

#[test]
fn test_keep_in_fence_violation_time() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(2), 0.0, false, 0.0).unwrap();
    // Fence ends 500 m east of the start; the plan flies straight out.
    tm.input_geofence_data(FenceType::KeepIn, 0, 0.0, 100.0, square_vertices(START, 500.0));

    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    let data = tm.monitor_trajectory(0.0, "Plan0", &START, &vel, 1, 1);
    assert!(data.fence_conflict);
    assert!(
        (data.time_to_fence_violation - 50.0).abs() < 3.0,
        "500 m at 10 m/s, got {}",
        data.time_to_fence_violation
    );
}

#[test]
fn test_keep_in_fence_no_conflict_when_plan_stays_inside() {
    let mut tm = monitor();
    // One short leg that stays well inside the fence.
    let wps = vec![
        Waypoint::new(START, 0.0),
        Waypoint::new(START.linear_dist_2d(90f64.to_radians(), 100.0), 10.0),
    ];
    tm.input_flight_plan("Plan0", wps, 0.0, false, 0.0).unwrap();
    tm.input_geofence_data(FenceType::KeepIn, 0, 0.0, 100.0, square_vertices(START, 5000.0));

    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    let data = tm.monitor_trajectory(0.0, "Plan0", &START, &vel, 1, 1);
    assert!(!data.fence_conflict);
    assert!(data.time_to_fence_violation.is_infinite());
}

#[test]
fn test_keep_out_fence_entry_time() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(2), 0.0, false, 0.0).unwrap();
    // Keep-out square straddling the plan 1000 m ahead.
    let center = START.linear_dist_2d(90f64.to_radians(), 1000.0);
    tm.input_geofence_data(FenceType::KeepOut, 1, 0.0, 100.0, square_vertices(center, 200.0));

    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    let data = tm.monitor_trajectory(0.0, "Plan0", &START, &vel, 1, 1);
    assert!(data.fence_conflict);
    assert!(
        (data.time_to_fence_violation - 80.0).abs() < 3.0,
        "plan enters the keep-out 800 m ahead, got {}",
        data.time_to_fence_violation
    );
}

#[test]
fn test_traffic_conflict_head_on() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(2), 0.0, false, 0.0).unwrap();

    // Intruder 1000 m ahead, closing head-on at 10 m/s.
    let intruder_pos = START.linear_dist_2d(90f64.to_radians(), 1000.0);
    tm.input_traffic(TrafficState {
        callsign: "INTRUDER1".to_string(),
        source: "adsb".to_string(),
        position: intruder_pos,
        velocity: Velocity::make_trk_gs_vs(270.0, 10.0, 0.0),
        time: 0.0,
        pos_uncertainty: [0.0; 6],
        vel_uncertainty: [0.0; 6],
    });

    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    let data = tm.monitor_trajectory(0.0, "Plan0", &START, &vel, 1, 1);
    assert!(data.traffic_conflict);
    // Closure rate 20 m/s, well-clear radius 30 m.
    let expected = (1000.0 - 30.0) / 20.0;
    assert!(
        (data.time_to_traffic_violation - expected).abs() < 3.0,
        "expected ~{expected}, got {}",
        data.time_to_traffic_violation
    );
}

#[test]
fn test_traffic_plan_conflict() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(2), 0.0, false, 0.0).unwrap();

    // An intent plan converging onto the second half of our first leg.
    let mut tp = Plan::new("TRAFFIC1");
    tp.add(START.linear_dist_2d(90f64.to_radians(), 1000.0), 0.0);
    tp.add(START, 100.0);
    tm.input_traffic_plan(tp);

    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    let data = tm.monitor_trajectory(0.0, "Plan0", &START, &vel, 1, 1);
    assert!(data.traffic_conflict);
    assert!(data.time_to_traffic_violation < 60.0);
}

#[test]
fn test_projection_skipped_when_far_off_plan() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(2), 0.0, false, 0.0).unwrap();
    tm.input_geofence_data(FenceType::KeepIn, 0, 0.0, 100.0, square_vertices(START, 500.0));

    // 200 m off the flown leg: predictions are not meaningful.
    let pos = START.linear_dist_2d(0.0, 200.0);
    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    let data = tm.monitor_trajectory(0.0, "Plan0", &pos, &vel, 1, 1);
    assert!(!data.fence_conflict);
    assert!(!data.traffic_conflict);
}

#[test]
fn test_next_feasible_waypoint_skips_fenced_waypoints() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(4), 0.0, false, 0.0).unwrap();
    // Keep-out square sitting on waypoint 1.
    let wp1 = START.linear_dist_2d(90f64.to_radians(), 1000.0);
    tm.input_geofence_data(FenceType::KeepOut, 2, 0.0, 100.0, square_vertices(wp1, 100.0));

    // Stand well off the plan so violation projections don't gate the
    // walk, then check the waypoint filter alone.
    let pos = START.linear_dist_2d(0.0, 200.0);
    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    let data = tm.monitor_trajectory(0.0, "Plan0", &pos, &vel, 1, 1);
    assert_eq!(data.next_feasible_wp, 2, "waypoint inside a keep-out is infeasible");
}

#[test]
fn test_next_feasible_waypoint_skips_short_legs() {
    let mut tm = monitor();
    let mut wps = eastbound_waypoints(2);
    // Insert a 20 m stub leg after waypoint 1.
    let stub = wps[1].position.linear_dist_2d(90f64.to_radians(), 20.0);
    wps.insert(2, Waypoint::new(stub, 102.0));
    tm.input_flight_plan("Plan0", wps, 0.0, false, 0.0).unwrap();

    let pos = START.linear_dist_2d(0.0, 200.0);
    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    let data = tm.monitor_trajectory(0.0, "Plan0", &pos, &vel, 1, 1);
    // Waypoint 1 is followed by a 20 m leg (< 30 m of travel): skip it.
    assert_eq!(data.next_feasible_wp, 2);
}

#[test]
fn test_line_of_sight_blocked_by_fence() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(2), 0.0, false, 0.0).unwrap();
    let mid = START.linear_dist_2d(90f64.to_radians(), 500.0);
    tm.input_geofence_data(FenceType::KeepOut, 3, 0.0, 100.0, square_vertices(mid, 100.0));

    let goal = START.linear_dist_2d(90f64.to_radians(), 1000.0);
    assert!(!tm.check_line_of_sight(&START, &goal), "fence blocks the direct segment");

    let offset_goal = goal.linear_dist_2d(0.0, 500.0);
    assert!(tm.check_line_of_sight(&START, &offset_goal), "offset segment clears the fence");

    // Flying above the fence ceiling restores line of sight.
    assert!(tm.check_line_of_sight(&START.mk_alt(150.0), &goal.mk_alt(150.0)));
}

#[test]
fn test_secondary_plans_resolve_to_plan_plus() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(2), 0.0, false, 0.0).unwrap();
    assert!(tm.get_plan("Plan+").is_some(), "Plan0 input seeds Plan+");

    let detour = vec![
        Waypoint::new(START.linear_dist_2d(0.0, 100.0), 0.0),
        Waypoint::new(START.linear_dist_2d(90f64.to_radians(), 500.0), 60.0),
    ];
    tm.input_flight_plan("Plan3", detour, 0.0, false, 0.0).unwrap();

    // A query against the detour id runs against Plan+.
    let vel = Velocity::make_trk_gs_vs(90.0, 10.0, 0.0);
    let data = tm.monitor_trajectory(0.0, "Plan3", &START, &vel, 1, 1);
    assert!(data.line_of_sight_to_goal);
}

#[test]
fn test_combine_plan_appends_tail() {
    let mut tm = monitor();
    tm.input_flight_plan("Plan0", eastbound_waypoints(3), 0.0, false, 0.0).unwrap();
    let detour = vec![
        Waypoint::new(START.linear_dist_2d(0.0, 100.0), 0.0),
        Waypoint::new(START.linear_dist_2d(90f64.to_radians(), 1500.0), 80.0),
    ];
    tm.input_flight_plan("Plan1", detour, 0.0, false, 0.0).unwrap();

    tm.combine_plan("Plan1", "Plan0", 2);
    let combined = tm.get_plan("Plan+").unwrap();
    assert_eq!(combined.len(), 2 + 2, "detour plus the Plan0 tail from index 2");
    // Times keep their original leg durations, rebased onto the detour.
    assert!((combined.time(2) - (80.0 + 100.0)).abs() < 1e-6);
    for i in 1..combined.len() {
        assert!(combined.time(i) >= combined.time(i - 1));
    }
}
