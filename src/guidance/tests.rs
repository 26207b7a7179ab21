use super::*;
use crate::geom::Position;
use crate::plan::Waypoint;

const START: Position = Position::new(38.0, -76.0, 50.0);

/// Three waypoints due north, legs of 1000 m, flown at `gs` m/s.
fn northbound_waypoints(gs: f64) -> Vec<Waypoint> {
    let p1 = START.linear_dist_2d(0.0, 1000.0);
    let p2 = p1.linear_dist_2d(0.0, 1000.0);
    vec![
        Waypoint::new(START, 0.0),
        Waypoint::new(p1, 1000.0 / gs),
        Waypoint::new(p2, 2000.0 / gs),
    ]
}

fn guidance_on_plan(gs: f64) -> Guidance {
    let mut guidance = Guidance::new(Parameters::default());
    guidance.input_flightplan_data("Plan0", northbound_waypoints(gs), 0.0, false, 0.0).unwrap();
    guidance.set_aircraft_state(START, Velocity::make_trk_gs_vs(0.0, gs, 0.0));
    guidance.set_guidance_mode(GuidanceMode::Flightplan, "Plan0", 1, false);
    guidance
}

#[test]
fn test_plan_following_tracks_leg() {
    let mut guidance = guidance_on_plan(10.0);
    guidance.run(0.0);
    let out = guidance.get_output();
    assert_eq!(out.mode, GuidanceMode::Flightplan);
    let trk = out.vel_cmd.compass_deg();
    assert!(trk < 5.0 || trk > 355.0, "expected a northbound setpoint, got {trk}");
    assert!((out.vel_cmd.gs() - 10.0).abs() < 0.5);
    assert!(out.vel_cmd.vs().abs() < 0.1, "level leg flies level");
    assert_eq!(out.active_plan, "Plan0");
}

#[test]
fn test_speed_and_climb_clamps() {
    // A plan scheduled at 100 m/s against a 20 m/s envelope.
    let mut guidance = Guidance::new(Parameters::default());
    guidance.input_flightplan_data("Plan0", northbound_waypoints(100.0), 0.0, false, 0.0).unwrap();
    guidance.set_aircraft_state(START, Velocity::make_trk_gs_vs(0.0, 18.0, 0.0));
    guidance.set_guidance_mode(GuidanceMode::Flightplan, "Plan0", 1, false);
    guidance.run(0.0);
    let out = guidance.get_output();
    let params = Parameters::default();
    assert!(out.vel_cmd.gs() >= params.min_hs - 1e-9);
    assert!(out.vel_cmd.gs() <= params.max_hs + 1e-9);
    assert!(out.vel_cmd.vs() >= params.min_vs - 1e-9);
    assert!(out.vel_cmd.vs() <= params.max_vs + 1e-9);
}

#[test]
fn test_velocity_command_clamped_to_envelope() {
    let mut guidance = Guidance::new(Parameters::default());
    guidance.set_aircraft_state(START, Velocity::make_trk_gs_vs(90.0, 10.0, 0.0));
    guidance.set_wind_data(270.0, 2.0);
    guidance.set_guidance_mode(GuidanceMode::Vector, "", 0, false);

    guidance.set_velocity_commands(&Velocity::make_trk_gs_vs(90.0, 50.0, 0.0));
    guidance.run(0.0);
    let out = guidance.get_output();
    let params = Parameters::default();
    let wind_gs = guidance.wind_gs();
    assert!((out.vel_cmd.gs() - (params.max_hs + wind_gs)).abs() < 1e-9);

    guidance.set_velocity_commands(&Velocity::make_trk_gs_vs(90.0, 0.01, 0.0));
    guidance.run(1.0);
    let out = guidance.get_output();
    assert!((out.vel_cmd.gs() - (params.min_hs + wind_gs)).abs() < 1e-9);
}

#[test]
fn test_waypoint_capture() {
    // Approaching 5 m short of the waypoint: captured.
    let mut guidance = guidance_on_plan(5.0);
    let wp1 = START.linear_dist_2d(0.0, 1000.0);
    let near = START.linear_dist_2d(0.0, 995.0);
    guidance.set_aircraft_state(near, Velocity::make_trk_gs_vs(0.0, 5.0, 0.0));
    guidance.run(0.0);
    let out = guidance.get_output();
    assert!(out.wp_reached, "approaching inside the capture radius captures");
    assert_eq!(out.next_wp, Some(2));

    // Moving away inside the radius: not captured.
    let mut guidance = guidance_on_plan(5.0);
    let past = wp1.linear_dist_2d(0.0, 5.0);
    guidance.set_aircraft_state(past, Velocity::make_trk_gs_vs(0.0, 5.0, 0.0));
    guidance.run(0.0);
    assert!(!guidance.get_output().wp_reached, "receding vehicle must not capture");

    // Unless nearly stationary (capture radius shrinks with speed, so
    // sit just past the waypoint).
    let mut guidance = guidance_on_plan(5.0);
    let just_past = wp1.linear_dist_2d(0.0, 1.0);
    guidance.set_aircraft_state(just_past, Velocity::make_trk_gs_vs(0.0, 0.3, 0.0));
    guidance.run(0.0);
    assert!(guidance.get_output().wp_reached, "slow-speed exemption applies");
}

#[test]
fn test_capture_requires_altitude() {
    let mut guidance = guidance_on_plan(5.0);
    let near = START.linear_dist_2d(0.0, 997.0).mk_alt(50.0 + 50.0);
    guidance.set_aircraft_state(near, Velocity::make_trk_gs_vs(0.0, 5.0, 0.0));
    guidance.run(0.0);
    assert!(
        !guidance.get_output().wp_reached,
        "vertical distance beyond the climb window must block capture"
    );
}

#[test]
fn test_speed_change_idempotence() {
    let mut guidance = guidance_on_plan(10.0);

    // Commanding the plan's own speed makes no clone.
    guidance.change_waypoint_speed("Plan0", 1, 10.0);
    assert!(guidance.get_plan("PlanSpeedChange").is_none());
    let out = guidance.get_output();
    assert_eq!(out.active_plan, "Plan0");

    // A real change clones and rebases the schedule.
    guidance.change_waypoint_speed("Plan0", 1, 5.0);
    let clone = guidance.get_plan("PlanSpeedChange").expect("clone expected");
    assert!((clone.time(1) - 200.0).abs() < 1.0, "1000 m at 5 m/s takes 200 s");
    assert!((clone.time(2) - 400.0).abs() < 1.0);
    let first_times: Vec<f64> = (0..clone.len()).map(|i| clone.time(i)).collect();

    // The same request again produces an identical clone, not a
    // stacked one.
    guidance.change_waypoint_speed("Plan0", 1, 5.0);
    let clone = guidance.get_plan("PlanSpeedChange").unwrap();
    let second_times: Vec<f64> = (0..clone.len()).map(|i| clone.time(i)).collect();
    assert_eq!(first_times, second_times);

    // Cognition keeps seeing the original id.
    let out = guidance.get_output();
    assert_eq!(out.active_plan, "Plan0");
}

#[test]
fn test_alt_change_round_trip() {
    let mut guidance = guidance_on_plan(10.0);

    // Asking for the current altitude is a no-op.
    guidance.change_waypoint_alt("Plan0", 1, 50.0, true);
    assert!(guidance.get_plan("PlanAltChange").is_none());

    guidance.change_waypoint_alt("Plan0", 1, 80.0, true);
    let clone = guidance.get_plan("PlanAltChange").expect("clone expected");
    assert!((clone.pos(1).alt() - 80.0).abs() < 1e-9);
    assert!((clone.pos(2).alt() - 80.0).abs() < 1e-9, "update_all shifts the whole suffix");
    assert!((clone.pos(0).alt() - 50.0).abs() < 1e-9, "waypoints before the edit keep their altitude");

    // The same edit again leaves an identical clone.
    guidance.change_waypoint_alt("Plan0", 1, 80.0, true);
    let clone = guidance.get_plan("PlanAltChange").unwrap();
    assert!((clone.pos(2).alt() - 80.0).abs() < 1e-9);
}

#[test]
fn test_alt_change_single_waypoint() {
    let mut guidance = guidance_on_plan(10.0);
    guidance.change_waypoint_alt("Plan0", 1, 80.0, false);
    let clone = guidance.get_plan("PlanAltChange").unwrap();
    assert!((clone.pos(1).alt() - 80.0).abs() < 1e-9);
    assert!((clone.pos(2).alt() - 50.0).abs() < 1e-9, "only one waypoint shifts");
}

#[test]
fn test_eta_change_shifts_suffix() {
    let mut guidance = guidance_on_plan(10.0);
    guidance.change_waypoint_eta("Plan0", 1, 150.0, true);
    let fp = guidance.get_plan("Plan0").unwrap();
    assert!((fp.time(1) - 150.0).abs() < 1e-9);
    assert!((fp.time(2) - 250.0).abs() < 1e-9, "suffix shifts by the same delta");

    guidance.change_waypoint_eta("Plan0", 2, 300.0, false);
    let fp = guidance.get_plan("Plan0").unwrap();
    assert!((fp.time(1) - 150.0).abs() < 1e-9);
    assert!((fp.time(2) - 300.0).abs() < 1e-9);
}

#[test]
fn test_eta_maintenance_speed() {
    let mut params = Parameters::default();
    params.maintain_eta = true;
    let mut guidance = Guidance::new(params);
    guidance.input_flightplan_data("Plan0", northbound_waypoints(10.0), 0.0, false, 0.0).unwrap();
    guidance.set_aircraft_state(START, Velocity::make_trk_gs_vs(0.0, 10.0, 0.0));
    guidance.set_guidance_mode(GuidanceMode::Flightplan, "Plan0", 1, true);

    // On schedule: 1000 m with 100 s to go.
    guidance.run(0.0);
    assert!((guidance.get_output().vel_cmd.gs() - 10.0).abs() < 0.5);

    // Running 50 s late: the required speed doubles. Current speed set
    // close enough that the low-pass filter stays out of the way.
    guidance.set_aircraft_state(START, Velocity::make_trk_gs_vs(0.0, 18.0, 0.0));
    guidance.run(50.0);
    assert!((guidance.get_output().vel_cmd.gs() - 20.0).abs() < 1.0);
}

#[test]
fn test_land_mode_descends_to_final_waypoint() {
    let mut guidance = guidance_on_plan(10.0);
    let above = START.linear_dist_2d(0.0, 1900.0).mk_alt(120.0);
    guidance.set_aircraft_state(above, Velocity::make_trk_gs_vs(0.0, 5.0, 0.0));
    guidance.set_guidance_mode(GuidanceMode::Land, "Plan0", 2, false);
    guidance.run(0.0);
    let out = guidance.get_output();
    assert_eq!(out.mode, GuidanceMode::Land);
    assert!(out.vel_cmd.vs() < 0.0, "descending towards the touchdown point");
    assert!(out.vel_cmd.vs() >= Parameters::default().min_vs - 1e-9);
}

#[test]
fn test_turn_following_uses_tangent_heading() {
    // North leg, right turn, east leg; repaired at 3 deg/s.
    let p1 = START.linear_dist_2d(0.0, 1000.0);
    let p2 = p1.linear_dist_2d(90f64.to_radians(), 1000.0);
    let wps = vec![
        Waypoint::new(START, 0.0),
        Waypoint::new(p1, 100.0),
        Waypoint::new(p2, 200.0),
    ];
    let mut guidance = Guidance::new(Parameters::default());
    guidance.input_flightplan_data("Plan0", wps, 0.0, true, 3.0).unwrap();

    let fp = guidance.get_plan("Plan0").unwrap().clone();
    let bot = (0..fp.len()).find(|&i| fp.is_bot(i)).unwrap();

    // Sitting on the BOT, still heading north: the tangent there is the
    // inbound heading.
    guidance.set_aircraft_state(fp.pos(bot), Velocity::make_trk_gs_vs(0.0, 10.0, 0.0));
    guidance.set_guidance_mode(GuidanceMode::Flightplan, "Plan0", bot + 1, false);
    guidance.run(fp.time(bot));
    let trk = guidance.get_output().vel_cmd.compass_deg();
    assert!(trk < 10.0 || trk > 350.0, "tangent at turn entry stays northbound, got {trk}");
}

#[test]
fn test_sharp_turn_reduces_speed() {
    // Next leg requires an about-face; linear plans slow down for it.
    let mut guidance = guidance_on_plan(18.0);
    let beyond = START.linear_dist_2d(0.0, 1100.0);
    guidance.set_aircraft_state(beyond, Velocity::make_trk_gs_vs(0.0, 18.0, 0.0));
    guidance.run(0.0);
    let out = guidance.get_output();
    assert!(
        out.vel_cmd.gs() < 18.0,
        "a turn beyond 60 degrees must slow the vehicle, got {}",
        out.vel_cmd.gs()
    );
}
