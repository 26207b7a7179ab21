//! Conversion of linear plans into kinematic plans with explicit turn
//! arcs (BOT / MOT / EOT) sized from a commanded turn rate.

use super::{Plan, TrackTcp, Waypoint};
use crate::geom::{Projection, Vect3, turn_delta, turn_dir, wrap_rad};
use std::f64::consts::FRAC_PI_2;

/// Heading changes below this threshold keep the vertex as a plain
/// waypoint (degrees).
const MIN_TURN_ANGLE_DEG: f64 = 3.0;

/// Rebuilds `plan` with fillet turn arcs inserted at every interior
/// vertex whose heading change exceeds the threshold. The turn radius at
/// each vertex follows from the inbound leg speed and `turn_rate`
/// (deg/s), shrunk where the adjacent legs are too short to host the
/// fillet. Times are recomputed so each leg keeps its original ground
/// speed.
pub fn make_kinematic(plan: &Plan, _init_heading: f64, turn_rate: f64) -> Plan {
    if plan.len() < 3 || turn_rate <= 1e-3 {
        return plan.clone();
    }

    let mut out = Plan::new(plan.id());
    out.add_waypoint(plan.point(0).clone());

    let mut entry = plan.point(0).position;
    let mut entry_time = plan.point(0).time;

    for i in 1..plan.len() - 1 {
        let vertex = plan.point(i).position;
        let next = plan.point(i + 1).position;
        let gs = plan.gs_in(i).max(0.1);
        let trk1 = entry.track(&vertex);
        let trk2 = vertex.track(&next);
        let dir = turn_dir(trk1, trk2);
        let delta = turn_delta(trk1, trk2, dir);

        if delta.to_degrees() < MIN_TURN_ANGLE_DEG || delta.to_degrees() > 180.0 {
            let time = entry_time + entry.distance_h(&vertex) / gs;
            let mut wp = plan.point(i).clone();
            wp.time = time;
            out.add_waypoint(wp);
            entry = vertex;
            entry_time = time;
            continue;
        }

        // Fillet geometry: the arc is tangent to both legs at distance
        // d = R tan(delta/2) from the vertex.
        let mut radius = gs / turn_rate.to_radians();
        let leg_in = entry.distance_h(&vertex);
        let leg_out = vertex.distance_h(&next);
        let max_d = 0.5 * leg_in.min(leg_out);
        let mut d = radius * (delta / 2.0).tan();
        if d > max_d {
            d = max_d;
            radius = d / (delta / 2.0).tan();
        }

        let bot_pos = vertex.linear_dist_2d(wrap_rad(trk1 + std::f64::consts::PI), d);
        let eot_pos = vertex.linear_dist_2d(trk2, d);
        let side = if dir > 0 { FRAC_PI_2 } else { -FRAC_PI_2 };
        let center = bot_pos.linear_dist_2d(wrap_rad(trk1 + side), radius).mk_alt(vertex.alt());

        // Arc midpoint: rotate the center->BOT vector by half the turn.
        let proj = Projection::new(center);
        let bot_trk = proj.project(&bot_pos).vect2().trk();
        let mid_trk = wrap_rad(bot_trk + f64::from(dir) * delta / 2.0);
        let mot_pos = proj.inverse(Vect3::new(
            mid_trk.sin() * radius,
            mid_trk.cos() * radius,
            vertex.alt(),
        ));

        let bot_time = entry_time + (leg_in - d) / gs;
        let arc_half = radius * delta / 2.0 / gs;

        let mut bot = Waypoint::new(bot_pos.mk_alt(vertex.alt()), bot_time);
        bot.track_tcp = TrackTcp::Bot {
            radius: radius * f64::from(dir),
            center,
        };
        let mut mot = Waypoint::new(mot_pos, bot_time + arc_half);
        mot.track_tcp = TrackTcp::Mot;
        let mut eot = Waypoint::new(eot_pos.mk_alt(vertex.alt()), bot_time + 2.0 * arc_half);
        eot.track_tcp = TrackTcp::Eot;
        let eot_time = eot.time;

        out.add_waypoint(bot);
        out.add_waypoint(mot);
        out.add_waypoint(eot);

        entry = eot_pos;
        entry_time = eot_time;
    }

    let last = plan.len() - 1;
    let gs = plan.gs_in(last).max(0.1);
    let mut final_wp = plan.point(last).clone();
    final_wp.time = entry_time + entry.distance_h(&final_wp.position) / gs;
    out.add_waypoint(final_wp);
    out
}
