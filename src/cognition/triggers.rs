//! Trigger predicates gating each cognition event. All triggers are
//! pure: the fused conflict flags they read are refreshed once per tick
//! before the monitor pass runs.

use super::state::CognitionState;

/// resolution_type digit for a search (path) resolution.
pub const SEARCH_DIGIT: i32 = 4;
/// resolution_type digit for a ditch resolution.
pub const DITCH_DIGIT: i32 = 5;

/// Mission start armed, fences clear and the scenario clock has come up.
pub fn takeoff_trigger(state: &CognitionState) -> bool {
    state.mission_start == 0
        && !state.keep_in_conflict
        && !state.keep_out_conflict
        && state.utc_time >= state.scenario_time
}

/// Transition out of a takeoff commanded by the host.
pub fn nominal_departure_trigger(state: &CognitionState) -> bool { state.mission_start > 0 }

/// Imminent fence violation projected on the flown plan. Ignored while a
/// traffic conflict is being resolved.
pub fn fence_conflict_trigger(state: &CognitionState) -> bool {
    state.plan_projected_fence_conflict
        && state.time_to_fence_violation < state.parameters.plan_lookahead_time
        && !state.traffic_conflict
        && state.ic_ready
}

/// A resolution plan ran to completion.
pub fn secondary_plan_completion_trigger(state: &CognitionState) -> bool {
    let Some(fp) = state.active_plan() else {
        return false;
    };
    let plan_id = fp.id();
    plan_id != "Plan0"
        && plan_id != "DitchPath"
        && plan_id != "RtlPath"
        && state.next_wp_index(plan_id) >= fp.len()
        && state.ic_ready
}

/// The nominal mission plan ran to completion.
pub fn primary_plan_completion_trigger(state: &CognitionState) -> bool {
    state.active_plan().is_some_and(|fp| {
        fp.id() == "Plan0" && state.next_wp_index("Plan0") >= fp.len()
    })
}

/// The return-to-launch plan ran to completion.
pub fn rtl_plan_completion_trigger(state: &CognitionState) -> bool {
    state.active_plan().is_some_and(|fp| {
        fp.id() == "RtlPath" && state.next_wp_index("RtlPath") >= fp.len()
    })
}

/// Cross-track deviation beyond the allowed threshold.
pub fn flightplan_deviation_trigger(state: &CognitionState) -> bool {
    let Some(fp) = state.active_plan() else {
        return false;
    };
    if fp.id() == "Plan0" && state.next_wp_index("Plan0") >= fp.len() {
        return false;
    }
    state.xtrack_deviation > state.parameters.allowed_xtrack_deviation
        && !state.traffic_conflict
        && state.ic_ready
}

/// On a detour, a rising edge of line-of-sight to the goal means a more
/// direct return is now available.
pub fn flight_replan_trigger(state: &CognitionState) -> bool {
    let Some(fp) = state.active_plan() else {
        return false;
    };
    fp.id() != "Plan0" && !state.line_of_sight_to_goal_prev && state.line_of_sight_to_goal
}

/// Well clear violation handled with a vector resolution (anything but
/// search). Whether a usable resolution exists in the selected
/// dimension is the handler's concern, not the trigger's.
pub fn traffic_conflict_vector_res_trigger(state: &CognitionState) -> bool {
    if state.parameters.resolution_type == SEARCH_DIGIT {
        return false;
    }
    state.traffic_conflict
}

/// Well clear violation handled by asking the planner for a new path.
pub fn traffic_conflict_path_res_trigger(state: &CognitionState) -> bool {
    state.parameters.resolution_type == SEARCH_DIGIT && state.traffic_conflict && state.ic_ready
}

/// Traffic conflict escalated to a ditch.
pub fn traffic_conflict_ditch_trigger(state: &CognitionState) -> bool {
    state.traffic_conflict && state.parameters.resolution_type == DITCH_DIGIT
}

/// A merge is in progress; suppress traffic resolutions meanwhile.
pub fn merging_activity_trigger(state: &CognitionState) -> bool {
    state.merging_active == 1 && state.ic_ready
}

/// External ditch request.
pub fn ditching_trigger(state: &CognitionState) -> bool { state.ditch && state.ic_ready }

/// External return-to-launch request.
pub fn rtl_trigger(state: &CognitionState) -> bool { state.rtl && state.ic_ready }

/// The top-of-descent point of the ditch path has been reached.
pub fn ditch_site_tod_trigger(state: &CognitionState) -> bool {
    state.active_plan().is_some_and(|fp| {
        fp.id() == "DitchPath" && state.next_wp_index("DitchPath") >= fp.len()
    }) && state.ic_ready
}
