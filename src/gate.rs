use crate::control::ControlState;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use tracing::debug;

/// Outcome of a gate evaluation. Deny variants carry the first veto that
/// fired, in evaluation order: snooze, then the enabled flag, then the
/// schedule window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Snoozed,
    Disabled,
    OutsideSchedule,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

/// Point-in-time allow/deny decision for a notification.
///
/// Snooze wins over everything: it is the operator's explicit, time-bounded
/// request for quiet. The enabled flag is the standing override, and the
/// schedule is the steady-state policy checked last. The decision is
/// synchronous and never blocks; an expired snooze is simply ignored.
///
/// `now` is the instant snooze expiry is compared against; `local_now` is the
/// host-local wall clock the schedule window is resolved with.
pub fn evaluate(state: &ControlState, now: DateTime<Utc>, local_now: NaiveDateTime) -> GateDecision {
    if state.snooze_active(now) {
        debug!(until = ?state.snooze_until(), "gate: denied, snoozed");
        return GateDecision::Snoozed;
    }
    if !state.enabled() {
        debug!("gate: denied, sending disabled");
        return GateDecision::Disabled;
    }
    if !state.schedule().is_within_window(local_now) {
        debug!("gate: denied, outside schedule window");
        return GateDecision::OutsideSchedule;
    }
    GateDecision::Allow
}

/// Evaluate against the current system clocks.
pub fn evaluate_now(state: &ControlState) -> GateDecision {
    evaluate(state, Utc::now(), Local::now().naive_local())
}
