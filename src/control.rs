use crate::schedule::WeekSchedule;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Operator action carried on the retained control channel.
///
/// Wire shape is `{"event_type": "...", "details": {...}}` with the variant
/// tags and field names the front-end publishes; both processes must agree
/// on it exactly since the retained copy is the only durable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "details", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Schedule delta, merged by weekday into the current schedule
    ScheduleSet { schedule: WeekSchedule },
    /// Blunt on/off switch for all notifications
    EmailSendingToggled { enabled: bool },
    /// Temporary quiet period; 0 minutes clears an active snooze
    SnoozeSet { cooldown_minutes: u32 },
}

/// Replicated control state: one logical instance per process, mutated only
/// by applying control messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    enabled: bool,
    snooze_until: Option<DateTime<Utc>>,
    schedule: WeekSchedule,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            enabled: true,
            snooze_until: None,
            schedule: WeekSchedule::default(),
        }
    }
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one control message. Schedule deltas merge by weekday; a toggle
    /// replaces the enabled flag; a snooze of N > 0 minutes sets the expiry
    /// relative to `now`, N == 0 clears it.
    pub fn apply(&mut self, message: &ControlMessage, now: DateTime<Utc>) {
        match message {
            ControlMessage::ScheduleSet { schedule } => {
                self.schedule.merge(schedule);
                info!(weekdays = schedule.len(), "schedule updated");
            }
            ControlMessage::EmailSendingToggled { enabled } => {
                self.enabled = *enabled;
                info!(enabled = *enabled, "notification sending toggled");
            }
            ControlMessage::SnoozeSet { cooldown_minutes } => {
                if *cooldown_minutes == 0 {
                    self.snooze_until = None;
                    info!("snooze cleared");
                } else {
                    let until = now + Duration::minutes(i64::from(*cooldown_minutes));
                    self.snooze_until = Some(until);
                    info!(minutes = *cooldown_minutes, until = %until, "snooze set");
                }
            }
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a snooze is in effect at `now`. An expiry in the past is
    /// equivalent to unset; it is never swept proactively.
    pub fn snooze_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.snooze_until, Some(until) if now < until)
    }

    pub fn snooze_until(&self) -> Option<DateTime<Utc>> {
        self.snooze_until
    }

    pub fn schedule(&self) -> &WeekSchedule {
        &self.schedule
    }
}

/// Shared handle to the process-local control state replica.
///
/// Control messages arrive on the transport path while gating runs on the
/// event path; the lock makes each apply atomic so a gating read never
/// observes a half-merged update. Gating reads take a snapshot and never
/// mutate.
#[derive(Debug, Clone, Default)]
pub struct SharedControlState {
    inner: Arc<RwLock<ControlState>>,
}

impl SharedControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, message: &ControlMessage, now: DateTime<Utc>) {
        let mut state = self.inner.write();
        state.apply(message, now);
        debug!("control state applied");
    }

    pub fn snapshot(&self) -> ControlState {
        self.inner.read().clone()
    }
}
