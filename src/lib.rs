pub mod app;
pub mod clip_request;
pub mod config;
pub mod control;
pub mod dedup;
pub mod error;
pub mod event;
pub mod filter;
pub mod gate;
pub mod notify;
pub mod replicator;
pub mod router;
pub mod schedule;

pub use app::NotifierApp;
pub use config::NotifyConfig;
pub use control::{ControlMessage, ControlState, SharedControlState};
pub use dedup::{RecentEventWindow, RECENT_WINDOW_CAPACITY};
pub use error::{NotifyError, Result};
pub use event::DetectionEvent;
pub use filter::{DetectionFilter, ALL_CAMERAS};
pub use gate::GateDecision;
pub use notify::{EmailSink, NotificationSink};
pub use replicator::{ConnectionState, ControlPublisher, Replicator};
pub use router::{EventRouter, RouteOutcome};
pub use schedule::{ScheduleWindow, TimeOfDay, WeekSchedule};
