use crate::event::DetectionEvent;
use serde::{Deserialize, Serialize};

/// Sentinel camera name that matches every camera.
pub const ALL_CAMERAS: &str = "ALL";

/// Stateless camera/label predicate applied to every non-duplicate event.
///
/// An event passes iff its camera is listed (or the list contains "ALL") and
/// its label equals the required label exactly. Matching is case-sensitive
/// with no synonym handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFilter {
    cameras: Vec<String>,
    label: String,
}

impl DetectionFilter {
    pub fn new(cameras: Vec<String>, label: impl Into<String>) -> Self {
        Self {
            cameras,
            label: label.into(),
        }
    }

    pub fn matches(&self, event: &DetectionEvent) -> bool {
        let camera_allowed = self
            .cameras
            .iter()
            .any(|camera| camera == ALL_CAMERAS || camera == &event.camera);
        camera_allowed && event.label == self.label
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}
