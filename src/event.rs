use crate::error::{NotifyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single detection reported by the recorder.
///
/// The recorder owns the payload shape; only the fields the notifier reads
/// are lifted out. The full payload is kept alongside as opaque JSON so a
/// sink can log or forward it without re-parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Opaque identifier, unique per real-world occurrence
    pub id: String,
    /// Name of the camera that produced the detection
    pub camera: String,
    /// Classification of the detected subject (e.g. "person")
    pub label: String,
    /// Whether the recorder has a snapshot available for this event
    pub has_snapshot: bool,
    /// The raw recorder payload this event was lifted from
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub raw: Value,
}

impl DetectionEvent {
    /// Parse a detection-event channel message.
    ///
    /// The recorder publishes `{"before": {...}, "after": {...}}` envelopes;
    /// the notifier reads only `after.id`, `after.camera`, `after.label` and
    /// `after.has_snapshot`. A payload missing any required field is rejected
    /// and must be dropped by the caller with state unchanged.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let raw: Value = serde_json::from_slice(payload)?;
        let after = raw
            .get("after")
            .ok_or_else(|| NotifyError::malformed("missing 'after' object"))?;

        let id = required_str(after, "id")?;
        let camera = required_str(after, "camera")?;
        let label = required_str(after, "label")?;
        let has_snapshot = after
            .get("has_snapshot")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            id,
            camera,
            label,
            has_snapshot,
            raw,
        })
    }
}

fn required_str(after: &Value, field: &str) -> Result<String> {
    after
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| NotifyError::malformed(format!("missing or non-string 'after.{}'", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(id: &str, camera: &str, label: &str, has_snapshot: bool) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "before": { "id": id },
            "after": {
                "id": id,
                "camera": camera,
                "label": label,
                "has_snapshot": has_snapshot,
                "top_score": 0.92,
            },
            "type": "new",
        }))
        .unwrap()
    }

    #[test]
    fn parses_recorder_envelope() {
        let event = DetectionEvent::parse(&payload("1695000000.123-abc", "front", "person", true))
            .unwrap();
        assert_eq!(event.id, "1695000000.123-abc");
        assert_eq!(event.camera, "front");
        assert_eq!(event.label, "person");
        assert!(event.has_snapshot);
    }

    #[test]
    fn missing_snapshot_flag_defaults_to_false() {
        let bytes =
            br#"{"after": {"id": "a", "camera": "front", "label": "person"}}"#;
        let event = DetectionEvent::parse(bytes).unwrap();
        assert!(!event.has_snapshot);
    }

    #[test]
    fn rejects_missing_after() {
        let err = DetectionEvent::parse(br#"{"before": {"id": "a"}}"#).unwrap_err();
        assert!(matches!(err, NotifyError::MalformedPayload { .. }));
    }

    #[test]
    fn rejects_missing_required_field() {
        let err =
            DetectionEvent::parse(br#"{"after": {"id": "a", "camera": "front"}}"#).unwrap_err();
        assert!(matches!(err, NotifyError::MalformedPayload { .. }));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = DetectionEvent::parse(b"not json").unwrap_err();
        assert!(matches!(err, NotifyError::Json(_)));
    }
}
