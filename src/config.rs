use crate::error::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Top-level configuration, loaded once at startup from an optional TOML
/// file overlaid with `NVR_NOTIFY_*` environment variables. Runtime control
/// arrives only via the control channel, never by re-reading this.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotifyConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub frigate: FrigateConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    /// Broker hostname or address
    #[serde(default = "default_broker")]
    pub broker: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Client identifier presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Detection-event channel published by the recorder
    #[serde(default = "default_event_topic")]
    pub event_topic: String,

    /// Retained control channel shared with the front-end
    #[serde(default = "default_control_topic")]
    pub control_topic: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilterConfig {
    /// Cameras to notify for; "ALL" matches every camera
    #[serde(default = "default_cameras")]
    pub cameras: Vec<String>,

    /// Detection label that triggers a notification
    #[serde(default = "default_label")]
    pub label: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrigateConfig {
    /// Recorder HTTP API host
    #[serde(default = "default_frigate_host")]
    pub host: String,

    /// Recorder HTTP API port
    #[serde(default = "default_frigate_port")]
    pub port: u16,
}

impl FrigateConfig {
    pub fn api_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmailConfig {
    /// Sending account address, also the target of "Request Clip" replies
    #[serde(default)]
    pub address: String,

    /// Sending account password or app token
    #[serde(default)]
    pub password: String,

    /// Operator address notifications are sent to
    #[serde(default)]
    pub recipient: String,

    /// SMTP relay host
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// SMTP relay port (STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuntimeConfig {
    /// Fixed delay between broker reconnect attempts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Delay after connect before subscribing to the control channel, so the
    /// retained control message replays only once the session is settled
    #[serde(default = "default_control_subscribe_delay")]
    pub control_subscribe_delay_secs: u64,

    /// Capacity of the bounded queue between transport and processing loop
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

fn default_broker() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "nvr-notify".to_string()
}

fn default_event_topic() -> String {
    "frigate/events".to_string()
}

fn default_control_topic() -> String {
    "scheduler/notifications".to_string()
}

fn default_cameras() -> Vec<String> {
    vec![crate::filter::ALL_CAMERAS.to_string()]
}

fn default_label() -> String {
    "person".to_string()
}

fn default_frigate_host() -> String {
    "localhost".to_string()
}

fn default_frigate_port() -> u16 {
    5000
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_control_subscribe_delay() -> u64 {
    3
}

fn default_event_queue_capacity() -> usize {
    64
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            event_topic: default_event_topic(),
            control_topic: default_control_topic(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            cameras: default_cameras(),
            label: default_label(),
        }
    }
}

impl Default for FrigateConfig {
    fn default() -> Self {
        Self {
            host: default_frigate_host(),
            port: default_frigate_port(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            password: String::new(),
            recipient: String::new(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_reconnect_delay(),
            control_subscribe_delay_secs: default_control_subscribe_delay(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            filter: FilterConfig::default(),
            frigate: FrigateConfig::default(),
            email: EmailConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl NotifyConfig {
    /// Load configuration from a TOML file (if present) overlaid with
    /// environment variables, e.g. `NVR_NOTIFY_MQTT__BROKER`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut builder = Config::builder();

        if path.exists() {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(File::from(path));
        } else {
            info!(
                path = %path.display(),
                "configuration file not found, using defaults and environment"
            );
        }

        let config: NotifyConfig = builder
            .add_source(Environment::with_prefix("NVR_NOTIFY").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Sanity checks beyond what deserialization enforces. Called at startup
    /// so a broken deployment fails before connecting anywhere.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.broker.is_empty() {
            return Err(invalid("mqtt.broker must not be empty"));
        }
        if self.mqtt.event_topic.is_empty() || self.mqtt.control_topic.is_empty() {
            return Err(invalid("mqtt topics must not be empty"));
        }
        if self.mqtt.event_topic == self.mqtt.control_topic {
            return Err(invalid("event and control topics must differ"));
        }
        if self.filter.cameras.is_empty() {
            return Err(invalid("filter.cameras must list at least one camera or ALL"));
        }
        if self.filter.label.is_empty() {
            return Err(invalid("filter.label must not be empty"));
        }
        if self.email.address.is_empty()
            || self.email.password.is_empty()
            || self.email.recipient.is_empty()
        {
            return Err(invalid(
                "email.address, email.password and email.recipient are required",
            ));
        }
        if self.runtime.event_queue_capacity == 0 {
            return Err(invalid("runtime.event_queue_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Render the configuration as TOML, used by `--print-config`.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn invalid(message: &str) -> crate::error::NotifyError {
    config::ConfigError::Message(message.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> NotifyConfig {
        NotifyConfig {
            email: EmailConfig {
                address: "cam@example.com".to_string(),
                password: "secret".to_string(),
                recipient: "owner@example.com".to_string(),
                ..EmailConfig::default()
            },
            ..NotifyConfig::default()
        }
    }

    #[test]
    fn defaults_are_sensible() {
        let config = NotifyConfig::default();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.event_topic, "frigate/events");
        assert_eq!(config.filter.cameras, vec!["ALL".to_string()]);
        assert_eq!(config.filter.label, "person");
        assert_eq!(config.runtime.control_subscribe_delay_secs, 3);
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_email_settings() {
        let config = NotifyConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_colliding_topics() {
        let mut config = valid_config();
        config.mqtt.control_topic = config.mqtt.event_topic.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_camera_list() {
        let mut config = valid_config();
        config.filter.cameras.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_toml_file_with_partial_sections() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[mqtt]\nbroker = \"broker.lan\"\n\n[filter]\nlabel = \"car\"\n"
        )
        .unwrap();

        let config = NotifyConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.mqtt.broker, "broker.lan");
        // Unspecified fields fall back to defaults
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.filter.label, "car");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = NotifyConfig::load_from_file("/nonexistent/nvr-notify.toml").unwrap();
        assert_eq!(config.mqtt.broker, "localhost");
    }

    #[test]
    fn renders_toml() {
        let toml = NotifyConfig::default().to_toml().unwrap();
        assert!(toml.contains("[mqtt]"));
        assert!(toml.contains("event_topic"));
    }
}
