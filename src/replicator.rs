use crate::config::{MqttConfig, RuntimeConfig};
use crate::control::{ControlMessage, SharedControlState};
use crate::error::Result;
use crate::event::DetectionEvent;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, Publish, QoS};
use std::future::pending;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Transport lifecycle of the consuming replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// Connected, receiving detection events only
    SubscribedEvents,
    /// Receiving detection events and control messages
    SubscribedAll,
}

/// Consumer side of the control channel, plus the detection-event feed.
///
/// Owns the MQTT event loop. Detection events are decoded and pushed into a
/// bounded channel toward the single-consumer processing loop; control
/// messages are applied to the shared state replica on this task, which is
/// the only writer.
///
/// The control-channel subscribe is deliberately delayed a few seconds after
/// each connect: subscribing replays the broker's retained control message,
/// and doing so mid-handshake risks acting on a message meant for an earlier
/// session. After a reconnect the replay is exactly what we want, so both
/// channels are re-subscribed on every new session.
pub struct Replicator {
    client: AsyncClient,
    eventloop: rumqttc::EventLoop,
    event_topic: String,
    control_topic: String,
    control_subscribe_delay: Duration,
    reconnect_delay: Duration,
    state: SharedControlState,
    events_tx: mpsc::Sender<DetectionEvent>,
    connection_state: ConnectionState,
}

impl Replicator {
    pub fn new(
        mqtt: &MqttConfig,
        runtime: &RuntimeConfig,
        state: SharedControlState,
        events_tx: mpsc::Sender<DetectionEvent>,
    ) -> Self {
        let mut options = MqttOptions::new(mqtt.client_id.clone(), mqtt.broker.clone(), mqtt.port);
        options.set_keep_alive(Duration::from_secs(60));
        let (client, eventloop) = AsyncClient::new(options, 64);

        Self {
            client,
            eventloop,
            event_topic: mqtt.event_topic.clone(),
            control_topic: mqtt.control_topic.clone(),
            control_subscribe_delay: Duration::from_secs(runtime.control_subscribe_delay_secs),
            reconnect_delay: Duration::from_secs(runtime.reconnect_delay_secs),
            state,
            events_tx,
            connection_state: ConnectionState::Disconnected,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    /// Drive the transport until the process exits. Reconnection is
    /// indefinite with a fixed delay: this service is expected to outlive
    /// broker restarts.
    pub async fn run(mut self) {
        self.connection_state = ConnectionState::Connecting;
        let mut control_subscribe_at: Option<Instant> = None;

        loop {
            let timer_target = control_subscribe_at;
            let control_timer = async move {
                match timer_target {
                    Some(at) => sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                _ = control_timer => {
                    control_subscribe_at = None;
                    match self
                        .client
                        .subscribe(self.control_topic.clone(), QoS::AtLeastOnce)
                        .await
                    {
                        Ok(()) => {
                            self.connection_state = ConnectionState::SubscribedAll;
                            info!(topic = %self.control_topic, "subscribed to control channel");
                        }
                        Err(err) => warn!(error = %err, "control channel subscribe failed"),
                    }
                }
                polled = self.eventloop.poll() => match polled {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!(code = ?ack.code, "connected to broker");
                        match self
                            .client
                            .subscribe(self.event_topic.clone(), QoS::AtMostOnce)
                            .await
                        {
                            Ok(()) => {
                                self.connection_state = ConnectionState::SubscribedEvents;
                                info!(topic = %self.event_topic, "subscribed to event channel");
                            }
                            Err(err) => warn!(error = %err, "event channel subscribe failed"),
                        }
                        control_subscribe_at =
                            Some(Instant::now() + self.control_subscribe_delay);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.on_publish(publish).await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(
                            error = %err,
                            delay_secs = self.reconnect_delay.as_secs(),
                            "broker connection lost, reconnecting"
                        );
                        self.connection_state = ConnectionState::Disconnected;
                        control_subscribe_at = None;
                        tokio::time::sleep(self.reconnect_delay).await;
                        self.connection_state = ConnectionState::Connecting;
                    }
                }
            }
        }
    }

    async fn on_publish(&mut self, publish: Publish) {
        if publish.topic == self.event_topic {
            match DetectionEvent::parse(&publish.payload) {
                Ok(event) => {
                    // try_send keeps broker I/O off the gating path; a full
                    // queue sheds the event rather than stalling keepalives
                    if let Err(err) = self.events_tx.try_send(event) {
                        warn!(error = %err, "event queue unavailable, dropping event");
                    }
                }
                Err(err) => error!(error = %err, "malformed detection payload dropped"),
            }
        } else if publish.topic == self.control_topic {
            match apply_control_payload(&self.state, &publish.payload) {
                Ok(Some(message)) => debug!(?message, "control message applied"),
                Ok(None) => debug!("empty retained control payload ignored"),
                Err(err) => error!(error = %err, "malformed control payload dropped"),
            }
        } else {
            debug!(topic = %publish.topic, "publish on unexpected topic ignored");
        }
    }
}

/// Decode a control-channel payload and apply it atomically to the local
/// replica. An empty payload (a cleared retained message) is a no-op; a
/// malformed one is an error and leaves the state untouched.
pub fn apply_control_payload(
    state: &SharedControlState,
    payload: &[u8],
) -> Result<Option<ControlMessage>> {
    if payload.is_empty() {
        return Ok(None);
    }
    let message: ControlMessage = serde_json::from_slice(payload)?;
    state.apply(&message, Utc::now());
    Ok(Some(message))
}

/// Producer side of the control channel.
///
/// Every publish is retained: the broker keeps only the latest message per
/// channel and hands it to each new subscriber, which is the system's sole
/// durability mechanism. The producer never clears the retained value.
pub struct ControlPublisher {
    client: AsyncClient,
    topic: String,
}

impl ControlPublisher {
    pub fn new(client: AsyncClient, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }

    pub async fn publish(&self, message: &ControlMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.client
            .publish(self.topic.clone(), QoS::AtLeastOnce, true, payload)
            .await?;
        info!(topic = %self.topic, ?message, "control message published (retained)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{self, GateDecision};
    use chrono::{Duration as ChronoDuration, NaiveDate};

    #[test]
    fn empty_retained_payload_is_a_no_op() {
        let state = SharedControlState::new();
        let before = state.snapshot();
        assert!(apply_control_payload(&state, b"").unwrap().is_none());
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn malformed_control_payload_leaves_state_unchanged() {
        let state = SharedControlState::new();
        state.apply(
            &ControlMessage::EmailSendingToggled { enabled: false },
            Utc::now(),
        );
        let before = state.snapshot();

        assert!(apply_control_payload(&state, b"{not json").is_err());
        assert!(apply_control_payload(
            &state,
            br#"{"event_type": "unknown_thing", "details": {}}"#
        )
        .is_err());
        assert!(apply_control_payload(
            &state,
            br#"{"event_type": "schedule_set", "details": {"schedule": {
                "monday": {"start_time": "18:00", "end_time": "08:00"}}}}"#
        )
        .is_err());

        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn valid_payload_is_applied() {
        let state = SharedControlState::new();
        let message = apply_control_payload(
            &state,
            br#"{"event_type": "email_sending_toggled", "details": {"enabled": false}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(message, ControlMessage::EmailSendingToggled { enabled: false });
        assert!(!state.snapshot().enabled());
    }

    #[test]
    fn retained_replay_restores_pre_restart_gating() {
        // Producer session: the operator disables sending. Only the latest
        // retained payload survives the "restart".
        let retained = serde_json::to_vec(&ControlMessage::EmailSendingToggled {
            enabled: false,
        })
        .unwrap();

        // Fresh replica after restart: compiled-in defaults would allow
        let local = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let replica = SharedControlState::new();
        assert_eq!(
            gate::evaluate(&replica.snapshot(), Utc::now(), local),
            GateDecision::Allow
        );

        // Replaying the retained message reproduces pre-restart decisions
        apply_control_payload(&replica, &retained).unwrap();
        assert_eq!(
            gate::evaluate(&replica.snapshot(), Utc::now(), local),
            GateDecision::Disabled
        );
    }

    #[test]
    fn retained_snooze_replay_keeps_lazy_expiry() {
        let retained = serde_json::to_vec(&ControlMessage::SnoozeSet {
            cooldown_minutes: 30,
        })
        .unwrap();
        let replica = SharedControlState::new();
        apply_control_payload(&replica, &retained).unwrap();

        let snapshot = replica.snapshot();
        assert!(snapshot.snooze_active(Utc::now()));
        assert!(!snapshot.snooze_active(Utc::now() + ChronoDuration::minutes(31)));
    }

    #[test]
    fn connection_state_starts_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
