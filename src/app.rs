use crate::config::NotifyConfig;
use crate::control::SharedControlState;
use crate::error::Result;
use crate::filter::DetectionFilter;
use crate::notify::EmailSink;
use crate::replicator::Replicator;
use crate::router::EventRouter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Wires the transport, control-state replica, router and sink together and
/// runs the single-consumer processing loop.
pub struct NotifierApp {
    config: NotifyConfig,
}

impl NotifierApp {
    pub fn new(config: NotifyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run until ctrl-c. The replicator task owns all broker I/O; detection
    /// events flow through a bounded queue into this loop, which owns the
    /// dedup window and makes every gating decision in arrival order.
    pub async fn run(self) -> Result<()> {
        let state = SharedControlState::new();
        let (events_tx, mut events_rx) =
            mpsc::channel(self.config.runtime.event_queue_capacity);

        let sink = Arc::new(EmailSink::new(&self.config.email, &self.config.frigate)?);
        let filter = DetectionFilter::new(
            self.config.filter.cameras.clone(),
            self.config.filter.label.clone(),
        );
        let mut router = EventRouter::new(filter, state.clone(), sink);

        let replicator = Replicator::new(
            &self.config.mqtt,
            &self.config.runtime,
            state.clone(),
            events_tx,
        );
        info!(
            broker = %self.config.mqtt.broker,
            port = self.config.mqtt.port,
            event_topic = %self.config.mqtt.event_topic,
            control_topic = %self.config.mqtt.control_topic,
            "starting transport"
        );
        let transport = tokio::spawn(replicator.run());

        loop {
            tokio::select! {
                received = events_rx.recv() => match received {
                    Some(event) => {
                        let outcome = router.on_event(event).await;
                        tracing::debug!(?outcome, "event routed");
                    }
                    None => {
                        warn!("event channel closed, stopping");
                        break;
                    }
                },
                signal = tokio::signal::ctrl_c() => {
                    if let Err(err) = signal {
                        warn!(error = %err, "failed to listen for shutdown signal");
                    }
                    info!("shutdown requested");
                    break;
                }
            }
        }

        transport.abort();
        info!("notifier stopped");
        Ok(())
    }
}
