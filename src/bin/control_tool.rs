use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nvr_notify::control::ControlMessage;
use nvr_notify::replicator::ControlPublisher;
use nvr_notify::schedule::{ScheduleWindow, TimeOfDay, WeekSchedule};
use nvr_notify::NotifyConfig;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Publish retained control messages on the control channel.
///
/// This is the operator-facing producer: every message overwrites the
/// broker's retained value for the channel, which is what consumers replay
/// after a restart.
#[derive(Parser, Debug)]
#[command(name = "control-tool")]
#[command(about = "Publish retained schedule/toggle/snooze control messages")]
#[command(version)]
struct Args {
    /// Path to configuration file (for broker address and control topic)
    #[arg(short, long, default_value = "nvr-notify.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enable or disable notification sending
    Toggle {
        /// true to enable, false to disable
        #[arg(value_parser = clap::value_parser!(bool))]
        enabled: bool,
    },
    /// Snooze notifications for a number of minutes (0 clears the snooze)
    Snooze {
        /// Cooldown in minutes; 0 clears an active snooze immediately
        minutes: u32,
    },
    /// Set the allow window for one weekday (merged into the schedule)
    Schedule {
        /// Lowercase full weekday name, e.g. "monday"
        day: String,
        /// Window start, zero-padded 24-hour HH:MM
        start: String,
        /// Window end, zero-padded 24-hour HH:MM
        end: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = NotifyConfig::load_from_file(&args.config)?;
    let message = build_message(&args.command)?;

    publish_retained(&config, &message).await?;
    println!("published: {}", serde_json::to_string(&message)?);
    Ok(())
}

/// Validate the operator input and build the wire message. Invalid windows
/// are rejected here, before anything reaches the broker.
fn build_message(command: &Command) -> Result<ControlMessage> {
    match command {
        Command::Toggle { enabled } => Ok(ControlMessage::EmailSendingToggled {
            enabled: *enabled,
        }),
        Command::Snooze { minutes } => Ok(ControlMessage::SnoozeSet {
            cooldown_minutes: *minutes,
        }),
        Command::Schedule { day, start, end } => {
            let start: TimeOfDay = start.parse().context("invalid start time")?;
            let end: TimeOfDay = end.parse().context("invalid end time")?;
            let window = ScheduleWindow::new(start, end).context("invalid schedule window")?;

            let mut delta = WeekSchedule::new();
            let weekday = parse_weekday(day)?;
            delta.set(weekday, window);
            Ok(ControlMessage::ScheduleSet { schedule: delta })
        }
    }
}

fn parse_weekday(day: &str) -> Result<chrono::Weekday> {
    const NAMES: [(&str, chrono::Weekday); 7] = [
        ("monday", chrono::Weekday::Mon),
        ("tuesday", chrono::Weekday::Tue),
        ("wednesday", chrono::Weekday::Wed),
        ("thursday", chrono::Weekday::Thu),
        ("friday", chrono::Weekday::Fri),
        ("saturday", chrono::Weekday::Sat),
        ("sunday", chrono::Weekday::Sun),
    ];
    NAMES
        .into_iter()
        .find(|(name, _)| *name == day)
        .map(|(_, weekday)| weekday)
        .with_context(|| format!("unknown weekday '{}', expected a lowercase full name", day))
}

/// Connect, publish retained, wait for the broker's ack, disconnect.
async fn publish_retained(config: &NotifyConfig, message: &ControlMessage) -> Result<()> {
    let mut options = MqttOptions::new(
        format!("{}-control", config.mqtt.client_id),
        config.mqtt.broker.clone(),
        config.mqtt.port,
    );
    options.set_keep_alive(Duration::from_secs(10));
    let (client, mut eventloop) = AsyncClient::new(options, 16);

    let publisher = ControlPublisher::new(client.clone(), config.mqtt.control_topic.clone());
    publisher.publish(message).await?;

    // Drive the event loop until the publish is acknowledged
    let acked = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(_))) => break Ok(()),
                Ok(event) => debug!(?event, "broker event"),
                Err(err) => break Err(err),
            }
        }
    })
    .await
    .context("timed out waiting for broker acknowledgement")?;
    acked.context("broker connection failed")?;

    info!(topic = %config.mqtt.control_topic, "retained control message stored");
    client.disconnect().await.ok();
    Ok(())
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
