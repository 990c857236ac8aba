use anyhow::Result;
use clap::Parser;
use nvr_notify::{NotifierApp, NotifyConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nvr-notify")]
#[command(about = "MQTT-to-email notification gate for NVR detection events")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "nvr-notify.toml")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long)]
    debug: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate_config: bool,

    /// Print default configuration in TOML format and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", NotifyConfig::default().to_toml()?);
        return Ok(());
    }

    init_logging(&args);

    info!("Starting nvr-notify v{}", env!("CARGO_PKG_VERSION"));

    let config = match NotifyConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %args.config, error = %err, "failed to load configuration");
            return Err(err.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("configuration is valid");
                return Ok(());
            }
            Err(err) => {
                eprintln!("configuration validation failed: {}", err);
                std::process::exit(1);
            }
        }
    }

    NotifierApp::new(config)?.run().await?;
    Ok(())
}

fn init_logging(args: &Args) {
    let default_level = if args.debug {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
