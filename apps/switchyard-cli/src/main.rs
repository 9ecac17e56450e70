//! Switchyard CLI - route text through the intent classification backends.
//!
//! Provides a `switchyard` command for classifying text, inspecting A/B
//! assignments and validating router configuration files.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use switchyard_router::{LatencyTier, DEFAULT_MIN_CONFIDENCE};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Switchyard - adaptive routing for intent classification
#[derive(Parser, Debug)]
#[command(name = "switchyard", author, version, about = "Switchyard - adaptive routing for intent classification")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Router configuration file (TOML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify text and print the result with its routing decision
    Classify {
        /// Text to classify
        text: String,

        /// Latency tier (critical, standard, relaxed)
        #[arg(short, long, default_value = "standard")]
        tier: LatencyTier,

        /// Minimum confidence the caller accepts
        #[arg(long, default_value_t = DEFAULT_MIN_CONFIDENCE)]
        min_confidence: f64,

        /// User identifier for A/B assignment
        #[arg(short, long)]
        user: Option<String>,

        /// Append routing statistics to the output
        #[arg(long)]
        stats: bool,
    },

    /// Show whether a user falls inside an experiment rollout
    Assign {
        /// Experiment name
        #[arg(short, long, default_value = "routing_v1")]
        experiment: String,

        /// User identifier
        #[arg(short, long)]
        user: String,

        /// Rollout percentage (0-100)
        #[arg(short, long)]
        rollout: f64,
    },

    /// Load and validate a configuration file
    ValidateConfig {
        /// Path to the TOML file
        path: PathBuf,
    },

    /// Probe every configured backend
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    // Logs go to stderr so stdout stays machine-readable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Classify { text, tier, min_confidence, user, stats } => {
            commands::classify::execute(args.config.as_deref(), &text, tier, min_confidence, user.as_deref(), stats)
                .await
        }
        Command::Assign { experiment, user, rollout } => commands::assign::execute(&experiment, &user, rollout),
        Command::ValidateConfig { path } => commands::validate_config::execute(&path),
        Command::Health => commands::health::execute(args.config.as_deref()).await,
    }
}
