//! Profile Runner - Operator CLI for the adapter engine
//!
//! Loads provider profiles and routing rules from JSON files and drives the
//! engine directly. Useful for trying out a profile before publishing it.
//!
//! # Usage
//!
//! ```bash
//! # Execute a profile
//! profile-runner run --profile dalle.json --var prompt="a red fox" --api-key "$OPENAI_API_KEY"
//!
//! # Pick a model for a request context
//! profile-runner route --rules rules.json --context ctx.json --available gpt-4o,gpt-4o-mini
//!
//! # Check a profile without calling anything
//! profile-runner validate --profile dalle.json
//!
//! # Verbose logging
//! RUST_LOG=debug profile-runner run --profile dalle.json
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): cancels the in-flight invocation

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use adapter_core::config::{load_config_from_path, ConfigOverrides};
use adapter_core::Purpose;

/// Profile Runner - execute and inspect adapter profiles
#[derive(Parser, Debug)]
#[command(name = "profile-runner")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Engine configuration file path
    #[arg(short = 'c', long, env = "ADAPTER_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "ADAPTER_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Runner subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a profile and print the normalized content as JSON
    Run {
        /// Profile JSON file
        #[arg(short, long, value_name = "FILE")]
        profile: PathBuf,

        /// Template variable (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// JSON object of template variables
        #[arg(long, value_name = "FILE")]
        vars_file: Option<PathBuf>,

        /// JSON body template merged over the profile's body
        #[arg(long, value_name = "FILE")]
        body_template: Option<PathBuf>,

        /// Base URL override
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,

        /// Request timeout override in seconds
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,

        /// Connection timeout override in milliseconds
        #[arg(long, value_name = "MS")]
        connect_timeout_ms: Option<u64>,

        /// API key exposed as `{{api_key}}`
        #[arg(long, env = "ADAPTER_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Account endpoint exposed as `{{endpoint_url}}`
        #[arg(long, value_name = "URL")]
        endpoint_url: Option<String>,
    },

    /// Select a model for a request context
    Route {
        /// JSON array of routing rules
        #[arg(short, long, value_name = "FILE")]
        rules: PathBuf,

        /// JSON request context
        #[arg(short = 'x', long, value_name = "FILE")]
        context: PathBuf,

        /// Comma-separated available model ids (default: all)
        #[arg(short, long, value_delimiter = ',')]
        available: Option<Vec<String>>,

        /// Purpose whose configured default applies when no rule matches
        #[arg(long, default_value = "chat", value_parser = commands::parse_purpose)]
        purpose: Purpose,
    },

    /// Load and validate a profile
    Validate {
        /// Profile JSON file
        #[arg(short, long, value_name = "FILE")]
        profile: PathBuf,
    },
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("adapter_runner={level},adapter_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "Profile runner starting");

    let config_path = args.config.clone().or_else(adapter_core::config::default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load engine configuration")?;

    let output = match args.command {
        Command::Run {
            profile,
            vars,
            vars_file,
            body_template,
            base_url,
            timeout_secs,
            connect_timeout_ms,
            api_key,
            endpoint_url,
        } => {
            let mut overrides = ConfigOverrides::new();
            if let Some(secs) = timeout_secs {
                overrides = overrides.with_default_timeout_ms(secs.saturating_mul(1_000));
            }
            if let Some(ms) = connect_timeout_ms {
                overrides = overrides.with_connect_timeout_ms(ms);
            }
            overrides.apply(&mut config);

            commands::run(
                config,
                commands::RunArgs {
                    profile,
                    vars,
                    vars_file,
                    body_template,
                    base_url,
                    timeout_secs,
                    api_key,
                    endpoint_url,
                },
            )
            .await?
        }
        Command::Route {
            rules,
            context,
            available,
            purpose,
        } => commands::route(config, &rules, &context, available, purpose).await?,
        Command::Validate { profile } => commands::validate(&profile).await?,
    };

    println!("{output}");
    Ok(())
}
