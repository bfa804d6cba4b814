use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slotwatch::config::Config;
use slotwatch::scheduler::MonitorOverrides;

mod commands;

#[derive(Parser)]
#[command(
    name = "slotwatch",
    version,
    about = "Appointment slot monitor with priority-based automatic registration",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// TOML config file (defaults to SLOTWATCH_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor, event dispatcher and control API until Ctrl-C
    Run {
        /// Two-character room code (overrides config)
        #[arg(short, long)]
        room: Option<String>,

        /// Polling interval in milliseconds (overrides config)
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Only report slots, never submit registrations
        #[arg(long, default_value = "false")]
        no_register: bool,

        /// Start with the monitor stopped (start it via the control API)
        #[arg(long, default_value = "false")]
        idle: bool,

        /// Do not start the HTTP control API
        #[arg(long, default_value = "false")]
        no_control: bool,
    },

    /// Probe one date and print its open times
    Probe {
        /// Date to probe (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Skip the same-day lead-time filter
        #[arg(long, default_value = "false")]
        raw: bool,
    },

    /// Print the booking page's datepicker window
    Constraints,

    /// Maintain the registrant store
    Registrants {
        #[command(subcommand)]
        action: RegistrantCommands,
    },
}

#[derive(Subcommand)]
enum RegistrantCommands {
    /// Add a registrant
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        surname: String,

        /// belarus, russia, ukraine, stateless
        #[arg(long)]
        citizenship: String,

        #[arg(long)]
        email: String,

        /// Digits only
        #[arg(long)]
        phone: String,

        /// Application type key
        #[arg(long, default_value = "adult")]
        application_type: String,

        /// Desired month (1-12)
        #[arg(short, long)]
        month: u32,
    },

    /// List pending registrants in priority order
    List {
        /// Only this month
        #[arg(short, long)]
        month: Option<u32>,

        /// Include registrants that already hold a reservation
        #[arg(long, default_value = "false")]
        all: bool,
    },

    /// Show store statistics
    Stats,

    /// Delete a registrant by id
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Commands::Run {
            room,
            poll_interval_ms,
            no_register,
            idle,
            no_control,
        } => {
            tracing::info!(
                room = ?room,
                poll_interval_ms = ?poll_interval_ms,
                no_register = %no_register,
                "Starting run command"
            );
            let params = commands::RunParams {
                overrides: MonitorOverrides {
                    room,
                    poll_interval_ms,
                    auto_registration: no_register.then_some(false),
                    registrant_recheck_secs: None,
                },
                idle,
                without_control: no_control,
            };
            commands::run(config, params).await?;
        }

        Commands::Probe { date, raw } => {
            tracing::info!(date = %date, raw = %raw, "Starting probe command");
            commands::probe(config, date, raw).await?;
        }

        Commands::Constraints => {
            commands::constraints(config).await?;
        }

        Commands::Registrants { action } => match action {
            RegistrantCommands::Add {
                name,
                surname,
                citizenship,
                email,
                phone,
                application_type,
                month,
            } => {
                let params = commands::registrants::AddParams {
                    name,
                    surname,
                    citizenship,
                    email,
                    phone,
                    application_type,
                    month,
                };
                commands::registrants::add(config, params).await?;
            }
            RegistrantCommands::List { month, all } => {
                commands::registrants::list(config, month, all).await?;
            }
            RegistrantCommands::Stats => commands::registrants::stats(config).await?,
            RegistrantCommands::Delete { id } => {
                commands::registrants::delete(config, id).await?;
            }
        },
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        "slotwatch=debug,info"
    } else {
        "slotwatch=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
