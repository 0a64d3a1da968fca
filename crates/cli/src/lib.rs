pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use caddie_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use caddie_core::domain::shot::{Lie, MissDirection, PressureContext};
use clap::{Parser, Subcommand};

use crate::commands::record_shot::ShotArgs;

#[derive(Debug, Parser)]
#[command(
    name = "caddie",
    about = "Caddie operator CLI",
    long_about = "Inspect caddie configuration, apply migrations, and work with shot memory and intent suggestions.",
    after_help = "Examples:\n  caddie doctor --json\n  caddie normalize \"gimme my 7i yardage\"\n  caddie record-shot --club driver --miss right --pressure scoring\n  caddie patterns --club driver"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a caddie.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity, and memory schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show how golf shorthand in the input is normalized")]
    Normalize {
        #[arg(required = true, help = "Text to normalize")]
        text: Vec<String>,
    },
    #[command(about = "List keyword suggestions offered when an intent cannot be read")]
    Suggest {
        #[arg(required = true, help = "Text to suggest intents for")]
        text: Vec<String>,
        #[arg(long, help = "Only suggest intents available without a network")]
        offline: bool,
    },
    #[command(about = "Show decayed miss patterns, strongest first")]
    Patterns {
        #[arg(long, help = "Restrict to one club, e.g. 7-iron")]
        club: Option<String>,
    },
    #[command(about = "Record a shot and update miss-pattern memory")]
    RecordShot {
        #[arg(long, help = "Club used, e.g. driver or 7-iron")]
        club: String,
        #[arg(long, default_value = "fairway", help = "Lie the shot was played from")]
        lie: Lie,
        #[arg(long, help = "Miss direction, omit for a good shot")]
        miss: Option<MissDirection>,
        #[arg(long, default_value = "normal", help = "Pressure context of the shot")]
        pressure: PressureContext,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=36))]
        hole: Option<u8>,
        #[arg(long)]
        notes: Option<String>,
    },
    #[command(about = "Clear all shots, miss patterns, and conversation history")]
    Forget,
}

pub fn init_logging(config: &LoggingConfig) {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // Ignored when a subscriber is already installed.
    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config.clone(), ..LoadOptions::default() };

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(options, json) }
        }
        Command::Normalize { text } => commands::normalize::run(&text.join(" ")),
        Command::Suggest { text, offline } => {
            commands::suggest::run(options, &text.join(" "), offline)
        }
        Command::Patterns { club } => commands::patterns::run(options, club.as_deref()),
        Command::RecordShot { club, lie, miss, pressure, hole, notes } => {
            commands::record_shot::run(options, ShotArgs { club, lie, miss, pressure, hole, notes })
        }
        Command::Forget => commands::forget::run(options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
