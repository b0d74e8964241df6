//! Tidepool command-line tool - runs replay scripts against a JSON store and
//! prints what every listener saw.

use std::{path::PathBuf, process};

use clap::{Parser, Subcommand, ValueEnum};
use tidepool::{
    replay::{LogLevel, ReplayScript, Replayer},
    tracing_config,
};
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "tidepool")]
#[command(about = "Replay scripted sessions against a reactive store")]
struct Cli {
    /// Log level; overrides the script's `general.log_level`
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a replay script and print its transcript
    Replay {
        /// Path to the TOML script
        script: PathBuf,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the JSON schema of replay scripts
    Schema,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!(error = %e, "tidepool failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Replay { script, format } => {
            let script = ReplayScript::load(&script)?;
            tracing_config::init(cli.log_level.unwrap_or(script.general.log_level))?;
            debug!(steps = script.steps.len(), "running replay");

            let transcript = Replayer::run(&script)?;
            let output = match format {
                OutputFormat::Text => transcript.to_text(),
                OutputFormat::Json => transcript.to_json()?,
            };
            println!("{output}");
        }
        Commands::Schema => {
            tracing_config::init(cli.log_level.unwrap_or_default())?;
            println!("{}", ReplayScript::schema()?);
        }
    }

    Ok(())
}
