//! courier CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

use telemetry_courier::logging::{init_logging, LoggingConfig};
use telemetry_courier::Severity;

#[derive(Parser)]
#[command(name = "courier")]
#[command(author, version, about = "Ship telemetry to an OTLP/HTTP collector", long_about = None)]
struct Cli {
    /// Show debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the resolved settings
    Check {
        /// Path to the YAML configuration
        #[arg(short, long)]
        config: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Send one log record and wait for delivery
    Send {
        /// Path to the YAML configuration
        #[arg(short, long)]
        config: PathBuf,
        /// API key, overriding the configuration file
        #[arg(long, env = "COURIER_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Log body
        #[arg(short, long)]
        message: String,
        /// Severity (trace, debug, info, warn, error, fatal)
        #[arg(short, long, default_value = "info")]
        severity: Severity,
        /// Attribute as key=value (repeatable)
        #[arg(short = 'a', long = "attr")]
        attributes: Vec<String>,
        /// service.name resource attribute
        #[arg(long)]
        service: Option<String>,
        /// Print the full delivery report
        #[arg(long)]
        detailed: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = if cli.verbose {
        LoggingConfig::development()
    } else {
        LoggingConfig::production()
    };
    init_logging(&logging)?;

    match cli.command {
        Some(Commands::Check { config, json }) => {
            telemetry_courier::cli::commands::check::run_check(&config, json)?;
        }
        Some(Commands::Send {
            config,
            api_key,
            message,
            severity,
            attributes,
            service,
            detailed,
        }) => {
            telemetry_courier::cli::commands::send::run_send(
                telemetry_courier::cli::commands::send::SendOptions {
                    config_path: &config,
                    api_key,
                    message: &message,
                    severity,
                    attributes: &attributes,
                    service: service.as_deref(),
                    detailed,
                },
            )
            .await?;
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "courier", &mut std::io::stdout());
        }
        None => {
            println!("courier - telemetry delivery pipeline");
            println!("Run 'courier --help' for usage");
        }
    }

    Ok(())
}
