mod config;
mod decode;
mod serve;
mod telemetry;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::ServiceConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Push-delivery writer for per-user activity timelines.
#[derive(Parser)]
#[command(
    name = "timeline",
    version,
    about = "Push-delivery writer for per-user activity timelines"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the push-delivery HTTP endpoint
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Decode a push envelope and show where it would be written
    Decode {
        /// Path to the envelope JSON file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            telemetry::init();
            let mut config = match ServiceConfig::from_env() {
                Ok(c) => c,
                Err(e) => {
                    report_error(&format!("configuration error: {}", e), cli.output);
                    process::exit(1);
                }
            };
            if let Some(port) = port {
                config.port = port;
            }
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(&format!("failed to create tokio runtime: {}", e), cli.output);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(config)) {
                report_error(&format!("Server error: {}", e), cli.output);
                process::exit(1);
            }
        }
        Commands::Decode { file } => {
            decode::cmd_decode(&file, cli.output);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat) {
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
