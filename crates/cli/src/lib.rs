pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use leadflow_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "leadflow",
    about = "Leadflow operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations, and chat with the qualification or support agent.",
    after_help = "Examples:\n  leadflow doctor --json\n  leadflow config\n  leadflow chat --key demo\n  leadflow chat --support"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a leadflow.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, agent profile, completion client, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Chat with the agent from the terminal; state persists in the database")]
    Chat {
        #[arg(long, default_value = "cli-session", help = "Conversation key to use")]
        key: String,
        #[arg(long, help = "Talk to the support agent instead of the qualification engine")]
        support: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => {
            let (exit_code, output) = commands::doctor::run(options, json);
            commands::CommandResult { exit_code, output }
        }
        Command::Chat { key, support } => commands::chat::run(options, &key, support),
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
