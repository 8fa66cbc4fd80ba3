pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "velocita",
    about = "VelocitaLeads operator CLI",
    long_about = "Operate the VelocitaLeads contact metrics engine: migrations, demo data, \
                  config inspection, readiness checks and metrics recomputation.",
    after_help = "Examples:\n  velocita doctor --json\n  velocita recompute --owner usr-alice\n  \
                  velocita recompute --contact ct-demo-active"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo owners, contacts and quotes, then verify them")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, scoring policy and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Recompute contact metrics for one contact, one owner, or everyone")]
    Recompute {
        #[arg(long, value_name = "CONTACT_ID", help = "Recompute a single contact")]
        contact: Option<String>,
        #[arg(
            long,
            value_name = "OWNER_ID",
            conflicts_with = "contact",
            help = "Restrict the batch to one owner's contacts"
        )]
        owner: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Recompute { contact, owner } => commands::recompute::run(contact, owner),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
