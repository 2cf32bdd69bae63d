pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "voxflow",
    about = "Voxflow operator CLI",
    long_about = "Operate the voxflow orchestration engine: validate objective graphs, simulate conversations, replay event traces, and apply migrations.",
    after_help = "Examples:\n  voxflow validate --graph onboarding.json\n  voxflow simulate --graph onboarding.json --fail capture_phone\n  voxflow replay --trace 4f7c2a90-...\n  voxflow migrate"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate an objective graph document and report structured errors")]
    Validate {
        #[arg(long, help = "Path to the graph configuration JSON document")]
        graph: PathBuf,
    },
    #[command(
        about = "Run one conversation against a stubbed execution service and print the event stream"
    )]
    Simulate {
        #[arg(long, help = "Path to the graph configuration JSON document")]
        graph: PathBuf,
        #[arg(long = "fail", help = "Primitive type that should always fail (repeatable)")]
        fail: Vec<String>,
    },
    #[command(about = "Print every durably stored event for a trace, in sequence order")]
    Replay {
        #[arg(long, help = "Trace identifier to replay")]
        trace: String,
    },
    #[command(about = "Apply pending event-store migrations and return structured status output")]
    Migrate,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Validate { graph } => commands::validate::run(&graph),
        Command::Simulate { graph, fail } => commands::simulate::run(&graph, fail),
        Command::Replay { trace } => commands::replay::run(&trace),
        Command::Migrate => commands::migrate::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
