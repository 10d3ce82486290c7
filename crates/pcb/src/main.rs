use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::process::ExitCode;

mod route;

#[derive(Parser, Debug)]
#[command(name = "pcb", version, about = "next-gen tooling for pcb design")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage hand-authored routing in KiCad layouts
    Route(route::RouteArgs),
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Route(args) => route::execute(args),
    }
}
