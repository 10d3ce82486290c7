//! Route command for injecting hand-authored traces into KiCad layouts

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use log::debug;
use pcb_route::{
    apply_to_file, routing_block, strip_file, KicadBoard, PatchOutcome, RouteTable, UuidGen,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Arguments for the `route` command
#[derive(Args, Debug)]
#[command(about = "Insert, strip or inspect generated routing in a KiCad layout")]
pub struct RouteArgs {
    #[command(subcommand)]
    pub command: RouteCommands,
}

#[derive(Subcommand, Debug)]
pub enum RouteCommands {
    /// Replace generated routing in a layout with the route table
    Apply(ApplyArgs),
    /// Remove generated routing from a layout
    Strip(StripArgs),
    /// Print the serialized routing block
    Emit(TableArgs),
    /// Report segment and via counts per net
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct TableArgs {
    /// Route table (TOML). Defaults to the built-in precursor-lora table
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub table: Option<PathBuf>,
}

/// Arguments for the `route apply` subcommand
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Path to the .kicad_pcb file to patch
    #[arg(value_name = "BOARD", value_hint = clap::ValueHint::FilePath)]
    pub board: PathBuf,

    #[command(flatten)]
    pub table: TableArgs,

    /// Compute the patch without writing the file
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `route strip` subcommand
#[derive(Args, Debug)]
pub struct StripArgs {
    /// Path to the .kicad_pcb file to clean
    #[arg(value_name = "BOARD", value_hint = clap::ValueHint::FilePath)]
    pub board: PathBuf,

    /// Report what would be removed without writing the file
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `route inspect` subcommand
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to the .kicad_pcb file to inspect
    #[arg(value_name = "BOARD", value_hint = clap::ValueHint::FilePath)]
    pub board: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the `route` command
pub fn execute(args: RouteArgs) -> Result<ExitCode> {
    match args.command {
        RouteCommands::Apply(args) => execute_apply(args),
        RouteCommands::Strip(args) => execute_strip(args).map(|_| ExitCode::SUCCESS),
        RouteCommands::Emit(args) => execute_emit(args).map(|_| ExitCode::SUCCESS),
        RouteCommands::Inspect(args) => execute_inspect(args).map(|_| ExitCode::SUCCESS),
    }
}

fn load_table(args: &TableArgs) -> Result<RouteTable> {
    let table = match &args.table {
        Some(path) => RouteTable::load(path)
            .with_context(|| format!("Failed to load route table: {}", path.display()))?,
        None => RouteTable::builtin().context("Built-in route table is invalid")?,
    };

    debug!(
        "route table: {} segments, {} vias across {} nets",
        table.segments.len(),
        table.vias.len(),
        table.used_nets().len()
    );
    Ok(table)
}

fn require_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("Board file does not exist: {}", path.display());
    }
    Ok(())
}

/// Execute the `route apply` subcommand
fn execute_apply(args: ApplyArgs) -> Result<ExitCode> {
    require_file(&args.board)?;
    let table = load_table(&args.table)?;

    eprintln!("Patching {}", args.board.display());
    let outcome = apply_to_file(&args.board, &table, args.dry_run)
        .with_context(|| format!("Failed to patch board: {}", args.board.display()))?;

    match outcome {
        PatchOutcome::Patched(patch) => {
            if patch.removed > 0 {
                eprintln!("  Removed {} previously generated records", patch.removed);
            }
            if args.dry_run {
                eprintln!("  Dry run, file not written");
            }
            println!("Inserted {} segments and {} vias", patch.segments, patch.vias);
            Ok(ExitCode::SUCCESS)
        }
        PatchOutcome::AnchorMissing => {
            eprintln!(
                "error: insertion anchor not found in {}; file left unchanged",
                args.board.display()
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Execute the `route strip` subcommand
fn execute_strip(args: StripArgs) -> Result<()> {
    require_file(&args.board)?;

    let stripped = strip_file(&args.board, args.dry_run)
        .with_context(|| format!("Failed to strip board: {}", args.board.display()))?;

    if args.dry_run {
        eprintln!("  Dry run, file not written");
    }
    println!("Removed {} generated records", stripped.removed);

    Ok(())
}

/// Execute the `route emit` subcommand
fn execute_emit(args: TableArgs) -> Result<()> {
    let table = load_table(&args)?;
    print!("{}", routing_block(&table, &mut UuidGen::new()));
    Ok(())
}

/// Execute the `route inspect` subcommand
fn execute_inspect(args: InspectArgs) -> Result<()> {
    require_file(&args.board)?;

    let board = KicadBoard::parse(&args.board)
        .with_context(|| format!("Failed to parse board: {}", args.board.display()))?;
    let routing = board.routing_by_net();

    if args.json {
        let json = serde_json::json!({
            "version": board.version,
            "footprints": board.footprints,
            "segments": board.tracks.len(),
            "vias": board.vias.len(),
            "nets": routing,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!(
        "{} footprints, {} segments, {} vias",
        board.footprints,
        board.tracks.len(),
        board.vias.len()
    );
    for net in routing.iter().filter(|n| n.segments > 0 || n.vias > 0) {
        let name = if net.name.is_empty() { "?" } else { net.name.as_str() };
        println!(
            "  net {:>3} {:<12} {:>4} segments {:>3} vias",
            net.id, name, net.segments, net.vias
        );
    }

    Ok(())
}
