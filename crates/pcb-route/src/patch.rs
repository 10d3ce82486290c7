//! Strip-and-reinsert patching of generated routing in a `.kicad_pcb` file

use crate::board::KicadBoard;
use crate::format::{routing_block, UuidGen};
use crate::table::RouteTable;
use log::{debug, info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Routing is inserted immediately before the last occurrence of this text
pub const INSERT_ANCHOR: &str = "\n\t(embedded_fonts no)\n)";

/// Trimmed lines that open a multi-line generated record
const BLOCK_OPENERS: [&str; 2] = ["(segment", "(via"];

/// Substrings marking a single-line generated record
const INLINE_RECORDS: [&str; 2] = ["\t(segment (start", "\t(via (at"];

/// Two or more blank lines in a row
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("patched content of {} is not a valid board; file left unchanged", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

/// Text with generated routing removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    pub text: String,
    /// Generated records dropped (blocks and single lines)
    pub removed: usize,
}

/// A successfully patched board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub text: String,
    pub segments: usize,
    pub vias: usize,
    /// Previously generated records that were replaced
    pub removed: usize,
}

/// Result of a patch attempt. A missing anchor is an expected outcome, not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched(Patch),
    AnchorMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StripState {
    Scanning,
    SkippingBlock,
}

/// Drop generated segment/via records, then collapse blank-line runs.
///
/// Multi-line records open with a line that trims to `(segment` or `(via` and
/// end at the next line whose trimmed text starts with `)`. A block that never
/// closes swallows the rest of the input.
pub fn strip_generated(content: &str) -> Stripped {
    let mut kept = String::with_capacity(content.len());
    let mut state = StripState::Scanning;
    let mut removed = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        match state {
            StripState::Scanning => {
                if BLOCK_OPENERS.contains(&trimmed) {
                    state = StripState::SkippingBlock;
                    removed += 1;
                } else if INLINE_RECORDS.iter().any(|p| line.contains(p)) {
                    removed += 1;
                } else {
                    kept.push_str(line);
                }
            }
            StripState::SkippingBlock => {
                if trimmed.starts_with(')') {
                    state = StripState::Scanning;
                }
            }
        }
    }

    if state == StripState::SkippingBlock {
        warn!("generated block was never closed; discarded the remainder of the file");
    }

    Stripped {
        text: collapse_blank_lines(&kept),
        removed,
    }
}

/// Reduce every run of blank lines to a single blank line
pub fn collapse_blank_lines(content: &str) -> String {
    BLANK_RUN.replace_all(content, "\n\n").into_owned()
}

/// Splice `block` in front of the last insertion anchor
pub fn insert_before_anchor(content: &str, block: &str) -> Option<String> {
    let pos = content.rfind(INSERT_ANCHOR)?;

    let mut out = String::with_capacity(content.len() + block.len());
    out.push_str(&content[..pos]);
    out.push_str(block);
    out.push_str(&content[pos..]);
    Some(out)
}

/// Replace any generated routing in `content` with the serialized `table`
pub fn patch_routing(content: &str, table: &RouteTable, ids: &mut UuidGen) -> PatchOutcome {
    let stripped = strip_generated(content);
    debug!("stripped {} generated records", stripped.removed);

    if !stripped.text.contains(INSERT_ANCHOR) {
        return PatchOutcome::AnchorMissing;
    }

    let block = routing_block(table, ids);
    match insert_before_anchor(&stripped.text, &block) {
        Some(text) => PatchOutcome::Patched(Patch {
            text,
            segments: table.segments.len(),
            vias: table.vias.len(),
            removed: stripped.removed,
        }),
        None => PatchOutcome::AnchorMissing,
    }
}

/// Patch a board file in place.
///
/// Nothing is written when the anchor is missing, when the patched text does not
/// parse as a board, or when `dry_run` is set.
pub fn apply_to_file(
    path: &Path,
    table: &RouteTable,
    dry_run: bool,
) -> Result<PatchOutcome, PatchError> {
    let content = read_board(path)?;

    let patch = match patch_routing(&content, table, &mut UuidGen::new()) {
        PatchOutcome::Patched(patch) => patch,
        PatchOutcome::AnchorMissing => return Ok(PatchOutcome::AnchorMissing),
    };

    let board = verify_board(path, &patch.text)?;
    warn_unknown_nets(&board, table);

    if dry_run {
        info!("dry run: {} left unchanged", path.display());
    } else {
        write_board(path, &patch.text)?;
        info!(
            "replaced {} generated records in {}",
            patch.removed,
            path.display()
        );
    }

    Ok(PatchOutcome::Patched(patch))
}

/// Remove generated routing from a board file without inserting anything
pub fn strip_file(path: &Path, dry_run: bool) -> Result<Stripped, PatchError> {
    let content = read_board(path)?;

    let stripped = strip_generated(&content);
    verify_board(path, &stripped.text)?;

    if !dry_run && stripped.text != content {
        write_board(path, &stripped.text)?;
    }

    Ok(stripped)
}

/// Read a board with line endings normalized to `\n`; the board is written back with LF
fn read_board(path: &Path) -> Result<String, PatchError> {
    let content = std::fs::read_to_string(path).map_err(|source| PatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(normalize_line_endings(content))
}

/// Convert CRLF and lone CR line endings to LF
pub fn normalize_line_endings(content: String) -> String {
    if !content.contains('\r') {
        return content;
    }
    debug!("converting CRLF line endings to LF");
    content.replace("\r\n", "\n").replace('\r', "\n")
}

fn write_board(path: &Path, text: &str) -> Result<(), PatchError> {
    std::fs::write(path, text).map_err(|source| PatchError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn verify_board(path: &Path, text: &str) -> Result<KicadBoard, PatchError> {
    KicadBoard::parse_str(text).map_err(|source| PatchError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn warn_unknown_nets(board: &KicadBoard, table: &RouteTable) {
    if board.nets.is_empty() {
        return;
    }

    for net in table.used_nets() {
        if !board.nets.contains_key(&net) {
            warn!(
                "net {} ({}) is not declared in the board",
                net,
                table.net_name(net).unwrap_or("unnamed")
            );
        }
    }
}
