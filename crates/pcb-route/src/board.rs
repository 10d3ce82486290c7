//! Structural view of a `.kicad_pcb` layout: nets, tracks and vias

use crate::sexpr::{self, Sexpr};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Parsed KiCad PCB layout, limited to what routing cares about
#[derive(Debug, Default)]
pub struct KicadBoard {
    /// KiCad version number
    pub version: u32,
    /// Net definitions
    pub nets: BTreeMap<u32, String>,
    /// Copper segments
    pub tracks: Vec<Track>,
    /// Vias
    pub vias: Vec<ViaHole>,
    /// Number of footprint instances
    pub footprints: usize,
}

/// A `(segment ...)` on the board
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub start: (f64, f64),
    pub end: (f64, f64),
    pub width: f64,
    /// Layer name (e.g., "F.Cu", "In1.Cu")
    pub layer: String,
    pub net: u32,
    pub uuid: String,
}

/// A `(via ...)` on the board
#[derive(Debug, Clone, PartialEq)]
pub struct ViaHole {
    pub at: (f64, f64),
    pub size: f64,
    pub drill: f64,
    pub layers: Vec<String>,
    pub net: u32,
    pub uuid: String,
}

/// Per-net routing summary
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct NetRouting {
    pub id: u32,
    pub name: String,
    pub segments: usize,
    pub vias: usize,
}

impl KicadBoard {
    /// Parse a `.kicad_pcb` file
    pub fn parse(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read PCB file: {}", path.display()))?;

        Self::parse_str(&content)
    }

    /// Parse PCB from string content
    pub fn parse_str(content: &str) -> Result<Self> {
        let sexpr = sexpr::parse(content).context("Failed to parse PCB S-expression")?;

        let list = sexpr.as_list().context("Expected root list")?;
        if list.first().and_then(|s| s.as_sym()) != Some("kicad_pcb") {
            anyhow::bail!("Expected kicad_pcb root element");
        }

        let mut board = KicadBoard::default();

        for item in list.iter().skip(1) {
            if let Some(items) = item.as_list() {
                match items.first().and_then(|s| s.as_sym()) {
                    Some("version") => {
                        board.version = items.get(1).and_then(|v| v.as_int()).unwrap_or(0) as u32;
                    }
                    Some("net") => {
                        if let (Some(id), Some(name)) = (
                            items.get(1).and_then(|s| s.as_int()),
                            items.get(2).map(get_string_value),
                        ) {
                            board.nets.insert(id as u32, name);
                        }
                    }
                    Some("footprint") => board.footprints += 1,
                    Some("segment") => board.tracks.push(parse_track(items)),
                    Some("via") => board.vias.push(parse_via(items)),
                    _ => {}
                }
            }
        }

        Ok(board)
    }

    /// Segment and via counts per net id, including declared nets with no copper
    pub fn routing_by_net(&self) -> Vec<NetRouting> {
        let mut by_net: BTreeMap<u32, NetRouting> = self
            .nets
            .iter()
            .map(|(&id, name)| {
                (
                    id,
                    NetRouting {
                        id,
                        name: name.clone(),
                        ..Default::default()
                    },
                )
            })
            .collect();

        for track in &self.tracks {
            by_net.entry(track.net).or_insert_with(|| unnamed(track.net)).segments += 1;
        }
        for via in &self.vias {
            by_net.entry(via.net).or_insert_with(|| unnamed(via.net)).vias += 1;
        }

        by_net.into_values().collect()
    }
}

fn unnamed(id: u32) -> NetRouting {
    NetRouting {
        id,
        ..Default::default()
    }
}

fn parse_track(list: &[Sexpr]) -> Track {
    let mut track = Track {
        start: (0.0, 0.0),
        end: (0.0, 0.0),
        width: 0.0,
        layer: String::new(),
        net: 0,
        uuid: String::new(),
    };

    for item in list.iter().skip(1) {
        if let Some(items) = item.as_list() {
            match items.first().and_then(|s| s.as_sym()) {
                Some("start") => track.start = parse_xy(items),
                Some("end") => track.end = parse_xy(items),
                Some("width") => {
                    track.width = items.get(1).and_then(|s| s.as_float()).unwrap_or(0.0);
                }
                Some("layer") => {
                    track.layer = items.get(1).map(get_string_value).unwrap_or_default();
                }
                Some("net") => track.net = parse_net_ref(items),
                Some("uuid") => {
                    track.uuid = items.get(1).map(get_string_value).unwrap_or_default();
                }
                _ => {}
            }
        }
    }

    track
}

fn parse_via(list: &[Sexpr]) -> ViaHole {
    let mut via = ViaHole {
        at: (0.0, 0.0),
        size: 0.0,
        drill: 0.0,
        layers: Vec::new(),
        net: 0,
        uuid: String::new(),
    };

    for item in list.iter().skip(1) {
        if let Some(items) = item.as_list() {
            match items.first().and_then(|s| s.as_sym()) {
                Some("at") => via.at = parse_xy(items),
                Some("size") => via.size = items.get(1).and_then(|s| s.as_float()).unwrap_or(0.0),
                Some("drill") => {
                    via.drill = items.get(1).and_then(|s| s.as_float()).unwrap_or(0.0);
                }
                Some("layers") => {
                    via.layers = items.iter().skip(1).map(get_string_value).collect();
                }
                Some("net") => via.net = parse_net_ref(items),
                Some("uuid") => {
                    via.uuid = items.get(1).map(get_string_value).unwrap_or_default();
                }
                _ => {}
            }
        }
    }

    via
}

fn parse_xy(items: &[Sexpr]) -> (f64, f64) {
    (
        items.get(1).and_then(|s| s.as_float()).unwrap_or(0.0),
        items.get(2).and_then(|s| s.as_float()).unwrap_or(0.0),
    )
}

/// Net references are numeric; anything else maps to the unconnected net 0
fn parse_net_ref(items: &[Sexpr]) -> u32 {
    items
        .get(1)
        .and_then(|s| s.as_int())
        .and_then(|i| u32::try_from(i).ok())
        .unwrap_or(0)
}

/// Extract string value from Sexpr (handles both Symbol and String variants)
fn get_string_value(sexpr: &Sexpr) -> String {
    sexpr
        .as_str()
        .or_else(|| sexpr.as_sym())
        .unwrap_or("")
        .to_string()
}
