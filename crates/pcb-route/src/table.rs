//! Route table: the hand-authored segments and vias for each net

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default trace width in mm
pub const DEFAULT_TRACE_WIDTH: f64 = 0.25;
/// Default via pad diameter in mm
pub const DEFAULT_VIA_SIZE: f64 = 0.6;
/// Default via drill diameter in mm
pub const DEFAULT_VIA_DRILL: f64 = 0.3;

/// Route table for the precursor-lora board, compiled into the binary
const BUILTIN_TABLE: &str = include_str!("../routes/precursor-lora.toml");

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read route table {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid route table")]
    Parse(#[from] toml::de::Error),
    #[error("net {net}: unknown layer \"{layer}\" (expected F.Cu or B.Cu)")]
    UnknownLayer { net: String, layer: String },
    #[error("net {net}: {what} must be a positive number, got {value}")]
    InvalidDimension {
        net: String,
        what: &'static str,
        value: f64,
    },
    #[error("net {net}: coordinates must be finite")]
    InvalidCoordinate { net: String },
    #[error("net id {id} is claimed by both \"{first}\" and \"{second}\"")]
    ConflictingNet {
        id: u32,
        first: String,
        second: String,
    },
}

/// A point on the board in mm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

/// Copper layer a segment is drawn on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layer {
    #[default]
    Front,
    Back,
}

impl Layer {
    /// KiCad canonical layer name
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Front => "F.Cu",
            Layer::Back => "B.Cu",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F.Cu" => Ok(Layer::Front),
            "B.Cu" => Ok(Layer::Back),
            other => Err(other.to_string()),
        }
    }
}

/// A straight copper trace on one layer
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
    pub net: u32,
    pub layer: Layer,
    /// Trace width in mm
    pub width: f64,
}

/// A through via joining F.Cu and B.Cu
#[derive(Debug, Clone, PartialEq)]
pub struct Via {
    pub at: Point,
    pub net: u32,
    /// Pad diameter in mm
    pub size: f64,
    /// Drill diameter in mm
    pub drill: f64,
}

/// A named net referenced by the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetLabel {
    pub id: u32,
    pub name: String,
}

/// Ordered segments and vias, emitted in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteTable {
    pub nets: Vec<NetLabel>,
    pub segments: Vec<Segment>,
    pub vias: Vec<Via>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table shipped with the crate
    pub fn builtin() -> Result<Self, TableError> {
        Self::from_toml_str(BUILTIN_TABLE)
    }

    /// Load a table from a TOML route file
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let content = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse a table from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, TableError> {
        let file: RouteFile = toml::from_str(content)?;
        file.into_table()
    }

    /// Append a segment using the default trace width
    pub fn segment(&mut self, start: Point, end: Point, net: u32, layer: Layer) -> &mut Self {
        self.segment_with_width(start, end, net, layer, DEFAULT_TRACE_WIDTH)
    }

    pub fn segment_with_width(
        &mut self,
        start: Point,
        end: Point,
        net: u32,
        layer: Layer,
        width: f64,
    ) -> &mut Self {
        self.segments.push(Segment {
            start,
            end,
            net,
            layer,
            width,
        });
        self
    }

    /// Append a via with the default pad and drill sizes
    pub fn via(&mut self, at: Point, net: u32) -> &mut Self {
        self.vias.push(Via {
            at,
            net,
            size: DEFAULT_VIA_SIZE,
            drill: DEFAULT_VIA_DRILL,
        });
        self
    }

    /// Net ids referenced by any segment or via, in first-use order
    pub fn used_nets(&self) -> Vec<u32> {
        let mut ids = Vec::new();
        let nets = self
            .segments
            .iter()
            .map(|s| s.net)
            .chain(self.vias.iter().map(|v| v.net));
        for net in nets {
            if !ids.contains(&net) {
                ids.push(net);
            }
        }
        ids
    }

    /// Label for a net id, if the table names it
    pub fn net_name(&self, id: u32) -> Option<&str> {
        self.nets
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.name.as_str())
    }
}

// =============================================================================
// TOML schema
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteFile {
    #[serde(default)]
    defaults: Defaults,
    #[serde(default, rename = "net")]
    nets: Vec<NetSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Defaults {
    #[serde(default = "default_width")]
    width: f64,
    #[serde(default = "default_via_size")]
    via_size: f64,
    #[serde(default = "default_via_drill")]
    via_drill: f64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            width: DEFAULT_TRACE_WIDTH,
            via_size: DEFAULT_VIA_SIZE,
            via_drill: DEFAULT_VIA_DRILL,
        }
    }
}

fn default_width() -> f64 {
    DEFAULT_TRACE_WIDTH
}

fn default_via_size() -> f64 {
    DEFAULT_VIA_SIZE
}

fn default_via_drill() -> f64 {
    DEFAULT_VIA_DRILL
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NetSpec {
    name: String,
    id: u32,
    width: Option<f64>,
    #[serde(default)]
    segments: Vec<SegmentSpec>,
    #[serde(default)]
    vias: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SegmentSpec {
    start: [f64; 2],
    end: [f64; 2],
    layer: Option<String>,
    width: Option<f64>,
}

impl RouteFile {
    fn into_table(self) -> Result<RouteTable, TableError> {
        let defaults = self.defaults;
        check_dimension("defaults", "width", defaults.width)?;
        check_dimension("defaults", "via size", defaults.via_size)?;
        check_dimension("defaults", "via drill", defaults.via_drill)?;

        let mut table = RouteTable::new();
        let mut names: HashMap<u32, String> = HashMap::new();

        for net in self.nets {
            match names.get(&net.id) {
                Some(first) if *first != net.name => {
                    return Err(TableError::ConflictingNet {
                        id: net.id,
                        first: first.clone(),
                        second: net.name,
                    });
                }
                Some(_) => {}
                None => {
                    names.insert(net.id, net.name.clone());
                    table.nets.push(NetLabel {
                        id: net.id,
                        name: net.name.clone(),
                    });
                }
            }

            let net_width = net.width.unwrap_or(defaults.width);
            check_dimension(&net.name, "width", net_width)?;

            for spec in net.segments {
                let layer = match spec.layer.as_deref() {
                    Some(name) => name.parse().map_err(|layer| TableError::UnknownLayer {
                        net: net.name.clone(),
                        layer,
                    })?,
                    None => Layer::Front,
                };
                let width = spec.width.unwrap_or(net_width);
                check_dimension(&net.name, "width", width)?;

                let (start, end) = (Point::from(spec.start), Point::from(spec.end));
                if !start.is_finite() || !end.is_finite() {
                    return Err(TableError::InvalidCoordinate { net: net.name });
                }

                table.segment_with_width(start, end, net.id, layer, width);
            }

            for at in net.vias {
                let at = Point::from(at);
                if !at.is_finite() {
                    return Err(TableError::InvalidCoordinate { net: net.name });
                }
                table.vias.push(Via {
                    at,
                    net: net.id,
                    size: defaults.via_size,
                    drill: defaults.via_drill,
                });
            }
        }

        Ok(table)
    }
}

fn check_dimension(net: &str, what: &'static str, value: f64) -> Result<(), TableError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TableError::InvalidDimension {
            net: net.to_string(),
            what,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table() {
        let table = RouteTable::builtin().unwrap();

        assert_eq!(table.segments.len(), 45);
        assert_eq!(table.vias.len(), 10);
        assert_eq!(table.used_nets(), vec![8, 5, 7, 2, 3, 4, 9]);
        assert_eq!(table.net_name(8), Some("RF"));
        assert_eq!(table.net_name(1), Some("GND"));

        // RF runs wider than the default
        let rf = &table.segments[0];
        assert_eq!(rf.net, 8);
        assert_eq!(rf.width, 0.3);
        assert_eq!(rf.start, Point::new(145.07, 92.395));
        assert_eq!(rf.end, Point::new(159.0, 92.395));

        let uart_back = &table.segments[6];
        assert_eq!(uart_back.net, 5);
        assert_eq!(uart_back.layer, Layer::Back);
        assert_eq!(uart_back.width, DEFAULT_TRACE_WIDTH);

        let first_via = &table.vias[0];
        assert_eq!(first_via.at, Point::new(140.0, 101.8));
        assert_eq!(first_via.size, DEFAULT_VIA_SIZE);
        assert_eq!(first_via.drill, DEFAULT_VIA_DRILL);

        let last_via = table.vias.last().unwrap();
        assert_eq!(last_via.at, Point::new(161.5, 104.52));
        assert_eq!(last_via.net, 9);
    }

    #[test]
    fn test_builtin_front_copper_clear_of_j2_keepout() {
        // J2 keepout rectangle
        let (x0, x1, y0, y1) = (160.565, 162.655, 99.55, 101.45);
        let inside = |p: &Point| p.x > x0 && p.x < x1 && p.y > y0 && p.y < y1;
        // Exact for horizontal and vertical runs
        let crosses = |s: &Segment| {
            s.start.x.min(s.end.x) < x1
                && s.start.x.max(s.end.x) > x0
                && s.start.y.min(s.end.y) < y1
                && s.start.y.max(s.end.y) > y0
        };

        let table = RouteTable::builtin().unwrap();
        for seg in &table.segments {
            assert!(
                seg.start.x == seg.end.x || seg.start.y == seg.end.y,
                "diagonal run {seg:?}"
            );
        }

        let front: Vec<&Segment> = table
            .segments
            .iter()
            .filter(|s| s.layer == Layer::Front)
            .collect();
        for seg in &front {
            assert!(!crosses(seg), "{seg:?}");
        }
        for via in &table.vias {
            assert!(!inside(&via.at), "{via:?}");
        }

        // The 3V3 run passes under J2 on the back layer only
        let back: Vec<&Segment> = table
            .segments
            .iter()
            .filter(|s| s.layer == Layer::Back && crosses(s))
            .collect();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].net, 2);
    }

    #[test]
    fn test_defaults_and_overrides() {
        let table = RouteTable::from_toml_str(
            r#"
            [defaults]
            via_size = 0.8

            [[net]]
            name = "SIG"
            id = 4
            width = 0.2
            segments = [
              { start = [0.0, 0.0], end = [1.0, 0.0] },
              { start = [1.0, 0.0], end = [1.0, 2.5], layer = "B.Cu", width = 0.5 },
            ]
            vias = [[1.0, 0.0]]
            "#,
        )
        .unwrap();

        assert_eq!(table.segments[0].width, 0.2);
        assert_eq!(table.segments[0].layer, Layer::Front);
        assert_eq!(table.segments[1].width, 0.5);
        assert_eq!(table.segments[1].layer, Layer::Back);
        assert_eq!(table.vias[0].size, 0.8);
        assert_eq!(table.vias[0].drill, DEFAULT_VIA_DRILL);
    }

    #[test]
    fn test_empty_table() {
        let table = RouteTable::from_toml_str("").unwrap();
        assert!(table.segments.is_empty());
        assert!(table.vias.is_empty());
    }

    #[test]
    fn test_unknown_layer() {
        let err = RouteTable::from_toml_str(
            r#"
            [[net]]
            name = "SIG"
            id = 4
            segments = [{ start = [0.0, 0.0], end = [1.0, 0.0], layer = "In1.Cu" }]
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, TableError::UnknownLayer { ref layer, .. } if layer == "In1.Cu"));
    }

    #[test]
    fn test_invalid_width() {
        let err = RouteTable::from_toml_str(
            r#"
            [[net]]
            name = "SIG"
            id = 4
            width = 0.0
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, TableError::InvalidDimension { what: "width", .. }));
    }

    #[test]
    fn test_conflicting_net_ids() {
        let err = RouteTable::from_toml_str(
            r#"
            [[net]]
            name = "GND"
            id = 1

            [[net]]
            name = "VIN"
            id = 1
            "#,
        )
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "net id 1 is claimed by both \"GND\" and \"VIN\""
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = RouteTable::from_toml_str(
            r#"
            [[net]]
            name = "SIG"
            id = 4
            drill = 0.3
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, TableError::Parse(_)));
    }

    #[test]
    fn test_builder() {
        let mut table = RouteTable::new();
        table
            .segment(Point::new(0.0, 0.0), Point::new(1.0, 0.0), 3, Layer::Front)
            .via(Point::new(1.0, 0.0), 3)
            .segment(Point::new(1.0, 0.0), Point::new(1.0, 1.0), 3, Layer::Back);

        assert_eq!(table.segments.len(), 2);
        assert_eq!(table.vias.len(), 1);
        assert_eq!(table.used_nets(), vec![3]);
    }
}
