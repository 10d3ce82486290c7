//! Serialization of route records into `.kicad_pcb` lines

use crate::table::{Layer, RouteTable, Segment, Via};
use std::fmt::Write;
use uuid::Uuid;

/// Deterministic identifier source.
///
/// Call `n` (starting at 1) yields the MD5 digest of `pcb-{n:08}` rendered as a
/// hyphenated UUID, so the same record order always produces the same tokens.
#[derive(Debug, Clone, Default)]
pub struct UuidGen {
    counter: u64,
}

impl UuidGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identifiers handed out so far
    pub fn issued(&self) -> u64 {
        self.counter
    }

    pub fn next_uuid(&mut self) -> String {
        self.counter += 1;
        let digest = md5::compute(format!("pcb-{:08}", self.counter));
        Uuid::from_bytes(digest.0).hyphenated().to_string()
    }
}

/// Shortest round-trip decimal, always with a fractional part (`159` -> `159.0`)
pub fn format_number(value: f64) -> String {
    let mut s = value.to_string();
    if value.is_finite() && !s.contains('.') {
        s.push_str(".0");
    }
    s
}

pub fn format_segment(seg: &Segment, ids: &mut UuidGen) -> String {
    format!(
        "\t(segment (start {} {}) (end {} {}) (width {}) (layer \"{}\") (net {}) (uuid \"{}\"))",
        format_number(seg.start.x),
        format_number(seg.start.y),
        format_number(seg.end.x),
        format_number(seg.end.y),
        format_number(seg.width),
        seg.layer,
        seg.net,
        ids.next_uuid(),
    )
}

pub fn format_via(via: &Via, ids: &mut UuidGen) -> String {
    format!(
        "\t(via (at {} {}) (size {}) (drill {}) (layers \"{}\" \"{}\") (net {}) (uuid \"{}\"))",
        format_number(via.at.x),
        format_number(via.at.y),
        format_number(via.size),
        format_number(via.drill),
        Layer::Front,
        Layer::Back,
        via.net,
        ids.next_uuid(),
    )
}

/// Render the whole table as the text spliced in front of the insertion anchor.
///
/// Layout: a blank line, every segment, a blank line, every via, each on its own
/// line. Segments draw identifiers before vias.
pub fn routing_block(table: &RouteTable, ids: &mut UuidGen) -> String {
    let mut out = String::from("\n");

    for seg in &table.segments {
        writeln!(out).unwrap();
        out.push_str(&format_segment(seg, ids));
    }
    writeln!(out).unwrap();
    for via in &table.vias {
        writeln!(out).unwrap();
        out.push_str(&format_via(via, ids));
    }
    writeln!(out).unwrap();

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Point;

    #[test]
    fn test_uuid_sequence() {
        let mut ids = UuidGen::new();
        assert_eq!(ids.next_uuid(), "ee34461c-7c98-3883-fd32-7ba07414d122");
        assert_eq!(ids.next_uuid(), "e2ff6e3f-45b3-4c8c-ce0e-78c448644f50");
        assert_eq!(ids.next_uuid(), "b8d3d9a8-1522-54c7-b401-15024aa3e13b");
        assert_eq!(ids.issued(), 3);

        // A fresh generator replays the same sequence
        assert_eq!(
            UuidGen::new().next_uuid(),
            "ee34461c-7c98-3883-fd32-7ba07414d122"
        );
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(159.0), "159.0");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(145.835), "145.835");
        assert_eq!(format_number(143.1675), "143.1675");
        assert_eq!(format_number(-2.0), "-2.0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn test_format_segment() {
        let seg = Segment {
            start: Point::new(145.07, 92.395),
            end: Point::new(159.0, 92.395),
            net: 8,
            layer: Layer::Front,
            width: 0.3,
        };
        let line = format_segment(&seg, &mut UuidGen::new());

        assert!(line.starts_with('\t'));
        insta::assert_snapshot!(line.trim(), @r#"(segment (start 145.07 92.395) (end 159.0 92.395) (width 0.3) (layer "F.Cu") (net 8) (uuid "ee34461c-7c98-3883-fd32-7ba07414d122"))"#);
    }

    #[test]
    fn test_format_via() {
        let mut table = RouteTable::new();
        table.via(Point::new(140.0, 101.8), 5);
        let line = format_via(&table.vias[0], &mut UuidGen::new());

        assert_eq!(
            line,
            "\t(via (at 140.0 101.8) (size 0.6) (drill 0.3) (layers \"F.Cu\" \"B.Cu\") (net 5) (uuid \"ee34461c-7c98-3883-fd32-7ba07414d122\"))"
        );
    }

    #[test]
    fn test_routing_block_layout() {
        let mut table = RouteTable::new();
        table
            .segment(Point::new(0.0, 0.0), Point::new(1.0, 0.0), 3, Layer::Front)
            .segment(Point::new(1.0, 0.0), Point::new(1.0, 1.0), 3, Layer::Back)
            .via(Point::new(1.0, 0.0), 3);

        let mut ids = UuidGen::new();
        let block = routing_block(&table, &mut ids);
        let lines: Vec<&str> = block.split('\n').collect();

        // "\n" + ["", seg, seg, "", via].join("\n") + "\n"
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "");
        assert!(lines[2].starts_with("\t(segment (start 0.0 0.0) (end 1.0 0.0)"));
        assert!(lines[3].contains("(layer \"B.Cu\")"));
        assert_eq!(lines[4], "");
        assert!(lines[5].starts_with("\t(via (at 1.0 0.0)"));
        assert_eq!(lines[6], "");

        // Segments take identifiers 1 and 2, the via takes 3
        assert!(lines[5].contains("b8d3d9a8-1522-54c7-b401-15024aa3e13b"));
        assert_eq!(ids.issued(), 3);
    }

    #[test]
    fn test_routing_block_empty_table() {
        let block = routing_block(&RouteTable::new(), &mut UuidGen::new());
        assert_eq!(block, "\n\n\n");
    }

    #[test]
    fn test_builtin_routing_block() {
        let table = RouteTable::builtin().unwrap();
        let block = routing_block(&table, &mut UuidGen::new());

        // Indentation and the outer newlines are covered by the layout test
        insta::assert_snapshot!(
            "builtin_routing_block",
            block.replace('\t', "").trim_matches('\n')
        );
    }
}
