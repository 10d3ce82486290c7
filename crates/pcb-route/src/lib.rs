//! Hand-routed trace injection for KiCad layouts
//!
//! Holds a table of copper segments and vias per net, serializes it into the
//! `.kicad_pcb` s-expression dialect, and splices it into a board file in place
//! of any previously generated routing.

pub mod board;
pub mod format;
pub mod patch;
pub mod sexpr;
pub mod table;

pub use board::KicadBoard;
pub use format::{routing_block, UuidGen};
pub use patch::{apply_to_file, strip_file, PatchError, PatchOutcome};
pub use table::{Layer, Point, RouteTable, Segment, TableError, Via};
