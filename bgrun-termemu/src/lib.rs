//! bgrun-termemu: VT100/ANSI terminal emulator
//!
//! A screen buffer with scrollback driven by a small escape-sequence state
//! machine. Implements the subset of VT100 needed to mirror a child
//! process's terminal: cursor motion, erase in line/display, SGR
//! attributes (including extended-color introducer skipping) and OSC 8
//! hyperlinks. The rendered screen can be exported as plain text,
//! Markdown or HTML.

mod cell;
mod export;
mod parser;
mod terminal;

pub use cell::{Attributes, Cell, Color, Hyperlink, PALETTE};
pub use export::{ExportFormat, ExportOptions};
pub use terminal::{Snapshot, Terminal};
