//! Screen buffer, scrollback and cursor state

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cell::{Attributes, Cell, Hyperlink};
use crate::export::{self, ExportOptions};
use crate::parser::ParserState;

/// Internal terminal state, guarded by the [`Terminal`] lock
pub(crate) struct TerminalState {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) screen: Vec<Vec<Cell>>,
    pub(crate) scrollback: VecDeque<Vec<Cell>>,
    pub(crate) max_scrollback: usize,
    pub(crate) cursor_row: usize,
    pub(crate) cursor_col: usize,
    pub(crate) attr: Attributes,
    pub(crate) hyperlink: Option<Arc<Hyperlink>>,
    pub(crate) parser: ParserState,
    pub(crate) param_buf: Vec<u8>,
}

impl TerminalState {
    fn new(rows: usize, cols: usize, max_scrollback: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            screen: (0..rows).map(|_| vec![Cell::default(); cols]).collect(),
            scrollback: VecDeque::new(),
            max_scrollback,
            cursor_row: 0,
            cursor_col: 0,
            attr: Attributes::default(),
            hyperlink: None,
            parser: ParserState::Normal,
            param_buf: Vec::with_capacity(32),
        }
    }

    fn blank_row(&self) -> Vec<Cell> {
        vec![Cell::default(); self.cols]
    }

    pub(crate) fn put_char(&mut self, ch: char) {
        if self.cursor_col >= self.cols {
            self.line_feed();
            self.cursor_col = 0;
        }
        if self.cursor_row >= self.rows {
            self.cursor_row = self.rows - 1;
        }
        self.screen[self.cursor_row][self.cursor_col] = Cell {
            ch,
            attr: self.attr,
            link: self.hyperlink.clone(),
        };
        self.cursor_col += 1;
    }

    pub(crate) fn line_feed(&mut self) {
        self.cursor_row += 1;
        if self.cursor_row >= self.rows {
            // Scroll up: top row moves into the scrollback
            let top = std::mem::replace(&mut self.screen[0], Vec::new());
            self.scrollback.push_back(top);
            if self.scrollback.len() > self.max_scrollback {
                self.scrollback.pop_front();
            }

            self.screen.remove(0);
            self.screen.push(self.blank_row());
            self.cursor_row = self.rows - 1;
        }
    }

    pub(crate) fn carriage_return(&mut self) {
        self.cursor_col = 0;
    }

    pub(crate) fn backspace(&mut self) {
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
        }
    }

    pub(crate) fn tab(&mut self) {
        let next_tab = (self.cursor_col / 8 + 1) * 8;
        if next_tab < self.cols {
            self.cursor_col = next_tab;
        }
    }

    pub(crate) fn move_cursor(&mut self, row: i32, col: i32) {
        self.cursor_row = (row.max(0) as usize).min(self.rows - 1);
        self.cursor_col = (col.max(0) as usize).min(self.cols - 1);
    }

    pub(crate) fn clear_screen(&mut self) {
        for row in &mut self.screen {
            row.fill(Cell::default());
        }
        self.cursor_row = 0;
        self.cursor_col = 0;
    }

    pub(crate) fn clear_line(&mut self) {
        self.screen[self.cursor_row].fill(Cell::default());
        self.cursor_col = 0;
    }

    fn resize(&mut self, rows: usize, cols: usize) {
        let rows = rows.max(1);
        let cols = cols.max(1);

        let mut new_screen: Vec<Vec<Cell>> = (0..rows).map(|_| vec![Cell::default(); cols]).collect();
        let copy_rows = rows.min(self.rows);
        let copy_cols = cols.min(self.cols);
        for r in 0..copy_rows {
            new_screen[r][..copy_cols].clone_from_slice(&self.screen[r][..copy_cols]);
        }

        self.rows = rows;
        self.cols = cols;
        self.screen = new_screen;

        if self.cursor_row >= rows {
            self.cursor_row = rows - 1;
        }
        if self.cursor_col >= cols {
            self.cursor_col = cols - 1;
        }
    }

    fn line_text(row: &[Cell]) -> String {
        row.iter().map(Cell::display_char).collect()
    }
}

/// Rendered viewport state for GET_SCREEN
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub rows: usize,
    pub cols: usize,
    pub cursor_row: usize,
    pub cursor_col: usize,
    pub lines: Vec<String>,
}

/// A VT100 terminal emulator
///
/// Writes (the parser consuming PTY output) take the lock exclusively;
/// reads (snapshots, export) take it shared.
pub struct Terminal {
    state: RwLock<TerminalState>,
}

impl Terminal {
    /// Default scrollback depth in lines
    pub const DEFAULT_SCROLLBACK: usize = 1000;

    pub fn new(rows: usize, cols: usize) -> Self {
        Self::with_scrollback(rows, cols, Self::DEFAULT_SCROLLBACK)
    }

    pub fn with_scrollback(rows: usize, cols: usize, max_scrollback: usize) -> Self {
        Self {
            state: RwLock::new(TerminalState::new(rows, cols, max_scrollback)),
        }
    }

    /// Process output bytes and update the terminal state
    pub fn feed(&self, data: &[u8]) {
        let mut state = self.state.write();
        for &b in data {
            state.feed_byte(b);
        }
    }

    /// Change the viewport size, preserving the top-left overlap and the
    /// scrollback
    pub fn resize(&self, rows: usize, cols: usize) {
        self.state.write().resize(rows, cols);
    }

    /// Current cursor position (row, col), zero-based
    pub fn cursor(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.cursor_row, state.cursor_col)
    }

    /// Number of lines currently held in the scrollback
    pub fn scrollback_len(&self) -> usize {
        self.state.read().scrollback.len()
    }

    /// Copy of the cell at (row, col), if inside the viewport
    pub fn cell(&self, row: usize, col: usize) -> Option<Cell> {
        let state = self.state.read();
        state.screen.get(row).and_then(|r| r.get(col)).cloned()
    }

    /// Viewport snapshot: dimensions, cursor and rendered lines
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            rows: state.rows,
            cols: state.cols,
            cursor_row: state.cursor_row,
            cursor_col: state.cursor_col,
            lines: state.screen.iter().map(|r| TerminalState::line_text(r)).collect(),
        }
    }

    /// The whole screen as newline-separated text
    pub fn screen_text(&self) -> String {
        self.snapshot().lines.join("\n")
    }

    /// Export terminal content in the requested format
    pub fn export(&self, opts: &ExportOptions) -> String {
        export::render(&self.state.read(), opts)
    }
}
