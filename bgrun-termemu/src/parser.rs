//! VT100/ANSI escape-sequence state machine

use std::sync::Arc;

use crate::cell::{Color, Hyperlink};
use crate::terminal::TerminalState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParserState {
    Normal,
    Escape,
    Csi,
    Osc,
    // After ESC inside an OSC payload (expecting \)
    OscEscape,
}

impl TerminalState {
    pub(crate) fn feed_byte(&mut self, b: u8) {
        match self.parser {
            ParserState::Normal => self.on_normal(b),
            ParserState::Escape => self.on_escape(b),
            ParserState::Csi => self.on_csi(b),
            ParserState::Osc => self.on_osc(b),
            ParserState::OscEscape => self.on_osc_escape(b),
        }
    }

    fn on_normal(&mut self, b: u8) {
        match b {
            0x1b => {
                self.parser = ParserState::Escape;
                self.param_buf.clear();
            }
            b'\n' => self.line_feed(),
            b'\r' => self.carriage_return(),
            0x08 => self.backspace(),
            b'\t' => self.tab(),
            _ => {
                // Printable 7-bit range plus Latin-1 high bytes
                if (0x20..0x7F).contains(&b) || b >= 0xA0 {
                    self.put_char(b as char);
                }
            }
        }
    }

    fn on_escape(&mut self, b: u8) {
        match b {
            b'[' => {
                self.parser = ParserState::Csi;
                self.param_buf.clear();
            }
            b']' => {
                self.parser = ParserState::Osc;
                self.param_buf.clear();
            }
            b'M' => {
                // Reverse index: cursor up by one, no scroll
                if self.cursor_row > 0 {
                    self.cursor_row -= 1;
                }
                self.parser = ParserState::Normal;
            }
            b'7' | b'8' => {
                // DECSC/DECRC reserved
                self.parser = ParserState::Normal;
            }
            _ => {
                self.parser = ParserState::Normal;
            }
        }
    }

    fn on_csi(&mut self, b: u8) {
        // CSI sequences end with a letter or @, `, ~
        if b.is_ascii_alphabetic() || b == b'@' || b == b'`' || b == b'~' {
            self.execute_csi(b);
            self.parser = ParserState::Normal;
            return;
        }
        self.param_buf.push(b);
    }

    fn parse_params(&self) -> Vec<i32> {
        let raw = String::from_utf8_lossy(&self.param_buf);
        raw.split(';')
            .filter(|part| !part.is_empty())
            .filter_map(|part| part.parse::<i32>().ok())
            .collect()
    }

    fn execute_csi(&mut self, cmd: u8) {
        let params = self.parse_params();

        match cmd {
            b'A' => {
                let n = params.first().copied().unwrap_or(1).max(0) as usize;
                self.cursor_row = self.cursor_row.saturating_sub(n);
            }
            b'B' => {
                let n = params.first().copied().unwrap_or(1).max(0) as usize;
                self.cursor_row = (self.cursor_row + n).min(self.rows - 1);
            }
            b'C' => {
                let n = params.first().copied().unwrap_or(1).max(0) as usize;
                self.cursor_col = (self.cursor_col + n).min(self.cols - 1);
            }
            b'D' => {
                let n = params.first().copied().unwrap_or(1).max(0) as usize;
                self.cursor_col = self.cursor_col.saturating_sub(n);
            }
            b'H' | b'f' => {
                // Parameters are 1-based
                let row = params.first().copied().unwrap_or(1);
                let col = params.get(1).copied().unwrap_or(1);
                self.move_cursor(row - 1, col - 1);
            }
            b'J' => {
                let mode = params.first().copied().unwrap_or(0);
                match mode {
                    // Mode 0 clears the entire display, matching the
                    // behavior GET_SCREEN consumers rely on
                    0 | 2 => self.clear_screen(),
                    1 => {}
                    _ => {}
                }
            }
            b'K' => {
                let mode = params.first().copied().unwrap_or(0);
                let row = self.cursor_row;
                match mode {
                    0 => {
                        for col in self.cursor_col..self.cols {
                            self.screen[row][col] = Default::default();
                        }
                    }
                    1 => {
                        for col in 0..=self.cursor_col.min(self.cols - 1) {
                            self.screen[row][col] = Default::default();
                        }
                    }
                    2 => self.clear_line(),
                    _ => {}
                }
            }
            b'm' => self.apply_sgr(&params),
            b'r' | b'l' | b'h' => {
                // Scrolling regions and mode set/reset: reserved
            }
            _ => {}
        }
    }

    fn apply_sgr(&mut self, params: &[i32]) {
        // An empty parameter list is a full reset
        let params: &[i32] = if params.is_empty() { &[0] } else { params };

        let mut i = 0;
        while i < params.len() {
            match params[i] {
                0 => self.attr = Default::default(),
                1 => self.attr.bold = true,
                2 => self.attr.dim = true,
                3 => self.attr.italic = true,
                4 => self.attr.underline = true,
                5 => self.attr.blink = true,
                7 => self.attr.reverse = true,
                8 => self.attr.hidden = true,
                9 => self.attr.strike = true,
                22 => {
                    self.attr.bold = false;
                    self.attr.dim = false;
                }
                23 => self.attr.italic = false,
                24 => self.attr.underline = false,
                25 => self.attr.blink = false,
                27 => self.attr.reverse = false,
                28 => self.attr.hidden = false,
                29 => self.attr.strike = false,
                30..=37 => self.attr.fg = Color::Indexed((params[i] - 30) as u8),
                39 => self.attr.fg = Color::Default,
                40..=47 => self.attr.bg = Color::Indexed((params[i] - 40) as u8),
                49 => self.attr.bg = Color::Default,
                90..=97 => self.attr.fg = Color::Indexed((params[i] - 90 + 8) as u8),
                100..=107 => self.attr.bg = Color::Indexed((params[i] - 100 + 8) as u8),
                38 | 48 => {
                    // Extended-color introducer: consume the sub-parameters;
                    // only palette indices 0-15 change the pen
                    let is_fg = params[i] == 38;
                    match params.get(i + 1).copied() {
                        Some(5) => {
                            if let Some(&idx) = params.get(i + 2) {
                                if (0..16).contains(&idx) {
                                    let color = Color::Indexed(idx as u8);
                                    if is_fg {
                                        self.attr.fg = color;
                                    } else {
                                        self.attr.bg = color;
                                    }
                                }
                            }
                            i += 2;
                        }
                        Some(2) => {
                            i += 4;
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }

    fn on_osc(&mut self, b: u8) {
        // OSC sequences end with BEL or ESC \ (ST)
        match b {
            0x07 => {
                self.execute_osc();
                self.parser = ParserState::Normal;
            }
            0x1b => {
                self.parser = ParserState::OscEscape;
            }
            _ => self.param_buf.push(b),
        }
    }

    fn on_osc_escape(&mut self, b: u8) {
        if b == b'\\' {
            self.execute_osc();
            self.parser = ParserState::Normal;
            return;
        }
        // Not a string terminator: the ESC belongs to the payload
        self.param_buf.push(0x1b);
        self.param_buf.push(b);
        self.parser = ParserState::Osc;
    }

    fn execute_osc(&mut self) {
        let data = String::from_utf8_lossy(&self.param_buf).into_owned();
        let mut parts = data.splitn(2, ';');
        let cmd = parts.next().unwrap_or("");

        // Only OSC 8 (hyperlinks) is handled
        if cmd != "8" {
            return;
        }
        let Some(rest) = parts.next() else {
            return;
        };

        let mut osc_parts = rest.splitn(2, ';');
        let params = osc_parts.next().unwrap_or("");
        let Some(uri) = osc_parts.next() else {
            self.hyperlink = None;
            return;
        };

        if uri.is_empty() {
            // Empty URI closes the hyperlink
            self.hyperlink = None;
            return;
        }

        // Parameters are colon-separated key=value pairs; only id is defined
        let mut id = "";
        if !params.is_empty() {
            for param in params.split(':') {
                if let Some(value) = param.strip_prefix("id=") {
                    id = value;
                    break;
                }
            }
        }

        self.hyperlink = Some(Arc::new(Hyperlink {
            url: uri.to_string(),
            id: id.to_string(),
        }));
    }
}
