// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Byte-level command builder for thermal receipt printers.
//
// Supports the two command sets found on nearly every 80mm receipt printer:
// Epson ESC/POS and Star line mode.  Text is sent as-is; characters outside
// ASCII are replaced with '?' since code page selection varies per model.

use quittung_core::types::PrinterType;

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    fn code(self) -> u8 {
        match self {
            Self::Left => 0,
            Self::Center => 1,
            Self::Right => 2,
        }
    }
}

/// Accumulates printer commands for one receipt.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    printer_type: PrinterType,
    width: usize,
    buf: Vec<u8>,
}

impl CommandBuilder {
    /// Start a new document; the printer is reset first.
    pub fn new(printer_type: PrinterType, width: usize) -> Self {
        let mut builder = Self {
            printer_type,
            width,
            buf: Vec::with_capacity(1024),
        };
        builder.buf.extend_from_slice(&[ESC, b'@']);
        builder
    }

    /// Characters per line.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn align(&mut self, align: Align) -> &mut Self {
        match self.printer_type {
            PrinterType::Epson => self.buf.extend_from_slice(&[ESC, b'a', align.code()]),
            PrinterType::Star => self.buf.extend_from_slice(&[ESC, GS, b'a', align.code()]),
        }
        self
    }

    pub fn bold(&mut self, on: bool) -> &mut Self {
        match self.printer_type {
            PrinterType::Epson => self.buf.extend_from_slice(&[ESC, b'E', u8::from(on)]),
            PrinterType::Star => self.buf.extend_from_slice(&[ESC, if on { b'E' } else { b'F' }]),
        }
        self
    }

    /// Print `text` followed by a line feed.
    pub fn println(&mut self, text: &str) -> &mut Self {
        self.buf.extend(text.chars().map(|c| {
            if c.is_ascii() && !c.is_ascii_control() {
                c as u8
            } else {
                b'?'
            }
        }));
        self.buf.push(LF);
        self
    }

    pub fn new_line(&mut self) -> &mut Self {
        self.buf.push(LF);
        self
    }

    /// A full-width rule of dashes.
    pub fn draw_line(&mut self) -> &mut Self {
        let rule = "-".repeat(self.width);
        self.println(&rule)
    }

    /// Feed past the tear bar and cut.
    pub fn cut(&mut self) -> &mut Self {
        match self.printer_type {
            // GS V 66 n: feed n lines then partial cut.
            PrinterType::Epson => self.buf.extend_from_slice(&[GS, b'V', 66, 3]),
            // ESC d 3: feed to cutter and partial cut.
            PrinterType::Star => self.buf.extend_from_slice(&[ESC, b'd', 3]),
        }
        self
    }

    /// Finish and return the command bytes.
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_initialise() {
        let bytes = CommandBuilder::new(PrinterType::Epson, 32).build();
        assert_eq!(bytes, vec![ESC, b'@']);
    }

    #[test]
    fn epson_and_star_differ_on_bold_off_and_cut() {
        let mut epson = CommandBuilder::new(PrinterType::Epson, 32);
        epson.bold(false).cut();
        let mut star = CommandBuilder::new(PrinterType::Star, 32);
        star.bold(false).cut();

        assert_eq!(&epson.build()[2..], &[ESC, b'E', 0, GS, b'V', 66, 3]);
        assert_eq!(&star.build()[2..], &[ESC, b'F', ESC, b'd', 3]);
    }

    #[test]
    fn rule_spans_the_paper_width() {
        let mut b = CommandBuilder::new(PrinterType::Epson, 20);
        b.draw_line();
        let bytes = b.build();
        assert_eq!(&bytes[2..], format!("{}\n", "-".repeat(20)).as_bytes());
    }

    #[test]
    fn non_ascii_is_replaced() {
        let mut b = CommandBuilder::new(PrinterType::Epson, 32);
        b.println("Café");
        assert_eq!(&b.build()[2..], b"Caf?\n");
    }
}
