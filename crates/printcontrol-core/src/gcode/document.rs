//! G-Code document model
//!
//! Holds the raw lines of a program in file order and the summary metrics
//! derived from its linear moves. Lines are kept verbatim, including blank
//! and comment-only ones, so that line indices stay stable for replay.

use crate::error::{GcodeError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Mnemonic of the linear move, the only command feeding the metrics
pub const MOTION_MNEMONIC: &str = "G1";

/// Start of a line comment
pub const COMMENT_MARKER: char = ';';

/// A loaded G-Code program
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcodeDocument {
    lines: Vec<String>,
    height_max: f64,
    filament_total: f64,
    layer_count: usize,
}

impl GcodeDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a document from a file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut document = Self::new();
        document.load_file(path)?;
        Ok(document)
    }

    /// Build a document from raw text
    pub fn from_text(text: &str) -> Self {
        let mut document = Self::new();
        document.load_text(text);
        document
    }

    /// Replace the contents with the lines of a file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| GcodeError::FileError {
            reason: format!("{}: {}", path.display(), e),
        })?;
        self.load_reader(BufReader::new(file))?;
        tracing::info!(
            "Loaded {} ({} lines, height {:.2}, filament {:.2}, {} layers)",
            path.display(),
            self.lines.len(),
            self.height_max,
            self.filament_total,
            self.layer_count
        );
        Ok(())
    }

    /// Replace the contents with the lines of a stream
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected.
    /// On a read error the document is left empty.
    pub fn load_reader<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        self.reset();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
                    let line = line.strip_suffix(b"\r").unwrap_or(line);
                    self.push_line(String::from_utf8_lossy(line).into_owned());
                }
                Err(e) => {
                    self.reset();
                    return Err(GcodeError::FileError {
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Replace the contents with the lines of a string
    pub fn load_text(&mut self, text: &str) {
        self.reset();
        for line in text.lines() {
            self.push_line(line.to_string());
        }
    }

    /// Clear all lines and metrics
    pub fn reset(&mut self) {
        self.lines.clear();
        self.height_max = 0.0;
        self.filament_total = 0.0;
        self.layer_count = 0;
    }

    /// Number of raw lines
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Raw line at `index`
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// All raw lines in file order
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether the document has no lines
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Highest Z reached by a linear move (0 if none)
    pub fn height_max(&self) -> f64 {
        self.height_max
    }

    /// Sum of the E values of all linear moves
    ///
    /// E is summed as written, not as a delta from the previous position,
    /// so files that reset the extruder report more filament than they use.
    pub fn filament_total(&self) -> f64 {
        self.filament_total
    }

    /// Number of layers
    ///
    /// Counts the linear moves whose Z rises above every Z seen before.
    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    fn push_line(&mut self, line: String) {
        self.measure(&line);
        self.lines.push(line);
    }

    fn measure(&mut self, line: &str) {
        let mut tokens = tokenize(line);
        if tokens.next() != Some(MOTION_MNEMONIC) {
            return;
        }

        for (name, value) in tokens.filter_map(parse_word) {
            match name {
                'Z' => {
                    if value > self.height_max {
                        self.height_max = value;
                        self.layer_count += 1;
                    }
                }
                'E' => self.filament_total += value,
                _ => {}
            }
        }
    }
}

/// Split a line into whitespace-separated tokens, dropping any comment
pub fn tokenize(line: &str) -> impl Iterator<Item = &str> {
    strip_comment(line).split_whitespace()
}

/// The part of a line before the comment marker
pub fn strip_comment(line: &str) -> &str {
    match line.find(COMMENT_MARKER) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Parse a `<letter><number>` word such as `X10.5`
///
/// Returns `None` unless the first character is an uppercase letter and the
/// remainder is a valid floating point number.
pub fn parse_word(token: &str) -> Option<(char, f64)> {
    let mut chars = token.chars();
    let name = chars.next().filter(|c| c.is_ascii_uppercase())?;
    let value = chars.as_str().parse::<f64>().ok()?;
    Some((name, value))
}
