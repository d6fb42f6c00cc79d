//! Line framing for the numbered, checksummed streaming protocol
//!
//! Every program line sent during a job is wrapped as
//! `N<seq> <content>*<checksum>\n`, where the checksum is the XOR of every
//! byte before the `*`. The controller rejects frames whose checksum or
//! sequence number does not match, so corrupted lines are never executed.

use printcontrol_core::gcode::strip_comment;

/// Separator between payload and checksum
pub const CHECKSUM_MARKER: u8 = b'*';

/// 8-bit XOR of every byte in `payload`
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, byte| sum ^ byte)
}

/// The command content of a raw line, without comment or surrounding whitespace
///
/// Returns `None` for blank and comment-only lines.
pub fn command_content(raw_line: &str) -> Option<&str> {
    let content = strip_comment(raw_line).trim();
    if content.is_empty() {
        None
    } else {
        Some(content)
    }
}

/// Build the wire frame for `raw_line` with sequence number `seq`
///
/// Returns `None` when the line holds nothing to send; the caller must then
/// neither transmit nor use up the sequence number.
pub fn encode(seq: u32, raw_line: &str) -> Option<Vec<u8>> {
    let content = command_content(raw_line)?;
    let payload = format!("N{} {}", seq, content);
    let sum = checksum(payload.as_bytes());
    Some(format!("{}*{}\n", payload, sum).into_bytes())
}

/// A frame taken apart by [`decode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Sequence number
    pub seq: u32,
    /// Command content
    pub content: String,
    /// Checksum carried by the frame
    pub checksum: u8,
    /// Whether the carried checksum matches the payload
    pub valid: bool,
}

/// Parse a frame produced by [`encode`]
///
/// Returns `None` if the bytes are not shaped like a frame.
pub fn decode(frame: &[u8]) -> Option<DecodedFrame> {
    let text = std::str::from_utf8(frame).ok()?;
    let text = text.strip_suffix('\n').unwrap_or(text);
    let (payload, sum) = text.rsplit_once(CHECKSUM_MARKER as char)?;
    let carried = sum.parse::<u8>().ok()?;

    let (number, content) = payload.strip_prefix('N')?.split_once(' ')?;
    let seq = number.parse::<u32>().ok()?;

    Some(DecodedFrame {
        seq,
        content: content.to_string(),
        checksum: carried,
        valid: checksum(payload.as_bytes()) == carried,
    })
}

/// Check that a frame is well formed and its checksum matches
pub fn verify(frame: &[u8]) -> bool {
    decode(frame).is_some_and(|decoded| decoded.valid)
}
