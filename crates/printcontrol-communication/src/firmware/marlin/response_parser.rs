//! Controller Response Parser
//!
//! Parses one line of controller output. Lines are split into tokens on
//! spaces and line terminators. A `:` closes the current token as a key;
//! the key `echo` switches the rest of the line into pass-through, captured
//! verbatim as diagnostic text. Outside pass-through the token `ok` marks an
//! acknowledgment. Other `key:value` pairs (temperature reports and the
//! like) are collected for logging only.

/// Token that acknowledges one line
pub const ACK_TOKEN: &str = "ok";

/// Key that starts raw echo text
pub const ECHO_KEY: &str = "echo";

/// Result of parsing one response line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEvent {
    /// The line acknowledged a sent line
    pub ack: bool,
    /// Text following `echo:`, if any
    pub echo_text: Option<String>,
    /// Other `key:value` pairs, in order of appearance
    pub fields: Vec<(String, String)>,
}

impl ResponseEvent {
    /// Whether the line carried nothing of interest
    pub fn is_empty(&self) -> bool {
        !self.ack && self.echo_text.is_none() && self.fields.is_empty()
    }
}

/// Response line parser
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseParser;

impl ResponseParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self
    }

    /// Parse one line of controller output
    pub fn parse(&self, line: &str) -> ResponseEvent {
        let mut event = ResponseEvent::default();
        let mut token = String::new();
        let mut pending_key: Option<String> = None;
        let mut echo: Option<String> = None;

        for c in line.chars() {
            if let Some(text) = echo.as_mut() {
                if c != '\n' && c != '\r' {
                    text.push(c);
                }
                continue;
            }

            match c {
                ' ' | '\n' | '\r' | '\t' => {
                    finish_token(&mut token, &mut pending_key, &mut event);
                }
                ':' => {
                    let key = std::mem::take(&mut token);
                    if key == ECHO_KEY {
                        pending_key = None;
                        echo = Some(String::new());
                    } else if !key.is_empty() {
                        pending_key = Some(key);
                    }
                }
                _ => token.push(c),
            }
        }
        finish_token(&mut token, &mut pending_key, &mut event);

        event.echo_text = echo;
        event
    }
}

fn finish_token(token: &mut String, pending_key: &mut Option<String>, event: &mut ResponseEvent) {
    if token.is_empty() {
        return;
    }
    let token = std::mem::take(token);
    // `ok` acknowledges wherever it appears, even after a dangling key.
    if token == ACK_TOKEN {
        pending_key.take();
        event.ack = true;
        return;
    }
    if let Some(key) = pending_key.take() {
        event.fields.push((key, token));
    }
}
