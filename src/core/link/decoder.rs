use serde_json::{Map, Value};

/// Decoded inbound JSON object
pub type Payload = Map<String, Value>;

/// Why an inbound line produced no payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    InvalidUtf8,
    Empty,
    InvalidJson(String),
    NotAnObject,
}

impl std::fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeFailure::InvalidUtf8 => write!(f, "line is not valid UTF-8"),
            DecodeFailure::Empty => write!(f, "line is empty"),
            DecodeFailure::InvalidJson(e) => write!(f, "malformed JSON: {}", e),
            DecodeFailure::NotAnObject => write!(f, "JSON value is not an object"),
        }
    }
}

/// Longest line accepted before it is dropped as noise.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Splits a byte stream into lines on `\n`. Bytes after the last newline stay
/// buffered until the rest of the line arrives. A line longer than the limit
/// is dropped whole, up to and including its newline, and counted as
/// overflowed.
#[derive(Debug)]
pub struct LineBuffer {
    buffer: Vec<u8>,
    max_line: usize,
    discarding: bool,
    overflowed: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_LENGTH)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_line.min(1024)),
            max_line,
            discarding: false,
            overflowed: 0,
        }
    }

    /// Append bytes and return every line they complete, without the newline.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let segment = &rest[..pos];
            if self.discarding {
                self.discarding = false;
            } else if self.buffer.len() + segment.len() > self.max_line {
                self.overflowed += 1;
                self.buffer.clear();
            } else {
                self.buffer.extend_from_slice(segment);
                lines.push(std::mem::take(&mut self.buffer));
            }
            rest = &rest[pos + 1..];
        }

        if !self.discarding {
            if self.buffer.len() + rest.len() > self.max_line {
                self.overflowed += 1;
                self.buffer.clear();
                self.discarding = true;
            } else {
                self.buffer.extend_from_slice(rest);
            }
        }
        lines
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_line(&self) -> usize {
        self.max_line
    }

    /// Lines dropped for length since the last call.
    pub fn take_overflowed(&mut self) -> usize {
        std::mem::take(&mut self.overflowed)
    }
}

/// Decode one raw line into a payload. Whitespace (including a trailing `\r`)
/// is trimmed first.
pub fn decode_line(raw: &[u8]) -> Result<Payload, DecodeFailure> {
    let text = std::str::from_utf8(raw).map_err(|_| DecodeFailure::InvalidUtf8)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(DecodeFailure::Empty);
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DecodeFailure::NotAnObject),
        Err(e) => Err(DecodeFailure::InvalidJson(e.to_string())),
    }
}
