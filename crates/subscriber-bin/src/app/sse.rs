//! Incremental decoder for `text/event-stream` bodies.
//!
//! Network chunks may end anywhere, including inside a UTF-8 sequence, so
//! bytes are buffered until a blank line completes an event. A completed
//! event that is not valid UTF-8 is an error rather than a lossy payload.

use std::str::Utf8Error;

/// Splits a byte stream into the `data` payloads of its events.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the payloads of every event it completed.
    ///
    /// Events without `data` lines (comments, keep-alives) yield nothing.
    /// Multi-line data is joined with `\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, Utf8Error> {
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut payloads = Vec::new();
        while let Some(end) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(data) = parse_event(&block[..end])? {
                payloads.push(data);
            }
        }
        Ok(payloads)
    }

    /// Bytes of an event that has not been terminated yet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn parse_event(block: &[u8]) -> Result<Option<String>, Utf8Error> {
    let text = std::str::from_utf8(block)?;
    let mut data: Option<String> = None;

    for line in text.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    Ok(data)
}
