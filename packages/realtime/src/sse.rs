//! Server-Sent Events framing.
//!
//! Each event is written as
//!
//! ```text
//! event: new_emergency
//! data: {"event":"new_emergency","data":{...}}
//!
//! ```
//!
//! The `data` line carries the full tagged event so the payload is
//! self-describing; the `event` line lets generic SSE tooling route on the
//! name.

use desa_sos_emergency_models::EmergencyEvent;

use crate::RealtimeError;

/// Largest unterminated frame the decoder buffers.
pub const MAX_PENDING_FRAME_BYTES: usize = 64 * 1024;

/// Comment frame sent while no events are flowing.
pub const KEEP_ALIVE_FRAME: &str = ": keep-alive\n\n";

/// Encodes one event as an SSE frame.
///
/// # Errors
///
/// Returns an error if the event cannot be serialized.
pub fn encode_event(event: &EmergencyEvent) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {json}\n\n", event.name()))
}

/// Frame telling the browser how long to wait before reconnecting.
#[must_use]
pub fn retry_frame(millis: u64) -> String {
    format!("retry: {millis}\n\n")
}

/// One decoded SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// Concatenated `data:` lines.
    pub data: String,
    /// Value of the `id:` field, if any.
    pub id: Option<String>,
}

impl SseFrame {
    /// Decodes the data payload as an emergency event.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a known event.
    pub fn to_event(&self) -> Result<EmergencyEvent, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// Incremental SSE parser.
///
/// Network chunks can split anywhere, including inside a UTF-8 sequence,
/// so bytes are buffered until a blank line closes a frame.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completed. Comment-only
    /// frames (keep-alives) and `retry:` frames produce nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::FrameTooLarge`] once more than
    /// [`MAX_PENDING_FRAME_BYTES`] are buffered without a blank line. The
    /// buffer is cleared and the stream should be dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, RealtimeError> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&raw[..end]);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
        }

        if self.buffer.len() > MAX_PENDING_FRAME_BYTES {
            let pending = self.buffer.len();
            self.buffer = Vec::new();
            return Err(RealtimeError::FrameTooLarge {
                pending,
                limit: MAX_PENDING_FRAME_BYTES,
            });
        }
        Ok(frames)
    }
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => frame.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            "id" => frame.id = Some(value.to_string()),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}
