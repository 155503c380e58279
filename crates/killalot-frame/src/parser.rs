use tracing::trace;

use crate::codec::{decode_datagram, Datagram, DATAGRAM_LEN, END, ESC, ESC_END, ESC_ESC};
use crate::error::{FrameError, Result};

/// Where the parser is within the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for an opening delimiter.
    Idle,
    /// Collecting frame content.
    InFrame,
    /// The previous byte was an escape.
    Escaping,
}

/// Incremental frame recognizer, fed one byte at a time.
///
/// Transitions:
/// - `Idle` + END starts a frame; anything else is skipped.
/// - `InFrame` + END closes the frame. Fewer than 12 content bytes yields
///   [`FrameError::ShortFrame`], except for an empty frame, which is treated
///   as a repeated delimiter and keeps the parser in `InFrame`.
/// - `InFrame` + ESC moves to `Escaping`.
/// - `Escaping` + ESC_END / ESC_ESC appends END / ESC. Any other byte is a
///   [`FrameError::BadEscape`] and drops the frame.
///
/// Content beyond the 12th byte is counted but not kept.
#[derive(Debug, Clone)]
pub struct FrameParser {
    state: ParserState,
    buf: [u8; DATAGRAM_LEN],
    len: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            buf: [0u8; DATAGRAM_LEN],
            len: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Content bytes seen in the current frame.
    pub fn buffered(&self) -> usize {
        self.len
    }

    /// Drop any partial frame and wait for the next delimiter.
    pub fn reset(&mut self) {
        self.state = ParserState::Idle;
        self.len = 0;
    }

    /// Consume one byte.
    ///
    /// Returns `Ok(Some(_))` when the byte completes a datagram, `Ok(None)`
    /// when more input is needed, and an error when a malformed frame was
    /// discarded. The parser is always ready for the next byte afterwards.
    pub fn push(&mut self, byte: u8) -> Result<Option<Datagram>> {
        match self.state {
            ParserState::Idle => {
                if byte == END {
                    self.state = ParserState::InFrame;
                    self.len = 0;
                }
                Ok(None)
            }
            ParserState::InFrame => match byte {
                END if self.len == 0 => Ok(None),
                END => {
                    let len = self.len;
                    self.reset();
                    if len < DATAGRAM_LEN {
                        return Err(FrameError::ShortFrame { len });
                    }
                    let datagram = decode_datagram(&self.buf)?;
                    trace!(indicator = datagram.indicator(), "frame complete");
                    Ok(Some(datagram))
                }
                ESC => {
                    self.state = ParserState::Escaping;
                    Ok(None)
                }
                other => {
                    self.append(other);
                    Ok(None)
                }
            },
            ParserState::Escaping => match byte {
                ESC_END => {
                    self.append(END);
                    self.state = ParserState::InFrame;
                    Ok(None)
                }
                ESC_ESC => {
                    self.append(ESC);
                    self.state = ParserState::InFrame;
                    Ok(None)
                }
                other => {
                    self.reset();
                    Err(FrameError::BadEscape { byte: other })
                }
            },
        }
    }

    fn append(&mut self, byte: u8) {
        if self.len < DATAGRAM_LEN {
            self.buf[self.len] = byte;
        }
        self.len = self.len.saturating_add(1);
    }
}
