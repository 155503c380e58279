/// Errors that can occur while framing or deframing datagrams.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame ended before a full header and payload were received.
    #[error("short frame ({len} bytes, need 12)")]
    ShortFrame { len: usize },

    /// An escape byte was followed by something other than ESC_END/ESC_ESC.
    #[error("invalid escape sequence (0xDB followed by {byte:#04x})")]
    BadEscape { byte: u8 },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
