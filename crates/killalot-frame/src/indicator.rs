//! Indicator bytes (header[0]) identifying what a datagram carries.
//!
//! Values below 10 are link control; 10 and above carry application data.

/// Keep-alive, no payload.
pub const HEARTBEAT: u8 = 1;

/// Peer-reported error (e.g. buffer full).
pub const CTLERR: u8 = 2;

/// Peer request (stop, resend).
pub const CTLREQ: u8 = 3;

/// Up to eight channel values starting at the index in the header.
pub const CHANNEL: u8 = 10;

/// One chunk of a terminal command string.
pub const COMMAND: u8 = 11;

/// Image geometry and pixel encoding.
pub const IMAGEHEAD: u8 = 12;

/// Eight bytes of raw pixel data.
pub const IMAGE: u8 = 13;

/// Total length of a binary transfer.
pub const BINARYHEAD: u8 = 20;

/// Eight bytes of binary data.
pub const BINARY: u8 = 21;

/// Returns a human-readable name for an indicator byte.
pub fn indicator_name(indicator: u8) -> &'static str {
    match indicator {
        HEARTBEAT => "HEARTBEAT",
        CTLERR => "CTLERR",
        CTLREQ => "CTLREQ",
        CHANNEL => "CHANNEL",
        COMMAND => "COMMAND",
        IMAGEHEAD => "IMAGEHEAD",
        IMAGE => "IMAGE",
        BINARYHEAD => "BINARYHEAD",
        BINARY => "BINARY",
        _ => "UNKNOWN",
    }
}

/// Returns true for link-control indicators.
pub fn is_control(indicator: u8) -> bool {
    matches!(indicator, HEARTBEAT | CTLERR | CTLREQ)
}

/// Returns true for indicators carrying application data.
pub fn is_data(indicator: u8) -> bool {
    matches!(
        indicator,
        CHANNEL | COMMAND | IMAGEHEAD | IMAGE | BINARYHEAD | BINARY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_classes() {
        assert_eq!(indicator_name(IMAGEHEAD), "IMAGEHEAD");
        assert_eq!(indicator_name(99), "UNKNOWN");
        assert!(is_control(CTLREQ));
        assert!(!is_control(CHANNEL));
        assert!(is_data(BINARY));
        assert!(!is_data(HEARTBEAT));
        assert!(!is_data(0));
    }
}
