use std::fmt;
use std::io;

use killalot_frame::FrameError;
use killalot_link::LinkError;
use killalot_protocol::AssemblyError;
use killalot_transport::TransportError;

// Exit codes follow sysexits/coreutils conventions where one applies.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ShortFrame { .. } | FrameError::BadEscape { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn assembly_error(context: &str, err: AssemblyError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::Assembly(err) => assembly_error(context, err),
        LinkError::Disconnected => CliError::new(FAILURE, format!("{context}: {err}")),
        LinkError::QueueFull { .. } | LinkError::DuplicateName(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use killalot_protocol::DataType;

    #[test]
    fn io_kinds_map_to_exit_codes() {
        let denied = io_error("open", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.code, PERMISSION_DENIED);
        assert!(denied.message.starts_with("open: "));

        let refused = link_error(
            "connect failed",
            LinkError::Transport(TransportError::Io(io::Error::from(
                io::ErrorKind::ConnectionRefused,
            ))),
        );
        assert_eq!(refused.code, FAILURE);
    }

    #[test]
    fn payload_errors_are_data_invalid() {
        let err = link_error(
            "send failed",
            LinkError::Assembly(AssemblyError::Empty {
                kind: DataType::Command,
            }),
        );
        assert_eq!(err.code, DATA_INVALID);
        assert_eq!(frame_error("dump", FrameError::ShortFrame { len: 3 }).code, DATA_INVALID);
    }
}
