use crate::bitmap::BitmapError;
use crate::control::NetworkErrorKind;
use crate::data_type::DataType;

/// Errors raised while turning a payload into an outgoing transaction.
///
/// No partial transaction is produced when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    /// The payload needs more packets (or characters) than the header can index.
    #[error("{kind} payload needs {required}, limit is {limit}")]
    LimitExceeded {
        kind: DataType,
        required: usize,
        limit: usize,
    },

    /// Nothing to send.
    #[error("{kind} payload is empty")]
    Empty { kind: DataType },

    /// The bitmap is malformed.
    #[error("invalid bitmap: {0}")]
    Bitmap(#[from] BitmapError),
}

/// Errors detected while decoding an incoming datagram stream.
///
/// Reported through [`crate::DecodeListener::on_error`]; decoding carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A head frame arrived while a transaction of the same type was open.
    #[error("{0} transaction already in progress")]
    TransactionAlreadyInProgress(DataType),

    /// `header[0]` is not a known indicator.
    #[error("unknown indicator byte {0}")]
    UnknownIndicator(u8),

    /// A head frame describes a transaction that cannot be received.
    #[error("invalid {kind} head: {reason}")]
    InvalidHead { kind: DataType, reason: String },

    /// The peer reported an error (CTLERR).
    #[error("peer reported {kind} (code {code})")]
    Network { kind: NetworkErrorKind, code: u8 },
}
