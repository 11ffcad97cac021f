use parley_codec::DecodeError;
use parley_wire::ErrorCode;

/// Where an engine-reported error was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    /// The writer task failed delivering a message.
    Send,
    /// The reader task failed receiving a message.
    Receive,
    /// The connection was stopped.
    Stop,
}

impl std::fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorPhase::Send => write!(f, "send"),
            ErrorPhase::Receive => write!(f, "receive"),
            ErrorPhase::Stop => write!(f, "stop"),
        }
    }
}

/// Error resolving an outgoing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The connection is stopped or cancelled, or was stopped while the call
    /// was outstanding.
    Cancelled,
    /// The remote dispatcher answered with an error code. An unknown method
    /// surfaces here as [`ErrorCode::NOT_IMPL`].
    Remote(ErrorCode),
    /// The response payload did not decode as the declared result type.
    Decode(DecodeError),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Cancelled => write!(f, "call cancelled"),
            CallError::Remote(code) => write!(f, "remote error: {code}"),
            CallError::Decode(error) => write!(f, "response decode error: {error}"),
        }
    }
}

impl std::error::Error for CallError {}

impl From<DecodeError> for CallError {
    fn from(error: DecodeError) -> Self {
        CallError::Decode(error)
    }
}

/// Error assembling a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// Neither a client marshaller nor a server dispatcher was configured.
    NoMarshaller,
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::NoMarshaller => {
                write!(f, "a connection needs a client marshaller, a server dispatcher, or both")
            }
        }
    }
}

impl std::error::Error for BuildError {}
