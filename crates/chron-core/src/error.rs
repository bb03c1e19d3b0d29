use std::fmt;

/// Machine-readable error codes attached to isolated ingestion failures.
///
/// None of these are fatal: every failure they label is logged and the
/// worker moves on to the next payload, chunk or tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MalformedPayload,
    MissingPath,
    MissingIdentity,
    FetchFailed,
    StreamDisconnected,
    StoreWriteFailed,
    ProjectionFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::MalformedPayload => "E2001",
            Self::MissingPath => "E2002",
            Self::MissingIdentity => "E2003",
            Self::FetchFailed => "E3001",
            Self::StreamDisconnected => "E3002",
            Self::StoreWriteFailed => "E4001",
            Self::ProjectionFailed => "E4002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MalformedPayload => "Malformed feed payload",
            Self::MissingPath => "Required sub-collection missing from payload",
            Self::MissingIdentity => "Entity has no identifier field",
            Self::FetchFailed => "Upstream fetch failed",
            Self::StreamDisconnected => "Stream connection lost",
            Self::StoreWriteFailed => "Merge store write failed",
            Self::ProjectionFailed => "Game projection refresh failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
