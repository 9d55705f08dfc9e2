//! Error types for the inbound side of the proxy

use thiserror::Error;

/// Transport-level failures on an inbound connection.
///
/// The session engine never rejects a command, so these are the only
/// errors an inbound dialogue can produce.
#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Too much mail data (max {max} bytes)")]
    TooMuchData { max: usize },
}

/// Size limits applied to inbound and outbound traffic
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of a reply line including CRLF (RFC 5321 4.5.3.1.5)
    pub const REPLY_LINE_MAX_LENGTH: usize = 512;

    /// Maximum length of any inbound line including CRLF (RFC 5321 4.5.3.1.6)
    pub const TEXT_LINE_MAX_LENGTH: usize = 1000;

    /// Maximum total size of one DATA block, held in memory until relayed
    pub const MAX_DATA_SIZE: usize = 10 * 1024 * 1024; // 10MB
}

impl SmtpError {
    /// Whether the peer simply went away, as opposed to a failed read or write
    pub fn is_closed(&self) -> bool {
        match self {
            SmtpError::ConnectionClosed => true,
            SmtpError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ),
            SmtpError::LineTooLong { .. } | SmtpError::TooMuchData { .. } => false,
        }
    }
}
