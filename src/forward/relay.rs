//! Delivery through the authenticated upstream server

use crate::config::{TlsMode, UpstreamConfig};
use crate::forward::error::ForwardError;

use lettre::address::{Address, Envelope};
use lettre::transport::smtp::Error as SmtpTransportError;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{SmtpTransport, Transport};

/// A rewritten message ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Bare envelope sender; empty for the null sender
    pub sender: String,
    /// The single envelope recipient
    pub recipient: String,
    /// Complete message, headers and body
    pub payload: Vec<u8>,
}

/// Somewhere a rewritten message can be submitted to.
///
/// Implementations must be shareable across delivery threads.
pub trait Upstream: Send + Sync {
    fn submit(&self, message: &OutboundMessage) -> Result<(), ForwardError>;
}

/// Build the SMTP envelope for a message.
///
/// Unparsable addresses, including an unresolved (empty) recipient, count
/// as a rejection.
pub fn envelope(message: &OutboundMessage) -> Result<Envelope, ForwardError> {
    let sender = if message.sender.is_empty() {
        None
    } else {
        Some(message.sender.parse::<Address>().map_err(|e| {
            ForwardError::UpstreamRejected(format!("sender {:?}: {e}", message.sender))
        })?)
    };

    let recipient = message.recipient.parse::<Address>().map_err(|e| {
        ForwardError::UpstreamRejected(format!("recipient {:?}: {e}", message.recipient))
    })?;

    Envelope::new(sender, vec![recipient])
        .map_err(|e| ForwardError::UpstreamRejected(e.to_string()))
}

/// Submits messages with PLAIN authentication over `lettre`'s SMTP transport.
///
/// A fresh transport is built for every message; nothing is pooled between
/// deliveries.
#[derive(Debug, Clone)]
pub struct RelayClient {
    config: UpstreamConfig,
}

impl RelayClient {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, ForwardError> {
        let builder = match self.config.tls {
            TlsMode::StartTls => SmtpTransport::starttls_relay(&self.config.server),
            TlsMode::Wrapper => SmtpTransport::relay(&self.config.server),
            TlsMode::None => Ok(SmtpTransport::builder_dangerous(&self.config.server)),
        }
        .map_err(|e| ForwardError::UpstreamUnavailable(e.to_string()))?;

        Ok(builder
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ))
            .authentication(vec![Mechanism::Plain])
            .build())
    }
}

/// Split transport errors into the server saying no and the server not
/// being reachable at all
fn classify(error: SmtpTransportError) -> ForwardError {
    if error.is_permanent() || error.is_transient() {
        ForwardError::UpstreamRejected(error.to_string())
    } else {
        ForwardError::UpstreamUnavailable(error.to_string())
    }
}

impl Upstream for RelayClient {
    fn submit(&self, message: &OutboundMessage) -> Result<(), ForwardError> {
        let envelope = envelope(message)?;
        let transport = self.transport()?;

        // Connecting authenticates, so a failure here is never a rejection
        // of this particular message.
        match transport.test_connection() {
            Ok(true) => {}
            Ok(false) => {
                return Err(ForwardError::UpstreamUnavailable(format!(
                    "{}:{} did not respond",
                    self.config.server, self.config.port
                )));
            }
            Err(e) => return Err(ForwardError::UpstreamUnavailable(e.to_string())),
        }

        transport
            .send_raw(&envelope, &message.payload)
            .map(|_| ())
            .map_err(classify)
    }
}
