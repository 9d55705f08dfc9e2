//! Inbound SMTP dialogue

pub mod commands;
pub mod error;
pub mod lines;
pub mod response;
pub mod server;
pub mod session;

pub use commands::Command;
pub use error::{SmtpError, SmtpLimits};
pub use lines::{LineReader, LineWriter};
pub use response::SmtpResponse;
pub use server::ForwardServer;
pub use session::{SmtpSession, SmtpState, Termination, Transaction};
