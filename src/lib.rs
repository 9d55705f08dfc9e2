//! # maskrelay
//!
//! maskrelay is an SMTP forwarding proxy for masked addresses.
//!
//! Mail sent to `someone@<fake domain>` is accepted over a minimal SMTP
//! dialogue, readdressed to `<true local>+someone@<true domain>` and relayed
//! through an authenticated upstream server. The fake address is all a
//! correspondent ever sees.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maskrelay::{ForwardServer, RelayClient, RewriteRule};
//! use maskrelay::config::UpstreamConfig;
//! use std::sync::Arc;
//!
//! let rule = RewriteRule::new("fake.example", "real", "real.example");
//! let relay = RelayClient::new(UpstreamConfig {
//!     server: "smtp.real.example".to_owned(),
//!     port: 587,
//!     username: "real@real.example".to_owned(),
//!     password: "secret".to_owned(),
//!     ..Default::default()
//! });
//!
//! let server = ForwardServer::new("relay.local", rule, Arc::new(relay));
//! server.start("127.0.0.1:2525").unwrap();
//! ```
//!
//! ## Supported SMTP commands
//!
//! Keywords are matched case-sensitively on everything before the first `:`.
//!
//! - `MAIL FROM` - Set the sender (the last one wins)
//! - `RCPT TO` - Add a recipient
//! - `DATA` - Send the message, terminated by a lone `.`
//! - `QUIT` - Close the connection
//!
//! Every other line is acknowledged with 250 and otherwise ignored.
//!
//! ## Notes
//!
//! - The dialogue is deliberately permissive: no command is ever refused
//!   and no ordering is enforced.
//! - Only the first recipient in the fake domain is delivered to.
//! - Delivery is fire-and-forget. A failed upstream send is logged and the
//!   message is dropped; nothing is queued or retried.
//! - `X-*`, `Message-Id`, `Dkim-Signature` and `Received` headers are
//!   stripped before relaying, and `To` is replaced with the true mailbox.

pub mod config;
pub mod forward;
pub mod logging;
mod smtp;

pub use config::Config;
pub use forward::{
    ForwardError, OutboundMessage, ParsedMessage, RelayClient, RewriteRule, Upstream,
};
pub use smtp::{
    Command, ForwardServer, LineReader, LineWriter, SmtpError, SmtpLimits, SmtpResponse,
    SmtpSession, SmtpState, Termination, Transaction,
};
