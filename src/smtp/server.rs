//! Listener, per-connection threads and relay handoff

use crate::forward::{RewriteRule, Upstream, forward};
use crate::smtp::error::SmtpError;
use crate::smtp::session::{SmtpSession, Termination, Transaction};

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{error, info, info_span, warn};

/// Accepts client connections and relays what they submit.
///
/// Each connection runs on its own thread. Once a dialogue ends with a
/// captured message, delivery runs on a further detached thread so the
/// connection can close without waiting for the upstream server.
#[derive(Clone)]
pub struct ForwardServer {
    /// Hostname announced in the greeting
    hostname: Arc<str>,
    rule: Arc<RewriteRule>,
    upstream: Arc<dyn Upstream>,
    client_timeout: Option<Duration>,
    /// Connection ids, for log correlation only
    connections: Arc<AtomicU64>,
}

impl ForwardServer {
    /// Create a new forwarding server
    pub fn new(hostname: &str, rule: RewriteRule, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            hostname: Arc::from(hostname),
            rule: Arc::new(rule),
            upstream,
            client_timeout: None,
            connections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Apply a read/write deadline to every inbound connection
    pub fn with_client_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.client_timeout = timeout;
        self
    }

    /// Bind the address and serve forever (blocking)
    pub fn start(&self, addr: &str) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Serve forever on an existing listener (blocking)
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!("Listening on {}", listener.local_addr()?);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let id = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
                    let server = self.clone();
                    thread::spawn(move || server.handle_client(id, stream));
                }
                Err(e) => {
                    warn!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }

    /// Handle a client connection
    fn handle_client(&self, id: u64, stream: TcpStream) {
        let span = info_span!("connection", id);
        let _enter = span.enter();

        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_owned(), |addr| addr.to_string());
        info!("Handling {peer}");

        let (transaction, termination) = match self.converse(stream) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Could not set up connection from {peer}: {e}");
                return;
            }
        };
        info!(%termination, "Closing {peer}");

        if transaction.should_forward() {
            self.hand_off(id, transaction);
        }
    }

    /// Run the dialogue; the stream is closed when this returns
    fn converse(&self, stream: TcpStream) -> Result<(Transaction, Termination), SmtpError> {
        stream.set_read_timeout(self.client_timeout)?;
        stream.set_write_timeout(self.client_timeout)?;
        let reader = BufReader::new(stream.try_clone()?);

        Ok(SmtpSession::new(&self.hostname, reader, stream).run())
    }

    /// Deliver on a detached thread; the outcome is only logged
    fn hand_off(&self, id: u64, transaction: Transaction) {
        let rule = Arc::clone(&self.rule);
        let upstream = Arc::clone(&self.upstream);

        thread::spawn(move || {
            let span = info_span!("delivery", id);
            let _enter = span.enter();

            match forward(transaction, &rule, upstream.as_ref()) {
                Ok(message) => info!(recipient = %message.recipient, "mail sent"),
                Err(e) => error!("Delivery failed: {e}"),
            }
        });
    }
}
