//! Per-connection dialogue and transaction state

use crate::smtp::commands::Command;
use crate::smtp::error::SmtpError;
use crate::smtp::lines::{LineReader, LineWriter};
use crate::smtp::response::SmtpResponse;

use std::fmt;
use std::io::{BufRead, Write};

use tracing::{debug, warn};

/// Envelope and body accumulated over one client dialogue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    /// Argument of the last `MAIL FROM`, as supplied
    pub sender: String,
    /// Arguments of every `RCPT TO`, in order, as supplied
    pub recipients: Vec<String>,
    /// Raw lines of the last `DATA` block, terminator excluded
    pub body: Vec<Vec<u8>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this transaction carries a message worth relaying
    pub fn should_forward(&self) -> bool {
        !self.body.is_empty()
    }
}

/// Where the dialogue currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Greeting not yet sent
    Greeting,
    /// Reading commands
    CommandLoop,
    /// Collecting a dot-terminated message block
    DataCapture,
    /// Dialogue finished
    Closed,
}

/// Why a dialogue ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The client sent `QUIT` and the reply was delivered
    Quit,
    /// The client went away
    StreamClosed,
    /// A read or write on the connection failed
    IoError,
}

impl From<&SmtpError> for Termination {
    fn from(error: &SmtpError) -> Self {
        if error.is_closed() {
            Termination::StreamClosed
        } else {
            Termination::IoError
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::Quit => "quit",
            Termination::StreamClosed => "stream-closed",
            Termination::IoError => "io-error",
        })
    }
}

/// Drives one connection from greeting to close.
///
/// Every command is acknowledged: `DATA` with 354, `QUIT` with 221 and
/// everything else, recognized or not, with 250. Commands are accepted in
/// any order.
#[derive(Debug)]
pub struct SmtpSession<'a, R, W> {
    hostname: &'a str,
    reader: LineReader<R>,
    writer: LineWriter<W>,
    state: SmtpState,
    transaction: Transaction,
}

impl<'a, R: BufRead, W: Write> SmtpSession<'a, R, W> {
    pub fn new(hostname: &'a str, reader: R, writer: W) -> Self {
        Self {
            hostname,
            reader: LineReader::new(reader),
            writer: LineWriter::new(writer),
            state: SmtpState::Greeting,
            transaction: Transaction::new(),
        }
    }

    /// Current state of the dialogue
    pub fn state(&self) -> SmtpState {
        self.state
    }

    /// Run the dialogue to completion.
    ///
    /// The transaction is returned whatever the outcome; transport failures
    /// only show up in the termination reason.
    pub fn run(mut self) -> (Transaction, Termination) {
        let termination = match self.converse() {
            Ok(()) => Termination::Quit,
            Err(e) if e.is_closed() => {
                debug!("Session ended: {e}");
                Termination::from(&e)
            }
            Err(e) => {
                warn!("Session aborted: {e}");
                Termination::from(&e)
            }
        };

        self.state = SmtpState::Closed;
        (self.transaction, termination)
    }

    fn converse(&mut self) -> Result<(), SmtpError> {
        self.writer
            .write_response(&SmtpResponse::greeting(self.hostname))?;
        self.state = SmtpState::CommandLoop;

        loop {
            let line = self.reader.read_line()?;
            let command = Command::from(line.as_str());
            if command.is_quit() {
                self.writer.write_response(&SmtpResponse::quit())?;
                return Ok(());
            }

            self.process_command(command)?;
            self.writer.write_response(&SmtpResponse::ok())?;
        }
    }

    fn process_command(&mut self, command: Command) -> Result<(), SmtpError> {
        match command {
            Command::MailFrom(sender) => self.transaction.sender = sender,
            Command::RcptTo(recipient) => self.transaction.recipients.push(recipient),
            Command::Data => {
                self.writer.write_response(&SmtpResponse::data_start())?;
                self.state = SmtpState::DataCapture;
                self.transaction.body = self.reader.read_dot_lines()?;
                self.state = SmtpState::CommandLoop;
            }
            Command::Quit | Command::Unknown(_) => {}
        }
        Ok(())
    }
}
