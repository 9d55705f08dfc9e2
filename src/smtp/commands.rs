//! Classification of client command lines

/// A client command line, tagged by keyword.
///
/// The keyword is everything before the first `:` and is matched
/// case-sensitively. The argument is everything after it, unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `MAIL FROM:<argument>`
    MailFrom(String),
    /// `RCPT TO:<argument>`
    RcptTo(String),
    Data,
    Quit,
    /// Anything else, accepted without effect
    Unknown(String),
}

impl Command {
    /// Whether this command ends the dialogue
    pub fn is_quit(&self) -> bool {
        matches!(self, Command::Quit)
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        let (keyword, argument) = match line.split_once(':') {
            Some((keyword, argument)) => (keyword, Some(argument)),
            None => (line, None),
        };

        match (keyword, argument) {
            ("MAIL FROM", Some(argument)) => Command::MailFrom(argument.to_owned()),
            ("RCPT TO", Some(argument)) => Command::RcptTo(argument.to_owned()),
            ("DATA", _) => Command::Data,
            ("QUIT", _) => Command::Quit,
            _ => Command::Unknown(line.to_owned()),
        }
    }
}
