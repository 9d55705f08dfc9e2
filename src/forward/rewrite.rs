//! Header rewriting for captured messages
//!
//! Only the header block is touched. The body is carried over byte for
//! byte; no MIME structure is interpreted.

use crate::forward::error::ForwardError;

/// Header names, in canonical form, that must not survive a re-send
const RELAY_HEADERS: [&str; 3] = ["Message-Id", "Dkim-Signature", "Received"];

/// Put a header name in MIME canonical form (`dkim-signature` becomes
/// `Dkim-Signature`). Names with characters outside the token set are
/// returned unchanged.
pub fn canonical_name(name: &str) -> String {
    let is_token = |b: u8| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b);
    if name.is_empty() || !name.bytes().all(is_token) {
        return name.to_owned();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}

/// Whether a canonical header name was added by infrastructure along the
/// original route
pub fn is_relay_header(name: &str) -> bool {
    name.starts_with("X-") || RELAY_HEADERS.contains(&name)
}

/// A captured message split into headers and body.
///
/// Duplicate header names keep their first occurrence, in position and
/// value. Header values and the body are kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    headers: Vec<(String, Vec<u8>)>,
    body: Vec<u8>,
}

impl ParsedMessage {
    /// Parse raw DATA lines.
    ///
    /// The header block ends at the first empty line; a message without one
    /// is malformed, as is a header block that is not `Name: value` lines.
    pub fn parse<S: AsRef<[u8]>>(lines: &[S]) -> Result<Self, ForwardError> {
        let separator = lines
            .iter()
            .position(|line| line.as_ref().is_empty())
            .ok_or_else(|| {
                ForwardError::MalformedMessage("no blank line after headers".to_owned())
            })?;

        for (index, line) in lines[..separator].iter().enumerate() {
            let line = line.as_ref();
            let folded = line.starts_with(b" ") || line.starts_with(b"\t");
            let named = line
                .iter()
                .position(|&b| b == b':')
                .is_some_and(|colon| !line[..colon].trim_ascii().is_empty());
            if (folded && index == 0) || (!folded && !named) {
                return Err(ForwardError::MalformedMessage(format!(
                    "invalid header line: {:?}",
                    String::from_utf8_lossy(line)
                )));
            }
        }

        let mut headers: Vec<(String, Vec<u8>)> = Vec::new();
        if separator > 0 {
            let mut block = join_crlf(&lines[..separator]);
            block.extend_from_slice(b"\r\n\r\n");

            let (parsed, _) = mailparse::parse_headers(&block)
                .map_err(|e| ForwardError::MalformedMessage(e.to_string()))?;

            for header in parsed {
                let name = canonical_name(header.get_key().trim());
                if headers.iter().all(|(existing, _)| *existing != name) {
                    headers.push((name, header.get_value_raw().to_vec()));
                }
            }
        }

        Ok(Self {
            headers,
            body: join_crlf(&lines[separator + 1..]),
        })
    }

    /// Raw value of a header, looked up by canonical name
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        let name = canonical_name(name);
        self.headers
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value.as_slice())
    }

    /// Header names in output order
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.headers.iter().map(|(name, _)| name.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Drop `X-*`, `Message-Id`, `Dkim-Signature` and `Received` headers
    pub fn strip_relay_headers(&mut self) {
        self.headers.retain(|(name, _)| !is_relay_header(name));
    }

    /// Replace a header in place, or append it if absent
    pub fn set_header(&mut self, name: &str, value: &str) {
        let name = canonical_name(name);
        let value = value.as_bytes().to_vec();
        match self.headers.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Serialize as header lines, a blank line and the body
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 64 * self.headers.len());
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

fn join_crlf<S: AsRef<[u8]>>(lines: &[S]) -> Vec<u8> {
    lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&[u8]>>()
        .join(&b"\r\n"[..])
}

/// Rewrite captured DATA lines for delivery to `recipient`
pub fn rewrite<S: AsRef<[u8]>>(lines: &[S], recipient: &str) -> Result<Vec<u8>, ForwardError> {
    let mut message = ParsedMessage::parse(lines)?;
    message.strip_relay_headers();
    message.set_header("To", recipient);
    Ok(message.to_bytes())
}
