//! End-to-end sessions over TCP with a recording upstream

use maskrelay::{ForwardError, ForwardServer, OutboundMessage, RewriteRule, Upstream};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// Passes every submission to a channel, then answers with `outcome`
struct RecordingUpstream {
    sender: Mutex<mpsc::Sender<OutboundMessage>>,
    outcome: Result<(), ForwardError>,
}

impl Upstream for RecordingUpstream {
    fn submit(&self, message: &OutboundMessage) -> Result<(), ForwardError> {
        let _ = self.sender.lock().unwrap().send(message.clone());
        self.outcome.clone()
    }
}

fn start_server_with(
    outcome: Result<(), ForwardError>,
    timeout: Option<Duration>,
) -> (String, mpsc::Receiver<OutboundMessage>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, rx) = mpsc::channel();
    let upstream = RecordingUpstream {
        sender: Mutex::new(tx),
        outcome,
    };
    let server = ForwardServer::new(
        "test.local",
        RewriteRule::new("fake.example", "real", "real.example"),
        Arc::new(upstream),
    )
    .with_client_timeout(timeout);

    // Start server in background thread
    thread::spawn(move || {
        if let Err(e) = server.start_with_listener(listener) {
            eprintln!("Error starting server: {e}");
        }
    });

    (addr, rx)
}

fn start_test_server() -> (String, mpsc::Receiver<OutboundMessage>) {
    start_server_with(Ok(()), None)
}

fn connect(addr: &str) -> (TcpStream, BufReader<TcpStream>) {
    let stream = TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut greeting = String::new();
    reader.read_line(&mut greeting).unwrap();
    assert!(greeting.starts_with("220"));

    (stream, reader)
}

fn send_command(
    stream: &mut TcpStream,
    reader: &mut BufReader<TcpStream>,
    command: &str,
) -> String {
    write!(stream, "{command}\r\n").unwrap();
    stream.flush().unwrap();

    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    response.trim().to_string()
}

#[test]
fn test_end_to_end_rewrite() {
    let (addr, rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    assert!(send_command(&mut stream, &mut reader, "MAIL FROM:<a@b.com>").starts_with("250"));
    assert!(
        send_command(&mut stream, &mut reader, "RCPT TO:<x@fake.example>").starts_with("250")
    );
    assert!(send_command(&mut stream, &mut reader, "DATA").starts_with("354"));
    let response = send_command(
        &mut stream,
        &mut reader,
        "Subject: Hi\r\nX-Spam-Score: 0\r\nMessage-ID: <1@b.com>\r\nTo: x@fake.example\r\n\r\nHello\r\n.",
    );
    assert!(response.starts_with("250"));
    assert!(send_command(&mut stream, &mut reader, "QUIT").starts_with("221"));

    let message = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(message.sender, "a@b.com");
    assert_eq!(message.recipient, "real+x@real.example");
    assert_eq!(
        String::from_utf8(message.payload).unwrap(),
        "Subject: Hi\r\nTo: real+x@real.example\r\n\r\nHello"
    );
}

#[test]
fn test_first_fake_recipient_wins() {
    let (addr, rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    send_command(&mut stream, &mut reader, "MAIL FROM:<a@b.com>");
    send_command(&mut stream, &mut reader, "RCPT TO:<carol@other.example>");
    send_command(&mut stream, &mut reader, "RCPT TO:<carol@fake.example>");
    send_command(&mut stream, &mut reader, "RCPT TO:<bob@fake.example>");
    send_command(&mut stream, &mut reader, "DATA");
    send_command(&mut stream, &mut reader, "Subject: Hi\r\n\r\nHello\r\n.");
    send_command(&mut stream, &mut reader, "QUIT");

    let message = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(message.recipient, "real+carol@real.example");

    // Exactly one delivery per transaction
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn test_unresolved_recipient_still_attempts_delivery() {
    let (addr, rx) = start_server_with(
        Err(ForwardError::UpstreamRejected("invalid recipient".to_owned())),
        None,
    );
    let (mut stream, mut reader) = connect(&addr);

    send_command(&mut stream, &mut reader, "MAIL FROM:<a@b.com>");
    send_command(&mut stream, &mut reader, "RCPT TO:<carol@other.example>");
    send_command(&mut stream, &mut reader, "DATA");
    send_command(&mut stream, &mut reader, "Subject: Hi\r\n\r\nHello\r\n.");
    assert!(send_command(&mut stream, &mut reader, "QUIT").starts_with("221"));

    let message = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(message.recipient.is_empty());
}

#[test]
fn test_permissive_dialogue() {
    let (addr, _rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    // Nothing is ever refused
    for command in ["EHLO client.local", "HELO client.local", "NOOP", "RSET", "VRFY x", ""] {
        assert!(send_command(&mut stream, &mut reader, command).starts_with("250"));
    }
    assert!(send_command(&mut stream, &mut reader, "DATA").starts_with("354"));
    assert!(send_command(&mut stream, &mut reader, ".").starts_with("250"));
    assert!(send_command(&mut stream, &mut reader, "QUIT").starts_with("221"));
}

#[test]
fn test_empty_body_is_not_relayed() {
    let (addr, rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    send_command(&mut stream, &mut reader, "MAIL FROM:<a@b.com>");
    send_command(&mut stream, &mut reader, "RCPT TO:<x@fake.example>");
    send_command(&mut stream, &mut reader, "DATA");
    send_command(&mut stream, &mut reader, ".");
    send_command(&mut stream, &mut reader, "QUIT");

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_disconnect_mid_dialogue_is_not_relayed() {
    let (addr, rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    send_command(&mut stream, &mut reader, "MAIL FROM:<a@b.com>");
    send_command(&mut stream, &mut reader, "RCPT TO:<x@fake.example>");
    drop(reader);
    drop(stream);

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_disconnect_after_data_is_relayed() {
    let (addr, rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    send_command(&mut stream, &mut reader, "MAIL FROM:<a@b.com>");
    send_command(&mut stream, &mut reader, "RCPT TO:<x@fake.example>");
    send_command(&mut stream, &mut reader, "DATA");
    send_command(&mut stream, &mut reader, "Subject: Hi\r\n\r\nHello\r\n.");
    drop(reader);
    drop(stream);

    let message = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(message.recipient, "real+x@real.example");
}

#[test]
fn test_dot_stuffed_body() {
    let (addr, rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    send_command(&mut stream, &mut reader, "RCPT TO:<x@fake.example>");
    send_command(&mut stream, &mut reader, "DATA");
    send_command(
        &mut stream,
        &mut reader,
        "Subject: dots\r\n\r\n..\r\n..leading\r\n\r\nend\r\n.",
    );
    send_command(&mut stream, &mut reader, "QUIT");

    let message = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let payload = String::from_utf8(message.payload).unwrap();
    assert!(payload.ends_with("\r\n\r\n.\r\n.leading\r\n\r\nend"));
    // No MAIL FROM means the null sender
    assert!(message.sender.is_empty());
}

#[test]
fn test_8bit_body_is_relayed_unchanged() {
    let (addr, rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    send_command(&mut stream, &mut reader, "RCPT TO:<x@fake.example>");
    send_command(&mut stream, &mut reader, "DATA");
    stream
        .write_all(b"Subject: Hi\r\n\r\ncaf\xe9\r\n\xff\xfe\r\n.\r\n")
        .unwrap();
    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    assert!(response.starts_with("250"));
    send_command(&mut stream, &mut reader, "QUIT");

    let message = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(message.payload.ends_with(b"\r\n\r\ncaf\xe9\r\n\xff\xfe"));
}

#[test]
fn test_unbounded_line_drops_only_that_session() {
    let (addr, rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    send_command(&mut stream, &mut reader, "RCPT TO:<x@fake.example>");
    send_command(&mut stream, &mut reader, "DATA");
    // Never sends a newline; the server stops reading and hangs up
    let _ = stream.write_all(&[b'a'; 64 * 1024]);
    let mut line = String::new();
    assert_eq!(reader.read_line(&mut line).unwrap_or(0), 0);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    // Other clients are still served
    let (mut stream, mut reader) = connect(&addr);
    assert!(send_command(&mut stream, &mut reader, "QUIT").starts_with("221"));
}

#[test]
fn test_malformed_message_is_dropped() {
    let (addr, rx) = start_test_server();
    let (mut stream, mut reader) = connect(&addr);

    send_command(&mut stream, &mut reader, "RCPT TO:<x@fake.example>");
    send_command(&mut stream, &mut reader, "DATA");
    // No blank line between headers and body
    assert!(send_command(&mut stream, &mut reader, "Subject: Hi\r\nHello\r\n.").starts_with("250"));
    assert!(send_command(&mut stream, &mut reader, "QUIT").starts_with("221"));

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_idle_client_times_out() {
    let (addr, _rx) = start_server_with(Ok(()), Some(Duration::from_millis(100)));
    let (_stream, mut reader) = connect(&addr);

    // The server gives up and closes the connection
    let mut line = String::new();
    assert_eq!(reader.read_line(&mut line).unwrap_or(0), 0);
}

#[test]
fn test_concurrent_sessions() {
    let (addr, rx) = start_test_server();

    let clients: Vec<_> = (0..4)
        .map(|i| {
            let addr = addr.clone();
            thread::spawn(move || {
                let (mut stream, mut reader) = connect(&addr);
                send_command(&mut stream, &mut reader, &format!("MAIL FROM:<s{i}@b.com>"));
                send_command(&mut stream, &mut reader, &format!("RCPT TO:<u{i}@fake.example>"));
                send_command(&mut stream, &mut reader, "DATA");
                let message = format!("Subject: {i}\r\n\r\nbody {i}\r\n.");
                send_command(&mut stream, &mut reader, &message);
                send_command(&mut stream, &mut reader, "QUIT");
            })
        })
        .collect();

    for client in clients {
        client.join().unwrap();
    }

    let mut recipients: Vec<String> = (0..4)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap().recipient)
        .collect();
    recipients.sort();
    assert_eq!(
        recipients,
        vec![
            "real+u0@real.example",
            "real+u1@real.example",
            "real+u2@real.example",
            "real+u3@real.example",
        ]
    );
}
