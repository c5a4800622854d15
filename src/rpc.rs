//! Coordinator wire protocol.
//!
//! One newline-terminated JSON request per TCP connection, answered by one
//! newline-terminated JSON response. Every request names the discovery key it
//! is meant for, so a coordinator never answers for the wrong resource.

use crate::error::{ExecLockError, Result};
use crate::ticket::Ticket;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

/// Upper bound for one encoded message.
pub(crate) const MAX_MESSAGE_BYTES: u64 = 4 * 1024 * 1024;

/// Request sent to a coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Upsert `ticket`, maybe run the election, return all tickets.
    GetTickets { key: String, ticket: Ticket },
    /// Release `ticket` if it is the working one.
    EndWork { key: String, ticket: Ticket },
    /// Read-only view of the ticket set.
    Snapshot { key: String },
}

impl Request {
    pub fn key(&self) -> &str {
        match self {
            Request::GetTickets { key, .. }
            | Request::EndWork { key, .. }
            | Request::Snapshot { key } => key,
        }
    }
}

/// Coordinator reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Tickets { tickets: Vec<Ticket> },
    Done,
    /// The request named a key this coordinator does not serve.
    WrongKey { serving: String },
    Error { message: String },
}

/// Address to dial for a listener bound to `addr`.
pub(crate) fn dial_addr(addr: SocketAddr) -> SocketAddr {
    if addr.ip().is_unspecified() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
    } else {
        addr
    }
}

/// Whether something accepts connections at `addr`.
pub fn probe(addr: SocketAddr, timeout: Duration) -> bool {
    TcpStream::connect_timeout(&dial_addr(addr), timeout).is_ok()
}

/// Send one request and wait for its response.
pub fn call(addr: SocketAddr, request: &Request, timeout: Duration) -> Result<Response> {
    let transport = |what: &str, e: std::io::Error| {
        ExecLockError::TransportError(format!("{} {}: {}", what, addr, e))
    };

    let stream = TcpStream::connect_timeout(&dial_addr(addr), timeout)
        .map_err(|e| transport("failed to connect to", e))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|()| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| transport("failed to configure connection to", e))?;

    write_message(&stream, request).map_err(|e| with_peer(e, addr))?;
    let response = read_message::<Response>(&stream).map_err(|e| with_peer(e, addr))?;
    match response {
        Response::WrongKey { serving } => Err(ExecLockError::WrongCoordinator(format!(
            "{} serves '{}', not '{}'",
            addr,
            serving,
            request.key()
        ))),
        other => Ok(other),
    }
}

fn with_peer(err: ExecLockError, addr: SocketAddr) -> ExecLockError {
    match err {
        ExecLockError::TransportError(msg) => {
            ExecLockError::TransportError(format!("{} ({})", msg, addr))
        }
        other => other,
    }
}

/// `GetTickets` call; fails on any non-ticket answer.
pub fn get_tickets(
    addr: SocketAddr,
    key: &str,
    ticket: &Ticket,
    timeout: Duration,
) -> Result<Vec<Ticket>> {
    let request = Request::GetTickets {
        key: key.to_string(),
        ticket: ticket.clone(),
    };
    expect_tickets(call(addr, &request, timeout)?)
}

/// `EndWork` call.
pub fn end_work(addr: SocketAddr, key: &str, ticket: &Ticket, timeout: Duration) -> Result<()> {
    let request = Request::EndWork {
        key: key.to_string(),
        ticket: ticket.clone(),
    };
    match call(addr, &request, timeout)? {
        Response::Done => Ok(()),
        other => Err(unexpected(other)),
    }
}

/// `Snapshot` call.
pub fn snapshot(addr: SocketAddr, key: &str, timeout: Duration) -> Result<Vec<Ticket>> {
    let request = Request::Snapshot {
        key: key.to_string(),
    };
    expect_tickets(call(addr, &request, timeout)?)
}

fn expect_tickets(response: Response) -> Result<Vec<Ticket>> {
    match response {
        Response::Tickets { tickets } => Ok(tickets),
        other => Err(unexpected(other)),
    }
}

fn unexpected(response: Response) -> ExecLockError {
    match response {
        Response::Error { message } => {
            ExecLockError::TransportError(format!("coordinator error: {}", message))
        }
        other => ExecLockError::TransportError(format!("unexpected response: {:?}", other)),
    }
}

/// Write one message followed by a newline.
pub(crate) fn write_message<T: Serialize>(mut stream: &TcpStream, message: &T) -> Result<()> {
    let mut line = serde_json::to_vec(message).map_err(|e| {
        ExecLockError::TransportError(format!("failed to encode message: {}", e))
    })?;
    line.push(b'\n');
    stream
        .write_all(&line)
        .and_then(|()| stream.flush())
        .map_err(|e| ExecLockError::TransportError(format!("failed to send message: {}", e)))
}

/// Read one newline-terminated message.
pub(crate) fn read_message<T: for<'de> Deserialize<'de>>(stream: &TcpStream) -> Result<T> {
    let mut reader = BufReader::new(std::io::Read::take(stream, MAX_MESSAGE_BYTES));
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| ExecLockError::TransportError(format!("failed to read message: {}", e)))?;
    if read == 0 {
        return Err(ExecLockError::TransportError(
            "connection closed before a message arrived".to_string(),
        ));
    }
    serde_json::from_str(line.trim_end()).map_err(|e| {
        ExecLockError::TransportError(format!("failed to decode message: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn request_wire_shape() {
        let request = Request::EndWork {
            key: "locker-build".to_string(),
            ticket: Ticket::at("t1", 9, 100, None),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["op"], "end_work");
        assert_eq!(json["key"], "locker-build");
        assert_eq!(json["ticket"]["createdAt"], 100);
        assert_eq!(request.key(), "locker-build");
    }

    #[test]
    fn response_wire_shape() {
        let json = serde_json::to_string(&Response::Done).unwrap();
        assert_eq!(json, r#"{"status":"done"}"#);

        let parsed: Response =
            serde_json::from_str(r#"{"status":"error","message":"wrong key"}"#).unwrap();
        assert!(matches!(parsed, Response::Error { message } if message == "wrong key"));
    }

    #[test]
    fn call_against_echo_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let request: Request = read_message(&stream).unwrap();
            let tickets = match request {
                Request::GetTickets { ticket, .. } => vec![ticket],
                _ => Vec::new(),
            };
            write_message(&stream, &Response::Tickets { tickets }).unwrap();
        });

        let ticket = Ticket::at("t1", 1, 5, None);
        let tickets = get_tickets(addr, "locker-build", &ticket, Duration::from_secs(2)).unwrap();
        assert_eq!(tickets, vec![ticket]);
        server.join().unwrap();
    }

    #[test]
    fn error_response_becomes_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let _: Request = read_message(&stream).unwrap();
            let reply = Response::Error {
                message: "wrong key".to_string(),
            };
            write_message(&stream, &reply).unwrap();
        });

        let err = snapshot(addr, "locker-build", Duration::from_secs(2)).unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("wrong key"));
        server.join().unwrap();
    }

    #[test]
    fn wrong_key_reply_is_distinct_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let _: Request = read_message(&stream).unwrap();
            let reply = Response::WrongKey {
                serving: "locker-deploy".to_string(),
            };
            write_message(&stream, &reply).unwrap();
        });

        let ticket = Ticket::at("t1", 1, 5, None);
        let err = get_tickets(addr, "locker-build", &ticket, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, ExecLockError::WrongCoordinator(_)));
        assert!(err.to_string().contains("locker-deploy"));
        server.join().unwrap();
    }

    #[test]
    fn unreachable_coordinator_is_transport_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        assert!(!probe(addr, Duration::from_millis(200)));
        let err = snapshot(addr, "locker-build", Duration::from_millis(200)).unwrap_err();
        assert!(err.is_transport());
    }
}
