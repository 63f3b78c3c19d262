//! Loopback WebSocket server for lifecycle testing.
//!
//! Speaks the server side of RFC 6455 using the crate's own frame codec:
//! frames it sends are unmasked, frames it receives must be masked.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use wslane::Endpoint;
use wslane::protocol::handshake::find_head_end;
use wslane::protocol::{Frame, OpCode, compute_accept_key};

/// What the server does with each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Echo text, answer pings, acknowledge close.
    Echo,
    /// Send a binary frame right after the handshake, then echo.
    BinaryThenEcho,
    /// Send close 1001 right after the handshake.
    CloseAfterHandshake,
    /// Drop the socket right after the handshake.
    HangUpAfterHandshake,
    /// Answer the upgrade request with 403.
    RejectHandshake,
    /// Accept the TCP connection and never answer.
    Silent,
}

pub struct TestServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, behavior, log).await;
                });
            }
        });

        Self {
            addr,
            received,
            task,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", "/", self.addr.port())
    }

    /// Text messages received so far, across all connections.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    behavior: Behavior,
    received: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let head_end = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        if read_more(&mut stream, &mut buf).await? == 0 {
            return Ok(());
        }
    };

    if behavior == Behavior::Silent {
        while read_more(&mut stream, &mut buf).await? > 0 {}
        return Ok(());
    }

    if behavior == Behavior::RejectHandshake {
        stream
            .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n")
            .await?;
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let key = request
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        compute_accept_key(&key)
    );
    stream.write_all(response.as_bytes()).await?;
    buf.drain(..head_end);

    match behavior {
        Behavior::HangUpAfterHandshake => return Ok(()),
        Behavior::CloseAfterHandshake => {
            write_frame(&mut stream, &Frame::close(Some(1001), "going away")).await?;
        }
        Behavior::BinaryThenEcho => {
            write_frame(&mut stream, &Frame::new(true, OpCode::Binary, vec![1, 2, 3])).await?;
        }
        _ => {}
    }

    loop {
        let frame = match Frame::parse(&buf) {
            Ok((frame, consumed)) => {
                buf.drain(..consumed);
                frame
            }
            Err(wslane::Error::IncompleteFrame { .. }) => {
                if read_more(&mut stream, &mut buf).await? == 0 {
                    return Ok(());
                }
                continue;
            }
            Err(_) => return Ok(()),
        };

        match frame.opcode {
            OpCode::Text => {
                let text = String::from_utf8_lossy(frame.payload()).into_owned();
                received.lock().unwrap().push(text);
                write_frame(&mut stream, &Frame::text(frame.into_payload())).await?;
            }
            OpCode::Ping => {
                write_frame(&mut stream, &Frame::pong(frame.into_payload())).await?;
            }
            OpCode::Close => {
                if behavior != Behavior::CloseAfterHandshake {
                    let reply = Frame::new(true, OpCode::Close, frame.into_payload());
                    write_frame(&mut stream, &reply).await?;
                }
                stream.shutdown().await?;
                return Ok(());
            }
            _ => {}
        }
    }
}

async fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    let mut chunk = [0u8; 4096];
    let n = stream.read(&mut chunk).await?;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

async fn write_frame(stream: &mut TcpStream, frame: &Frame) -> std::io::Result<()> {
    let mut out = vec![0u8; frame.wire_size(false)];
    frame
        .write(&mut out, None)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    stream.write_all(&out).await
}
