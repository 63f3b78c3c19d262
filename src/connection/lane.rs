//! The task that drives one connection.
//!
//! A lane owns the socket, the codec and the consumer callbacks. Everything
//! that touches the connection runs here one step at a time: resolve, connect,
//! handshake, then a loop that races the next inbound frame against the next
//! queued command and the idle timer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until, timeout};

use crate::codec::WebSocketCodec;
use crate::config::{Config, Limits};
use crate::connection::ConnectionPhase;
use crate::connection::callbacks::{Callbacks, Completion};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame};
use crate::observe::{EventSink, Operation};
use crate::protocol::handshake::{HandshakeRequest, HandshakeResponse, find_head_end};
use crate::protocol::{Frame, OpCode};

/// Work submitted by a [`ClientConnection`](crate::ClientConnection).
pub(crate) enum Command {
    Send { text: String, done: Completion },
    Close { done: Completion },
}

impl Command {
    pub(crate) fn operation(&self) -> Operation {
        match self {
            Command::Send { .. } => Operation::Write,
            Command::Close { .. } => Operation::Close,
        }
    }

    pub(crate) fn reject(self, error: Error) {
        match self {
            Command::Send { done, .. } | Command::Close { done } => done(Err(error)),
        }
    }
}

/// Store `to` and report the transition if the phase changed.
pub(crate) fn publish(
    phase: &watch::Sender<ConnectionPhase>,
    sink: &dyn EventSink,
    endpoint: &Endpoint,
    to: ConnectionPhase,
) {
    let from = *phase.borrow();
    if from != to {
        sink.phase_changed(endpoint, from, to);
        phase.send_replace(to);
    }
}

enum Establish {
    Done(std::result::Result<WebSocketCodec<TcpStream>, (Operation, Error)>),
    /// Close was requested (or every handle dropped) before the session opened.
    Aborted(Option<Completion>),
}

enum Inbound {
    Frame(Result<Frame>),
    Command(Option<Command>),
    Timer,
}

enum Step {
    Continue,
    /// The session is over; the error has already been reported to the sink.
    Disconnect(Error),
}

pub(crate) struct Lane {
    endpoint: Endpoint,
    config: Config,
    phase: Arc<watch::Sender<ConnectionPhase>>,
    sink: Arc<dyn EventSink>,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    callbacks: Callbacks,
    /// Set by `ClientConnection::close` as soon as it is called, before the
    /// command reaches the lane.
    closed_by_user: Arc<AtomicBool>,
}

impl Lane {
    pub(crate) fn new(
        endpoint: Endpoint,
        config: Config,
        phase: Arc<watch::Sender<ConnectionPhase>>,
        sink: Arc<dyn EventSink>,
        commands: mpsc::Receiver<Command>,
        callbacks: Callbacks,
        closed_by_user: Arc<AtomicBool>,
    ) -> Self {
        Self {
            endpoint,
            config,
            phase,
            sink,
            commands,
            commands_open: true,
            callbacks,
            closed_by_user,
        }
    }

    fn set_phase(&self, to: ConnectionPhase) {
        publish(&self.phase, &*self.sink, &self.endpoint, to);
    }

    fn user_closed(&self) -> bool {
        self.closed_by_user.load(Ordering::Acquire)
    }

    fn mark_user_closed(&self) {
        self.closed_by_user.store(true, Ordering::Release);
    }

    fn fail(&self, operation: Operation, error: &Error) {
        self.sink.failed(&self.endpoint, operation, error);
    }

    fn read_failure(&self, error: Error) -> Step {
        self.fail(Operation::Read, &error);
        Step::Disconnect(error)
    }

    /// Drive the connection from `Resolving` to a terminal phase.
    pub(crate) async fn run(mut self) {
        match self.establish_or_abort().await {
            Establish::Done(Ok(codec)) => {
                self.set_phase(ConnectionPhase::Open);
                self.callbacks.connected(Ok(()));
                self.run_open(codec).await;
            }
            Establish::Done(Err((operation, error))) => {
                self.fail(operation, &error);
                self.set_phase(ConnectionPhase::Failed);
                self.callbacks.connected(Err(error));
            }
            Establish::Aborted(done) => {
                self.mark_user_closed();
                self.fail(Operation::Connect, &Error::Aborted);
                self.set_phase(ConnectionPhase::Closed);
                self.callbacks.connected(Err(Error::Aborted));
                if let Some(done) = done {
                    done(Ok(()));
                }
            }
        }
        self.drain();
    }

    async fn establish_or_abort(&mut self) -> Establish {
        let establish = establish(&self.endpoint, &self.config, &self.phase, &*self.sink);
        tokio::pin!(establish);

        loop {
            tokio::select! {
                result = &mut establish => return Establish::Done(result),
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(Command::Close { done }) => return Establish::Aborted(Some(done)),
                    Some(command) => {
                        let error = Error::NotOpen(*self.phase.borrow());
                        self.sink.failed(&self.endpoint, command.operation(), &error);
                        command.reject(error);
                    }
                    None => {
                        self.commands_open = false;
                        return Establish::Aborted(None);
                    }
                },
            }
        }
    }

    /// The open session: deliver inbound messages, write queued sends, answer
    /// pings, and enforce the idle timeout until either side closes.
    async fn run_open<S>(&mut self, mut codec: WebSocketCodec<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let idle = self.config.timeouts.idle;
        let keep_alive = self.config.timeouts.keep_alive_pings;
        let mut last_inbound = Instant::now();
        let mut ping_sent = false;

        loop {
            let deadline = match idle {
                Some(window) if keep_alive && !ping_sent => last_inbound + window / 2,
                Some(window) => last_inbound + window,
                None => last_inbound,
            };

            let inbound = tokio::select! {
                frame = codec.read_frame() => Inbound::Frame(frame),
                command = self.commands.recv(), if self.commands_open => Inbound::Command(command),
                () = sleep_until(deadline), if idle.is_some() => Inbound::Timer,
            };

            let step = match inbound {
                Inbound::Frame(Ok(frame)) => {
                    last_inbound = Instant::now();
                    ping_sent = false;
                    self.on_frame(&mut codec, frame).await
                }
                Inbound::Frame(Err(error)) => self.read_failure(error),
                Inbound::Command(Some(Command::Send { text, done })) => {
                    self.write_text(&mut codec, text, done).await
                }
                Inbound::Command(Some(Command::Close { done })) => {
                    self.close(&mut codec, Some(done)).await;
                    return;
                }
                Inbound::Command(None) => {
                    self.commands_open = false;
                    self.close(&mut codec, None).await;
                    return;
                }
                Inbound::Timer => match idle {
                    Some(window) if Instant::now() >= last_inbound + window => {
                        self.read_failure(Error::IdleTimeout(window))
                    }
                    Some(_) => {
                        ping_sent = true;
                        self.write_control(&mut codec, Frame::ping(Vec::new()))
                            .await
                    }
                    None => Step::Continue,
                },
            };

            if let Step::Disconnect(error) = step {
                self.disconnect(&mut codec, error).await;
                return;
            }
        }
    }

    async fn on_frame<S>(&mut self, codec: &mut WebSocketCodec<S>, frame: Frame) -> Step
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(error) = frame.validate() {
            return self.read_failure(error);
        }

        match frame.opcode {
            OpCode::Text if frame.fin => {
                let text = self
                    .config
                    .limits
                    .check_message_size(frame.payload().len())
                    .and_then(|()| {
                        String::from_utf8(frame.into_payload()).map_err(|_| Error::InvalidUtf8)
                    });
                match text {
                    Ok(text) => {
                        self.callbacks.message(Ok(text));
                        Step::Continue
                    }
                    Err(error) => self.read_failure(error),
                }
            }
            OpCode::Binary if frame.fin => {
                let error = Error::UnsupportedData(format!(
                    "binary frame of {} bytes",
                    frame.payload().len()
                ));
                self.fail(Operation::Read, &error);
                self.callbacks.message(Err(error));
                Step::Continue
            }
            OpCode::Text | OpCode::Binary | OpCode::Continuation => self.read_failure(
                Error::ProtocolViolation("Fragmented messages are not supported".into()),
            ),
            OpCode::Ping => {
                self.write_control(codec, Frame::pong(frame.into_payload()))
                    .await
            }
            OpCode::Pong => Step::Continue,
            OpCode::Close => match CloseFrame::from_payload(frame.payload()) {
                Ok(close) => {
                    let code = close.map(|close| close.code.as_u16());
                    let _ = write_frame(codec, &Frame::close(code, "")).await;
                    self.read_failure(Error::ConnectionClosed(code))
                }
                Err(error) => self.read_failure(error),
            },
        }
    }

    async fn write_control<S>(&mut self, codec: &mut WebSocketCodec<S>, frame: Frame) -> Step
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match write_frame(codec, &frame).await {
            Ok(()) => Step::Continue,
            Err(error) => {
                self.fail(Operation::Write, &error);
                Step::Disconnect(error)
            }
        }
    }

    async fn write_text<S>(
        &mut self,
        codec: &mut WebSocketCodec<S>,
        text: String,
        done: Completion,
    ) -> Step
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = match self.config.limits.check_message_size(text.len()) {
            Ok(()) => write_frame(codec, &Frame::text(text)).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => {
                done(Ok(()));
                Step::Continue
            }
            Err(error) => {
                self.fail(Operation::Write, &error);
                let broken = matches!(error, Error::Io { .. });
                done(Err(error.clone()));
                if broken {
                    Step::Disconnect(error)
                } else {
                    Step::Continue
                }
            }
        }
    }

    /// End a session the user did not close.
    async fn disconnect<S>(&mut self, codec: &mut WebSocketCodec<S>, error: Error)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(code) = error.close_code() {
            let _ = write_frame(codec, &Frame::close(Some(code), "")).await;
        }
        let _ = codec.shutdown().await;
        self.set_phase(ConnectionPhase::Closed);
        if !self.user_closed() {
            self.callbacks.disconnected(error);
        }
    }

    /// User-initiated close. `done` is `None` when every handle was dropped.
    async fn close<S>(&mut self, codec: &mut WebSocketCodec<S>, done: Option<Completion>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.mark_user_closed();
        self.set_phase(ConnectionPhase::Closing);

        let result = self.close_handshake(codec).await;
        let _ = codec.shutdown().await;
        self.set_phase(ConnectionPhase::Closed);

        if let Err(error) = &result {
            self.fail(Operation::Close, error);
        }
        if let Some(done) = done {
            done(result);
        }
    }

    /// Send a normal close and wait for the peer's close or end of stream.
    ///
    /// Text messages that arrive before the peer acknowledges are still
    /// delivered.
    async fn close_handshake<S>(&mut self, codec: &mut WebSocketCodec<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        write_frame(codec, &Frame::close(Some(CloseCode::Normal.as_u16()), "")).await?;

        let limit = self.config.timeouts.close;
        let callbacks = &mut self.callbacks;
        let acknowledged = async {
            loop {
                match codec.read_frame().await {
                    Ok(frame) => match frame.opcode {
                        OpCode::Close => return Ok(()),
                        OpCode::Text if frame.fin => {
                            if let Ok(text) = String::from_utf8(frame.into_payload()) {
                                callbacks.message(Ok(text));
                            }
                        }
                        _ => {}
                    },
                    Err(error) if error.is_teardown() => return Ok(()),
                    Err(error) => return Err(error),
                }
            }
        };

        timeout(limit, acknowledged)
            .await
            .map_err(|_| Error::CloseTimeout(limit))?
    }

    /// Settle whatever is still queued once the lane is done.
    ///
    /// A queued close succeeds if the user asked for it and the session
    /// ended in `Closed` before the lane reached it. Everything else is
    /// rejected.
    fn drain(&mut self) {
        self.commands.close();
        let phase = *self.phase.borrow();
        let closed = phase == ConnectionPhase::Closed && self.user_closed();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Close { done } if closed => done(Ok(())),
                command => {
                    let error = Error::NotOpen(phase);
                    self.fail(command.operation(), &error);
                    command.reject(error);
                }
            }
        }
    }
}

async fn write_frame<S>(codec: &mut WebSocketCodec<S>, frame: &Frame) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    codec.write_frame(frame).await?;
    codec.flush().await
}

/// Resolve, connect and upgrade, publishing each phase as it starts.
async fn establish(
    endpoint: &Endpoint,
    config: &Config,
    phase: &watch::Sender<ConnectionPhase>,
    sink: &dyn EventSink,
) -> std::result::Result<WebSocketCodec<TcpStream>, (Operation, Error)> {
    let addr = resolve(endpoint)
        .await
        .map_err(|e| (Operation::Resolve, e))?;

    publish(phase, sink, endpoint, ConnectionPhase::Connecting);
    let mut stream = connect(addr, config.timeouts.connect)
        .await
        .map_err(|e| (Operation::Connect, e))?;

    publish(phase, sink, endpoint, ConnectionPhase::Handshaking);
    let limit = config.timeouts.handshake;
    let buffered = match timeout(limit, handshake(&mut stream, endpoint, &config.limits)).await {
        Ok(result) => result,
        Err(_) => Err(Error::HandshakeTimeout(limit)),
    }
    .map_err(|e| (Operation::Handshake, e))?;

    Ok(WebSocketCodec::with_buffered(stream, config, &buffered))
}

/// First address for the endpoint.
async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr> {
    let failed = |reason: String| Error::Resolve {
        host: endpoint.host().to_string(),
        port: endpoint.port(),
        reason,
    };

    let mut addrs = tokio::net::lookup_host((endpoint.host(), endpoint.port()))
        .await
        .map_err(|e| failed(e.to_string()))?;
    addrs.next().ok_or_else(|| failed("no addresses found".into()))
}

async fn connect(addr: SocketAddr, limit: std::time::Duration) -> Result<TcpStream> {
    let stream = timeout(limit, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::ConnectTimeout(limit))?
        .map_err(|e| Error::Connect(format!("{addr}: {e}")))?;
    stream
        .set_nodelay(true)
        .map_err(|e| Error::Connect(format!("{addr}: {e}")))?;
    Ok(stream)
}

/// Perform the client handshake on `stream`.
///
/// Returns any bytes the server sent after the response head; they belong to
/// the first frames of the session.
pub(crate) async fn handshake<S>(stream: &mut S, endpoint: &Endpoint, limits: &Limits) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_failed = |e: std::io::Error| Error::InvalidHandshake(format!("I/O error: {e}"));

    let request = HandshakeRequest::for_endpoint(endpoint)?;
    let mut out = Vec::with_capacity(256);
    request.write(&mut out)?;
    stream.write_all(&out).await.map_err(io_failed)?;
    stream.flush().await.map_err(io_failed)?;

    let mut response = BytesMut::with_capacity(1024);
    loop {
        let n = stream.read_buf(&mut response).await.map_err(io_failed)?;
        if n == 0 {
            return Err(Error::InvalidHandshake(
                "Connection closed during handshake".into(),
            ));
        }

        if let Some(end) = find_head_end(&response) {
            limits.check_handshake_size(end)?;
            HandshakeResponse::parse(&response[..end])?.verify(&request)?;
            return Ok(response[end..].to_vec());
        }
        limits.check_handshake_size(response.len())?;
    }
}
