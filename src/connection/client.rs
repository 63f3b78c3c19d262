use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::config::Config;
use crate::connection::ConnectionPhase;
use crate::connection::callbacks::Callbacks;
use crate::connection::lane::{Command, Lane, publish};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::observe::{EventSink, Operation, TracingSink};

/// A WebSocket client for one endpoint.
///
/// All methods are non-blocking and take `&self`: they hand work to the
/// connection's lane, a task spawned on the runtime passed at construction,
/// and report outcomes through callbacks that run on that runtime. Wrap the
/// connection in an `Arc` to call it from inside its own callbacks.
///
/// Dropping the last handle while the connection is open sends a normal close
/// without invoking any callback.
///
/// ## Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use wslane::{Callbacks, ClientConnection, Endpoint};
///
/// # fn demo(handle: tokio::runtime::Handle) {
/// let client = Arc::new(ClientConnection::new(
///     Endpoint::new("127.0.0.1", "/", 9001),
///     handle,
/// ));
///
/// let sender = client.clone();
/// client.connect(
///     Callbacks::new()
///         .on_connect(move |result| {
///             if result.is_ok() {
///                 sender.send("Hello, WebSocket!", |sent| println!("sent: {sent:?}"));
///             }
///         })
///         .on_message(|message| println!("received: {message:?}")),
/// );
/// # }
/// ```
pub struct ClientConnection {
    endpoint: Endpoint,
    config: Config,
    handle: Handle,
    sink: Arc<dyn EventSink>,
    phase: Arc<watch::Sender<ConnectionPhase>>,
    commands: mpsc::Sender<Command>,
    /// Shared with the lane; set the moment `close` is called.
    closed_by_user: Arc<AtomicBool>,
    /// Taken by the first `connect`.
    pending_lane: Mutex<Option<mpsc::Receiver<Command>>>,
}

impl ClientConnection {
    /// Create an idle connection with the default configuration.
    #[must_use]
    pub fn new(endpoint: Endpoint, handle: Handle) -> Self {
        Self::with_config(endpoint, Config::default(), handle)
    }

    #[must_use]
    pub fn with_config(endpoint: Endpoint, config: Config, handle: Handle) -> Self {
        let (commands, receiver) = mpsc::channel(config.send_queue_capacity.max(1));
        let (phase, _) = watch::channel(ConnectionPhase::Idle);
        Self {
            endpoint,
            config,
            handle,
            sink: Arc::new(TracingSink),
            phase: Arc::new(phase),
            commands,
            closed_by_user: Arc::default(),
            pending_lane: Mutex::new(Some(receiver)),
        }
    }

    /// Report events to `sink` instead of `tracing`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase change.
    #[must_use]
    pub fn phase_changes(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.subscribe()
    }

    /// Start connecting.
    ///
    /// `on_connect` fires exactly once with the outcome. Calling `connect`
    /// again fails that call's `on_connect` with [`Error::AlreadyStarted`]
    /// and leaves the running connection untouched.
    pub fn connect(&self, callbacks: Callbacks) {
        let receiver = match self.pending_lane.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let Some(commands) = receiver else {
            let error = Error::AlreadyStarted(self.phase());
            self.sink.failed(&self.endpoint, Operation::Connect, &error);
            let mut callbacks = callbacks;
            self.handle.spawn(async move { callbacks.connected(Err(error)) });
            return;
        };

        publish(
            &self.phase,
            &*self.sink,
            &self.endpoint,
            ConnectionPhase::Resolving,
        );
        let lane = Lane::new(
            self.endpoint.clone(),
            self.config.clone(),
            self.phase.clone(),
            self.sink.clone(),
            commands,
            callbacks,
            self.closed_by_user.clone(),
        );
        self.handle.spawn(lane.run());
    }

    /// Queue `text` to be sent as one text message.
    ///
    /// `on_send` fires once: with `Ok(())` after the frame is written, or with
    /// [`Error::NotOpen`] if the connection is not open, or with
    /// [`Error::SendQueueFull`] if too many sends are already waiting.
    pub fn send(
        &self,
        text: impl Into<String>,
        on_send: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        let command = Command::Send {
            text: text.into(),
            done: Box::new(on_send),
        };

        let phase = self.phase();
        if !phase.can_send() {
            return self.reject(command, Error::NotOpen(phase));
        }

        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                self.reject(command, Error::SendQueueFull(self.commands.max_capacity()));
            }
            Err(TrySendError::Closed(command)) => {
                let phase = self.phase();
                self.reject(command, Error::NotOpen(phase));
            }
        }
    }

    /// Close the connection.
    ///
    /// While open, sends a normal close and waits for the peer; sends queued
    /// earlier are written first. While still connecting, abandons the attempt
    /// (`on_connect` receives [`Error::Aborted`]). `on_close` fires once with
    /// the outcome; closing an idle or finished connection fails it with
    /// [`Error::NotOpen`].
    ///
    /// Once `close` is accepted, `on_disconnect` never fires, even if the
    /// peer closes before the lane gets to the request.
    pub fn close(&self, on_close: impl FnOnce(Result<()>) + Send + 'static) {
        let command = Command::Close {
            done: Box::new(on_close),
        };

        let phase = self.phase();
        if phase == ConnectionPhase::Idle || phase.is_terminal() {
            return self.reject(command, Error::NotOpen(phase));
        }

        // From here on a peer teardown must not reach `on_disconnect`.
        self.closed_by_user.store(true, Ordering::Release);

        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                // A close is never refused for backpressure; wait for room.
                let commands = self.commands.clone();
                let phase = self.phase.clone();
                self.handle.spawn(async move {
                    if let Err(mpsc::error::SendError(command)) = commands.send(command).await {
                        command.reject(Error::NotOpen(*phase.borrow()));
                    }
                });
            }
            Err(TrySendError::Closed(command)) => {
                let phase = self.phase();
                self.reject(command, Error::NotOpen(phase));
            }
        }
    }

    /// Log `error` and fail `command` on the runtime.
    fn reject(&self, command: Command, error: Error) {
        self.sink.failed(&self.endpoint, command.operation(), &error);
        self.handle.spawn(async move { command.reject(error) });
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("endpoint", &self.endpoint)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
