//! Recorders for callbacks and sink events.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use wslane::{Callbacks, ConnectionPhase, Endpoint, Error, EventSink, Operation, Result};

/// One callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(Result<()>),
    Message(Result<String>),
    Disconnect(Error),
    Sent(Result<()>),
    Closed(Result<()>),
}

/// Turns callbacks into an ordered stream of [`Event`]s.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Recorder {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn callbacks(&self) -> Callbacks {
        let (a, b, c) = (self.tx.clone(), self.tx.clone(), self.tx.clone());
        Callbacks::new()
            .on_connect(move |r| {
                let _ = a.send(Event::Connect(r));
            })
            .on_message(move |m| {
                let _ = b.send(Event::Message(m));
            })
            .on_disconnect(move |e| {
                let _ = c.send(Event::Disconnect(e));
            })
    }

    pub fn on_send(&self) -> impl FnOnce(Result<()>) + Send + 'static {
        let tx = self.tx.clone();
        move |r| {
            let _ = tx.send(Event::Sent(r));
        }
    }

    pub fn on_close(&self) -> impl FnOnce(Result<()>) + Send + 'static {
        let tx = self.tx.clone();
        move |r| {
            let _ = tx.send(Event::Closed(r));
        }
    }

    /// Next event; panics if none arrives within ten seconds.
    pub async fn next(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(10), self.rx.recv())
            .await
            .expect("timed out waiting for a callback")
            .expect("recorder channel closed")
    }

    /// Panics if any event arrives within `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(Some(event)) = tokio::time::timeout(window, self.rx.recv()).await {
            panic!("unexpected callback: {event:?}");
        }
    }
}

/// [`EventSink`] that keeps everything it is told.
#[derive(Default)]
pub struct RecordingSink {
    failures: Mutex<Vec<(Operation, Error)>>,
    phases: Mutex<Vec<ConnectionPhase>>,
}

impl RecordingSink {
    pub fn failures(&self) -> Vec<(Operation, Error)> {
        self.failures.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<ConnectionPhase> {
        self.phases.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn phase_changed(&self, _: &Endpoint, _: ConnectionPhase, to: ConnectionPhase) {
        self.phases.lock().unwrap().push(to);
    }

    fn failed(&self, _: &Endpoint, operation: Operation, error: &Error) {
        self.failures.lock().unwrap().push((operation, error.clone()));
    }
}
