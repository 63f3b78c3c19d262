//! Consumer notifications.

use crate::error::{Error, Result};

type ConnectFn = Box<dyn FnMut(Result<()>) + Send + 'static>;
type MessageFn = Box<dyn FnMut(Result<String>) + Send + 'static>;
type DisconnectFn = Box<dyn FnMut(Error) + Send + 'static>;

/// Single-shot completion for one `send` or `close`.
pub type Completion = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Notifications registered with [`connect`](crate::ClientConnection::connect).
///
/// Every callback is optional; a missing one is a no-op. Callbacks run on a
/// runtime worker thread and may call back into the same connection.
///
/// ```
/// use wslane::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_connect(|result| println!("connected: {result:?}"))
///     .on_message(|message| println!("message: {message:?}"))
///     .on_disconnect(|error| println!("disconnected: {error}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    connect: Option<ConnectFn>,
    message: Option<MessageFn>,
    disconnect: Option<DisconnectFn>,
}

impl Callbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once with the outcome of establishing the connection.
    #[must_use]
    pub fn on_connect(mut self, f: impl FnMut(Result<()>) + Send + 'static) -> Self {
        self.connect = Some(Box::new(f));
        self
    }

    /// Called for each text message, or with an error for a frame that
    /// cannot be delivered as text.
    #[must_use]
    pub fn on_message(mut self, f: impl FnMut(Result<String>) + Send + 'static) -> Self {
        self.message = Some(Box::new(f));
        self
    }

    /// Called at most once when the open session ends without `close`.
    #[must_use]
    pub fn on_disconnect(mut self, f: impl FnMut(Error) + Send + 'static) -> Self {
        self.disconnect = Some(Box::new(f));
        self
    }

    pub(crate) fn connected(&mut self, result: Result<()>) {
        if let Some(f) = self.connect.as_mut() {
            f(result);
        }
    }

    pub(crate) fn message(&mut self, message: Result<String>) {
        if let Some(f) = self.message.as_mut() {
            f(message);
        }
    }

    pub(crate) fn disconnected(&mut self, error: Error) {
        if let Some(f) = self.disconnect.as_mut() {
            f(error);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_connect", &self.connect.is_some())
            .field("on_message", &self.message.is_some())
            .field("on_disconnect", &self.disconnect.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_missing_callbacks_are_noops() {
        let mut callbacks = Callbacks::new();
        callbacks.connected(Ok(()));
        callbacks.message(Ok("hi".into()));
        callbacks.disconnected(Error::Aborted);
    }

    #[test]
    fn test_callbacks_receive_values() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());
        let mut callbacks = Callbacks::new()
            .on_connect(move |r| a.lock().unwrap().push(format!("connect {}", r.is_ok())))
            .on_message(move |m| b.lock().unwrap().push(format!("message {}", m.unwrap())))
            .on_disconnect(move |e| c.lock().unwrap().push(format!("disconnect {e}")));

        callbacks.connected(Ok(()));
        callbacks.message(Ok("hello".into()));
        callbacks.disconnected(Error::Aborted);

        assert_eq!(
            *seen.lock().unwrap(),
            ["connect true", "message hello", "disconnect Operation aborted"]
        );
    }

    #[test]
    fn test_debug_shows_registration() {
        let callbacks = Callbacks::new().on_message(|_| {});
        let debug = format!("{callbacks:?}");
        assert!(debug.contains("on_connect: false"));
        assert!(debug.contains("on_message: true"));
    }
}
