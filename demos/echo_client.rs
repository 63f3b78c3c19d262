//! Connects to an echo server, sends one message, waits for the echo and closes.
//!
//! ```text
//! WSLANE_HOST=127.0.0.1 WSLANE_PORT=9001 RUST_LOG=debug cargo run --example echo_client
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use wslane::{Callbacks, ClientConnection, Endpoint};

#[derive(Debug)]
enum Progress {
    Connected(wslane::Result<()>),
    Message(wslane::Result<String>),
    Disconnected(wslane::Error),
    Closed(wslane::Result<()>),
}

fn endpoint_from_env() -> Endpoint {
    let host = std::env::var("WSLANE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("WSLANE_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(9001);
    let path = std::env::var("WSLANE_PATH").unwrap_or_else(|_| "/".to_string());
    Endpoint::new(host, path, port)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = Arc::new(ClientConnection::new(
            endpoint_from_env(),
            tokio::runtime::Handle::current(),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let (on_connect, on_message, on_disconnect) = (tx.clone(), tx.clone(), tx.clone());
        client.connect(
            Callbacks::new()
                .on_connect(move |result| {
                    let _ = on_connect.send(Progress::Connected(result));
                })
                .on_message(move |message| {
                    let _ = on_message.send(Progress::Message(message));
                })
                .on_disconnect(move |error| {
                    let _ = on_disconnect.send(Progress::Disconnected(error));
                }),
        );

        while let Some(progress) = rx.recv().await {
            match progress {
                Progress::Connected(Ok(())) => {
                    tracing::info!(endpoint = %client.endpoint(), "connected");
                    client.send("Hello, WebSocket!", |result| {
                        tracing::info!(?result, "send completed");
                    });
                }
                Progress::Connected(Err(error)) => {
                    tracing::error!(%error, "connect failed");
                    break;
                }
                Progress::Message(Ok(text)) => {
                    tracing::info!(%text, "received");
                    let tx = tx.clone();
                    client.close(move |result| {
                        let _ = tx.send(Progress::Closed(result));
                    });
                }
                Progress::Message(Err(error)) => tracing::warn!(%error, "unreadable message"),
                Progress::Disconnected(error) => {
                    tracing::warn!(%error, "disconnected");
                    break;
                }
                Progress::Closed(result) => {
                    tracing::info!(?result, "closed");
                    break;
                }
            }
        }
    });

    Ok(())
}
