// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Async WebSocket session layer with automatic reconnection.
//!
//! Provides a session handle that manages one logical WebSocket session with
//! exponential-backoff reconnection, a connect-timeout watchdog, endpoint
//! hot-swap, and graceful shutdown. At most one underlying socket exists at
//! any time.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::metrics::SessionMetrics;
use crate::protocol::{self, Coordinate};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for a coordinate stream session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint URL, scheme `ws` or `wss`.
    pub endpoint: String,
    /// Watchdog for the connect + upgrade handshake.
    pub connect_timeout: Duration,
    /// First reconnect delay; doubles per failed attempt.
    pub base_delay: Duration,
    /// Reconnect delay cap.
    pub max_delay: Duration,
    /// Relative jitter spread around each reconnect delay.
    pub jitter_factor: f64,
    /// Bounded outbound frame/command queue depth.
    pub command_capacity: usize,
    /// Bounded event channel depth.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8080/coords".to_string(),
            connect_timeout: Duration::from_secs(10),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
            command_capacity: 64,
            event_capacity: 256,
        }
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No socket; idle or waiting out a reconnect delay.
    Disconnected,
    /// Connect + upgrade in flight.
    Connecting,
    /// Socket established, frames flow.
    Open,
    /// Graceful shutdown in progress.
    Closing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// Events emitted by the session, delivered in occurrence order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Session state changed.
    StateChanged(SessionState),
    /// One inbound text frame, verbatim.
    Message(String),
    /// An inbound frame could not be decoded; the connection stays up.
    MalformedMessage(String),
    /// The transport failed or the server closed; reconnection follows
    /// unless the session was explicitly closed.
    ConnectionFailed(String),
}

/// Errors returned by [`CoordStream::send`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("session is not open")]
    NotConnected,

    #[error("outbound queue is full")]
    QueueFull,

    #[error("session was closed")]
    Closed,
}

/// Errors returned by [`CoordStream::connect`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("session was closed")]
    Closed,
}

enum Command {
    Connect,
    Send(String),
}

/// Why an open connection stopped.
enum SessionExit {
    EndpointChanged,
    ClosedByServer,
    Cancelled,
}

/// Handle to a managed coordinate stream session.
///
/// The session runs in a background task and reconnects automatically with
/// exponential backoff. Use [`recv`](Self::recv) to observe events,
/// [`send`](Self::send) to enqueue frames, and [`close`](Self::close) for a
/// graceful, terminal shutdown.
pub struct CoordStream {
    command_tx: mpsc::Sender<Command>,
    event_rx: mpsc::Receiver<SessionEvent>,
    state_rx: watch::Receiver<SessionState>,
    endpoint_tx: watch::Sender<String>,
    cancel_token: CancellationToken,
    metrics: Arc<SessionMetrics>,
}

impl std::fmt::Debug for CoordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordStream")
            .field("state", &*self.state_rx.borrow())
            .field("endpoint", &*self.endpoint_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl CoordStream {
    /// Spawn the background session task.
    ///
    /// The session starts out Disconnected; call [`connect`](Self::connect)
    /// to initiate the socket.
    #[must_use]
    pub fn spawn(config: SessionConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (endpoint_tx, endpoint_rx) = watch::channel(config.endpoint.clone());
        let cancel_token = CancellationToken::new();
        let metrics = Arc::new(SessionMetrics::new());

        let task_cancel = cancel_token.clone();
        let task_metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            session_loop(
                config,
                command_rx,
                event_tx,
                state_tx,
                endpoint_rx,
                task_cancel,
                task_metrics,
            )
            .await;
        });

        Self {
            command_tx,
            event_rx,
            state_rx,
            endpoint_tx,
            cancel_token,
            metrics,
        }
    }

    /// Initiate the connection; no-op if already Connecting or Open.
    pub fn connect(&self) -> Result<(), ConnectError> {
        if self.cancel_token.is_cancelled() {
            return Err(ConnectError::Closed);
        }
        match *self.state_rx.borrow() {
            SessionState::Connecting | SessionState::Open => return Ok(()),
            SessionState::Closing => return Err(ConnectError::Closed),
            SessionState::Disconnected => {}
        }
        match self.command_tx.try_send(Command::Connect) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                // The session task drains commands while idle; a full queue
                // means a wakeup is already pending.
                debug!("Command queue full, connect already pending");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ConnectError::Closed),
        }
    }

    /// Enqueue one coordinate for transmission.
    ///
    /// Never blocks: the frame goes into the bounded outbound queue and is
    /// written by the session task. Fails with [`SendError::NotConnected`]
    /// unless the session is Open, and with [`SendError::QueueFull`] when the
    /// caller outruns the transport; buffering or dropping on backpressure is
    /// the caller's policy.
    pub fn send(&self, coordinate: &Coordinate) -> Result<(), SendError> {
        if self.cancel_token.is_cancelled() {
            return Err(SendError::Closed);
        }
        if *self.state_rx.borrow() != SessionState::Open {
            return Err(SendError::NotConnected);
        }
        match self.command_tx.try_send(Command::Send(coordinate.wire_frame())) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(SendError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Receive the next session event.
    ///
    /// Returns `None` once the session has fully shut down.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Change the endpoint URL.
    ///
    /// The session drops the current socket and reconnects to the new
    /// endpoint immediately.
    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        let _ = self.endpoint_tx.send(endpoint.into());
    }

    /// The currently configured endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.endpoint_tx.borrow().clone()
    }

    /// Session counters.
    #[must_use]
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Close the session: cancels any pending reconnect timer or in-flight
    /// connect attempt, sends a WebSocket Close frame if a socket is open,
    /// and suppresses reconnection. Terminal for this handle.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for CoordStream {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn emit(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("Event receiver dropped");
    }
}

async fn transition(
    state_tx: &watch::Sender<SessionState>,
    event_tx: &mpsc::Sender<SessionEvent>,
    next: SessionState,
) {
    let changed = state_tx.send_if_modified(|state| {
        if *state == next {
            false
        } else {
            *state = next;
            true
        }
    });
    if changed {
        emit(event_tx, SessionEvent::StateChanged(next)).await;
    }
}

/// Frames accepted while a socket was open but never written are dropped on
/// disconnect, never replayed onto the next connection.
fn discard_queued_frames(command_rx: &mut mpsc::Receiver<Command>) {
    let mut dropped = 0_usize;
    while let Ok(command) = command_rx.try_recv() {
        if matches!(command, Command::Send(_)) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!("Dropped {dropped} queued frame(s) on disconnect");
    }
}

async fn session_loop(
    config: SessionConfig,
    mut command_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
    mut endpoint_rx: watch::Receiver<String>,
    cancel_token: CancellationToken,
    metrics: Arc<SessionMetrics>,
) {
    // Idle until the first connect request, then hand off to the reconnect
    // loop, which only returns once the session is cancelled.
    loop {
        let start = tokio::select! {
            () = cancel_token.cancelled() => false,
            cmd = command_rx.recv() => match cmd {
                Some(Command::Connect) => true,
                Some(Command::Send(_)) => {
                    warn!("Dropping frame enqueued while disconnected");
                    continue;
                }
                None => false,
            },
        };

        if start {
            connect_loop(
                &config,
                &mut command_rx,
                &event_tx,
                &state_tx,
                &mut endpoint_rx,
                &cancel_token,
                &metrics,
            )
            .await;
        }
        break;
    }

    transition(&state_tx, &event_tx, SessionState::Closing).await;
    transition(&state_tx, &event_tx, SessionState::Disconnected).await;
    debug!("Session task finished");
}

async fn connect_loop(
    config: &SessionConfig,
    command_rx: &mut mpsc::Receiver<Command>,
    event_tx: &mpsc::Sender<SessionEvent>,
    state_tx: &watch::Sender<SessionState>,
    endpoint_rx: &mut watch::Receiver<String>,
    cancel_token: &CancellationToken,
    metrics: &SessionMetrics,
) {
    let mut backoff = Backoff::new(config.base_delay, config.max_delay, config.jitter_factor);

    loop {
        let endpoint = endpoint_rx.borrow_and_update().clone();

        transition(state_tx, event_tx, SessionState::Connecting).await;
        metrics.record_connect_attempt();
        info!("Connecting to {endpoint}...");

        let connected = tokio::select! {
            result = timeout(config.connect_timeout, connect_async(endpoint.as_str())) => result,
            () = cancel_token.cancelled() => return,
        };

        match connected {
            Ok(Ok((ws, _response))) => {
                info!("Connected to {endpoint}");
                metrics.record_open();
                backoff.reset();
                transition(state_tx, event_tx, SessionState::Open).await;

                let exit = drive_open(
                    ws,
                    &endpoint,
                    command_rx,
                    event_tx,
                    state_tx,
                    endpoint_rx,
                    cancel_token,
                    metrics,
                )
                .await;
                metrics.record_disconnect();
                discard_queued_frames(command_rx);

                match exit {
                    Ok(SessionExit::Cancelled) => return,
                    Ok(SessionExit::EndpointChanged) => {
                        info!("Endpoint changed, reconnecting immediately...");
                        transition(state_tx, event_tx, SessionState::Disconnected).await;
                        continue;
                    }
                    Ok(SessionExit::ClosedByServer) => {
                        info!("Connection closed by server");
                        emit(
                            event_tx,
                            SessionEvent::ConnectionFailed(
                                "connection closed by server".to_string(),
                            ),
                        )
                        .await;
                    }
                    Err(e) => {
                        error!("Connection error: {e}");
                        emit(event_tx, SessionEvent::ConnectionFailed(e.to_string())).await;
                    }
                }
            }
            Ok(Err(e)) => {
                error!("Connect to {endpoint} failed: {e}");
                emit(event_tx, SessionEvent::ConnectionFailed(e.to_string())).await;
            }
            Err(_elapsed) => {
                error!(
                    "Connect to {endpoint} timed out after {:?}",
                    config.connect_timeout
                );
                emit(
                    event_tx,
                    SessionEvent::ConnectionFailed(format!(
                        "connect timed out after {:?}",
                        config.connect_timeout
                    )),
                )
                .await;
            }
        }

        transition(state_tx, event_tx, SessionState::Disconnected).await;

        let delay = backoff.next_delay();
        warn!(
            "Reconnecting to {endpoint} in {} ms (attempt {})",
            delay.as_millis(),
            backoff.attempt()
        );
        tokio::select! {
            () = sleep(delay) => {}
            () = cancel_token.cancelled() => return,
        }
    }
}

#[allow(clippy::too_many_arguments, reason = "task plumbing, mirrors session_loop")]
async fn drive_open(
    ws: WsStream,
    endpoint: &str,
    command_rx: &mut mpsc::Receiver<Command>,
    event_tx: &mpsc::Sender<SessionEvent>,
    state_tx: &watch::Sender<SessionState>,
    endpoint_rx: &mut watch::Receiver<String>,
    cancel_token: &CancellationToken,
    metrics: &SessionMetrics,
) -> Result<SessionExit, tungstenite::Error> {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                transition(state_tx, event_tx, SessionState::Closing).await;
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!("Close frame not delivered: {e}");
                }
                return Ok(SessionExit::Cancelled);
            }

            cmd = command_rx.recv() => match cmd {
                Some(Command::Send(frame)) => {
                    sink.send(Message::Text(frame)).await?;
                    metrics.record_frame_sent();
                }
                Some(Command::Connect) => {} // already open
                None => {
                    // Handle dropped without an explicit close()
                    transition(state_tx, event_tx, SessionState::Closing).await;
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionExit::Cancelled);
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    metrics.record_frame_received();
                    emit(event_tx, SessionEvent::Message(text)).await;
                }
                Some(Ok(Message::Binary(data))) => match protocol::decode_frame(data) {
                    Ok(text) => {
                        metrics.record_frame_received();
                        emit(event_tx, SessionEvent::Message(text)).await;
                    }
                    Err(e) => {
                        metrics.record_malformed_frame();
                        warn!("Undecodable frame from {endpoint}: {e}");
                        emit(event_tx, SessionEvent::MalformedMessage(e.to_string())).await;
                    }
                },
                Some(Ok(Message::Close(_))) | None => return Ok(SessionExit::ClosedByServer),
                Some(Ok(_)) => {} // ping/pong, handled by tungstenite
                Some(Err(e)) => return Err(e),
            },

            changed = endpoint_rx.changed() => {
                if changed.is_err() {
                    return Ok(SessionExit::Cancelled);
                }
                let new_endpoint = endpoint_rx.borrow_and_update().clone();
                if new_endpoint != endpoint {
                    info!("Endpoint changed from {endpoint} to {new_endpoint}");
                    return Ok(SessionExit::EndpointChanged);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn test_config(endpoint: String) -> SessionConfig {
        SessionConfig {
            endpoint,
            connect_timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            ..Default::default()
        }
    }

    async fn wait_for_state(stream: &mut CoordStream, target: SessionState) {
        loop {
            match stream.recv().await {
                Some(SessionEvent::StateChanged(state)) if state == target => return,
                Some(_) => {}
                None => panic!("session ended before reaching {target}"),
            }
        }
    }

    async fn wait_for_message(stream: &mut CoordStream) -> String {
        loop {
            match stream.recv().await {
                Some(SessionEvent::Message(text)) => return text,
                Some(_) => {}
                None => panic!("session ended before a message arrived"),
            }
        }
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails() {
        let stream = CoordStream::spawn(test_config("ws://127.0.0.1:1/coords".to_string()));
        let coordinate = Coordinate::new(48.8345, 8.3819).unwrap();

        assert_eq!(stream.send(&coordinate), Err(SendError::NotConnected));
        assert_eq!(stream.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_and_connect_after_close_fail_fast() {
        let stream = CoordStream::spawn(test_config("ws://127.0.0.1:1/coords".to_string()));
        stream.close();

        let coordinate = Coordinate::new(48.8345, 8.3819).unwrap();
        assert_eq!(stream.send(&coordinate), Err(SendError::Closed));
        assert_eq!(stream.connect(), Err(ConnectError::Closed));
    }

    #[tokio::test]
    async fn test_connect_send_receive_ack() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            let frame = ws.next().await.unwrap().unwrap();
            assert_eq!(
                frame.into_text().unwrap(),
                r#"{"Latitude":48.8345,"Longitude":8.3819}"#
            );

            ws.send(Message::Text("ack".to_string())).await.unwrap();

            // Hold the socket open until the client closes
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let mut stream = CoordStream::spawn(test_config(format!("ws://{addr}/coords")));
        stream.connect().unwrap();
        wait_for_state(&mut stream, SessionState::Open).await;

        let coordinate = Coordinate::new(48.8345, 8.3819).unwrap();
        stream.send(&coordinate).unwrap();

        assert_eq!(wait_for_message(&mut stream).await, "ack");

        stream.close();
        server.await.unwrap();

        assert_eq!(stream.metrics().snapshot().frames_sent, 1);
        assert_eq!(stream.metrics().snapshot().frames_received, 1);
    }

    #[tokio::test]
    async fn test_binary_utf8_surfaced_and_garbage_flagged() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            ws.send(Message::Binary(vec![0xff, 0xfe])).await.unwrap();
            ws.send(Message::Binary(b"still here".to_vec())).await.unwrap();

            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let mut stream = CoordStream::spawn(test_config(format!("ws://{addr}/coords")));
        stream.connect().unwrap();
        wait_for_state(&mut stream, SessionState::Open).await;

        let mut saw_malformed = false;
        loop {
            match stream.recv().await {
                Some(SessionEvent::MalformedMessage(_)) => saw_malformed = true,
                Some(SessionEvent::Message(text)) => {
                    // The malformed frame must not have torn down the session
                    assert_eq!(text, "still here");
                    break;
                }
                Some(_) => {}
                None => panic!("session ended early"),
            }
        }
        assert!(saw_malformed);
        assert_eq!(stream.state(), SessionState::Open);

        stream.close();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_during_reconnect_stops_attempts() {
        // Bind then drop to get an address that refuses connections
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut stream = CoordStream::spawn(SessionConfig {
            endpoint: format!("ws://{addr}/coords"),
            base_delay: Duration::from_secs(30),
            ..Default::default()
        });
        stream.connect().unwrap();

        // Wait until the first attempt has failed and the backoff timer runs
        loop {
            match stream.recv().await {
                Some(SessionEvent::ConnectionFailed(_)) => break,
                Some(_) => {}
                None => panic!("session ended early"),
            }
        }

        stream.close();

        // Drain to the end: no further connect attempts may appear
        while let Some(event) = stream.recv().await {
            assert!(
                !matches!(event, SessionEvent::StateChanged(SessionState::Connecting)),
                "reconnect attempted after close()"
            );
        }
        assert_eq!(stream.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnects_after_server_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // First connection: accept and drop immediately
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = accept_async(tcp).await.unwrap();
            drop(ws);

            // Second connection: stay up and greet
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text("back".to_string())).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let mut stream = CoordStream::spawn(test_config(format!("ws://{addr}/coords")));
        stream.connect().unwrap();

        wait_for_state(&mut stream, SessionState::Open).await;
        wait_for_state(&mut stream, SessionState::Disconnected).await;
        wait_for_state(&mut stream, SessionState::Open).await;
        assert_eq!(wait_for_message(&mut stream).await, "back");

        stream.close();
        server.await.unwrap();

        let snapshot = stream.metrics().snapshot();
        assert_eq!(snapshot.opens, 2);
    }

    #[tokio::test]
    async fn test_endpoint_hot_swap_reconnects() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let first_addr = first.local_addr().unwrap();
        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second_addr = second.local_addr().unwrap();

        let first_server = tokio::spawn(async move {
            let (tcp, _) = first.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let second_server = tokio::spawn(async move {
            let (tcp, _) = second.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text("second".to_string())).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let mut stream = CoordStream::spawn(test_config(format!("ws://{first_addr}/coords")));
        stream.connect().unwrap();
        wait_for_state(&mut stream, SessionState::Open).await;

        stream.set_endpoint(format!("ws://{second_addr}/coords"));
        wait_for_state(&mut stream, SessionState::Open).await;
        assert_eq!(wait_for_message(&mut stream).await, "second");

        stream.close();
        first_server.await.unwrap();
        second_server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_is_noop_while_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let frame = ws.next().await.unwrap().unwrap();
            assert!(frame.into_text().unwrap().contains("Latitude"));
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let mut stream = CoordStream::spawn(test_config(format!("ws://{addr}/coords")));
        stream.connect().unwrap();
        wait_for_state(&mut stream, SessionState::Open).await;

        // A second connect must not disturb the open session
        stream.connect().unwrap();
        let coordinate = Coordinate::new(1.0, 2.0).unwrap();
        stream.send(&coordinate).unwrap();

        stream.close();
        server.await.unwrap();

        assert_eq!(stream.metrics().snapshot().opens, 1);
    }
}
