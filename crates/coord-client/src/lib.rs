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

//! Coordinate stream client library.
//!
//! A reconnecting, backpressure-aware WebSocket client for streaming
//! geographic coordinates to a server. The crate is split into layers that
//! can be used independently or composed together:
//!
//! - **Protocol layer**: validated [`Coordinate`] values and the exact JSON
//!   wire frame format
//! - **Backoff layer**: exponential reconnect delays with a cap and jitter
//! - **Session layer**: async WebSocket session with automatic reconnection,
//!   a connect-timeout watchdog, endpoint hot-swap, and graceful shutdown
//!
//! # Quick Start
//!
//! ```no_run
//! use coord_client::{CoordStream, Coordinate, SessionConfig, SessionEvent, SessionState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut stream = CoordStream::spawn(SessionConfig {
//!         endpoint: "ws://localhost:8080/coords".to_string(),
//!         ..Default::default()
//!     });
//!     stream.connect().unwrap();
//!
//!     while let Some(event) = stream.recv().await {
//!         match event {
//!             SessionEvent::StateChanged(SessionState::Open) => {
//!                 let coordinate = Coordinate::new(48.8345, 8.3819).unwrap();
//!                 stream.send(&coordinate).unwrap();
//!             }
//!             SessionEvent::Message(text) => println!("{text}"),
//!             _ => {}
//!         }
//!     }
//! }
//! ```
//!
//! Sends never block: frames go into a bounded queue drained by the session
//! task, and a full queue surfaces [`SendError::QueueFull`] so the caller
//! decides whether to buffer or drop.

pub mod backoff;
pub mod metrics;
pub mod protocol;
pub mod ws;

pub use backoff::Backoff;
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use protocol::{Coordinate, CoordinateError, FrameError};
pub use ws::{ConnectError, CoordStream, SendError, SessionConfig, SessionEvent, SessionState};
