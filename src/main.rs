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

//! Coordinate stream CLI.
//!
//! Connects to a WebSocket endpoint, sends a coordinate once the session is
//! open (optionally on an interval), and logs every inbound frame.

use std::time::Duration;

use clap::Parser;
use coord_client::{CoordStream, Coordinate, SendError, SessionConfig, SessionEvent, SessionState};
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "coordstream", about = "Stream coordinates to a WebSocket endpoint")]
struct Args {
    /// WebSocket endpoint URL
    #[arg(long, default_value = "ws://localhost:8080/coords")]
    url: String,

    /// Latitude to send, in degrees
    #[arg(long, default_value_t = 48.8345)]
    latitude: f64,

    /// Longitude to send, in degrees
    #[arg(long, default_value_t = 8.3819)]
    longitude: f64,

    /// Resend interval in seconds; sends once per connection if omitted
    #[arg(long)]
    interval: Option<u64>,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,
}

fn send_coordinate(stream: &CoordStream, coordinate: &Coordinate) {
    match stream.send(coordinate) {
        Ok(()) => info!(
            "-> latitude {} longitude {}",
            coordinate.latitude(),
            coordinate.longitude()
        ),
        Err(SendError::QueueFull) => warn!("Outbound queue full, dropping coordinate"),
        Err(e) => warn!("Send failed: {e}"),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let coordinate = match Coordinate::new(args.latitude, args.longitude) {
        Ok(coordinate) => coordinate,
        Err(e) => {
            error!("Invalid coordinate: {e}");
            std::process::exit(2);
        }
    };

    let mut stream = CoordStream::spawn(SessionConfig {
        endpoint: args.url.clone(),
        connect_timeout: Duration::from_secs(args.connect_timeout),
        ..Default::default()
    });

    if let Err(e) = stream.connect() {
        error!("Connect failed: {e}");
        std::process::exit(1);
    }
    info!("Streaming to {}", args.url);

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval.unwrap_or(3600)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = stream.recv() => match event {
                Some(SessionEvent::StateChanged(SessionState::Open)) => {
                    send_coordinate(&stream, &coordinate);
                }
                Some(SessionEvent::StateChanged(state)) => {
                    info!("Session state: {state}");
                }
                Some(SessionEvent::Message(text)) => {
                    info!("<- {text}");
                }
                Some(SessionEvent::MalformedMessage(reason)) => {
                    warn!("Malformed inbound frame: {reason}");
                }
                Some(SessionEvent::ConnectionFailed(reason)) => {
                    warn!("Connection failed: {reason}");
                }
                None => break,
            },

            _ = ticker.tick(), if args.interval.is_some() => {
                if stream.state() == SessionState::Open {
                    send_coordinate(&stream, &coordinate);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                stream.close();
            }
        }
    }

    info!("Session finished: {}", stream.metrics().snapshot().summary());
}
