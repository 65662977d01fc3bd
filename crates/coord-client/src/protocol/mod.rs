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

//! Protocol layer for the coordinate stream wire format.
//!
//! Outbound frames carry exactly one coordinate as a UTF-8 JSON text frame:
//!
//! ```text
//! {"Latitude":48.8345,"Longitude":8.3819}
//! ```
//!
//! Field names and capitalization are part of the protocol. Inbound frames
//! are opaque UTF-8 text surfaced verbatim to the caller.

use serde::Serialize;
use thiserror::Error;

/// Valid latitude range in degrees.
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
/// Valid longitude range in degrees.
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// Errors raised when constructing a [`Coordinate`] from invalid values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("{field} is not a finite number")]
    NotFinite { field: &'static str },
}

/// Errors raised when decoding an inbound frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// A validated geographic coordinate pair.
///
/// Values are checked on construction; a `Coordinate` that exists is always
/// finite and in range, so invalid values can never reach the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, validating range constraints.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() {
            return Err(CoordinateError::NotFinite { field: "latitude" });
        }
        if !longitude.is_finite() {
            return Err(CoordinateError::NotFinite { field: "longitude" });
        }
        if !(LATITUDE_RANGE.0..=LATITUDE_RANGE.1).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(LONGITUDE_RANGE.0..=LONGITUDE_RANGE.1).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Encode this coordinate as one wire frame.
    ///
    /// Both fields are finite f64 (enforced by the constructor), which always
    /// serializes cleanly.
    #[must_use]
    pub fn wire_frame(&self) -> String {
        serde_json::to_string(self).expect("coordinate serialization")
    }
}

/// Decode an inbound binary frame as UTF-8 text.
///
/// Text frames arrive pre-validated by the WebSocket layer; binary frames go
/// through here so undecodable payloads surface as [`FrameError`] instead of
/// tearing down the connection.
pub fn decode_frame(data: Vec<u8>) -> Result<String, FrameError> {
    Ok(String::from_utf8(data)?)
}
