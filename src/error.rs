// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `homelink` crate.
//!
//! Errors are split by where they originate: opening and driving hardware
//! handles, sampling the bus sensor, talking to the remote store, and the
//! bridge's own lifecycle. The umbrella [`Error`] wraps all of them.

use thiserror::Error;

use crate::bridge::BridgeState;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A hardware handle could not be opened or was misused.
    #[error("peripheral error: {0}")]
    Peripheral(#[from] PeripheralError),

    /// A sample could not be taken from the bus sensor.
    #[error("sample error: {0}")]
    Sample(#[from] SampleError),

    /// The remote store rejected or failed an operation.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The reconciliation bridge was driven from the wrong state.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Errors raised while opening or using a bus or pin handle.
///
/// These are surfaced synchronously to whoever called `open`/`close`; a
/// component whose `open` fails never starts its background activity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeripheralError {
    /// The port does not exist or could not be opened.
    #[error("peripheral {name} unavailable: {reason}")]
    Unavailable {
        /// Logical port name.
        name: String,
        /// Why the provider refused the handle.
        reason: String,
    },

    /// Another handle to the same line or bus address is still open.
    #[error("peripheral {name} is already claimed")]
    AlreadyClaimed {
        /// Logical port name (with address for bus devices).
        name: String,
    },

    /// The handle was used after `close`.
    #[error("handle used after close")]
    Closed,

    /// The line rejected a configuration or level change.
    #[error("pin error: {0}")]
    Pin(String),

    /// A raw bus transfer failed.
    #[error("bus error: {0}")]
    Bus(String),
}

impl PeripheralError {
    /// Returns true for the open-time failures the caller must not retry
    /// through the same component instance.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::AlreadyClaimed { .. })
    }
}

/// Errors produced by a single sampling tick.
///
/// A read failure is transient: it is handed to the listener and the
/// periodic task keeps going on the next tick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleError {
    /// The write/read exchange with the sensor failed.
    #[error("sample read failed: {0}")]
    ReadFailure(String),

    /// The engine has no open bus handle.
    #[error("sampling engine is not open")]
    NotOpen,
}

impl From<PeripheralError> for SampleError {
    fn from(e: PeripheralError) -> Self {
        match e {
            PeripheralError::Closed => Self::NotOpen,
            other => Self::ReadFailure(other.to_string()),
        }
    }
}

/// Errors reported by the remote shared-state store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// A field write was not accepted.
    #[error("write to {path} failed: {reason}")]
    WriteFailure {
        /// Record path that was written.
        path: String,
        /// Store-provided reason.
        reason: String,
    },

    /// The identity collaborator refused the session.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// The store could not open a subscription.
    #[error("subscription failed: {0}")]
    SubscribeFailure(String),

    /// A record could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// An internal channel was closed.
    #[error("channel closed")]
    ChannelClosed,
}

/// Errors related to the bridge lifecycle.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An operation was attempted in a state that does not allow it.
    #[error("bridge is {actual}, expected {expected}")]
    InvalidState {
        /// State the operation requires.
        expected: BridgeState,
        /// State the bridge was in.
        actual: BridgeState,
    },

    /// The remote handshake failed and the bridge is now closed.
    #[error("handshake failed: {0}")]
    Handshake(#[source] RemoteError),

    /// A remote operation issued by the bridge failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
