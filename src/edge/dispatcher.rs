// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Edge dispatcher for one input line.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::PeripheralError;
use crate::hal::{DigitalLine, EdgeReceiver, PeripheralProvider};
use crate::task::BackgroundTask;
use crate::types::{ActiveLevel, EdgeEvent, PinConfig};

/// What the dispatcher should do after a callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeControl {
    /// Keep delivering edges to this callback.
    Continue,
    /// Unregister the callback; it is never invoked again.
    Unregister,
}

impl From<bool> for EdgeControl {
    /// `true` keeps monitoring, `false` unregisters.
    fn from(keep_monitoring: bool) -> Self {
        if keep_monitoring {
            Self::Continue
        } else {
            Self::Unregister
        }
    }
}

/// Owns one input line and delivers its edges to a callback.
///
/// Edges reach the callback in hardware order, one at a time, on the
/// dispatcher's own task. The callback must return quickly; it runs
/// between edges, not concurrently with them.
pub struct EdgeDispatcher {
    provider: Arc<dyn PeripheralProvider>,
    port: String,
    line: Option<Box<dyn DigitalLine>>,
    edges: Option<Arc<Mutex<EdgeReceiver>>>,
    active_level: ActiveLevel,
    task: Option<BackgroundTask>,
}

impl EdgeDispatcher {
    /// Creates a closed dispatcher for line `port`.
    #[must_use]
    pub fn new(provider: Arc<dyn PeripheralProvider>, port: impl Into<String>) -> Self {
        Self {
            provider,
            port: port.into(),
            line: None,
            edges: None,
            active_level: ActiveLevel::default(),
            task: None,
        }
    }

    /// Returns the line name.
    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Returns true while the line handle is held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.line.is_some()
    }

    /// Returns true while a callback is registered and has not unregistered
    /// itself.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Opens and configures the line for edge-triggered input.
    ///
    /// Use [`PinConfig::input`] for the usual active-low, both-edges button.
    /// If the dispatcher is already open it is closed first.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Unavailable`] or
    /// [`PeripheralError::AlreadyClaimed`] if the line cannot be opened or
    /// configured. Nothing is left open on failure.
    pub async fn open(&mut self, config: PinConfig) -> Result<(), PeripheralError> {
        self.close().await;

        let mut line = self.provider.open_pin(&self.port)?;
        let edges = line
            .configure(config)
            .and_then(|()| line.edges())
            .map_err(|e| PeripheralError::Unavailable {
                name: self.port.clone(),
                reason: e.to_string(),
            })
            .inspect_err(|e| {
                tracing::error!(port = %self.port, error = %e, "Failed to configure input line");
            })?;

        self.line = Some(line);
        self.edges = Some(Arc::new(Mutex::new(edges)));
        self.active_level = config.active_level;

        tracing::info!(
            port = %self.port,
            active_level = ?config.active_level,
            edge = ?config.edge,
            "Input line opened"
        );
        Ok(())
    }

    /// Reads the current logical level of the line.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Closed`] if the dispatcher is closed.
    pub fn level(&mut self) -> Result<bool, PeripheralError> {
        let line = self.line.as_mut().ok_or(PeripheralError::Closed)?;
        Ok(self.active_level.logical(line.is_high()?))
    }

    /// Registers `callback` for every edge, replacing any earlier one.
    ///
    /// The callback receives the new logical level and decides whether it
    /// stays registered. Edges that arrived while no callback was registered
    /// are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Closed`] if the dispatcher is closed.
    pub async fn on_edge<F>(&mut self, callback: F) -> Result<(), PeripheralError>
    where
        F: FnMut(EdgeEvent) -> EdgeControl + Send + 'static,
    {
        let edges = self.edges.clone().ok_or(PeripheralError::Closed)?;
        if let Some(task) = self.task.take() {
            task.stop().await;
        }

        let stale = drain_stale_edges(&mut *edges.lock().await);
        if stale > 0 {
            tracing::debug!(port = %self.port, count = stale, "Discarded edges with no callback");
        }

        let port = self.port.clone();
        let active_level = self.active_level;
        self.task = Some(BackgroundTask::spawn("edge-dispatch", move |cancel| {
            dispatch_loop(port, edges, active_level, callback, cancel)
        }));
        Ok(())
    }

    /// Unregisters the callback and releases the line.
    ///
    /// Once this returns the callback is never invoked again. Calling it on
    /// a closed dispatcher does nothing.
    pub async fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.stop().await;
        }
        self.edges = None;
        if self.line.take().is_some() {
            tracing::info!(port = %self.port, "Input line closed");
        }
    }
}

impl std::fmt::Debug for EdgeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeDispatcher")
            .field("port", &self.port)
            .field("open", &self.is_open())
            .field("registered", &self.is_registered())
            .finish_non_exhaustive()
    }
}

fn drain_stale_edges(rx: &mut EdgeReceiver) -> usize {
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

async fn dispatch_loop<F>(
    port: String,
    edges: Arc<Mutex<EdgeReceiver>>,
    active_level: ActiveLevel,
    mut callback: F,
    cancel: CancellationToken,
) where
    F: FnMut(EdgeEvent) -> EdgeControl + Send + 'static,
{
    let mut rx = edges.lock().await;

    loop {
        let electrical_high = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            edge = rx.recv() => match edge {
                Some(high) => high,
                None => {
                    tracing::debug!(port = %port, "Edge source closed");
                    break;
                }
            },
        };

        let event = EdgeEvent {
            new_level: active_level.logical(electrical_high),
        };
        tracing::debug!(port = %port, level = event.new_level, "Edge");

        if callback(event) == EdgeControl::Unregister {
            tracing::debug!(port = %port, "Edge callback unregistered");
            break;
        }
    }
}
