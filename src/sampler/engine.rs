// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The sampling engine and its poll loop.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SamplerConfig;
use crate::error::{PeripheralError, SampleError};
use crate::hal::{BusDevice, PeripheralProvider};
use crate::task::BackgroundTask;

/// Consumer of sampled readings.
///
/// Receives the raw sensor byte, or the error of a failed tick.
pub type Listener = Arc<dyn Fn(Result<u8, SampleError>) + Send + Sync>;

/// Request byte written before every read.
const ZERO: [u8; 1] = [0];

type BusSlot = Arc<Mutex<Option<Box<dyn BusDevice>>>>;

/// Periodically samples one bus sensor and forwards readings to a listener.
///
/// The engine exclusively owns its bus handle and at most one poll task.
/// Sampling only starts once a listener slot is set with
/// [`set_listener`](Self::set_listener) or
/// [`remove_listener`](Self::remove_listener); both cancel the running task
/// and wait for it before starting the next one, so two tasks never touch
/// the bus at the same time. Bus exchanges run on tokio's blocking pool,
/// so a slow device never stalls the runtime thread.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use homelink::hal::SimPeripherals;
/// use homelink::sampler::{SamplerConfig, SamplingEngine};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sim = SimPeripherals::new().with_bus("I2C1");
/// sim.set_bus_value("I2C1", 0x4A, 23);
///
/// let mut engine = SamplingEngine::new(Arc::new(sim), SamplerConfig::new("I2C1"));
/// engine.open().await?;
/// assert_eq!(engine.read_now().await?, 23);
///
/// engine.set_listener(|reading| println!("temperature: {reading:?}")).await?;
/// engine.close().await;
/// # Ok(())
/// # }
/// ```
pub struct SamplingEngine {
    provider: Arc<dyn PeripheralProvider>,
    config: SamplerConfig,
    bus: BusSlot,
    task: Option<BackgroundTask>,
}

impl SamplingEngine {
    /// Creates a closed engine.
    #[must_use]
    pub fn new(provider: Arc<dyn PeripheralProvider>, config: SamplerConfig) -> Self {
        Self {
            provider,
            config,
            bus: Arc::new(Mutex::new(None)),
            task: None,
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Returns true while a bus handle is held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.bus.lock().is_some()
    }

    /// Returns true while a poll task is running.
    #[must_use]
    pub fn is_sampling(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Acquires the bus handle.
    ///
    /// If the engine is already open it is closed first.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Unavailable`] or
    /// [`PeripheralError::AlreadyClaimed`] if the provider refuses the
    /// handle. The engine stays closed.
    pub async fn open(&mut self) -> Result<(), PeripheralError> {
        self.close().await;

        let device = self
            .provider
            .open_bus(&self.config.port, self.config.address)
            .inspect_err(|e| {
                tracing::error!(
                    port = %self.config.port,
                    address = self.config.address,
                    error = %e,
                    "Failed to open sensor bus"
                );
            })?;
        *self.bus.lock() = Some(device);

        tracing::info!(
            port = %self.config.port,
            address = self.config.address,
            "Sensor bus opened"
        );
        Ok(())
    }

    /// Installs `listener` and (re)starts the poll task.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::NotOpen`] if the engine is closed.
    pub async fn set_listener<F>(&mut self, listener: F) -> Result<(), SampleError>
    where
        F: Fn(Result<u8, SampleError>) + Send + Sync + 'static,
    {
        self.restart(Some(Arc::new(listener))).await
    }

    /// Detaches the listener but keeps sampling.
    ///
    /// Reads continue on every tick whether or not anyone is listening.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::NotOpen`] if the engine is closed.
    pub async fn remove_listener(&mut self) -> Result<(), SampleError> {
        self.restart(None).await
    }

    /// Takes one sample immediately, outside the periodic schedule.
    ///
    /// Shares the bus lock with the poll task, so it never interleaves with
    /// a tick. The exchange runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::NotOpen`] if the engine is closed, or
    /// [`SampleError::ReadFailure`] if the exchange fails.
    pub async fn read_now(&self) -> Result<u8, SampleError> {
        sample(&self.bus).await
    }

    /// Stops sampling and releases the bus handle.
    ///
    /// Waits for an in-flight sample to finish; once this returns no further
    /// read happens and the listener is never called again. Calling it on a
    /// closed engine does nothing.
    pub async fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.stop().await;
        }
        if self.bus.lock().take().is_some() {
            tracing::info!(
                port = %self.config.port,
                address = self.config.address,
                "Sensor bus closed"
            );
        }
    }

    async fn restart(&mut self, listener: Option<Listener>) -> Result<(), SampleError> {
        if !self.is_open() {
            return Err(SampleError::NotOpen);
        }
        if let Some(task) = self.task.take() {
            task.stop().await;
        }

        let bus = Arc::clone(&self.bus);
        let period = self.config.period;
        tracing::debug!(
            port = %self.config.port,
            listening = listener.is_some(),
            period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "Starting poll task"
        );
        self.task = Some(BackgroundTask::spawn("sensor-poll", move |cancel| {
            poll_loop(bus, listener, period, cancel)
        }));
        Ok(())
    }
}

impl Drop for SamplingEngine {
    fn drop(&mut self) {
        if self.task.is_some() {
            tracing::warn!(
                port = %self.config.port,
                "Sampling engine dropped without close"
            );
        }
    }
}

impl std::fmt::Debug for SamplingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingEngine")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .field("sampling", &self.is_sampling())
            .finish_non_exhaustive()
    }
}

async fn poll_loop(
    bus: BusSlot,
    listener: Option<Listener>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = sample(&bus).await;
        match &result {
            Ok(value) => tracing::debug!(value, "Sensor sampled"),
            Err(e) => tracing::warn!(error = %e, "Sensor sample failed"),
        }
        if let Some(listener) = &listener {
            listener(result);
        }
    }
}

async fn sample(bus: &BusSlot) -> Result<u8, SampleError> {
    let bus = Arc::clone(bus);
    tokio::task::spawn_blocking(move || exchange(&bus))
        .await
        .unwrap_or_else(|e| Err(SampleError::ReadFailure(e.to_string())))
}

fn exchange(bus: &Mutex<Option<Box<dyn BusDevice>>>) -> Result<u8, SampleError> {
    let mut guard = bus.lock();
    let device = guard.as_mut().ok_or(SampleError::NotOpen)?;

    device.write(&ZERO)?;
    let mut buf = [0u8; 1];
    device.read(&mut buf)?;
    Ok(buf[0])
}
