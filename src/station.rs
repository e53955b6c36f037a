// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The complete device: light, button, sensor and bridge.
//!
//! A [`Station`] owns every component and wires them together on
//! [`start`](Station::start):
//!
//! - button edges mirror onto the light and publish `button` and `light`
//! - sensor readings publish `temperature`
//! - remote `light` changes drive the light
//!
//! [`stop`](Station::stop) releases everything. A failed `start` releases
//! whatever it had acquired before returning the error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeConfig, ReconciliationBridge};
use crate::edge::EdgeDispatcher;
use crate::error::Result;
use crate::hal::{LineActuator, PeripheralProvider, SharedActuator};
use crate::remote::RemoteStore;
use crate::sampler::{SamplerConfig, SamplingEngine};
use crate::types::PinConfig;

/// Ports and settings for a [`Station`].
///
/// # Examples
///
/// ```
/// use homelink::station::StationConfig;
///
/// let config = StationConfig::from_json(r#"{
///     "led_port": "BCM16",
///     "sensor": { "port": "I2C1", "address": 72, "period_ms": 1000 }
/// }"#).unwrap();
///
/// assert_eq!(config.led_port, "BCM16");
/// assert_eq!(config.button_port, "BCM21");
/// assert_eq!(config.sensor.address, 0x48);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Output line driving the light.
    pub led_port: String,
    /// Input line of the push button.
    pub button_port: String,
    /// Button line configuration.
    pub button: PinConfig,
    /// Temperature sensor.
    pub sensor: SamplerConfig,
    /// Remote record bridge.
    pub bridge: BridgeConfig,
}

impl StationConfig {
    /// Parses a JSON configuration. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the document is
    /// not valid.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the light output line.
    #[must_use]
    pub fn with_led_port(mut self, port: impl Into<String>) -> Self {
        self.led_port = port.into();
        self
    }

    /// Sets the button input line.
    #[must_use]
    pub fn with_button_port(mut self, port: impl Into<String>) -> Self {
        self.button_port = port.into();
        self
    }

    /// Sets the sensor configuration.
    #[must_use]
    pub fn with_sensor(mut self, sensor: SamplerConfig) -> Self {
        self.sensor = sensor;
        self
    }

    /// Sets the bridge configuration.
    #[must_use]
    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            led_port: "BCM6".to_string(),
            button_port: "BCM21".to_string(),
            button: PinConfig::input(),
            sensor: SamplerConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

/// Runs the light, button and sensor against one remote record.
///
/// The store client is cloned into a fresh bridge on every start, since a
/// closed bridge cannot be reopened.
pub struct Station<S> {
    provider: Arc<dyn PeripheralProvider>,
    store: S,
    config: StationConfig,
    sampler: SamplingEngine,
    button: EdgeDispatcher,
    led: Option<SharedActuator>,
    bridge: Option<ReconciliationBridge<S>>,
}

impl<S: RemoteStore + Clone> Station<S> {
    /// Creates a stopped station.
    #[must_use]
    pub fn new(provider: Arc<dyn PeripheralProvider>, store: S, config: StationConfig) -> Self {
        let sampler = SamplingEngine::new(Arc::clone(&provider), config.sensor.clone());
        let button = EdgeDispatcher::new(Arc::clone(&provider), config.button_port.clone());
        Self {
            provider,
            store,
            config,
            sampler,
            button,
            led: None,
            bridge: None,
        }
    }

    /// Returns the station configuration.
    #[must_use]
    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// Returns the bridge of the current run, if started.
    #[must_use]
    pub fn bridge(&self) -> Option<&ReconciliationBridge<S>> {
        self.bridge.as_ref()
    }

    /// Returns true between a successful `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.led.is_some()
    }

    /// Acquires every handle, starts the bridge and wires the callbacks.
    ///
    /// A running station is stopped first.
    ///
    /// # Errors
    ///
    /// Returns the first peripheral, sampling or bridge error. Every handle
    /// acquired before the failure is released again.
    pub async fn start(&mut self) -> Result<()> {
        self.stop().await;

        if let Err(e) = self.acquire().await {
            tracing::error!(error = %e, "Station failed to start");
            self.stop().await;
            return Err(e);
        }
        tracing::info!(
            led = %self.config.led_port,
            button = %self.config.button_port,
            sensor = %self.config.sensor.port,
            "Station started"
        );
        Ok(())
    }

    /// Releases everything in reverse order of acquisition. Idempotent.
    pub async fn stop(&mut self) {
        let was_running = self.is_running();

        self.sampler.close().await;
        self.button.close().await;
        if let Some(bridge) = self.bridge.take() {
            bridge.close().await;
        }
        self.led = None;

        if was_running {
            tracing::info!("Station stopped");
        }
    }

    async fn acquire(&mut self) -> Result<()> {
        let line = self.provider.open_pin(&self.config.led_port)?;
        let led = LineActuator::new(line, PinConfig::output_initially_low())?.shared();
        self.led = Some(Arc::clone(&led));

        let bridge = ReconciliationBridge::new(self.store.clone(), self.config.bridge.clone());
        bridge.set_actuator(led);
        self.bridge = Some(bridge.clone());
        bridge.start().await?;

        self.button.open(self.config.button).await?;
        bridge.attach_button(&mut self.button).await?;

        self.sampler.open().await?;
        match self.sampler.read_now().await {
            Ok(raw) => {
                bridge.publish_temperature(raw);
            }
            Err(e) => tracing::warn!(error = %e, "Initial temperature read failed"),
        }
        bridge.attach_sensor(&mut self.sampler).await?;
        Ok(())
    }
}

impl<S> Drop for Station<S> {
    fn drop(&mut self) {
        if self.led.is_some() {
            tracing::warn!("Station dropped without stop");
        }
    }
}

impl<S> std::fmt::Debug for Station<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("config", &self.config)
            .field("running", &self.led.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::bridge::BridgeState;
    use crate::error::PeripheralError;
    use crate::hal::SimPeripherals;
    use crate::remote::MemoryStore;

    fn board() -> SimPeripherals {
        let sim = SimPeripherals::new()
            .with_bus("I2C1")
            .with_pin("BCM6")
            .with_pin("BCM21");
        sim.set_bus_value("I2C1", 0x4A, 21);
        sim
    }

    #[test]
    fn config_defaults() {
        let config = StationConfig::default();
        assert_eq!(config.led_port, "BCM6");
        assert_eq!(config.button_port, "BCM21");
        assert_eq!(config.bridge.root_path, "home");
    }

    #[test]
    fn config_rejects_bad_json() {
        let err = StationConfig::from_json(r#"{"led_port": 6}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn start_and_stop_release_everything() {
        let sim = board();
        let mut station = Station::new(
            Arc::new(sim.clone()),
            MemoryStore::new(),
            StationConfig::default(),
        );

        station.start().await.unwrap();
        assert!(station.is_running());
        assert!(sim.is_pin_claimed("BCM6"));
        assert!(sim.is_pin_claimed("BCM21"));
        assert!(sim.is_bus_claimed("I2C1", 0x4A));
        let bridge = station.bridge().unwrap().clone();
        assert_eq!(bridge.state(), BridgeState::Subscribed);

        station.stop().await;
        assert!(!station.is_running());
        assert_eq!(bridge.state(), BridgeState::Closed);
        assert_eq!(sim.acquired(), 3);
        assert_eq!(sim.released(), 3);

        station.stop().await;
        assert_eq!(sim.released(), 3);
    }

    #[tokio::test]
    async fn missing_button_releases_earlier_handles() {
        let sim = SimPeripherals::new().with_bus("I2C1").with_pin("BCM6");
        let store = MemoryStore::new();
        let mut station = Station::new(Arc::new(sim.clone()), store.clone(), StationConfig::default());

        let err = station.start().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Peripheral(PeripheralError::Unavailable { ref name, .. }) if name == "BCM21"
        ));
        assert!(!station.is_running());
        assert!(!sim.is_pin_claimed("BCM6"));
        assert_eq!(sim.acquired(), sim.released());
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn auth_failure_releases_led() {
        let sim = board();
        let store = MemoryStore::new();
        store.fail_auth("expired");
        let mut station = Station::new(Arc::new(sim.clone()), store, StationConfig::default());

        let err = station.start().await.unwrap_err();
        assert!(matches!(err, Error::Bridge(_)));
        assert!(!sim.is_pin_claimed("BCM6"));
        assert!(!sim.is_pin_claimed("BCM21"));
        assert!(!sim.is_bus_claimed("I2C1", 0x4A));
    }

    /// The simulated board, with every sensor read taking a while.
    struct SlowSensorBoard {
        sim: SimPeripherals,
        delay: std::time::Duration,
    }

    struct SlowBus {
        inner: Box<dyn crate::hal::BusDevice>,
        delay: std::time::Duration,
    }

    impl crate::hal::BusDevice for SlowBus {
        fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), PeripheralError> {
            self.inner.write(bytes)
        }

        fn read(&mut self, buf: &mut [u8]) -> std::result::Result<(), PeripheralError> {
            std::thread::sleep(self.delay);
            self.inner.read(buf)
        }
    }

    impl PeripheralProvider for SlowSensorBoard {
        fn open_bus(
            &self,
            name: &str,
            address: u8,
        ) -> std::result::Result<Box<dyn crate::hal::BusDevice>, PeripheralError> {
            Ok(Box::new(SlowBus {
                inner: self.sim.open_bus(name, address)?,
                delay: self.delay,
            }))
        }

        fn open_pin(
            &self,
            name: &str,
        ) -> std::result::Result<Box<dyn crate::hal::DigitalLine>, PeripheralError> {
            self.sim.open_pin(name)
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn initial_read_does_not_stall_runtime() {
        let sim = board();
        let provider = SlowSensorBoard {
            sim: sim.clone(),
            delay: std::time::Duration::from_millis(300),
        };
        let store = MemoryStore::new();
        let mut station = Station::new(Arc::new(provider), store.clone(), StationConfig::default());

        let (started, elapsed) = tokio::join!(station.start(), async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let now = std::time::Instant::now();
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            now.elapsed()
        });

        started.unwrap();
        assert!(elapsed < std::time::Duration::from_millis(150));
        station.stop().await;
        assert_eq!(sim.acquired(), sim.released());
    }

    #[tokio::test]
    async fn restart_builds_fresh_bridge() {
        let sim = board();
        let store = MemoryStore::new();
        let mut station = Station::new(Arc::new(sim.clone()), store.clone(), StationConfig::default());

        station.start().await.unwrap();
        station.start().await.unwrap();
        assert_eq!(station.bridge().unwrap().state(), BridgeState::Subscribed);
        assert_eq!(store.auth_attempts(), 2);

        station.stop().await;
        assert_eq!(sim.acquired(), sim.released());
    }
}
