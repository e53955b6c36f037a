// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware handle provider and the handles it hands out.
//!
//! The core never reaches for a global peripheral manager. Each component is
//! given a [`PeripheralProvider`] and asks it for exactly the handles it
//! owns:
//!
//! - [`BusDevice`] - one addressed device on a serial bus (the temperature sensor)
//! - [`DigitalLine`] - one GPIO-like line (the button, the light)
//! - [`Actuator`] - the write side of an output line
//!
//! Handles are released by dropping them. A provider must refuse a second
//! open of a line or bus address while the first handle is alive.
//!
//! Board support code can build handles from any `embedded-hal` driver via
//! [`I2cBus`] and [`OutputActuator`]; [`SimPeripherals`] is an in-process
//! provider for tests and demos.

mod embedded;
mod sim;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::PeripheralError;
use crate::types::{ActiveLevel, PinConfig};

pub use embedded::{I2cBus, OutputActuator};
pub use sim::{SimBus, SimLine, SimPeripherals};

/// Raw electrical levels reported after each matching transition.
pub type EdgeReceiver = mpsc::UnboundedReceiver<bool>;

/// An actuator shared between the edge path and the bridge.
pub type SharedActuator = Arc<Mutex<Box<dyn Actuator>>>;

/// Resolves logical port names to exclusively owned hardware handles.
pub trait PeripheralProvider: Send + Sync {
    /// Opens the device at `address` on bus `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Unavailable`] if the bus cannot be opened,
    /// or [`PeripheralError::AlreadyClaimed`] if the address is in use.
    fn open_bus(&self, name: &str, address: u8) -> Result<Box<dyn BusDevice>, PeripheralError>;

    /// Opens digital line `name`. The line is unconfigured until
    /// [`DigitalLine::configure`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Unavailable`] if the line does not exist,
    /// or [`PeripheralError::AlreadyClaimed`] if it is already open.
    fn open_pin(&self, name: &str) -> Result<Box<dyn DigitalLine>, PeripheralError>;
}

/// Raw write/read access to one addressed bus device.
pub trait BusDevice: Send {
    /// Writes `bytes` to the device.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Bus`] if the transfer fails.
    fn write(&mut self, bytes: &[u8]) -> Result<(), PeripheralError>;

    /// Fills `buf` from the device.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Bus`] if the transfer fails.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), PeripheralError>;
}

/// One digital line.
pub trait DigitalLine: Send {
    /// Applies direction, polarity and edge selection.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Pin`] if the line rejects the configuration.
    fn configure(&mut self, config: PinConfig) -> Result<(), PeripheralError>;

    /// Reads the electrical level.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Pin`] if the line cannot be read.
    fn is_high(&mut self) -> Result<bool, PeripheralError>;

    /// Drives the electrical level of an output line.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Pin`] if the line is not an output.
    fn set_high(&mut self, high: bool) -> Result<(), PeripheralError>;

    /// Starts edge delivery for the configured trigger.
    ///
    /// Each message is the electrical level right after a transition, in
    /// the order the hardware saw them. Only one receiver exists per open
    /// handle.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Pin`] if edges are not configured or the
    /// receiver was already taken.
    fn edges(&mut self) -> Result<EdgeReceiver, PeripheralError>;
}

/// Write side of an on/off output.
pub trait Actuator: Send {
    /// Switches the output to the logical `on` state.
    ///
    /// # Errors
    ///
    /// Returns a [`PeripheralError`] if the output could not be driven.
    fn set(&mut self, on: bool) -> Result<(), PeripheralError>;
}

/// Drives a [`DigitalLine`] as an actuator, honouring its active level.
pub struct LineActuator {
    line: Box<dyn DigitalLine>,
    active_level: ActiveLevel,
}

impl LineActuator {
    /// Configures `line` as an output and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Pin`] if `config` is not an output
    /// configuration or the line rejects it.
    pub fn new(mut line: Box<dyn DigitalLine>, config: PinConfig) -> Result<Self, PeripheralError> {
        if !config.direction.is_output() {
            return Err(PeripheralError::Pin(
                "actuator line must be configured as an output".to_string(),
            ));
        }
        line.configure(config)?;
        Ok(Self {
            line,
            active_level: config.active_level,
        })
    }

    /// Wraps the actuator for sharing between the edge path and the bridge.
    #[must_use]
    pub fn shared(self) -> SharedActuator {
        Arc::new(Mutex::new(Box::new(self)))
    }
}

impl Actuator for LineActuator {
    fn set(&mut self, on: bool) -> Result<(), PeripheralError> {
        // logical(x) is its own inverse, so it maps logical back to electrical too
        self.line.set_high(self.active_level.logical(on))
    }
}

impl std::fmt::Debug for LineActuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineActuator")
            .field("active_level", &self.active_level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_actuator_rejects_input_config() {
        let sim = SimPeripherals::new().with_pin("BCM6");
        let line = sim.open_pin("BCM6").unwrap();

        let result = LineActuator::new(line, PinConfig::input());
        assert!(matches!(result, Err(PeripheralError::Pin(_))));
    }

    #[test]
    fn line_actuator_drives_output() {
        let sim = SimPeripherals::new().with_pin("BCM6");
        let line = sim.open_pin("BCM6").unwrap();
        let mut led = LineActuator::new(line, PinConfig::output_initially_low()).unwrap();

        assert_eq!(sim.level("BCM6"), Some(false));
        led.set(true).unwrap();
        assert_eq!(sim.level("BCM6"), Some(true));
        assert_eq!(sim.output_writes("BCM6"), vec![true]);
    }

    #[test]
    fn line_actuator_active_low_inverts() {
        let sim = SimPeripherals::new().with_pin("BCM6");
        let line = sim.open_pin("BCM6").unwrap();
        let config = PinConfig::output_initially_low().with_active_level(ActiveLevel::Low);
        let mut led = LineActuator::new(line, config).unwrap();

        led.set(true).unwrap();
        assert_eq!(sim.level("BCM6"), Some(false));
    }
}
