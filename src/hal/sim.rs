// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process peripheral provider.
//!
//! [`SimPeripherals`] behaves like a board's peripheral manager: it knows a
//! fixed set of bus and line names, hands out at most one handle per line or
//! bus address, and counts every acquisition and release. Tests and demos
//! drive the simulated hardware from the outside (`drive`, `set_bus_value`,
//! `fail_next_read`) and inspect what the core did to it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{BusDevice, DigitalLine, EdgeReceiver, PeripheralProvider};
use crate::error::PeripheralError;
use crate::types::PinConfig;

#[derive(Debug, Default)]
struct BusState {
    value: u8,
    failures: VecDeque<String>,
    writes: Vec<Vec<u8>>,
    reads: usize,
}

#[derive(Debug, Default)]
struct LineState {
    high: bool,
    config: Option<PinConfig>,
    edge_tx: Option<mpsc::UnboundedSender<bool>>,
    writes: Vec<bool>,
}

#[derive(Debug, Default)]
struct SimInner {
    buses: Mutex<HashSet<String>>,
    devices: Mutex<HashMap<(String, u8), BusState>>,
    lines: Mutex<HashMap<String, LineState>>,
    claimed: Mutex<HashSet<String>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl SimInner {
    fn claim(&self, key: String) -> Result<(), PeripheralError> {
        if !self.claimed.lock().insert(key.clone()) {
            return Err(PeripheralError::AlreadyClaimed { name: key });
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self, key: &str) {
        if self.claimed.lock().remove(key) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A simulated board with named buses and lines.
///
/// Cloning shares the same simulated hardware.
///
/// # Examples
///
/// ```
/// use homelink::hal::{PeripheralProvider, SimPeripherals};
///
/// let sim = SimPeripherals::new().with_bus("I2C1").with_pin("BCM21");
///
/// let bus = sim.open_bus("I2C1", 0x4A).unwrap();
/// assert!(sim.open_bus("I2C1", 0x4A).is_err());
///
/// drop(bus);
/// assert_eq!(sim.acquired(), sim.released());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimPeripherals {
    inner: Arc<SimInner>,
}

impl SimPeripherals {
    /// Creates a board with no buses or lines.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bus that devices can be opened on.
    #[must_use]
    pub fn with_bus(self, name: &str) -> Self {
        self.inner.buses.lock().insert(name.to_string());
        self
    }

    /// Adds a digital line, initially low.
    #[must_use]
    pub fn with_pin(self, name: &str) -> Self {
        self.inner
            .lines
            .lock()
            .insert(name.to_string(), LineState::default());
        self
    }

    /// Sets the byte every subsequent read of `name`/`address` returns.
    pub fn set_bus_value(&self, name: &str, address: u8, value: u8) {
        self.inner
            .devices
            .lock()
            .entry((name.to_string(), address))
            .or_default()
            .value = value;
    }

    /// Makes the next read of `name`/`address` fail with `reason`.
    pub fn fail_next_read(&self, name: &str, address: u8, reason: &str) {
        self.inner
            .devices
            .lock()
            .entry((name.to_string(), address))
            .or_default()
            .failures
            .push_back(reason.to_string());
    }

    /// Number of completed reads of `name`/`address`.
    #[must_use]
    pub fn bus_reads(&self, name: &str, address: u8) -> usize {
        self.inner
            .devices
            .lock()
            .get(&(name.to_string(), address))
            .map_or(0, |d| d.reads)
    }

    /// Every write made to `name`/`address`, oldest first.
    #[must_use]
    pub fn bus_writes(&self, name: &str, address: u8) -> Vec<Vec<u8>> {
        self.inner
            .devices
            .lock()
            .get(&(name.to_string(), address))
            .map(|d| d.writes.clone())
            .unwrap_or_default()
    }

    /// Changes the electrical level of an input line from the outside.
    ///
    /// A change that matches the configured edge trigger is reported to the
    /// open handle's edge receiver, if any. Returns true if an edge was
    /// delivered.
    pub fn drive(&self, name: &str, high: bool) -> bool {
        let mut lines = self.inner.lines.lock();
        let Some(line) = lines.get_mut(name) else {
            return false;
        };
        if line.high == high {
            return false;
        }
        line.high = high;

        let fires = line.config.is_some_and(|c| c.edge.fires_on(high));
        match &line.edge_tx {
            Some(tx) if fires => tx.send(high).is_ok(),
            _ => false,
        }
    }

    /// Current electrical level of a line.
    #[must_use]
    pub fn level(&self, name: &str) -> Option<bool> {
        self.inner.lines.lock().get(name).map(|l| l.high)
    }

    /// Every level written to an output line, oldest first.
    #[must_use]
    pub fn output_writes(&self, name: &str) -> Vec<bool> {
        self.inner
            .lines
            .lock()
            .get(name)
            .map(|l| l.writes.clone())
            .unwrap_or_default()
    }

    /// Total handles handed out.
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    /// Total handles dropped.
    #[must_use]
    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Returns true if a handle to line `name` is open.
    #[must_use]
    pub fn is_pin_claimed(&self, name: &str) -> bool {
        self.inner.claimed.lock().contains(&pin_key(name))
    }

    /// Returns true if a handle to `name`/`address` is open.
    #[must_use]
    pub fn is_bus_claimed(&self, name: &str, address: u8) -> bool {
        self.inner.claimed.lock().contains(&bus_key(name, address))
    }
}

fn pin_key(name: &str) -> String {
    format!("gpio:{name}")
}

fn bus_key(name: &str, address: u8) -> String {
    format!("{name}@0x{address:02X}")
}

impl PeripheralProvider for SimPeripherals {
    fn open_bus(&self, name: &str, address: u8) -> Result<Box<dyn BusDevice>, PeripheralError> {
        if !self.inner.buses.lock().contains(name) {
            return Err(PeripheralError::Unavailable {
                name: name.to_string(),
                reason: "no such bus".to_string(),
            });
        }
        let key = bus_key(name, address);
        self.inner.claim(key.clone())?;
        self.inner
            .devices
            .lock()
            .entry((name.to_string(), address))
            .or_default();

        Ok(Box::new(SimBus {
            inner: Arc::clone(&self.inner),
            device: (name.to_string(), address),
            key,
        }))
    }

    fn open_pin(&self, name: &str) -> Result<Box<dyn DigitalLine>, PeripheralError> {
        if !self.inner.lines.lock().contains_key(name) {
            return Err(PeripheralError::Unavailable {
                name: name.to_string(),
                reason: "no such line".to_string(),
            });
        }
        let key = pin_key(name);
        self.inner.claim(key.clone())?;

        Ok(Box::new(SimLine {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
            key,
        }))
    }
}

/// Handle to a simulated bus device. Dropping it releases the address.
#[derive(Debug)]
pub struct SimBus {
    inner: Arc<SimInner>,
    device: (String, u8),
    key: String,
}

impl BusDevice for SimBus {
    fn write(&mut self, bytes: &[u8]) -> Result<(), PeripheralError> {
        let mut devices = self.inner.devices.lock();
        let device = devices
            .get_mut(&self.device)
            .ok_or(PeripheralError::Closed)?;
        device.writes.push(bytes.to_vec());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), PeripheralError> {
        let mut devices = self.inner.devices.lock();
        let device = devices
            .get_mut(&self.device)
            .ok_or(PeripheralError::Closed)?;
        if let Some(reason) = device.failures.pop_front() {
            return Err(PeripheralError::Bus(reason));
        }
        buf.fill(device.value);
        device.reads += 1;
        Ok(())
    }
}

impl Drop for SimBus {
    fn drop(&mut self) {
        self.inner.release(&self.key);
    }
}

/// Handle to a simulated digital line. Dropping it releases the line and
/// stops edge delivery.
#[derive(Debug)]
pub struct SimLine {
    inner: Arc<SimInner>,
    name: String,
    key: String,
}

impl SimLine {
    fn with_line<T>(
        &self,
        f: impl FnOnce(&mut LineState) -> Result<T, PeripheralError>,
    ) -> Result<T, PeripheralError> {
        let mut lines = self.inner.lines.lock();
        let line = lines.get_mut(&self.name).ok_or(PeripheralError::Closed)?;
        f(line)
    }
}

impl DigitalLine for SimLine {
    fn configure(&mut self, config: PinConfig) -> Result<(), PeripheralError> {
        self.with_line(|line| {
            match config.direction {
                crate::types::Direction::OutInitiallyLow => line.high = false,
                crate::types::Direction::OutInitiallyHigh => line.high = true,
                crate::types::Direction::In => {}
            }
            line.config = Some(config);
            Ok(())
        })
    }

    fn is_high(&mut self) -> Result<bool, PeripheralError> {
        self.with_line(|line| Ok(line.high))
    }

    fn set_high(&mut self, high: bool) -> Result<(), PeripheralError> {
        self.with_line(|line| match line.config {
            Some(config) if config.direction.is_output() => {
                line.high = high;
                line.writes.push(high);
                Ok(())
            }
            _ => Err(PeripheralError::Pin(
                "line is not configured as an output".to_string(),
            )),
        })
    }

    fn edges(&mut self) -> Result<EdgeReceiver, PeripheralError> {
        self.with_line(|line| {
            let Some(config) = line.config else {
                return Err(PeripheralError::Pin("line is not configured".to_string()));
            };
            if config.direction.is_output() {
                return Err(PeripheralError::Pin(
                    "edges are only reported on inputs".to_string(),
                ));
            }
            if line.edge_tx.is_some() {
                return Err(PeripheralError::Pin(
                    "edge receiver already taken".to_string(),
                ));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            line.edge_tx = Some(tx);
            Ok(rx)
        })
    }
}

impl Drop for SimLine {
    fn drop(&mut self) {
        if let Some(line) = self.inner.lines.lock().get_mut(&self.name) {
            line.edge_tx = None;
            line.config = None;
        }
        self.inner.release(&self.key);
    }
}
