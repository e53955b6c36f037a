// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Adapters from `embedded-hal` 1.0 drivers to the handle traits.

use embedded_hal::digital::{self, OutputPin, PinState};
use embedded_hal::i2c::{self, I2c, SevenBitAddress};

use super::{Actuator, BusDevice};
use crate::error::PeripheralError;

/// A [`BusDevice`] bound to one 7-bit address on an `embedded-hal` I2C bus.
///
/// # Examples
///
/// ```ignore
/// let i2c = board.i2c1();
/// let sensor = homelink::hal::I2cBus::new(i2c, 0x4A);
/// ```
#[derive(Debug)]
pub struct I2cBus<I> {
    i2c: I,
    address: SevenBitAddress,
}

impl<I: I2c> I2cBus<I> {
    /// Binds `i2c` to `address`.
    #[must_use]
    pub fn new(i2c: I, address: SevenBitAddress) -> Self {
        Self { i2c, address }
    }

    /// Returns the bound device address.
    #[must_use]
    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    /// Releases the underlying bus driver.
    pub fn release(self) -> I {
        self.i2c
    }
}

fn bus_error<E: i2c::Error>(address: u8, e: &E) -> PeripheralError {
    PeripheralError::Bus(format!("i2c 0x{address:02X}: {:?}", e.kind()))
}

impl<I: I2c + Send> BusDevice for I2cBus<I> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), PeripheralError> {
        self.i2c
            .write(self.address, bytes)
            .map_err(|e| bus_error(self.address, &e))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), PeripheralError> {
        self.i2c
            .read(self.address, buf)
            .map_err(|e| bus_error(self.address, &e))
    }
}

/// An [`Actuator`] driving an `embedded-hal` output pin.
#[derive(Debug)]
pub struct OutputActuator<P> {
    pin: P,
    active_high: bool,
}

impl<P: OutputPin> OutputActuator<P> {
    /// Wraps an active-high output.
    #[must_use]
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            active_high: true,
        }
    }

    /// Wraps an output that turns the load on when driven low.
    #[must_use]
    pub fn active_low(pin: P) -> Self {
        Self {
            pin,
            active_high: false,
        }
    }
}

impl<P: OutputPin + Send> Actuator for OutputActuator<P> {
    fn set(&mut self, on: bool) -> Result<(), PeripheralError> {
        let state = PinState::from(on == self.active_high);
        self.pin
            .set_state(state)
            .map_err(|e| PeripheralError::Pin(format!("{:?}", digital::Error::kind(&e))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[derive(Debug, Default)]
    struct FakeI2c {
        writes: Vec<(u8, Vec<u8>)>,
        value: u8,
        nack: bool,
    }

    impl i2c::ErrorType for FakeI2c {
        type Error = i2c::ErrorKind;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [i2c::Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.nack {
                return Err(i2c::ErrorKind::NoAcknowledge(
                    i2c::NoAcknowledgeSource::Address,
                ));
            }
            for op in operations {
                match op {
                    i2c::Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                    i2c::Operation::Read(buf) => buf.fill(self.value),
                }
            }
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FakePin {
        high: bool,
    }

    impl digital::ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            Ok(())
        }
    }

    #[test]
    fn i2c_bus_writes_and_reads_at_address() {
        let mut bus = I2cBus::new(
            FakeI2c {
                value: 0x17,
                ..FakeI2c::default()
            },
            0x4A,
        );

        bus.write(&[0]).unwrap();
        let mut buf = [0u8; 1];
        bus.read(&mut buf).unwrap();

        assert_eq!(buf[0], 0x17);
        assert_eq!(bus.address(), 0x4A);
        assert_eq!(bus.release().writes, vec![(0x4A, vec![0])]);
    }

    #[test]
    fn i2c_bus_maps_nack() {
        let mut bus = I2cBus::new(
            FakeI2c {
                nack: true,
                ..FakeI2c::default()
            },
            0x4A,
        );

        let err = bus.write(&[0]).unwrap_err();
        assert!(matches!(err, PeripheralError::Bus(msg) if msg.contains("0x4A")));
    }

    #[test]
    fn output_actuator_polarity() {
        let mut led = OutputActuator::new(FakePin::default());
        led.set(true).unwrap();
        assert!(led.pin.high);

        let mut inverted = OutputActuator::active_low(FakePin::default());
        inverted.set(true).unwrap();
        assert!(!inverted.pin.high);
    }
}
