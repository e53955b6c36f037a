// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic sampling of the bus-addressed temperature sensor.
//!
//! Every period the engine writes a single zero byte to the sensor and
//! reads one byte back. The raw byte is the reading; any scaling to degrees
//! happens in the [bridge](crate::bridge), not here.
//!
//! A failed exchange is delivered to the listener as an error and the task
//! carries on with the next tick. There is no back-off.

mod config;
mod engine;

pub use config::{DEFAULT_ADDRESS, DEFAULT_PERIOD, SamplerConfig};
pub use engine::{Listener, SamplingEngine};
