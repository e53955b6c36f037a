// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `homelink` - keeps a small IoT board in step with a remote home record.
//!
//! The board has a light (digital output), a push button (edge-triggered
//! digital input) and a temperature sensor on a serial bus. A remote store
//! holds one shared record:
//!
//! ```json
//! { "button": false, "light": true, "temperature": 21.0 }
//! ```
//!
//! # Components
//!
//! - [`SamplingEngine`]: samples the bus sensor on a fixed period from a
//!   cancellable background task
//! - [`EdgeDispatcher`]: delivers button edges, in order, to a callback
//!   that decides whether it stays registered
//! - [`ReconciliationBridge`]: publishes local changes and applies remote
//!   `light` changes without echoing its own writes back
//! - [`Station`]: wires the three together with explicit `start`/`stop`
//!
//! Hardware and the remote store are collaborators passed in by the
//! caller: see [`hal::PeripheralProvider`] and [`remote::RemoteStore`].
//! [`hal::SimPeripherals`] and [`remote::MemoryStore`] are in-process
//! implementations for tests and demos.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use homelink::hal::SimPeripherals;
//! use homelink::remote::MemoryStore;
//! use homelink::{Station, StationConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> homelink::Result<()> {
//! let board = SimPeripherals::new()
//!     .with_bus("I2C1")
//!     .with_pin("BCM6")
//!     .with_pin("BCM21");
//!
//! let mut station = Station::new(Arc::new(board), MemoryStore::new(), StationConfig::default());
//! station.start().await?;
//! // ... the station runs until stopped
//! station.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber.

pub mod bridge;
pub mod edge;
pub mod error;
pub mod hal;
pub mod remote;
pub mod sampler;
pub mod station;
mod task;
pub mod types;

pub use bridge::{BridgeConfig, BridgeState, PublishPolicy, ReconciliationBridge, TemperatureScale};
pub use edge::{EdgeControl, EdgeDispatcher};
pub use error::{Error, Result};
pub use remote::{MemoryStore, RemoteStore};
pub use sampler::{SamplerConfig, SamplingEngine};
pub use station::{Station, StationConfig};
pub use types::{EdgeEvent, Field, FieldUpdate, HomeState, PinConfig};
