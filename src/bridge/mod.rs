// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconciliation between local hardware and the remote record.
//!
//! The [`ReconciliationBridge`] sits between the hardware components and the
//! [remote store](crate::remote):
//!
//! - outbound, sensor readings and button edges become single-field writes
//!   under the record path (`home/temperature`, `home/button`, `home/light`)
//! - inbound, record snapshots drive the light actuator, with echoes of the
//!   bridge's own writes suppressed
//!
//! Merging is last-writer-wins per field. Concurrent local and remote
//! updates to the same field are not ordered beyond what the store reports.
//!
//! # Lifecycle
//!
//! See [`BridgeState`]. Publishing is only effective in
//! [`BridgeState::Subscribed`]; earlier publishes follow the configured
//! [`PublishPolicy`].

mod config;
mod reconcile;
mod state;

pub use config::{
    BridgeConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_ROOT_PATH, PublishPolicy, TemperatureScale,
};
pub use reconcile::ReconciliationBridge;
pub use state::BridgeState;
