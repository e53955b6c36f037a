// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Edge-triggered dispatch for a digital input.
//!
//! [`EdgeDispatcher`] turns the raw electrical edges of one line into
//! [`EdgeEvent`](crate::types::EdgeEvent)s carrying the logical level, and
//! hands them to a single callback. The callback answers with
//! [`EdgeControl`] to stay registered or to unregister itself.
//!
//! ```
//! use std::sync::Arc;
//! use homelink::edge::{EdgeControl, EdgeDispatcher};
//! use homelink::hal::SimPeripherals;
//! use homelink::types::PinConfig;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), homelink::error::PeripheralError> {
//! let sim = SimPeripherals::new().with_pin("BCM21");
//! let mut button = EdgeDispatcher::new(Arc::new(sim), "BCM21");
//!
//! button.open(PinConfig::input()).await?;
//! button
//!     .on_edge(|event| {
//!         println!("pressed: {}", event.new_level);
//!         EdgeControl::Continue
//!     })
//!     .await?;
//! button.close().await;
//! # Ok(())
//! # }
//! ```

mod dispatcher;

pub use dispatcher::{EdgeControl, EdgeDispatcher};
