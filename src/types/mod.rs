// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared by the hardware and remote sides of the bridge.
//!
//! # Types
//!
//! - [`HomeState`] - The shared `{button, light, temperature}` record
//! - [`Field`] / [`FieldUpdate`] - Addressing and writing one record field
//! - [`PinConfig`] - Direction, active level and edge trigger of a line
//! - [`EdgeEvent`] - A logical-level transition on an input line

mod home_state;
mod pin;

pub use home_state::{Field, FieldUpdate, HomeState};
pub use pin::{ActiveLevel, Direction, EdgeEvent, EdgeTrigger, PinConfig};
