// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Digital line configuration and edge events.

use serde::{Deserialize, Serialize};

/// Direction of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Input, read by the device.
    #[default]
    In,
    /// Output, driven low until first written.
    OutInitiallyLow,
    /// Output, driven high until first written.
    OutInitiallyHigh,
}

impl Direction {
    /// Returns true for either output direction.
    #[must_use]
    pub const fn is_output(&self) -> bool {
        matches!(self, Self::OutInitiallyLow | Self::OutInitiallyHigh)
    }
}

/// Which electrical level counts as logically active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveLevel {
    /// Active when the line is pulled low (e.g. a grounded push button).
    #[default]
    Low,
    /// Active when the line is high.
    High,
}

impl ActiveLevel {
    /// Converts an electrical level into a logical one.
    ///
    /// ```
    /// use homelink::types::ActiveLevel;
    ///
    /// assert!(ActiveLevel::Low.logical(false));
    /// assert!(!ActiveLevel::Low.logical(true));
    /// assert!(ActiveLevel::High.logical(true));
    /// ```
    #[must_use]
    pub const fn logical(&self, electrical_high: bool) -> bool {
        match self {
            Self::Low => !electrical_high,
            Self::High => electrical_high,
        }
    }
}

/// Which transitions raise an edge event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeTrigger {
    /// No edge events.
    None,
    /// Electrical low to high only.
    Rising,
    /// Electrical high to low only.
    Falling,
    /// Every transition.
    #[default]
    Both,
}

impl EdgeTrigger {
    /// Returns true if a transition to `electrical_high` should fire.
    #[must_use]
    pub const fn fires_on(&self, electrical_high: bool) -> bool {
        match self {
            Self::None => false,
            Self::Rising => electrical_high,
            Self::Falling => !electrical_high,
            Self::Both => true,
        }
    }
}

/// Configuration applied to a digital line when it is opened.
///
/// The default is an edge-triggered, active-low input that fires on both
/// transitions, which is what a grounded push button needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Line direction.
    pub direction: Direction,
    /// Active-level polarity.
    pub active_level: ActiveLevel,
    /// Edge trigger selection.
    pub edge: EdgeTrigger,
}

impl PinConfig {
    /// Edge-triggered input (`In`, active low, both edges).
    #[must_use]
    pub fn input() -> Self {
        Self::default()
    }

    /// Plain output line, driven low at open, active high, no edges.
    #[must_use]
    pub fn output_initially_low() -> Self {
        Self {
            direction: Direction::OutInitiallyLow,
            active_level: ActiveLevel::High,
            edge: EdgeTrigger::None,
        }
    }

    /// Sets the active level.
    #[must_use]
    pub fn with_active_level(mut self, level: ActiveLevel) -> Self {
        self.active_level = level;
        self
    }

    /// Sets the edge trigger.
    #[must_use]
    pub fn with_edge(mut self, edge: EdgeTrigger) -> Self {
        self.edge = edge;
        self
    }
}

/// A single logical-level transition reported by the edge dispatcher.
///
/// Transient: produced per edge, handed to the callback, then dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Logical level after the transition, polarity already applied.
    pub new_level: bool,
}
