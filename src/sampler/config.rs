// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sampling engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bus address of the temperature sensor.
pub const DEFAULT_ADDRESS: u8 = 0x4A;

/// Default sampling period.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(2000);

/// Where and how often to sample the bus sensor.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use homelink::sampler::SamplerConfig;
///
/// let config = SamplerConfig::new("I2C1")
///     .with_address(0x48)
///     .with_period(Duration::from_millis(500));
///
/// assert_eq!(config.port, "I2C1");
/// assert_eq!(config.address, 0x48);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Logical bus name resolved by the peripheral provider.
    pub port: String,
    /// 7-bit device address on the bus.
    pub address: u8,
    /// Time between samples.
    #[serde(rename = "period_ms", with = "period_ms")]
    pub period: Duration,
}

impl SamplerConfig {
    /// Creates a configuration for the sensor on `port` with default
    /// address and period.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Sets the device address.
    #[must_use]
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Sets the sampling period.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            port: "I2C1".to_string(),
            address: DEFAULT_ADDRESS,
            period: DEFAULT_PERIOD,
        }
    }
}

mod period_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(period: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(period.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
