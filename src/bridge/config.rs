// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration.

use serde::{Deserialize, Serialize};

/// Default record path in the remote store.
pub const DEFAULT_ROOT_PATH: &str = "home";

/// Default bound of the pre-subscription publish queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// What happens to publishes made before the bridge is subscribed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishPolicy {
    /// Discard and log.
    #[default]
    Drop,
    /// Buffer, then flush in order once subscribed.
    Queue,
}

/// Linear conversion from the raw sensor byte to degrees.
///
/// ```
/// use homelink::bridge::TemperatureScale;
///
/// assert_eq!(TemperatureScale::default().apply(23), 23.0);
/// assert_eq!(TemperatureScale::new(0.5, -10.0).apply(60), 20.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureScale {
    /// Multiplier applied to the raw byte.
    pub factor: f32,
    /// Added after scaling.
    pub offset: f32,
}

impl TemperatureScale {
    /// Creates a scale of `raw * factor + offset`.
    #[must_use]
    pub const fn new(factor: f32, offset: f32) -> Self {
        Self { factor, offset }
    }

    /// Converts a raw reading.
    #[must_use]
    pub fn apply(&self, raw: u8) -> f32 {
        f32::from(raw).mul_add(self.factor, self.offset)
    }
}

impl Default for TemperatureScale {
    fn default() -> Self {
        Self::new(1.0, 0.0)
    }
}

/// Configuration of a [`ReconciliationBridge`](super::ReconciliationBridge).
///
/// # Examples
///
/// ```
/// use homelink::bridge::{BridgeConfig, PublishPolicy};
///
/// let config = BridgeConfig::default()
///     .with_root_path("cabin")
///     .with_publish_policy(PublishPolicy::Queue)
///     .with_queue_capacity(8);
///
/// assert_eq!(config.root_path, "cabin");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Path of the shared record.
    pub root_path: String,
    /// Handling of publishes made before `Subscribed`.
    pub publish_policy: PublishPolicy,
    /// Raw-to-degrees conversion for sensor readings.
    pub temperature_scale: TemperatureScale,
    /// Maximum number of queued publishes; the oldest is dropped beyond it.
    pub queue_capacity: usize,
}

impl BridgeConfig {
    /// Sets the record path.
    #[must_use]
    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    /// Sets the pre-subscription publish policy.
    #[must_use]
    pub fn with_publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish_policy = policy;
        self
    }

    /// Sets the temperature conversion.
    #[must_use]
    pub fn with_temperature_scale(mut self, scale: TemperatureScale) -> Self {
        self.temperature_scale = scale;
        self
    }

    /// Sets the publish queue bound.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            root_path: DEFAULT_ROOT_PATH.to_string(),
            publish_policy: PublishPolicy::default(),
            temperature_scale: TemperatureScale::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.root_path, "home");
        assert_eq!(config.publish_policy, PublishPolicy::Drop);
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.temperature_scale, TemperatureScale::new(1.0, 0.0));
    }

    #[test]
    fn policy_deserializes_lowercase() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"publish_policy":"queue","queue_capacity":4}"#).unwrap();
        assert_eq!(config.publish_policy, PublishPolicy::Queue);
        assert_eq!(config.queue_capacity, 4);
        assert_eq!(config.root_path, "home");
    }

    #[test]
    fn scale_applies_offset() {
        let scale = TemperatureScale::new(0.5, -10.0);
        assert!((scale.apply(60) - 20.0).abs() < f32::EPSILON);
    }
}
