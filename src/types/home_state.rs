// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The shared home record and single-field updates to it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Latest known snapshot shared between the device and the remote store.
///
/// This is a plain value: every update produces a new copy via
/// [`HomeState::merged`], it is never mutated in place across tasks.
/// The serialized shape is the persisted record layout:
///
/// ```
/// use homelink::types::HomeState;
///
/// let state = HomeState { button: true, light: true, temperature: 23.0 };
/// let json = serde_json::to_string(&state).unwrap();
/// assert_eq!(json, r#"{"button":true,"light":true,"temperature":23.0}"#);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeState {
    /// Logical level of the push button.
    pub button: bool,
    /// Requested state of the light actuator.
    pub light: bool,
    /// Last temperature reading, after bridge-side scaling.
    pub temperature: f32,
}

impl HomeState {
    /// Returns a copy of this state with one field replaced.
    #[must_use]
    pub fn merged(self, update: FieldUpdate) -> Self {
        let mut next = self;
        match update {
            FieldUpdate::Button(value) => next.button = value,
            FieldUpdate::Light(value) => next.light = value,
            FieldUpdate::Temperature(value) => next.temperature = value,
        }
        next
    }

    /// Returns the current value of `field` as an update.
    #[must_use]
    pub fn get(&self, field: Field) -> FieldUpdate {
        match field {
            Field::Button => FieldUpdate::Button(self.button),
            Field::Light => FieldUpdate::Light(self.light),
            Field::Temperature => FieldUpdate::Temperature(self.temperature),
        }
    }
}

/// One of the three fields of [`HomeState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The `button` field.
    Button,
    /// The `light` field.
    Light,
    /// The `temperature` field.
    Temperature,
}

impl Field {
    /// Every field, in record order.
    pub const ALL: [Self; 3] = [Self::Button, Self::Light, Self::Temperature];

    /// Returns the key used in the persisted record.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Light => "light",
            Self::Temperature => "temperature",
        }
    }

    /// Looks up a field by its record key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == key)
    }

    /// Returns the full store path of this field under `root`.
    #[must_use]
    pub fn path(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self.as_str())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write of a single [`HomeState`] field.
///
/// # Examples
///
/// ```
/// use homelink::types::{Field, FieldUpdate};
///
/// let update = FieldUpdate::Temperature(23.0);
/// assert_eq!(update.field(), Field::Temperature);
/// assert_eq!(update.field().path("home"), "home/temperature");
/// assert_eq!(update.to_json(), serde_json::json!(23.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldUpdate {
    /// New `button` value.
    Button(bool),
    /// New `light` value.
    Light(bool),
    /// New `temperature` value.
    Temperature(f32),
}

impl FieldUpdate {
    /// Returns which field this update targets.
    #[must_use]
    pub const fn field(&self) -> Field {
        match self {
            Self::Button(_) => Field::Button,
            Self::Light(_) => Field::Light,
            Self::Temperature(_) => Field::Temperature,
        }
    }

    /// Encodes the value the way it is stored at the field path.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match *self {
            Self::Button(v) | Self::Light(v) => serde_json::Value::Bool(v),
            Self::Temperature(v) => serde_json::Value::from(f64::from(v)),
        }
    }

    /// Decodes a stored value for `field`.
    ///
    /// Returns `None` when the JSON type does not match the field.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_json(field: Field, value: &serde_json::Value) -> Option<Self> {
        match field {
            Field::Button => value.as_bool().map(Self::Button),
            Field::Light => value.as_bool().map(Self::Light),
            Field::Temperature => value.as_f64().map(|v| Self::Temperature(v as f32)),
        }
    }
}

impl fmt::Display for FieldUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Button(v) | Self::Light(v) => write!(f, "{}={v}", self.field()),
            Self::Temperature(v) => write!(f, "{}={v:.1}", self.field()),
        }
    }
}
