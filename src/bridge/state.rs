// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge lifecycle states.

use std::fmt;

/// Lifecycle of a [`ReconciliationBridge`](super::ReconciliationBridge).
///
/// ```text
/// Unauthenticated -> Authenticating -> Subscribed -> Closed
///                          |                           ^
///                          +----- handshake failure ---+
/// ```
///
/// `Closed` is terminal. A closed bridge is never reopened; create a new
/// one instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// Created, `start` not called yet.
    #[default]
    Unauthenticated,
    /// Waiting for the remote handshake.
    Authenticating,
    /// Live: publishes are written and remote updates applied.
    Subscribed,
    /// Shut down or failed.
    Closed,
}

impl BridgeState {
    /// Returns true if publishes are written immediately in this state.
    #[must_use]
    pub const fn is_subscribed(self) -> bool {
        matches!(self, Self::Subscribed)
    }

    /// Returns true for the terminal state.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Subscribed => "subscribed",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
