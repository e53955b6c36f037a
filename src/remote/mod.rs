// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The remote shared-state store.
//!
//! The store is a key-value record service reached over the network. The
//! bridge only needs four operations from it, captured by [`RemoteStore`].
//! Paths are `/`-separated: the record lives at a root path such as `home`
//! and each field at `home/<field>`.
//!
//! Delivery is at-least-once with no ordering stronger than "reflects the
//! last successful write". A subscriber may see the same snapshot twice.
//!
//! [`MemoryStore`] is an in-process implementation for tests and demos.

mod memory;

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::RemoteError;
use crate::types::HomeState;

pub use memory::MemoryStore;

/// Stream of full-record snapshots from a subscription.
///
/// The subscription ends when the receiver yields `None`.
pub type Snapshots = mpsc::UnboundedReceiver<HomeState>;

/// Client for the remote shared-state record store.
///
/// Authentication is owned by an external identity collaborator; the store
/// only reports whether the session was accepted.
pub trait RemoteStore: Send + Sync + 'static {
    /// Establishes an authenticated session.
    ///
    /// No timeout is applied; a stalled identity service stalls the caller.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::AuthFailure`] if the session is refused.
    fn authenticate(&self) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Reads the whole record at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Codec`] if the stored record does not decode.
    fn read(&self, path: &str) -> impl Future<Output = Result<HomeState, RemoteError>> + Send;

    /// Writes `value` at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::WriteFailure`] if the store rejects the write.
    fn write(
        &self,
        path: &str,
        value: serde_json::Value,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Opens a continuous subscription to the record at `path`.
    ///
    /// The current record is delivered first, then one snapshot per change.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::SubscribeFailure`] if the subscription cannot
    /// be opened.
    fn subscribe(&self, path: &str) -> impl Future<Output = Result<Snapshots, RemoteError>> + Send;
}
