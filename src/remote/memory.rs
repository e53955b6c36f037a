// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process record store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use super::{RemoteStore, Snapshots};
use crate::error::RemoteError;
use crate::types::{Field, FieldUpdate, HomeState};

/// A [`RemoteStore`] that keeps records in memory.
///
/// Writes are applied last-writer-wins and every subscriber of the record
/// receives the full snapshot after each write. Failures can be injected to
/// exercise the bridge's error paths, and authentication can be held open
/// with [`gate_auth`](Self::gate_auth) to observe the `Authenticating`
/// state.
///
/// Clones share the same records.
///
/// # Examples
///
/// ```
/// use homelink::remote::{MemoryStore, RemoteStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), homelink::error::RemoteError> {
/// let store = MemoryStore::new();
/// store.write("home/light", serde_json::json!(true)).await?;
///
/// let record = store.read("home").await?;
/// assert!(record.light);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    records: Mutex<HashMap<String, HomeState>>,
    subscribers: Mutex<Vec<Subscriber>>,
    writes: Mutex<Vec<(String, serde_json::Value)>>,
    faults: Mutex<Faults>,
    auth_gated: AtomicBool,
    auth_gate: Notify,
    auth_attempts: AtomicUsize,
}

struct Subscriber {
    root: String,
    tx: mpsc::UnboundedSender<HomeState>,
}

#[derive(Default)]
struct Faults {
    auth: Option<String>,
    write: Option<String>,
    subscribe: Option<String>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every authentication attempt fail with `reason`.
    pub fn fail_auth(&self, reason: impl Into<String>) {
        self.inner.faults.lock().auth = Some(reason.into());
    }

    /// Makes every write fail with `reason` until [`heal_writes`](Self::heal_writes).
    pub fn fail_writes(&self, reason: impl Into<String>) {
        self.inner.faults.lock().write = Some(reason.into());
    }

    /// Clears an injected write failure.
    pub fn heal_writes(&self) {
        self.inner.faults.lock().write = None;
    }

    /// Makes every subscription attempt fail with `reason`.
    pub fn fail_subscribe(&self, reason: impl Into<String>) {
        self.inner.faults.lock().subscribe = Some(reason.into());
    }

    /// Holds authentication open until [`release_auth`](Self::release_auth).
    pub fn gate_auth(&self) {
        self.inner.auth_gated.store(true, Ordering::SeqCst);
    }

    /// Lets a gated authentication complete.
    pub fn release_auth(&self) {
        self.inner.auth_gated.store(false, Ordering::SeqCst);
        self.inner.auth_gate.notify_one();
    }

    /// Returns how many times authentication was attempted.
    #[must_use]
    pub fn auth_attempts(&self) -> usize {
        self.inner.auth_attempts.load(Ordering::SeqCst)
    }

    /// Returns every applied write, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<(String, serde_json::Value)> {
        self.inner.writes.lock().clone()
    }

    /// Returns the values applied at `path`, oldest first.
    #[must_use]
    pub fn writes_to(&self, path: &str) -> Vec<serde_json::Value> {
        self.inner
            .writes
            .lock()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Returns the current record at `root`, if it was ever written.
    #[must_use]
    pub fn record(&self, root: &str) -> Option<HomeState> {
        self.inner.records.lock().get(root).copied()
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }

    fn fan_out(&self, root: &str, snapshot: HomeState) {
        self.inner
            .subscribers
            .lock()
            .retain(|s| s.root != root || s.tx.send(snapshot).is_ok());
    }
}

/// Applies a field write (`root/key`) or a whole-record write (`root`).
fn apply(
    records: &mut HashMap<String, HomeState>,
    path: &str,
    value: &serde_json::Value,
) -> Result<(String, HomeState), RemoteError> {
    let field_write = path
        .rsplit_once('/')
        .and_then(|(root, key)| Field::from_key(key).map(|field| (root, field)));

    match field_write {
        Some((root, field)) => {
            let update = FieldUpdate::from_json(field, value).ok_or_else(|| RemoteError::WriteFailure {
                path: path.to_string(),
                reason: format!("{value} is not a valid {field}"),
            })?;
            let record = records.entry(root.to_string()).or_default();
            *record = record.merged(update);
            Ok((root.to_string(), *record))
        }
        None => {
            let record: HomeState = serde_json::from_value(value.clone())?;
            records.insert(path.to_string(), record);
            Ok((path.to_string(), record))
        }
    }
}

impl RemoteStore for MemoryStore {
    async fn authenticate(&self) -> Result<(), RemoteError> {
        self.inner.auth_attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.auth_gated.load(Ordering::SeqCst) {
            self.inner.auth_gate.notified().await;
        }

        let refused = self.inner.faults.lock().auth.clone();
        match refused {
            Some(reason) => Err(RemoteError::AuthFailure(reason)),
            None => Ok(()),
        }
    }

    async fn read(&self, path: &str) -> Result<HomeState, RemoteError> {
        Ok(self.record(path).unwrap_or_default())
    }

    async fn write(&self, path: &str, value: serde_json::Value) -> Result<(), RemoteError> {
        let rejected = self.inner.faults.lock().write.clone();
        if let Some(reason) = rejected {
            return Err(RemoteError::WriteFailure {
                path: path.to_string(),
                reason,
            });
        }

        // Snapshots leave in the order the writes were applied.
        let mut records = self.inner.records.lock();
        let (root, snapshot) = apply(&mut records, path, &value)?;
        self.inner.writes.lock().push((path.to_string(), value));
        self.fan_out(&root, snapshot);
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Snapshots, RemoteError> {
        let refused = self.inner.faults.lock().subscribe.clone();
        if let Some(reason) = refused {
            return Err(RemoteError::SubscribeFailure(reason));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let records = self.inner.records.lock();
        let current = records.get(path).copied().unwrap_or_default();
        // Receiver is alive, send cannot fail.
        let _ = tx.send(current);
        self.inner.subscribers.lock().push(Subscriber {
            root: path.to_string(),
            tx,
        });
        Ok(rx)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &*self.inner.records.lock())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}
