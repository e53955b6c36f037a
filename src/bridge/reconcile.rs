// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reconciliation bridge.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{BridgeConfig, BridgeState, PublishPolicy};
use crate::edge::{EdgeControl, EdgeDispatcher};
use crate::error::{BridgeError, PeripheralError, SampleError};
use crate::hal::SharedActuator;
use crate::remote::{RemoteStore, Snapshots};
use crate::sampler::SamplingEngine;
use crate::task::BackgroundTask;
use crate::types::{FieldUpdate, HomeState};

/// Keeps the local actuator and the remote record eventually consistent.
///
/// The bridge holds no hardware handles of its own. It is given a shared
/// actuator reference and wired to the sampling engine and edge dispatcher
/// through their callbacks. Publishing never blocks: updates are handed to a
/// writer task and remote write failures are only logged.
///
/// Inbound snapshots are compared against the last locally applied `light`
/// value. A snapshot that matches is an echo of our own write and is
/// ignored; one that differs drives the actuator exactly once. While a local
/// `light` write is still in flight, snapshots carrying another value
/// predate it and are ignored as well. Once the store acknowledges the write,
/// later snapshots are authoritative again. Snapshots that queue up while
/// the subscription task is busy are merged, and only the newest is
/// reconciled. The cached value and the actuator are updated under one lock,
/// so a local mirror and a remote apply never interleave.
///
/// If the store ends the subscription the bridge moves to `Closed` on its
/// own; observe it through [`watch_state`](Self::watch_state).
///
/// Cloning yields another handle to the same bridge.
///
/// # Examples
///
/// ```
/// use homelink::bridge::{BridgeConfig, BridgeState, ReconciliationBridge};
/// use homelink::remote::MemoryStore;
/// use homelink::types::FieldUpdate;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), homelink::error::BridgeError> {
/// let bridge = ReconciliationBridge::new(MemoryStore::new(), BridgeConfig::default());
/// bridge.start().await?;
/// assert_eq!(bridge.state(), BridgeState::Subscribed);
///
/// assert!(bridge.publish(FieldUpdate::Temperature(21.5)));
/// bridge.close().await;
/// # Ok(())
/// # }
/// ```
pub struct ReconciliationBridge<S> {
    inner: Arc<BridgeInner<S>>,
}

struct BridgeInner<S> {
    store: Arc<S>,
    config: BridgeConfig,
    state: Arc<watch::Sender<BridgeState>>,
    snapshot: Arc<Mutex<HomeState>>,
    light: Arc<Mutex<LightCache>>,
    outbox: Arc<Mutex<Outbox>>,
    tasks: Mutex<Vec<BackgroundTask>>,
}

/// Last locally applied light value and the actuator it drives.
#[derive(Default)]
struct LightCache {
    last_applied: Option<bool>,
    /// Latest local `light` publish the store has not acknowledged yet.
    unconfirmed: Option<bool>,
    actuator: Option<SharedActuator>,
}

#[derive(Default)]
struct Outbox {
    pending: VecDeque<FieldUpdate>,
    tx: Option<mpsc::UnboundedSender<FieldUpdate>>,
}

impl<S: RemoteStore> ReconciliationBridge<S> {
    /// Creates an unauthenticated bridge over `store`.
    #[must_use]
    pub fn new(store: S, config: BridgeConfig) -> Self {
        let (state, _) = watch::channel(BridgeState::Unauthenticated);
        Self {
            inner: Arc::new(BridgeInner {
                store: Arc::new(store),
                config,
                state: Arc::new(state),
                snapshot: Arc::new(Mutex::new(HomeState::default())),
                light: Arc::new(Mutex::new(LightCache::default())),
                outbox: Arc::new(Mutex::new(Outbox::default())),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the bridge configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Returns the remote store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BridgeState {
        *self.inner.state.borrow()
    }

    /// Returns a receiver that observes every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.inner.state.subscribe()
    }

    /// Returns the cached record.
    ///
    /// Local publishes and remote snapshots are merged last-writer-wins.
    #[must_use]
    pub fn snapshot(&self) -> HomeState {
        *self.inner.snapshot.lock()
    }

    /// Sets the actuator driven by remote `light` changes and local mirrors.
    pub fn set_actuator(&self, actuator: SharedActuator) {
        self.inner.light.lock().actuator = Some(actuator);
    }

    /// Authenticates, subscribes to the record and enters `Subscribed`.
    ///
    /// Publishes queued before this point are flushed in order. No timeout
    /// is applied to the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidState`] if the bridge was already
    /// started or was closed while authenticating, and
    /// [`BridgeError::Handshake`] if authentication or the subscription
    /// failed. After a handshake failure the bridge is `Closed` and must be
    /// recreated.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let mut actual = BridgeState::Unauthenticated;
        let moved = self.inner.state.send_if_modified(|state| {
            actual = *state;
            if *state == BridgeState::Unauthenticated {
                *state = BridgeState::Authenticating;
                true
            } else {
                false
            }
        });
        if !moved {
            return Err(BridgeError::InvalidState {
                expected: BridgeState::Unauthenticated,
                actual,
            });
        }
        tracing::info!(path = %self.inner.config.root_path, "Authenticating with remote store");

        let handshake = async {
            self.inner.store.authenticate().await?;
            self.inner.store.subscribe(&self.inner.config.root_path).await
        };
        let snapshots = match handshake.await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                tracing::error!(
                    path = %self.inner.config.root_path,
                    error = %e,
                    "Remote handshake failed"
                );
                self.close().await;
                return Err(BridgeError::Handshake(e));
            }
        };

        self.enter_subscribed(snapshots)
    }

    /// Writes one field of the record.
    ///
    /// Never blocks and never fails: the write happens on the bridge's
    /// writer task and its failure is logged. Returns true if the update
    /// was accepted for writing or queued, false if it was dropped because
    /// the bridge is not subscribed.
    pub fn publish(&self, update: FieldUpdate) -> bool {
        match update {
            FieldUpdate::Light(on) => {
                let mut light = self.inner.light.lock();
                let accepted = self.inner.enqueue(update);
                if accepted {
                    light.published(on);
                }
                accepted
            }
            _ => self.inner.enqueue(update),
        }
    }

    /// Scales a raw sensor byte and publishes it as `temperature`.
    pub fn publish_temperature(&self, raw: u8) -> bool {
        let degrees = self.inner.config.temperature_scale.apply(raw);
        self.publish(FieldUpdate::Temperature(degrees))
    }

    /// Handles a logical button level from the edge path.
    ///
    /// Mirrors the level onto the actuator directly, then publishes
    /// `button` and `light`. The mirror happens even when the bridge is not
    /// subscribed.
    pub fn handle_button(&self, pressed: bool) {
        let mut light = self.inner.light.lock();
        light.mirror(pressed);
        self.inner.enqueue(FieldUpdate::Button(pressed));
        if self.inner.enqueue(FieldUpdate::Light(pressed)) {
            light.published(pressed);
        }
    }

    /// Pulls the current record and reconciles it like an inbound snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidState`] unless the bridge is
    /// `Subscribed`, or [`BridgeError::Remote`] if the read fails.
    pub async fn refresh(&self) -> Result<HomeState, BridgeError> {
        let actual = self.state();
        if !actual.is_subscribed() {
            return Err(BridgeError::InvalidState {
                expected: BridgeState::Subscribed,
                actual,
            });
        }

        let record = self.inner.store.read(&self.inner.config.root_path).await?;
        reconcile(&self.inner.snapshot, &self.inner.light, record);
        Ok(record)
    }

    /// Feeds sensor readings into `temperature` publishes.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::NotOpen`] if the engine is closed.
    pub async fn attach_sensor(&self, engine: &mut SamplingEngine) -> Result<(), SampleError> {
        let bridge = self.clone();
        engine
            .set_listener(move |reading| match reading {
                Ok(raw) => {
                    bridge.publish_temperature(raw);
                }
                Err(e) => tracing::debug!(error = %e, "No temperature to publish"),
            })
            .await
    }

    /// Routes button edges through [`handle_button`](Self::handle_button).
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::Closed`] if the dispatcher is closed.
    pub async fn attach_button(&self, dispatcher: &mut EdgeDispatcher) -> Result<(), PeripheralError> {
        let bridge = self.clone();
        dispatcher
            .on_edge(move |event| {
                bridge.handle_button(event.new_level);
                EdgeControl::Continue
            })
            .await
    }

    /// Shuts the bridge down.
    ///
    /// Queued publishes are discarded. Once this returns no remote write is
    /// issued and no remote update reaches the actuator. Idempotent.
    pub async fn close(&self) {
        let (previous, discarded) = shut(&self.inner.outbox, &self.inner.state);
        if discarded > 0 {
            tracing::warn!(count = discarded, "Discarded queued publishes on close");
        }

        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            task.stop().await;
        }
        self.inner.light.lock().actuator = None;

        if !previous.is_closed() {
            tracing::info!(from = %previous, "Bridge closed");
        }
    }

    fn enter_subscribed(&self, snapshots: Snapshots) -> Result<(), BridgeError> {
        let mut outbox = self.inner.outbox.lock();
        let actual = *self.inner.state.borrow();
        if actual != BridgeState::Authenticating {
            return Err(BridgeError::InvalidState {
                expected: BridgeState::Authenticating,
                actual,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let writer = {
            let store = Arc::clone(&self.inner.store);
            let root = self.inner.config.root_path.clone();
            let light = Arc::clone(&self.inner.light);
            BackgroundTask::spawn("bridge-writer", move |cancel| {
                write_loop(store, root, light, rx, cancel)
            })
        };
        let subscription = {
            let snapshot = Arc::clone(&self.inner.snapshot);
            let light = Arc::clone(&self.inner.light);
            let outbox = Arc::clone(&self.inner.outbox);
            let state = Arc::clone(&self.inner.state);
            BackgroundTask::spawn("bridge-subscription", move |cancel| {
                subscription_loop(snapshots, snapshot, light, outbox, state, cancel)
            })
        };
        self.inner.tasks.lock().extend([writer, subscription]);

        let flushed = outbox.pending.len();
        for update in outbox.pending.drain(..) {
            // The writer holds rx until cancelled.
            let _ = tx.send(update);
        }
        outbox.tx = Some(tx);
        self.inner.state.send_replace(BridgeState::Subscribed);
        drop(outbox);

        tracing::info!(
            path = %self.inner.config.root_path,
            flushed,
            "Bridge subscribed"
        );
        Ok(())
    }
}

impl<S: RemoteStore> BridgeInner<S> {
    fn enqueue(&self, update: FieldUpdate) -> bool {
        let mut outbox = self.outbox.lock();

        if let Some(tx) = &outbox.tx {
            if tx.send(update).is_err() {
                tracing::warn!(%update, "Publish dropped: writer stopped");
                return false;
            }
            drop(outbox);
            self.record_local(update);
            tracing::debug!(%update, "Publish accepted");
            return true;
        }

        let state = *self.state.borrow();
        if state.is_closed() || self.config.publish_policy == PublishPolicy::Drop {
            tracing::warn!(%update, %state, "Publish dropped: bridge not subscribed");
            return false;
        }
        if self.config.queue_capacity == 0 {
            tracing::warn!(%update, "Publish dropped: queue has no capacity");
            return false;
        }

        if outbox.pending.len() >= self.config.queue_capacity
            && let Some(oldest) = outbox.pending.pop_front()
        {
            tracing::warn!(dropped = %oldest, "Publish queue full, dropped oldest");
        }
        outbox.pending.push_back(update);
        drop(outbox);
        self.record_local(update);
        tracing::debug!(%update, %state, "Publish queued until subscribed");
        true
    }

    fn record_local(&self, update: FieldUpdate) {
        let mut snapshot = self.snapshot.lock();
        *snapshot = snapshot.merged(update);
    }
}

impl LightCache {
    /// Drives the actuator from the local edge path.
    fn mirror(&mut self, on: bool) {
        if let Some(actuator) = &self.actuator
            && let Err(e) = actuator.lock().set(on)
        {
            tracing::error!(light = on, error = %e, "Failed to mirror light");
        }
        self.last_applied = Some(on);
    }

    /// Records a local `light` publish awaiting acknowledgement.
    fn published(&mut self, on: bool) {
        self.last_applied = Some(on);
        self.unconfirmed = Some(on);
    }

    /// Ends the guard for a `light` write the store has answered, whether
    /// it was applied or refused.
    fn settled(&mut self, on: bool) {
        if self.unconfirmed == Some(on) {
            self.unconfirmed = None;
        }
    }

    /// Applies a remote light value unless it matches the last applied one.
    fn apply_remote(&mut self, on: bool) -> bool {
        if let Some(pending) = self.unconfirmed {
            if pending == on {
                self.unconfirmed = None;
            } else {
                tracing::debug!(light = on, pending, "Remote light predates local write, ignored");
            }
            return false;
        }
        if self.last_applied == Some(on) {
            tracing::debug!(light = on, "Remote light unchanged, ignored");
            return false;
        }
        let Some(actuator) = &self.actuator else {
            tracing::debug!(light = on, "No actuator attached, remote light not applied");
            return false;
        };
        if let Err(e) = actuator.lock().set(on) {
            tracing::error!(light = on, error = %e, "Failed to apply remote light");
            return false;
        }
        self.last_applied = Some(on);
        tracing::info!(light = on, "Applied remote light");
        true
    }
}

fn reconcile(snapshot: &Mutex<HomeState>, light: &Mutex<LightCache>, remote: HomeState) {
    *snapshot.lock() = remote;
    light.lock().apply_remote(remote.light);
}

async fn write_loop<S: RemoteStore>(
    store: Arc<S>,
    root: String,
    light: Arc<Mutex<LightCache>>,
    mut rx: mpsc::UnboundedReceiver<FieldUpdate>,
    cancel: CancellationToken,
) {
    loop {
        let update = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(update) => update,
                None => break,
            },
        };

        let path = update.field().path(&root);
        match store.write(&path, update.to_json()).await {
            Ok(()) => tracing::debug!(path = %path, %update, "Remote write applied"),
            Err(e) => tracing::error!(path = %path, error = %e, "Remote write failed"),
        }
        if let FieldUpdate::Light(on) = update {
            light.lock().settled(on);
        }
    }
}

async fn subscription_loop(
    mut snapshots: Snapshots,
    snapshot: Arc<Mutex<HomeState>>,
    light: Arc<Mutex<LightCache>>,
    outbox: Arc<Mutex<Outbox>>,
    state: Arc<watch::Sender<BridgeState>>,
    cancel: CancellationToken,
) {
    loop {
        let mut remote = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = snapshots.recv() => match next {
                Some(remote) => remote,
                None => {
                    let (previous, discarded) = shut(&outbox, &state);
                    if !previous.is_closed() {
                        tracing::warn!(discarded, "Remote subscription ended, bridge closed");
                    }
                    break;
                }
            },
        };

        let mut merged = 0usize;
        while let Ok(newer) = snapshots.try_recv() {
            remote = newer;
            merged += 1;
        }
        tracing::debug!(?remote, merged, "Remote snapshot received");
        reconcile(&snapshot, &light, remote);
    }
}

/// Detaches the writer, discards queued publishes and moves to `Closed`.
///
/// Returns the previous state and how many publishes were discarded.
fn shut(outbox: &Mutex<Outbox>, state: &watch::Sender<BridgeState>) -> (BridgeState, usize) {
    let mut outbox = outbox.lock();
    outbox.tx = None;
    let discarded = outbox.pending.len();
    outbox.pending.clear();
    (state.send_replace(BridgeState::Closed), discarded)
}

impl<S> Clone for ReconciliationBridge<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for ReconciliationBridge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationBridge")
            .field("state", &*self.inner.state.borrow())
            .field("config", &self.inner.config)
            .field("snapshot", &*self.inner.snapshot.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::error::RemoteError;
    use crate::hal::{LineActuator, PeripheralProvider, SimPeripherals};
    use crate::remote::MemoryStore;
    use crate::types::PinConfig;

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn led(sim: &SimPeripherals) -> SharedActuator {
        let line = sim.open_pin("BCM6").unwrap();
        LineActuator::new(line, PinConfig::output_initially_low())
            .unwrap()
            .shared()
    }

    #[tokio::test]
    async fn start_reaches_subscribed() {
        let store = MemoryStore::new();
        let bridge = ReconciliationBridge::new(store.clone(), BridgeConfig::default());
        let mut states = bridge.watch_state();

        bridge.start().await.unwrap();
        assert_eq!(bridge.state(), BridgeState::Subscribed);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), BridgeState::Subscribed);
        assert_eq!(store.subscriber_count(), 1);

        bridge.close().await;
        assert_eq!(bridge.state(), BridgeState::Closed);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let bridge = ReconciliationBridge::new(MemoryStore::new(), BridgeConfig::default());
        bridge.start().await.unwrap();

        let err = bridge.start().await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::InvalidState {
                expected: BridgeState::Unauthenticated,
                actual: BridgeState::Subscribed,
            }
        ));
        bridge.close().await;
    }

    #[tokio::test]
    async fn auth_failure_closes_bridge() {
        let store = MemoryStore::new();
        store.fail_auth("revoked");
        let bridge = ReconciliationBridge::new(store.clone(), BridgeConfig::default());

        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::Handshake(RemoteError::AuthFailure(_))));
        assert_eq!(bridge.state(), BridgeState::Closed);
        assert_eq!(store.subscriber_count(), 0);

        assert!(!bridge.publish(FieldUpdate::Button(true)));
        settle().await;
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn subscribe_failure_closes_bridge() {
        let store = MemoryStore::new();
        store.fail_subscribe("no such record");
        let bridge = ReconciliationBridge::new(store, BridgeConfig::default());

        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::Handshake(RemoteError::SubscribeFailure(_))));
        assert_eq!(bridge.state(), BridgeState::Closed);
    }

    #[tokio::test]
    async fn publish_writes_field_path() {
        let store = MemoryStore::new();
        let bridge = ReconciliationBridge::new(store.clone(), BridgeConfig::default());
        bridge.start().await.unwrap();

        assert!(bridge.publish_temperature(23));
        settle().await;

        assert_eq!(store.writes_to("home/temperature"), vec![json!(23.0)]);
        assert!((bridge.snapshot().temperature - 23.0).abs() < f32::EPSILON);
        bridge.close().await;
    }

    #[tokio::test]
    async fn write_failure_is_contained() {
        let store = MemoryStore::new();
        store.fail_writes("offline");
        let bridge = ReconciliationBridge::new(store.clone(), BridgeConfig::default());
        bridge.start().await.unwrap();

        assert!(bridge.publish(FieldUpdate::Button(true)));
        settle().await;
        assert!(store.writes().is_empty());
        assert_eq!(bridge.state(), BridgeState::Subscribed);

        store.heal_writes();
        assert!(bridge.publish(FieldUpdate::Button(false)));
        settle().await;
        assert_eq!(store.writes_to("home/button"), vec![json!(false)]);
        bridge.close().await;
    }

    #[tokio::test]
    async fn queued_publishes_flush_in_order() {
        let store = MemoryStore::new();
        store.gate_auth();
        let config = BridgeConfig::default().with_publish_policy(PublishPolicy::Queue);
        let bridge = ReconciliationBridge::new(store.clone(), config);

        let starting = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.start().await }
        });
        let mut states = bridge.watch_state();
        states
            .wait_for(|s| *s == BridgeState::Authenticating)
            .await
            .unwrap();

        assert!(bridge.publish(FieldUpdate::Temperature(19.0)));
        assert!(bridge.publish(FieldUpdate::Temperature(20.0)));
        assert!(store.writes().is_empty());

        store.release_auth();
        starting.await.unwrap().unwrap();
        settle().await;

        assert_eq!(
            store.writes_to("home/temperature"),
            vec![json!(19.0), json!(20.0)]
        );
        bridge.close().await;
    }

    #[tokio::test]
    async fn full_queue_drops_oldest() {
        let store = MemoryStore::new();
        store.gate_auth();
        let config = BridgeConfig::default()
            .with_publish_policy(PublishPolicy::Queue)
            .with_queue_capacity(2);
        let bridge = ReconciliationBridge::new(store.clone(), config);

        let starting = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.start().await }
        });
        bridge
            .watch_state()
            .wait_for(|s| *s == BridgeState::Authenticating)
            .await
            .unwrap();

        for degrees in [18.0, 19.0, 20.0] {
            bridge.publish(FieldUpdate::Temperature(degrees));
        }
        store.release_auth();
        starting.await.unwrap().unwrap();
        settle().await;

        assert_eq!(
            store.writes_to("home/temperature"),
            vec![json!(19.0), json!(20.0)]
        );
        bridge.close().await;
    }

    #[tokio::test]
    async fn close_while_authenticating_discards_queue() {
        let store = MemoryStore::new();
        store.gate_auth();
        let config = BridgeConfig::default().with_publish_policy(PublishPolicy::Queue);
        let bridge = ReconciliationBridge::new(store.clone(), config);

        let starting = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.start().await }
        });
        bridge
            .watch_state()
            .wait_for(|s| *s == BridgeState::Authenticating)
            .await
            .unwrap();
        bridge.publish(FieldUpdate::Light(true));

        bridge.close().await;
        store.release_auth();

        let err = starting.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            BridgeError::InvalidState {
                actual: BridgeState::Closed,
                ..
            }
        ));
        settle().await;
        assert!(store.writes().is_empty());
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn remote_light_drives_actuator() {
        let sim = SimPeripherals::new().with_pin("BCM6");
        let store = MemoryStore::new();
        let bridge = ReconciliationBridge::new(store.clone(), BridgeConfig::default());
        bridge.set_actuator(led(&sim));
        bridge.start().await.unwrap();
        settle().await;

        store.write("home/light", json!(true)).await.unwrap();
        settle().await;

        assert_eq!(sim.level("BCM6"), Some(true));
        assert!(bridge.snapshot().light);
        bridge.close().await;
    }

    #[tokio::test]
    async fn handle_button_mirrors_and_publishes() {
        let sim = SimPeripherals::new().with_pin("BCM6");
        let store = MemoryStore::new();
        let bridge = ReconciliationBridge::new(store.clone(), BridgeConfig::default());
        bridge.set_actuator(led(&sim));
        bridge.start().await.unwrap();
        settle().await;
        let before = sim.output_writes("BCM6").len();

        bridge.handle_button(true);
        settle().await;

        assert_eq!(sim.output_writes("BCM6").len(), before + 1);
        assert_eq!(sim.level("BCM6"), Some(true));
        assert_eq!(
            store.writes(),
            vec![
                ("home/button".to_string(), json!(true)),
                ("home/light".to_string(), json!(true)),
            ]
        );
        bridge.close().await;
    }

    /// A store that acknowledges writes without echoing them and lets the
    /// test drive the snapshot stream by hand, like a backend that merges
    /// updates.
    #[derive(Default)]
    struct ScriptedStore {
        feed: Mutex<Option<mpsc::UnboundedSender<HomeState>>>,
        writes: Mutex<Vec<String>>,
    }

    impl ScriptedStore {
        fn push(&self, remote: HomeState) {
            if let Some(tx) = &*self.feed.lock() {
                tx.send(remote).unwrap();
            }
        }

        fn end_stream(&self) {
            self.feed.lock().take();
        }
    }

    impl RemoteStore for ScriptedStore {
        async fn authenticate(&self) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn read(&self, _path: &str) -> Result<HomeState, RemoteError> {
            Ok(HomeState::default())
        }

        async fn write(&self, path: &str, _value: serde_json::Value) -> Result<(), RemoteError> {
            self.writes.lock().push(path.to_string());
            Ok(())
        }

        async fn subscribe(&self, _path: &str) -> Result<Snapshots, RemoteError> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.feed.lock() = Some(tx);
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn acknowledged_light_yields_to_later_remote_change() {
        let sim = SimPeripherals::new().with_pin("BCM6");
        let bridge = ReconciliationBridge::new(ScriptedStore::default(), BridgeConfig::default());
        bridge.set_actuator(led(&sim));
        bridge.start().await.unwrap();

        bridge.handle_button(true);
        settle().await;
        assert_eq!(sim.level("BCM6"), Some(true));
        assert_eq!(bridge.store().writes.lock().len(), 2);

        // The echo never comes; another writer switched the light off.
        let remote = HomeState {
            button: true,
            light: false,
            temperature: 0.0,
        };
        bridge.store().push(remote);
        settle().await;

        assert_eq!(sim.level("BCM6"), Some(false));
        assert_eq!(bridge.snapshot(), remote);
        bridge.close().await;
    }

    #[tokio::test]
    async fn queued_snapshots_reconcile_newest_only() {
        let sim = SimPeripherals::new().with_pin("BCM6");
        let bridge = ReconciliationBridge::new(ScriptedStore::default(), BridgeConfig::default());
        bridge.set_actuator(led(&sim));
        bridge.start().await.unwrap();

        for light in [true, false, true] {
            bridge.store().push(HomeState {
                light,
                ..HomeState::default()
            });
        }
        settle().await;

        assert_eq!(sim.output_writes("BCM6"), vec![true]);
        bridge.close().await;
    }

    #[tokio::test]
    async fn ended_subscription_closes_bridge() {
        let bridge = ReconciliationBridge::new(ScriptedStore::default(), BridgeConfig::default());
        let mut states = bridge.watch_state();
        bridge.start().await.unwrap();
        assert_eq!(*states.borrow_and_update(), BridgeState::Subscribed);

        bridge.store().end_stream();
        states
            .wait_for(|s| *s == BridgeState::Closed)
            .await
            .unwrap();

        assert!(!bridge.publish(FieldUpdate::Button(true)));
        settle().await;
        assert!(bridge.store().writes.lock().is_empty());
        bridge.close().await;
    }

    #[tokio::test]
    async fn refresh_requires_subscribed() {
        let store = MemoryStore::new();
        store.write("home/light", json!(true)).await.unwrap();
        let bridge = ReconciliationBridge::new(store, BridgeConfig::default());

        assert!(matches!(
            bridge.refresh().await,
            Err(BridgeError::InvalidState { .. })
        ));

        bridge.start().await.unwrap();
        let record = bridge.refresh().await.unwrap();
        assert!(record.light);
        assert!(bridge.snapshot().light);
        bridge.close().await;
    }
}
