// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cancellable background tasks with awaitable shutdown.
//!
//! A [`BackgroundTask`] pairs a spawned tokio task with a
//! [`CancellationToken`]. Stopping it cancels the token and then waits for
//! the task to return, so once [`BackgroundTask::stop`] resolves the task
//! body is guaranteed not to run again.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned task that can be cancelled and joined.
#[derive(Debug)]
pub struct BackgroundTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawns `body` on the current tokio runtime.
    ///
    /// The body receives a child token and must return promptly once it is
    /// cancelled.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(cancel.clone()));
        tracing::debug!(task = name, "Background task started");
        Self {
            name,
            cancel,
            handle: Some(handle),
        }
    }

    /// Returns true if the task body has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancels the task and waits until it has returned.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::error!(task = self.name, error = %e, "Background task ended abnormally");
        }
        tracing::debug!(task = self.name, "Background task stopped");
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        // Without an await point the best we can do is signal.
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_body() {
        let ticks = Arc::new(AtomicU32::new(0));
        let ticks_clone = Arc::clone(&ticks);

        let task = BackgroundTask::spawn("ticker", move |cancel| async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_millis(10)) => {
                        ticks_clone.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        task.stop().await;
        let after_stop = ticks.load(Ordering::SeqCst);
        assert_eq!(after_stop, 3);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn finished_after_body_returns() {
        let task = BackgroundTask::spawn("oneshot", |_cancel| async {});
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(task.is_finished());
        task.stop().await;
    }

    #[tokio::test]
    async fn drop_cancels_token() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let task = BackgroundTask::spawn("dropped", move |cancel| async move {
            cancel.cancelled().await;
            let _ = tx.send(());
        });

        drop(task);
        assert!(rx.await.is_ok());
    }
}
