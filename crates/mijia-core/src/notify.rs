//! Scoped notification subscriptions.
//!
//! A [`NotificationStream`] owns one characteristic subscription. It ends with
//! [`Error::NotConnected`] as soon as its session is cancelled (disconnect or
//! link loss) or the underlying value stream closes, so a waiter never hangs on
//! a dead link. [`NotificationStream::stop`] releases the subscription;
//! dropping an unstopped stream releases it in the background.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::Stream;
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::link::{LinkCharacteristic, ValueStream};

/// A live subscription to one characteristic.
///
/// Also usable as a [`Stream`] of `Result<Vec<u8>>`; the stream form yields a
/// single `Err(NotConnected)` when the session ends and then finishes. The
/// per-value timeout only applies to [`next_value`](Self::next_value).
pub struct NotificationStream {
    characteristic: Arc<dyn LinkCharacteristic>,
    values: Option<ValueStream>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    value_timeout: Option<Duration>,
    stopped: bool,
}

impl std::fmt::Debug for NotificationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStream")
            .field("characteristic", &self.characteristic.uuid())
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl NotificationStream {
    pub(crate) fn new(
        characteristic: Arc<dyn LinkCharacteristic>,
        values: ValueStream,
        session: CancellationToken,
        value_timeout: Option<Duration>,
    ) -> Self {
        debug!(characteristic = %characteristic.uuid(), "Subscribed");
        Self {
            characteristic,
            values: Some(values),
            cancelled: Box::pin(session.cancelled_owned()),
            value_timeout,
            stopped: false,
        }
    }

    /// The subscribed characteristic.
    pub fn uuid(&self) -> Uuid {
        self.characteristic.uuid()
    }

    /// Wait for the next pushed value.
    ///
    /// Fails with [`Error::NotConnected`] if the session ends or the stream
    /// has finished, and with [`Error::Timeout`] if a notification timeout is
    /// configured and elapses first.
    pub async fn next_value(&mut self) -> Result<Vec<u8>> {
        let values = self.values.as_mut().ok_or(Error::NotConnected)?;
        let cancelled = &mut self.cancelled;
        let next = async {
            tokio::select! {
                biased;
                _ = cancelled => None,
                value = values.next() => value,
            }
        };

        let value = match self.value_timeout {
            Some(limit) => timeout(limit, next)
                .await
                .map_err(|_| Error::timeout("await notification", limit))?,
            None => next.await,
        };

        match value {
            Some(value) => {
                debug!(len = value.len(), "Notification");
                Ok(value)
            }
            None => {
                self.values = None;
                Err(Error::NotConnected)
            }
        }
    }

    /// Unsubscribe and release the listener.
    pub async fn stop(mut self) -> Result<()> {
        self.stopped = true;
        self.values = None;
        debug!(characteristic = %self.characteristic.uuid(), "Unsubscribing");
        self.characteristic.unsubscribe().await
    }
}

impl Stream for NotificationStream {
    type Item = Result<Vec<u8>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(values) = this.values.as_mut() else {
            return Poll::Ready(None);
        };

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.values = None;
            return Poll::Ready(Some(Err(Error::NotConnected)));
        }

        match values.as_mut().poll_next(cx) {
            Poll::Ready(Some(value)) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(None) => {
                this.values = None;
                Poll::Ready(Some(Err(Error::NotConnected)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        self.values = None;

        let characteristic = Arc::clone(&self.characteristic);
        warn!(
            characteristic = %characteristic.uuid(),
            "NotificationStream dropped without stop() - unsubscribing in the background"
        );
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = characteristic.unsubscribe().await {
                    debug!(error = %e, "Best-effort unsubscribe failed");
                }
            });
        }
    }
}
