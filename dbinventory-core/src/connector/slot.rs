//! A single client that is rebuilt on demand after it was discarded.
//!
//! Drivers without a pool keep their client here. A caller that sees the
//! client fail at the transport level discards it; the next caller connects
//! again. Once the slot is closed it never reconnects.

use crate::{InventoryError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};

pub(super) struct SessionSlot<C> {
    client: Mutex<Option<C>>,
    closed: AtomicBool,
}

impl<C> SessionSlot<C> {
    pub(super) fn new(client: C) -> Self {
        Self {
            client: Mutex::new(Some(client)),
            closed: AtomicBool::new(false),
        }
    }

    /// Locks the slot, connecting first if the previous client was discarded.
    ///
    /// The returned guard always holds a client.
    pub(super) async fn acquire<F, Fut>(&self, connect: F) -> Result<MutexGuard<'_, Option<C>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        let mut guard = self.client.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error());
        }
        if guard.is_none() {
            tracing::info!("Reconnecting after a lost connection");
            *guard = Some(connect().await?);
        }
        Ok(guard)
    }

    /// Takes the client out for good. Later `acquire` calls fail.
    pub(super) async fn close(&self) -> Option<C> {
        let mut guard = self.client.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        guard.take()
    }
}

pub(super) fn closed_error() -> InventoryError {
    InventoryError::connection_failed(
        "connection closed",
        std::io::Error::new(std::io::ErrorKind::NotConnected, "connection closed"),
    )
}
