//! Process-wide notifications.
//!
//! Low-memory pressure and debug-dump requests are broadcast through a
//! [`SignalHub`]. Each tile manager subscribes when constructed and drains its
//! subscription on the owning thread; dropping the [`Subscription`]
//! unregisters it.

use crossbeam_channel::{unbounded, Receiver, Sender};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use crate::prelude::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Drop every reclaimable tile now
    LowMemory,
    /// Log the current tile state of every subscriber
    DumpDebugLogs,
}

/// The hub every manager subscribes to unless given another one
static GLOBAL_HUB: Lazy<SignalHub> = Lazy::new(SignalHub::new);

pub fn global() -> &'static SignalHub {
    &GLOBAL_HUB
}

/// Convenience for `global().broadcast(Signal::LowMemory)`
pub fn notify_low_memory() -> usize {
    GLOBAL_HUB.broadcast(Signal::LowMemory)
}

pub fn request_debug_dump() -> usize {
    GLOBAL_HUB.broadcast(Signal::DumpDebugLogs)
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Sender<Signal>)>>,
}

impl HubInner {
    fn subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Sender<Signal>)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Broadcast point for [`Signal`]s. Cloning shares the same subscriber list.
#[derive(Clone, Default)]
pub struct SignalHub {
    inner: Arc<HubInner>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = unbounded();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers().push((id, tx));
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Sends `signal` to every subscriber. Returns how many received it.
    pub fn broadcast(&self, signal: Signal) -> usize {
        let mut subscribers = self.inner.subscribers();
        subscribers.retain(|(_, tx)| tx.send(signal).is_ok());
        log::debug!("broadcast {:?} to {} subscribers", signal, subscribers.len());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Registration with a [`SignalHub`]; unsubscribes on drop
pub struct Subscription {
    id: u64,
    rx: Receiver<Signal>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Signals received since the last poll, oldest first
    pub fn poll(&self) -> Vec<Signal> {
        self.rx.try_iter().collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.subscribers().retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
