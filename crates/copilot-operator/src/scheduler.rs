//! Per-key debounce of reconcile scheduling.
//!
//! Bursts of watch events for one resource collapse into a single reconcile
//! invocation per window, operating on the most recently scheduled snapshot.
//! Distinct resources debounce independently and cannot starve each other.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use copilot_core::Completion;

/// Debounce table: resource name -> latest pending snapshot. An entry exists
/// exactly while a timer for that key is armed.
type PendingTable = Arc<Mutex<HashMap<String, Completion>>>;

#[derive(Clone)]
pub struct DebounceScheduler {
    window: Duration,
    pending: PendingTable,
    tx: mpsc::Sender<Completion>,
}

impl DebounceScheduler {
    /// `tx` receives one snapshot per fired window; the consumer runs the
    /// reconcile passes, one at a time.
    pub fn new(window: Duration, tx: mpsc::Sender<Completion>) -> Self {
        Self {
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            tx,
        }
    }

    /// Queue `obj` for reconciliation after the debounce window.
    ///
    /// The first call for a key arms its timer; calls arriving before it
    /// fires replace the pending snapshot but do not reset the timer, so the
    /// queued invocation fires at a bounded, predictable time even under a
    /// steady stream of events.
    pub fn schedule(&self, obj: Completion) {
        let Some(name) = obj.name().map(str::to_string) else {
            warn!("dropping schedule request for unnamed object");
            return;
        };

        let Ok(mut pending) = self.pending.lock() else {
            warn!(name = %name, "debounce table poisoned, dropping schedule request");
            return;
        };
        match pending.entry(name.clone()) {
            Entry::Occupied(mut entry) => {
                debug!(name = %name, "coalescing into pending reconcile");
                entry.insert(obj);
            }
            Entry::Vacant(entry) => {
                debug!(name = %name, window_ms = self.window.as_millis() as u64, "arming debounce timer");
                entry.insert(obj);
                let table = Arc::clone(&self.pending);
                let tx = self.tx.clone();
                let window = self.window;
                tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    let snapshot = match table.lock() {
                        Ok(mut table) => table.remove(&name),
                        Err(_) => None,
                    };
                    if let Some(obj) = snapshot {
                        if tx.send(obj).await.is_err() {
                            warn!(name = %name, "reconcile worker is gone, dropping snapshot");
                        }
                    }
                });
            }
        }
    }
}
