use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Shared online/offline flag
///
/// The platform layer (network reachability callbacks, browser
/// `online`/`offline` events) calls [`set_online`](Self::set_online);
/// consumers [`subscribe`](Self::subscribe) and react to transitions.
/// Setting the current value again does not notify subscribers.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    /// Record connectivity; returns whether the value changed
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            debug!(online, "Connectivity signal changed");
        }
        changed
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
