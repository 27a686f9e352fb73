//! Cached directory of remote scene names.
//!
//! Refreshed once per `Connected` transition after a short settle
//! delay; the server does not answer reliably straight after the
//! handshake. The cache is derived data: cleared on every transition
//! away from `Connected`, safe to discard at any time.

use crate::obs::{ConnectionStatus, ObsHandle};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pause between handshake and the first `ListScenes` query.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Read handle to the scene-name cache. The refresh task runs until
/// the cancellation token fires.
#[derive(Clone)]
pub struct SceneDirectory {
    cache: Arc<ArcSwap<Vec<String>>>,
}

impl SceneDirectory {
    /// Spawn the refresh task. `settle` is how long to wait after a
    /// `Connected` transition before querying.
    #[must_use]
    pub fn spawn(obs: ObsHandle, settle: Duration, cancel: CancellationToken) -> Self {
        let cache = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let task_cache = Arc::clone(&cache);
        tokio::spawn(async move {
            refresh_loop(obs, settle, task_cache, cancel).await;
        });
        Self { cache }
    }

    /// Last successfully fetched scene names, or empty. Non-blocking.
    #[must_use]
    pub fn current(&self) -> Arc<Vec<String>> {
        self.cache.load_full()
    }
}

async fn refresh_loop(
    obs: ObsHandle,
    settle: Duration,
    cache: Arc<ArcSwap<Vec<String>>>,
    cancel: CancellationToken,
) {
    let mut status_rx = obs.subscribe();
    loop {
        let status = tokio::select! {
            () = cancel.cancelled() => return,
            status = status_rx.recv() => match status {
                Some(status) => status,
                None => return,
            },
        };

        if status != ConnectionStatus::Connected {
            cache.store(Arc::new(Vec::new()));
            continue;
        }

        // Settle, unless the connection moves on underneath us.
        let interrupted = tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(settle) => None,
            next = status_rx.recv() => match next {
                Some(next) => Some(next),
                None => return,
            },
        };
        if let Some(next) = interrupted {
            if next != ConnectionStatus::Connected {
                cache.store(Arc::new(Vec::new()));
            }
            continue;
        }

        // A failed refresh keeps the previous cache: stale-but-present
        // beats empty on a transient failure. Disconnection still
        // clears it above.
        match obs.list_scenes().await {
            Ok(names) => {
                debug!("scene directory refreshed: {} scenes", names.len());
                cache.store(Arc::new(names));
            }
            Err(e) => warn!("scene list refresh failed: {e}"),
        }
    }
}
