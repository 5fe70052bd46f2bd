//! Cache event listener installed by the server.
//!
//! Logs every event, counts it, and optionally adopts a finished update as
//! soon as it is ready.

use std::sync::{Arc, Weak};

use appcache_core::{CacheEvent, EventCallback, UpdateOrchestrator};
use tracing::{debug, info, warn};

use crate::metrics::CACHE_EVENTS_TOTAL;

/// Build the listener for `orchestrator`.
///
/// The listener only holds a weak reference so it does not keep the
/// orchestrator alive.
pub fn event_listener(orchestrator: &Arc<UpdateOrchestrator>, auto_swap: bool) -> EventCallback {
    let orchestrator: Weak<UpdateOrchestrator> = Arc::downgrade(orchestrator);

    Arc::new(move |event: &CacheEvent| {
        CACHE_EVENTS_TOTAL.with_label_values(&[event.name()]).inc();
        log_event(event);

        if auto_swap && *event == CacheEvent::UpdateReady {
            let Some(orchestrator) = orchestrator.upgrade() else {
                return;
            };
            match orchestrator.swap_cache() {
                Ok(()) => info!("Adopted new cache generation"),
                Err(e) => warn!(error = %e, "Automatic swap failed"),
            }
        }
    })
}

fn log_event(event: &CacheEvent) {
    match event {
        CacheEvent::Checking => debug!("Checking manifest"),
        CacheEvent::NoUpdate => info!("No update available"),
        CacheEvent::Downloading { total } => info!(total, "Downloading update"),
        CacheEvent::Progress { url, loaded, total } => {
            debug!(url = %url, loaded, total, "Progress")
        }
        CacheEvent::UpdateReady => info!("Update ready"),
        CacheEvent::Obsolete => warn!("Cache is obsolete"),
        CacheEvent::Stalled { loaded, total } => warn!(loaded, total, "Download stalled"),
        CacheEvent::Error {
            manifest,
            url,
            message,
        } => warn!(manifest, url = %url, error = %message, "Cache error"),
    }
}
