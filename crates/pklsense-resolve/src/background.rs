//! Cancellable module resolution off the caller's thread
//!
//! Graph lookups may read from disk. The helper here runs one on tokio's
//! blocking pool and races it against a `watch` cancellation flag. A
//! cancelled lookup is abandoned: its result, whenever it arrives, is dropped
//! and nothing is recorded in the resolver. A lookup cancelled before the
//! worker picks it up never reaches the graph; one already running finishes
//! inside the graph, which may keep whatever modules it loaded.

use std::sync::Arc;

use pklsense_core::{ModuleId, SyntaxTree};
use tokio::sync::watch;
use tracing::debug;

use crate::error::BackgroundError;
use crate::resolver::Resolver;

/// Resolve `uri` as written in `from` on the blocking pool
///
/// Returns [`BackgroundError::Cancelled`] as soon as `cancel` holds `true`,
/// including when it already does on entry.
pub async fn resolve_module_in_background(
    resolver: Arc<Resolver>,
    uri: String,
    from: ModuleId,
    mut cancel: watch::Receiver<bool>,
) -> Result<Arc<SyntaxTree>, BackgroundError> {
    if *cancel.borrow_and_update() {
        return Err(BackgroundError::Cancelled(uri));
    }
    let graph = resolver.graph().clone();
    let task_uri = uri.clone();
    let queued = cancel.clone();
    let lookup = tokio::task::spawn_blocking(move || {
        if *queued.borrow() {
            return None;
        }
        Some(graph.resolve_uri(&task_uri, &from))
    });

    tokio::select! {
        joined = lookup => match joined {
            Ok(Some(result)) => Ok(result?),
            Ok(None) => Err(BackgroundError::Cancelled(uri)),
            Err(e) => Err(BackgroundError::Join(e.to_string())),
        },
        _ = wait_cancelled(&mut cancel) => {
            debug!("abandoning background resolution of {}", uri);
            Err(BackgroundError::Cancelled(uri))
        }
    }
}

async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender gone without cancelling
            std::future::pending::<()>().await;
        }
    }
}
