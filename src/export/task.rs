//! Run a save on a tokio blocking worker and report back through a callback.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span};

use super::mbox::{discard, save_sync};
use super::{SaveProgress, SaveStats};
use crate::error::{Result, SaveError};
use crate::store::MessageStore;

/// Scheduling hint for a background save.
///
/// Recorded on the operation's tracing span; the blocking pool has no
/// priority levels of its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Default,
    High,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "default" | "normal" => Ok(Self::Default),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority '{other}' (low, default, high)")),
        }
    }
}

/// Progress sink shared with the worker thread.
pub type ProgressCallback = Arc<dyn Fn(SaveProgress) + Send + Sync>;

/// Start saving `uids` to `destination` in the background.
///
/// Returns as soon as the work is queued. `on_done` runs exactly once, on
/// the worker thread, with the outcome of [`save_sync`]. If the save panics,
/// the destination is removed and `on_done` gets [`SaveError::Aborted`].
/// An empty `uids`
/// is rejected here with [`SaveError::InvalidInput`] and `on_done` is never
/// called.
///
/// Must be called from within a tokio runtime. The returned handle
/// completes after `on_done` has returned.
pub fn save_async<F>(
    store: Arc<dyn MessageStore>,
    uids: Vec<String>,
    destination: PathBuf,
    priority: Priority,
    cancel: CancellationToken,
    progress: ProgressCallback,
    on_done: F,
) -> Result<JoinHandle<()>>
where
    F: FnOnce(Result<SaveStats>) + Send + 'static,
{
    if uids.is_empty() {
        return Err(SaveError::InvalidInput(
            "at least one message identifier is required".to_string(),
        ));
    }
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| SaveError::InvalidInput(format!("no async runtime: {e}")))?;

    let span = info_span!(
        "save",
        priority = ?priority,
        count = uids.len(),
        path = %destination.display()
    );

    Ok(runtime.spawn_blocking(move || {
        let _entered = span.enter();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            save_sync(
                store.as_ref(),
                &uids,
                &destination,
                &cancel,
                progress.as_ref(),
            )
        }))
        .unwrap_or_else(|payload| {
            let reason = panic_message(payload.as_ref());
            error!(path = %destination.display(), reason = %reason, "Save panicked");
            discard(&destination);
            Err(SaveError::Aborted(reason))
        });
        on_done(outcome);
    }))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
