//! Save messages from a store into a single mbox archive.
//!
//! Each record is a `From ` framing line, the normalized message passed
//! through [`MboxFilter`], and one blank separator line. The operation is
//! all-or-nothing: a fetch or write failure removes the partially written
//! file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::filter::MboxFilter;
use super::normalize::normalize;
use super::{SaveProgress, SaveStats};
use crate::error::{Result, SaveError};
use crate::model::mime::Message;
use crate::store::MessageStore;

/// Sender used in the framing line when a message names none.
const UNKNOWN_SENDER: &str = "MAILER-DAEMON";

/// Write the messages `uids` from `store` to `destination`, in order.
///
/// `destination` is created or replaced with owner-only permissions.
/// `progress` receives [`SaveProgress::Started`] once, then a
/// [`SaveProgress::Percent`] after each message whose percentage moved.
/// `cancel` is checked before every fetch; a cancelled save keeps the
/// records completed so far and returns [`SaveError::Cancelled`].
///
/// Blocks on file and store I/O; run it on a worker thread (see
/// [`save_async`](super::task::save_async)).
pub fn save_sync(
    store: &dyn MessageStore,
    uids: &[String],
    destination: &Path,
    cancel: &CancellationToken,
    progress: &dyn Fn(SaveProgress),
) -> Result<SaveStats> {
    if uids.is_empty() {
        return Err(SaveError::InvalidInput(
            "at least one message identifier is required".to_string(),
        ));
    }
    let file = open_destination(destination)?;
    info!(
        path = %destination.display(),
        count = uids.len(),
        "Saving messages"
    );
    save_into(file, store, uids, destination, cancel, progress)
}

/// Write the archive to `out`, an open handle on `destination`.
///
/// On a fetch or write failure `out` is dropped and `destination` removed.
fn save_into<W: Write>(
    out: W,
    store: &dyn MessageStore,
    uids: &[String],
    destination: &Path,
    cancel: &CancellationToken,
    progress: &dyn Fn(SaveProgress),
) -> Result<SaveStats> {
    let mut archive = ArchiveWriter::new(out, destination);
    let outcome = write_records(&mut archive, store, uids, cancel, progress)
        .and_then(|()| archive.finish());

    match outcome {
        Ok(stats) => {
            info!(
                path = %destination.display(),
                messages = stats.messages,
                bytes = stats.bytes_written,
                "Saved messages"
            );
            Ok(stats)
        }
        Err(SaveError::Cancelled) => {
            info!(
                path = %destination.display(),
                saved = archive.messages,
                "Save cancelled"
            );
            Err(SaveError::Cancelled)
        }
        Err(e) => {
            warn!(path = %destination.display(), error = %e, "Save failed");
            drop(archive);
            discard(destination);
            Err(e)
        }
    }
}

fn write_records<W: Write>(
    archive: &mut ArchiveWriter<'_, W>,
    store: &dyn MessageStore,
    uids: &[String],
    cancel: &CancellationToken,
    progress: &dyn Fn(SaveProgress),
) -> Result<()> {
    let total = uids.len();
    progress(SaveProgress::Started { total });

    let mut last_percent = 0;
    for (index, uid) in uids.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(SaveError::Cancelled);
        }

        let mut message = store
            .get_message(uid)
            .map_err(|source| SaveError::FetchFailed {
                uid: uid.clone(),
                source,
            })?;
        normalize(&mut message.root);
        archive.append(&message)?;

        let percent = percent_complete(index, total);
        debug!(uid = %uid, percent, "Saved message");
        if percent != last_percent {
            progress(SaveProgress::Percent(percent));
            last_percent = percent;
        }
    }
    Ok(())
}

/// Percentage done after the message at `index` (0-based), rounded up so
/// the first message of a short run already shows progress.
pub fn percent_complete(index: usize, total: usize) -> u8 {
    let percent = ((index + 1) * 100).div_ceil(total.max(1));
    percent.min(100) as u8
}

/// Exclusive owner of the destination handle and the reusable record buffer.
struct ArchiveWriter<'a, W: Write> {
    out: W,
    path: &'a Path,
    buffer: Vec<u8>,
    messages: usize,
    bytes_written: u64,
}

impl<'a, W: Write> ArchiveWriter<'a, W> {
    fn new(out: W, path: &'a Path) -> Self {
        Self {
            out,
            path,
            buffer: Vec::new(),
            messages: 0,
            bytes_written: 0,
        }
    }

    /// Append one record: framing line, filtered body, separator.
    fn append(&mut self, message: &Message) -> Result<()> {
        let from = from_line(message);
        self.out
            .write_all(from.as_bytes())
            .map_err(|e| SaveError::write(self.path, e))?;
        self.bytes_written += from.len() as u64;

        // The buffer travels through the filter by value and comes back empty
        // at the end, so its allocation is reused for every record.
        let mut filter = MboxFilter::new(std::mem::take(&mut self.buffer));
        message
            .write_to(&mut filter)
            .map_err(|e| SaveError::write(self.path, e))?;
        let mut buffer = filter.finish().map_err(|e| SaveError::write(self.path, e))?;

        if !buffer.ends_with(b"\n") {
            buffer.push(b'\n');
        }
        buffer.push(b'\n');

        self.out
            .write_all(&buffer)
            .map_err(|e| SaveError::write(self.path, e))?;
        self.bytes_written += buffer.len() as u64;
        self.messages += 1;

        buffer.clear();
        self.buffer = buffer;
        Ok(())
    }

    fn finish(&mut self) -> Result<SaveStats> {
        self.out
            .flush()
            .map_err(|e| SaveError::write(self.path, e))?;
        Ok(SaveStats {
            messages: self.messages,
            bytes_written: self.bytes_written,
        })
    }
}

/// Build the mbox framing line: `From <sender> <asctime date>\n`.
///
/// The date comes from the `Date` header (in UTC), or the current time when
/// the header is missing or unparseable.
pub fn from_line(message: &Message) -> String {
    let sender = message
        .sender_address()
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string());
    let date = message.date().unwrap_or_else(Utc::now);
    format!("From {sender} {}\n", date.format("%a %b %e %H:%M:%S %Y"))
}

/// Create or truncate the destination, readable by the owner only.
fn open_destination(path: &Path) -> Result<File> {
    let unavailable = |source| SaveError::DestinationUnavailable {
        path: path.to_path_buf(),
        source,
    };

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path).map_err(unavailable)?;

    // `mode` only applies to newly created files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(unavailable)?;
    }
    Ok(file)
}

/// Best-effort removal of a partially written archive.
pub(crate) fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "Could not remove partial archive");
    }
}
