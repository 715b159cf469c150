//! Store backed by a Maildir folder or a flat directory of `.eml` files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{parse_stored, MessageStore};
use crate::error::StoreError;
use crate::model::mime::Message;

/// Maildir subdirectories that hold delivered messages.
const MAILDIR_SUBDIRS: [&str; 2] = ["cur", "new"];

/// Messages on disk, one file per message.
///
/// If the directory has `cur/` or `new/` subdirectories it is read as a
/// Maildir and identifiers are the unique part of each file name (the
/// `:2,FLAGS` info suffix is dropped). Otherwise every regular file in the
/// directory is a message and its file name is the identifier. Hidden
/// files are ignored.
pub struct MaildirStore {
    files: BTreeMap<String, PathBuf>,
}

impl MaildirStore {
    /// Scan `path` and index the messages it contains.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(StoreError::io(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let maildir_dirs: Vec<PathBuf> = MAILDIR_SUBDIRS
            .iter()
            .map(|d| root.join(d))
            .filter(|d| d.is_dir())
            .collect();

        let mut files = BTreeMap::new();
        if maildir_dirs.is_empty() {
            scan_dir(&root, false, &mut files)?;
        } else {
            for dir in &maildir_dirs {
                scan_dir(dir, true, &mut files)?;
            }
        }

        info!(path = %root.display(), count = files.len(), "Opened message store");
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn scan_dir(
    dir: &Path,
    maildir: bool,
    files: &mut BTreeMap<String, PathBuf>,
) -> Result<(), StoreError> {
    let entries = std::fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let uid = if maildir { maildir_uid(&name) } else { name };
        if let Some(previous) = files.insert(uid.clone(), path) {
            debug!(uid = %uid, previous = %previous.display(), "Duplicate message id, keeping last");
        }
    }
    Ok(())
}

/// Strip the Maildir info suffix (`:2,S`, or `!2,S` on Windows).
fn maildir_uid(name: &str) -> String {
    name.split([':', '!']).next().unwrap_or(name).to_string()
}

impl MessageStore for MaildirStore {
    fn get_message(&self, uid: &str) -> Result<Message, StoreError> {
        let path = self
            .files
            .get(uid)
            .ok_or_else(|| StoreError::NotFound(uid.to_string()))?;
        let data = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(uid.to_string())
            } else {
                StoreError::io(path, e)
            }
        })?;
        parse_stored(uid, &data)
    }

    fn uids(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maildir_uid() {
        assert_eq!(maildir_uid("1700000000.M1P2.host:2,S"), "1700000000.M1P2.host");
        assert_eq!(maildir_uid("plain.eml"), "plain.eml");
    }

    #[test]
    fn test_open_flat_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.eml"), "Subject: B\n\nbody\n").unwrap();
        std::fs::write(dir.path().join("a.eml"), "Subject: A\n\nbody\n").unwrap();
        std::fs::write(dir.path().join(".hidden"), "Subject: H\n\n").unwrap();

        let store = MaildirStore::open(dir.path()).unwrap();
        assert_eq!(store.uids(), vec!["a.eml".to_string(), "b.eml".to_string()]);
        assert_eq!(store.subject("b.eml").as_deref(), Some("B"));
    }

    #[test]
    fn test_open_maildir_layout() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["cur", "new", "tmp"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
        }
        std::fs::write(dir.path().join("cur/100.x:2,S"), "Subject: Seen\n\nx\n").unwrap();
        std::fs::write(dir.path().join("new/200.y"), "Subject: New\n\ny\n").unwrap();
        std::fs::write(dir.path().join("tmp/300.z"), "Subject: Tmp\n\nz\n").unwrap();

        let store = MaildirStore::open(dir.path()).unwrap();
        assert_eq!(store.uids(), vec!["100.x".to_string(), "200.y".to_string()]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.subject("100.x").as_deref(), Some("Seen"));
    }

    #[test]
    fn test_missing_message_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = MaildirStore::open(dir.path()).unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.get_message("nope"),
            Err(StoreError::NotFound(uid)) if uid == "nope"
        ));
    }

    #[test]
    fn test_empty_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty"), "").unwrap();
        let store = MaildirStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get_message("empty"),
            Err(StoreError::Parse { .. })
        ));
    }

    #[test]
    fn test_open_rejects_non_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        assert!(MaildirStore::open(&file).is_err());
    }
}
