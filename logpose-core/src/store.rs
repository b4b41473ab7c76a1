//! JSON document store.
//!
//! Each session owns three documents in one directory: the world, the
//! transcript and the prompt templates. They are plain pretty-printed
//! UTF-8 JSON so they can be edited by hand or swapped out while the
//! process runs; callers re-read them at the start of every turn.
//!
//! Loading fails soft: a missing document is a first run and a malformed
//! one is logged, in both cases the caller-supplied default is returned.
//! Saving writes a sibling temporary file and renames it over the target.
//! There is a single writer per directory; no locking is attempted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{LogposeError, Result};

/// Handle to the directory holding the session documents.
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Store rooted at `root`. The directory is created on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the documents.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of document `name`.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Whether document `name` exists on disk.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Load document `name`, or `default` when it is missing or malformed.
    pub fn load<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        match self.load_strict(name) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                info!(path = %self.path(name).display(), "document missing, starting fresh");
                default
            }
            Err(e) => {
                warn!(path = %self.path(name).display(), error = %e, "document unreadable, using default");
                default
            }
        }
    }

    /// Load document `name`, distinguishing "missing" from "broken".
    ///
    /// # Errors
    /// Returns [`LogposeError::Io`] or [`LogposeError::Serialization`] when
    /// the file exists but cannot be read or parsed.
    pub fn load_strict<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let doc = serde_json::from_str(&content)
            .map_err(|e| LogposeError::Serialization(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), bytes = content.len(), "document loaded");
        Ok(Some(doc))
    }

    /// Overwrite document `name` with `doc`.
    ///
    /// # Errors
    /// Returns an error if serialization or any filesystem step fails. The
    /// previous file is left in place in that case.
    pub fn save<T: Serialize>(&self, name: &str, doc: &T) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.path(name);
        let mut content = serde_json::to_string_pretty(doc)?;
        content.push('\n');

        let tmp = self.root.join(format!(".{name}.tmp"));
        fs::write(&tmp, content.as_bytes())?;
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), bytes = content.len(), "document saved");
        Ok(())
    }

    /// Copy document `backup` over document `target`.
    ///
    /// # Errors
    /// Returns [`LogposeError::BackupMissing`] if the backup does not exist;
    /// `target` is untouched in that case.
    pub fn restore_backup(&self, backup: &str, target: &str) -> Result<()> {
        let source = self.path(backup);
        if !source.is_file() {
            return Err(LogposeError::BackupMissing(source));
        }
        let content = fs::read(&source)?;
        // Refuse to install a backup that would not load.
        serde_json::from_slice::<serde_json::Value>(&content)?;

        let tmp = self.root.join(format!(".{target}.tmp"));
        fs::write(&tmp, &content)?;
        fs::rename(&tmp, self.path(target))?;

        info!(backup = %source.display(), target, "world restored from backup");
        Ok(())
    }
}
