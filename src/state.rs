//! Loop record persistence and the typed view over it.
//!
//! One record per active loop, at a fixed path under the project-local
//! `.claude/` directory. The record's existence is the authoritative
//! "loop active" signal; deletion is the only terminal action.
//!
//! [`StateStore`] owns the file lifecycle (load, atomic save, idempotent
//! delete). [`LoopState`] wraps the raw record text together with its
//! decoded frontmatter, so the controller can validate fields lazily and
//! still rewrite the record byte-preservingly.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DevLoopError, Result};
use crate::frontmatter::{self, Frontmatter};

/// Hidden directory holding the record, relative to the project root.
const STATE_DIR: &str = ".claude";

/// Record filename.
const STATE_FILE: &str = "devloop.local.md";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Sentinel frontmatter value meaning "no completion promise configured".
///
/// A user whose promise phrase is literally `null` is indistinguishable
/// from no promise at all; existing records rely on this.
const UNSET_PROMISE: &str = "null";

/// File-backed store for the single loop record.
#[derive(Debug, Clone)]
pub struct StateStore {
    /// Project root; the record lives under `<project>/.claude/`.
    project: PathBuf,
}

impl StateStore {
    /// Creates a store rooted at the given project directory.
    #[must_use]
    pub fn new(project: impl AsRef<Path>) -> Self {
        Self {
            project: project.as_ref().to_path_buf(),
        }
    }

    /// Returns the path to the loop record.
    #[must_use]
    pub fn state_file_path(&self) -> PathBuf {
        self.project.join(STATE_DIR).join(STATE_FILE)
    }

    /// Returns the path to the temporary file used during saves.
    fn tmp_file_path(&self) -> PathBuf {
        self.project.join(STATE_DIR).join(format!("{STATE_FILE}{TMP_SUFFIX}"))
    }

    /// Checks whether a loop record exists (i.e. a loop is active).
    #[must_use]
    pub fn exists(&self) -> bool {
        self.state_file_path().exists()
    }

    /// Loads the current record.
    ///
    /// `Ok(None)` means no loop is active — not an error. A record that
    /// exists but cannot be read is a real failure.
    pub fn load(&self) -> Result<Option<LoopState>> {
        let path = self.state_file_path();
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(LoopState::parse(raw))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DevLoopError::state_unreadable(path, &e)),
        }
    }

    /// Saves the full record content atomically (write-then-rename).
    ///
    /// No lock file: the host serializes invocations, so the record is
    /// documented single-writer.
    pub fn save(&self, content: &str) -> Result<()> {
        fs::create_dir_all(self.project.join(STATE_DIR))?;

        let tmp_path = self.tmp_file_path();
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(content.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, self.state_file_path())?;
        debug!("wrote loop record to {}", self.state_file_path().display());
        Ok(())
    }

    /// Deletes the record. Idempotent: an absent record is not an error.
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(self.state_file_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// One decoded loop record.
///
/// Keeps the raw text alongside the decoded frontmatter: the controller
/// validates fields against the decoded map but rewrites the record via a
/// targeted substitution on the raw bytes.
#[derive(Debug, Clone)]
pub struct LoopState {
    raw: String,
    frontmatter: Frontmatter,
}

impl LoopState {
    /// Decodes a record from its raw text.
    #[must_use]
    pub fn parse(raw: String) -> Self {
        let frontmatter = frontmatter::parse(&raw);
        Self { raw, frontmatter }
    }

    /// Raw record text, byte-for-byte as stored.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The task prompt: everything after the metadata block, trimmed.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.frontmatter.body
    }

    /// Raw string value of a metadata field, if present.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.frontmatter.fields.get(key).map(String::as_str)
    }

    /// Current cycle count, or `None` when the field is unparseable.
    #[must_use]
    pub fn iteration(&self) -> Option<u32> {
        self.field("iteration")?.parse().ok()
    }

    /// Iteration ceiling (0 = unbounded), or `None` when unparseable.
    #[must_use]
    pub fn max_iterations(&self) -> Option<u32> {
        self.field("max_iterations")?.parse().ok()
    }

    /// Configured completion promise.
    ///
    /// Absent, empty, and the literal `null` sentinel all mean unset.
    #[must_use]
    pub fn completion_promise(&self) -> Option<&str> {
        match self.field("completion_promise") {
            None | Some("") | Some(UNSET_PROMISE) => None,
            Some(promise) => Some(promise),
        }
    }

    /// Informational start timestamp, verbatim from the record.
    #[must_use]
    pub fn started_at(&self) -> Option<&str> {
        self.field("started_at")
    }

    /// Record text with the iteration line rewritten; all other bytes kept.
    #[must_use]
    pub fn bumped(&self, next_iteration: u32) -> String {
        frontmatter::bump_iteration(&self.raw, next_iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RECORD: &str = "---\nactive: true\niteration: 1\nmax_iterations: 0\ncompletion_promise: null\nstarted_at: \"2025-06-01T12:00:00Z\"\n---\n\nShip the feature\n";

    fn test_store() -> (StateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = StateStore::new(temp_dir.path());
        (store, temp_dir)
    }

    #[test]
    fn test_store_load_returns_none_when_missing() {
        let (store, _temp_dir) = test_store();
        assert!(!store.exists());
        assert!(store.load().expect("load should not error").is_none());
    }

    #[test]
    fn test_store_save_and_load_roundtrip() {
        let (store, _temp_dir) = test_store();

        store.save(RECORD).expect("save should succeed");
        assert!(store.exists());

        let state = store.load().expect("load").expect("record present");
        assert_eq!(state.raw(), RECORD);
        assert_eq!(state.iteration(), Some(1));
        assert_eq!(state.max_iterations(), Some(0));
        assert_eq!(state.prompt(), "Ship the feature");
    }

    #[test]
    fn test_store_save_creates_state_dir() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = StateStore::new(temp_dir.path().join("nested").join("project"));

        store.save(RECORD).expect("save should succeed");
        assert!(store.exists());
    }

    #[test]
    fn test_store_save_leaves_no_tmp_file() {
        let (store, _temp_dir) = test_store();
        store.save(RECORD).expect("save should succeed");
        assert!(!store.tmp_file_path().exists());
    }

    #[test]
    fn test_store_delete_is_idempotent() {
        let (store, _temp_dir) = test_store();

        store.delete().expect("delete on absent record should succeed");

        store.save(RECORD).expect("save");
        store.delete().expect("delete");
        assert!(!store.exists());
        store.delete().expect("second delete should still succeed");
    }

    #[test]
    fn test_state_file_path_is_fixed() {
        let store = StateStore::new("/work/project");
        assert_eq!(
            store.state_file_path(),
            PathBuf::from("/work/project/.claude/devloop.local.md")
        );
    }

    #[test]
    fn test_loop_state_unparseable_numbers() {
        let state = LoopState::parse("---\niteration: abc\nmax_iterations: 1.5\n---\nbody".into());
        assert_eq!(state.iteration(), None);
        assert_eq!(state.max_iterations(), None);
        assert_eq!(state.field("iteration"), Some("abc"));
    }

    #[test]
    fn test_loop_state_missing_fields() {
        let state = LoopState::parse("no frontmatter here".into());
        assert_eq!(state.iteration(), None);
        assert_eq!(state.field("iteration"), None);
        assert_eq!(state.prompt(), "no frontmatter here");
    }

    #[test]
    fn test_completion_promise_unset_sentinels() {
        let unset = LoopState::parse("---\ncompletion_promise: null\n---\nbody".into());
        assert_eq!(unset.completion_promise(), None);

        let quoted_null = LoopState::parse("---\ncompletion_promise: \"null\"\n---\nbody".into());
        assert_eq!(quoted_null.completion_promise(), None);

        let empty = LoopState::parse("---\ncompletion_promise:\n---\nbody".into());
        assert_eq!(empty.completion_promise(), None);

        let absent = LoopState::parse("---\niteration: 1\n---\nbody".into());
        assert_eq!(absent.completion_promise(), None);
    }

    #[test]
    fn test_completion_promise_set() {
        let state =
            LoopState::parse("---\ncompletion_promise: \"ALL DONE\"\n---\nbody".into());
        assert_eq!(state.completion_promise(), Some("ALL DONE"));
    }

    #[test]
    fn test_bumped_preserves_other_fields_and_body() {
        let state = LoopState::parse(RECORD.into());
        let bumped = state.bumped(2);

        assert_eq!(bumped, RECORD.replace("iteration: 1", "iteration: 2"));

        let rebumped = LoopState::parse(bumped);
        assert_eq!(rebumped.iteration(), Some(2));
        assert_eq!(rebumped.max_iterations(), Some(0));
        assert_eq!(rebumped.started_at(), Some("2025-06-01T12:00:00Z"));
        assert_eq!(rebumped.prompt(), "Ship the feature");
    }
}
