//! JSON file backed join log.
//!
//! The whole log lives in `<base>/.linkjoin/join_log.json`. Every mutation
//! rewrites the file atomically (temp file, fsync, rename), so a crash leaves
//! either the previous or the new log on disk, never a torn one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::store::{JoinLogDocument, JoinLogStore};
use super::{JoinAttempt, JoinLogError, JoinLogResult, JoinLogUpdate, NewJoinAttempt};

/// Name of the state directory created under the base directory.
pub const STATE_DIR_NAME: &str = ".linkjoin";

/// Name of the join log file.
const JOIN_LOG_FILE_NAME: &str = "join_log.json";

/// Join log persisted to a single JSON file.
///
/// The in-memory copy only changes after the file write succeeds, so a failed
/// write leaves both in their previous state.
#[derive(Debug)]
pub struct FileJoinLogStore {
    log_path: PathBuf,
    document: Mutex<JoinLogDocument>,
}

impl FileJoinLogStore {
    /// Open (or start) the join log under `base_dir`.
    ///
    /// Creates the `.linkjoin` directory if it does not exist. A missing log file
    /// is treated as an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the existing file
    /// cannot be read or parsed, or it was written by a newer format version.
    pub fn open(base_dir: impl AsRef<Path>) -> JoinLogResult<Self> {
        let state_dir = base_dir.as_ref().join(STATE_DIR_NAME);
        fs::create_dir_all(&state_dir)?;

        let log_path = state_dir.join(JOIN_LOG_FILE_NAME);
        let document = Self::load(&log_path)?.unwrap_or_default();

        tracing::debug!(
            path = %log_path.display(),
            attempts = document.attempts.len(),
            "Opened join log"
        );

        Ok(Self {
            log_path,
            document: Mutex::new(document),
        })
    }

    /// Read the log without creating anything; `Ok(None)` if there is no log yet.
    ///
    /// Attempts come back most recent first, optionally only those for `group_ref`,
    /// the same as [`JoinLogStore::list`].
    pub fn read_existing(
        base_dir: impl AsRef<Path>,
        group_ref: Option<&str>,
    ) -> JoinLogResult<Option<Vec<JoinAttempt>>> {
        let log_path = base_dir
            .as_ref()
            .join(STATE_DIR_NAME)
            .join(JOIN_LOG_FILE_NAME);
        Ok(Self::load(&log_path)?.map(|document| document.list(group_ref)))
    }

    /// Path to the log file.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn load(path: &Path) -> JoinLogResult<Option<JoinLogDocument>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JoinLogError::Io(e)),
        };

        let document: JoinLogDocument = serde_json::from_str(&content)?;
        if document.version > JoinLogDocument::CURRENT_VERSION {
            return Err(JoinLogError::VersionMismatch {
                expected: JoinLogDocument::CURRENT_VERSION,
                found: document.version,
            });
        }
        Ok(Some(document))
    }

    async fn save(&self, document: &JoinLogDocument) -> JoinLogResult<()> {
        let json = serde_json::to_string_pretty(document)?;

        // Same directory, so the rename cannot cross filesystems
        let temp_path = self.log_path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.log_path).await?;
        Ok(())
    }
}

#[async_trait]
impl JoinLogStore for FileJoinLogStore {
    async fn create(&self, request: NewJoinAttempt) -> JoinLogResult<String> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        let id = next.insert(request);
        self.save(&next).await?;
        *document = next;
        Ok(id)
    }

    async fn update(&self, id: &str, update: JoinLogUpdate) -> JoinLogResult<()> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        next.apply(id, update)?;
        self.save(&next).await?;
        *document = next;
        Ok(())
    }

    async fn get(&self, id: &str) -> JoinLogResult<Option<JoinAttempt>> {
        Ok(self.document.lock().await.get(id))
    }

    async fn list(&self, group_ref: Option<&str>) -> JoinLogResult<Vec<JoinAttempt>> {
        Ok(self.document.lock().await.list(group_ref))
    }
}
