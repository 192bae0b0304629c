//! Upload persistence.
//!
//! Each attachment is written once under `<root>/<session_id>/` before the
//! backend call references it by path. Same-named uploads overwrite each
//! other unless `unique_names` is set; nothing is ever cleaned up.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::llm::StoredAttachment;

use super::request::Attachment;

/// What to do when an upload cannot be written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentPolicy {
    /// Drop the failed attachment and send the request without it.
    #[default]
    Skip,
    /// Do not call the backend; render the failure as the assistant turn.
    Abort,
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("cannot store attachment '{filename}': {source}")]
    Io {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
    unique_names: bool,
}

impl AttachmentStore {
    /// Store for one session, rooted at `root/<session_id>`.
    pub fn for_session(root: &Path, session_id: Uuid, unique_names: bool) -> Self {
        Self { dir: root.join(session_id.to_string()), unique_names }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one attachment to disk.
    pub async fn persist(&self, attachment: &Attachment) -> Result<StoredAttachment, AttachmentError> {
        let filename = sanitize_filename(&attachment.filename);
        let io_err = |source| AttachmentError::Io { filename: filename.clone(), source };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let stored_name = if self.unique_names {
            format!("{}-{filename}", Uuid::new_v4())
        } else {
            filename.clone()
        };
        let path = self.dir.join(stored_name);
        tokio::fs::write(&path, &attachment.bytes).await.map_err(io_err)?;

        debug!(path = %path.display(), bytes = attachment.bytes.len(), "attachment stored");
        Ok(StoredAttachment { mime: mime_for(&filename), filename, path })
    }
}

/// Reduce a user-supplied name to its final path component.
fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "attachment".to_string()
    } else {
        base.to_string()
    }
}

/// MIME type from the file extension.
pub fn mime_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn persist_writes_bytes_under_session_dir() {
        let root = TempDir::new().unwrap();
        let session = Uuid::new_v4();
        let store = AttachmentStore::for_session(root.path(), session, false);

        let stored = store.persist(&Attachment::new("cat.PNG", vec![7, 8, 9])).await.unwrap();

        assert_eq!(stored.filename, "cat.PNG");
        assert_eq!(stored.mime, "image/png");
        assert_eq!(stored.path, root.path().join(session.to_string()).join("cat.PNG"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), vec![7, 8, 9]);
    }

    #[tokio::test]
    async fn duplicate_names_overwrite() {
        let root = TempDir::new().unwrap();
        let store = AttachmentStore::for_session(root.path(), Uuid::new_v4(), false);

        let a = store.persist(&Attachment::new("x.jpg", vec![1])).await.unwrap();
        let b = store.persist(&Attachment::new("x.jpg", vec![2])).await.unwrap();

        assert_eq!(a.path, b.path);
        assert_eq!(std::fs::read(&b.path).unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn unique_names_do_not_collide() {
        let root = TempDir::new().unwrap();
        let store = AttachmentStore::for_session(root.path(), Uuid::new_v4(), true);

        let a = store.persist(&Attachment::new("x.jpg", vec![1])).await.unwrap();
        let b = store.persist(&Attachment::new("x.jpg", vec![2])).await.unwrap();

        assert_ne!(a.path, b.path);
        assert_eq!(a.filename, "x.jpg");
        assert_eq!(std::fs::read(&a.path).unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn unwritable_root_reports_io_error() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();
        let store = AttachmentStore::for_session(&blocker, Uuid::new_v4(), false);

        let err = store.persist(&Attachment::new("a.png", vec![1])).await.unwrap_err();
        assert!(err.to_string().contains("a.png"));
    }

    #[test]
    fn filenames_lose_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\pics\\dog.gif"), "dog.gif");
        assert_eq!(sanitize_filename(".."), "attachment");
        assert_eq!(sanitize_filename(""), "attachment");
    }

    #[test]
    fn mime_defaults_to_octet_stream() {
        assert_eq!(mime_for("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_for("notes.txt"), "application/octet-stream");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }
}
