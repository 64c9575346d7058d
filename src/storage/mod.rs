use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Public URL prefix under which stored blobs are served.
pub const PUBLIC_PREFIX: &str = "/static";

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    /// Media type without parameters, lowercased.
    pub fn media_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|essence| essence.trim().to_ascii_lowercase())
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type().as_deref() == Some("application/pdf")
    }
}

/// Where uploaded artifacts end up. Returns the locator recorded in the ledgers.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug {
    async fn store(
        &self,
        namespace: &str,
        filename: &str,
        bytes: Bytes,
    ) -> Result<String, ServiceError>;
}

/// Filesystem-backed store rooted at the configured upload directory.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keeps only the final path component and replaces anything outside
/// `[A-Za-z0-9._-]`, so a client filename can never escape the namespace.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn store(
        &self,
        namespace: &str,
        filename: &str,
        bytes: Bytes,
    ) -> Result<String, ServiceError> {
        let namespace = sanitize_filename(namespace);
        let name = format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(filename));

        let dir = self.root.join(&namespace);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ServiceError::StorageError(format!("{}: {}", dir.display(), e)))?;

        let path = dir.join(&name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ServiceError::StorageError(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), "stored upload");
        Ok(format!("{}/{}/{}", PUBLIC_PREFIX, namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("report.pdf", "report.pdf")]
    #[case("../../etc/passwd", "passwd")]
    #[case("C:\\Users\\me\\bid v2.pdf", "bid_v2.pdf")]
    #[case(".hidden", "hidden")]
    #[case("", "upload")]
    fn filenames_are_sanitized(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_filename(input), expected);
    }

    #[rstest]
    #[case(Some("application/pdf"), true)]
    #[case(Some("Application/PDF; charset=binary"), true)]
    #[case(Some("image/png"), false)]
    #[case(None, false)]
    fn pdf_detection(#[case] content_type: Option<&str>, #[case] expected: bool) {
        let upload = Upload {
            filename: "x".into(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::new(),
        };
        assert_eq!(upload.is_pdf(), expected);
    }

    #[tokio::test]
    async fn store_writes_under_namespace_and_returns_locator() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let locator = store
            .store("proposals", "bid.pdf", Bytes::from_static(b"%PDF-1.7"))
            .await
            .unwrap();

        assert!(locator.starts_with("/static/proposals/"));
        assert!(locator.ends_with("_bid.pdf"));

        let name = locator.rsplit('/').next().unwrap();
        let written = std::fs::read(dir.path().join("proposals").join(name)).unwrap();
        assert_eq!(written, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn same_filename_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let a = store
            .store("submissions", "final.zip", Bytes::from_static(b"a"))
            .await
            .unwrap();
        let b = store
            .store("submissions", "final.zip", Bytes::from_static(b"b"))
            .await
            .unwrap();
        assert_ne!(a, b);
    }
}
