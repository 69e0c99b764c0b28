//! External collaborators consumed by the engine.
//!
//! File bytes and place lookups live outside the database transaction. The
//! engine asks the [`FileStore`] for a reference before the transaction opens
//! and writes the bytes only after it commits; the [`PlaceResolver`] is
//! consulted before the transaction opens.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    CommissionImage,
    Receipt,
}

impl FileKind {
    pub fn dir(&self) -> &'static str {
        match self {
            FileKind::CommissionImage => "commission",
            FileKind::Receipt => "receipt",
        }
    }
}

/// `<kind>/<uuid>.<ext>`. The extension is taken from `file_name` when it is
/// short and alphanumeric, otherwise `bin`.
pub fn new_file_ref(kind: FileKind, file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    format!("{}/{}.{}", kind.dir(), uuid::Uuid::new_v4().simple(), ext)
}

#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    /// Stable reference for bytes that will be stored later. Must not touch
    /// the backing storage.
    fn allocate_ref(&self, kind: FileKind, file_name: &str) -> String {
        new_file_ref(kind, file_name)
    }

    async fn store(&self, reference: &str, bytes: &[u8]) -> Result<()>;

    /// Removing a reference that does not exist is not an error.
    async fn remove(&self, reference: &str) -> Result<()>;
}

/// Files under a root directory, addressed by relative reference.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference under the root. Absolute paths and `..` are refused.
    pub fn path_for(&self, reference: &str) -> Result<PathBuf> {
        let rel = Path::new(reference);
        if reference.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("invalid file reference: {:?}", reference);
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait::async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, reference: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(reference)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create dir {} failed", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("write {} failed", path.display()))?;
        Ok(())
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        let path = self.path_for(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {} failed", path.display())),
        }
    }
}

// ---------------------------------------------------------------------------
// Place resolver
// ---------------------------------------------------------------------------

/// What a place lookup returns for one external identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceDetails {
    pub name: Option<String>,
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub map_url: Option<String>,
}

#[async_trait::async_trait]
pub trait PlaceResolver: Send + Sync {
    /// `Ok(None)` when the identifier is unknown.
    async fn resolve(&self, external_place_id: &str) -> Result<Option<PlaceDetails>>;
}

/// Resolver for deployments without a geocoding service: every identifier is
/// unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlaceLookup;

#[async_trait::async_trait]
impl PlaceResolver for NoPlaceLookup {
    async fn resolve(&self, _external_place_id: &str) -> Result<Option<PlaceDetails>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ref_keeps_short_extensions_only() {
        let r = new_file_ref(FileKind::Receipt, "scan.PNG");
        assert!(r.starts_with("receipt/") && r.ends_with(".png"), "{r}");
        let r = new_file_ref(FileKind::CommissionImage, "noext");
        assert!(r.starts_with("commission/") && r.ends_with(".bin"), "{r}");
        let r = new_file_ref(FileKind::CommissionImage, "x.tar.gz/../etc");
        assert!(r.ends_with(".bin"), "{r}");
    }

    #[test]
    fn path_for_refuses_escapes() {
        let store = LocalFileStore::new("/srv/uploads");
        assert!(store.path_for("../secret").is_err());
        assert!(store.path_for("/etc/passwd").is_err());
        assert!(store.path_for("").is_err());
        assert_eq!(
            store.path_for("receipt/a.png").unwrap(),
            PathBuf::from("/srv/uploads/receipt/a.png")
        );
    }

    #[tokio::test]
    async fn local_store_writes_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let reference = store.allocate_ref(FileKind::CommissionImage, "a.jpg");

        store.store(&reference, b"jpeg").await.unwrap();
        let path = store.path_for(&reference).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg");

        store.remove(&reference).await.unwrap();
        assert!(!path.exists());
        // second remove is a no-op
        store.remove(&reference).await.unwrap();
    }
}
