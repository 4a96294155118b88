//! Read-only tree over a directory on local disk.
//!
//! A repository lives at `content_root/repos/<name>`. Paths are resolved
//! under that directory and may never escape it.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

use crate::constants::SAFE_REPO_PREFIX;
use crate::tree::error::{TreeError, TreeResult};
use crate::tree::ops::Tree;

/// Immutable tree backed by a checked-out repository directory.
///
/// All paths are relative to the repository root. For example, with
/// `content_root = /srv/content` and `repo_path = repos/site`,
/// `get_file_contents("index.html")` reads `/srv/content/repos/site/index.html`.
#[derive(Debug, Clone)]
pub struct FilesystemTree {
    root: PathBuf,
    repo_path: String,
}

impl FilesystemTree {
    /// Open the repository at `repo_path` under `content_root`.
    ///
    /// `repo_path` must start with `repos/`, name a repository below it, and
    /// contain no `..` or absolute components. The repository directory must
    /// exist; it is canonicalized once here.
    pub fn open(content_root: impl AsRef<Path>, repo_path: &str) -> TreeResult<Self> {
        check_repo_path(repo_path)?;

        let full = content_root.as_ref().join(repo_path);
        let root = dunce::canonicalize(&full).map_err(|e| TreeError::from_io(e, repo_path))?;
        if !root.is_dir() {
            return Err(TreeError::not_found(repo_path));
        }

        let canonical_content = dunce::canonicalize(content_root.as_ref())
            .map_err(|e| TreeError::from_io(e, repo_path))?;
        if !root.starts_with(&canonical_content) {
            return Err(TreeError::path_escapes_root(format!(
                "{} is not under {}",
                root.display(),
                canonical_content.display()
            )));
        }

        tracing::debug!(repo = repo_path, root = %root.display(), "opened filesystem tree");
        Ok(Self {
            root,
            repo_path: repo_path.to_string(),
        })
    }

    /// Canonical repository directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The repository path this tree was opened with.
    pub fn repo_path(&self) -> &str {
        &self.repo_path
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// `..` is rejected outright; symlinks are followed and the target must
    /// still lie under the root.
    fn resolve(&self, path: &str) -> TreeResult<PathBuf> {
        let rel = Path::new(path.trim_start_matches('/'));
        if rel.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }
        if rel.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            return Err(TreeError::path_escapes_root(path));
        }

        let full = self.root.join(rel);
        // Nonexistent paths can't be symlinks; the read reports NotFound.
        if !full.exists() {
            return Ok(full);
        }
        let canonical = dunce::canonicalize(&full).map_err(|e| TreeError::from_io(e, path))?;
        if !canonical.starts_with(&self.root) {
            return Err(TreeError::path_escapes_root(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }
        Ok(canonical)
    }

    async fn metadata(&self, path: &str) -> TreeResult<std::fs::Metadata> {
        let full = self.resolve(path)?;
        fs::metadata(&full).await.map_err(|e| TreeError::from_io(e, path))
    }

    async fn file_metadata(&self, path: &str) -> TreeResult<std::fs::Metadata> {
        let meta = self.metadata(path).await?;
        if !meta.is_file() {
            return Err(TreeError::not_found(path));
        }
        Ok(meta)
    }

    /// Every regular file below `dir`, as root-relative `/`-separated paths.
    async fn walk(&self, dir: PathBuf) -> TreeResult<Vec<String>> {
        let mut files = Vec::new();
        let mut pending = vec![dir];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                // DirEntry::file_type does not follow symlinks.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                    continue;
                }
                let Some(rel) = self.relative(&entry.path()) else {
                    continue;
                };
                let listed = file_type.is_file()
                    || (file_type.is_symlink() && self.is_linked_file(&rel).await);
                if listed {
                    files.push(rel);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// A symlink is listed when reads would serve it: its target is a regular
    /// file inside the root. Linked directories are not descended into.
    async fn is_linked_file(&self, rel: &str) -> bool {
        match self.resolve(rel) {
            Ok(target) => fs::metadata(&target).await.is_ok_and(|m| m.is_file()),
            Err(_) => false,
        }
    }

    fn relative(&self, full: &Path) -> Option<String> {
        let rel = full.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl Tree for FilesystemTree {
    fn is_mutable(&self) -> bool {
        false
    }

    async fn has_file(&self, path: &str) -> TreeResult<bool> {
        match self.metadata(path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(TreeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn has_directory(&self, path: &str) -> TreeResult<bool> {
        match self.metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(TreeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_file_contents(&self, path: &str) -> TreeResult<Option<Vec<u8>>> {
        self.file_metadata(path).await?;
        let full = self.resolve(path)?;
        let contents = fs::read(&full).await.map_err(|e| TreeError::from_io(e, path))?;
        Ok(Some(contents))
    }

    async fn get_file_size(&self, path: &str) -> TreeResult<Option<u64>> {
        Ok(Some(self.file_metadata(path).await?.len()))
    }

    async fn get_file_last_modified(&self, path: &str) -> TreeResult<Option<SystemTime>> {
        let meta = self.file_metadata(path).await?;
        Ok(Some(meta.modified()?))
    }

    async fn list_directory(&self, path: Option<&str>) -> TreeResult<Vec<String>> {
        let dir = path.unwrap_or("");
        let meta = self.metadata(dir).await?;
        if !meta.is_dir() {
            return Err(TreeError::not_found(dir));
        }
        self.walk(self.resolve(dir)?).await
    }
}

fn check_repo_path(repo_path: &str) -> TreeResult<()> {
    let Some(rest) = repo_path.strip_prefix(SAFE_REPO_PREFIX) else {
        return Err(TreeError::invalid_argument(format!(
            "repository path must start with {SAFE_REPO_PREFIX}: {repo_path}"
        )));
    };
    if rest.trim_matches('/').is_empty() {
        return Err(TreeError::invalid_argument(format!(
            "repository path names no repository: {repo_path}"
        )));
    }
    let unsafe_component = Path::new(repo_path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if unsafe_component {
        return Err(TreeError::invalid_argument(format!(
            "unsafe repository path: {repo_path}"
        )));
    }
    Ok(())
}
