//! Per-request tree construction.
//!
//! A serving instance owns one factory. Each request asks it for a tree bound
//! to that request's namespace; the tree lives only as long as the request.

use std::path::PathBuf;
use std::sync::Arc;

use super::backends::{FilesystemTree, RemoteTree};
use super::error::{TreeError, TreeResult};
use super::ops::Tree;
use super::types::ChunkPolicy;
use crate::resolver::{ProjectResolver, RequestContext};
use crate::store::SharedStore;

/// Builds trees over a shared store and content root.
#[derive(Debug, Clone)]
pub struct TreeFactory {
    store: SharedStore,
    policy: ChunkPolicy,
    content_root: Option<PathBuf>,
}

impl TreeFactory {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            policy: ChunkPolicy::default(),
            content_root: None,
        }
    }

    pub fn with_policy(mut self, policy: ChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Directory holding `repos/`, required for [`TreeFactory::filesystem`].
    pub fn with_content_root(mut self, content_root: impl Into<PathBuf>) -> Self {
        self.content_root = Some(content_root.into());
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Mutable tree for `namespace`; `None` is the default namespace.
    pub fn remote(&self, namespace: Option<&str>) -> RemoteTree {
        RemoteTree::new(self.store.clone(), namespace.unwrap_or_default()).with_policy(self.policy)
    }

    /// Same as [`TreeFactory::remote`], behind the trait.
    pub fn tree_for(&self, namespace: Option<&str>) -> Arc<dyn Tree> {
        Arc::new(self.remote(namespace))
    }

    /// Resolve the request's project and bind a mutable tree to it.
    pub fn for_request(
        &self,
        resolver: &ProjectResolver,
        ctx: &RequestContext,
        use_sticky: bool,
    ) -> Arc<dyn Tree> {
        let project = resolver.resolve(ctx, use_sticky);
        tracing::debug!(project = project.as_deref().unwrap_or(""), "binding request tree");
        self.tree_for(project.as_deref())
    }

    /// Read-only tree over the repository at `repo_path`.
    pub fn filesystem(&self, repo_path: &str) -> TreeResult<Arc<dyn Tree>> {
        let Some(content_root) = &self.content_root else {
            return Err(TreeError::invalid_argument("no content root configured"));
        };
        Ok(Arc::new(FilesystemTree::open(content_root, repo_path)?))
    }
}
