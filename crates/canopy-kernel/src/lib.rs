//! # canopy-kernel
//!
//! Multi-tenant virtual file trees.
//!
//! A request is resolved to a tenant namespace by the [`ProjectResolver`],
//! then served by a [`Tree`] bound to that namespace:
//! - [`FilesystemTree`] reads a repository checkout on local disk
//! - [`RemoteTree`] reads and writes files kept in a [`KvStore`], chunking
//!   the ones too large for a single record
//!
//! Trees hold nothing but their binding. Durable state lives in the store or
//! on disk, so building one per request is cheap.

pub mod config;
pub mod constants;
pub mod resolver;
pub mod store;
pub mod tree;

pub use config::{CanopyConfig, ConfigError};
pub use resolver::{ProjectResolver, RequestContext, ResolverConfig, StickyProject};
pub use store::{
    FailingStore, FailurePolicy, KvStore, MemoryStore, SharedStore, SqliteStore, StoreError,
    StoreResult,
};
pub use tree::{
    check_move, validate_path, ChunkPolicy, FileSnapshot, FilesystemTree, RemoteTree, Tree,
    TreeError, TreeFactory, TreeResult,
};
