//! Kernel constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

/// Hard per-record size limit of the backing store (1 MiB minus 4 bytes).
pub const BACKEND_MAX_RECORD_SIZE: usize = 1_048_572;

/// Default inline/chunked boundary for file contents (900 KiB).
///
/// Leaves room under [`BACKEND_MAX_RECORD_SIZE`] for key and metadata overhead.
pub const MAX_INLINE_SIZE: usize = 921_600;

/// Fixed marker naming the root record of every namespace.
pub const ROOT_MARKER: &str = "/";

/// Immutable trees may only be opened below this relative prefix.
pub const SAFE_REPO_PREFIX: &str = "repos/";

/// Default header carrying a platform-injected namespace.
pub const DEFAULT_NAMESPACE_HEADER: &str = "X-Canopy-Current-Namespace";

/// Default query parameter selecting a project.
pub const DEFAULT_PROJECT_QUERY_PARAM: &str = "_canopy_project";

/// Default path marker; `/_canopy/p/{id}/...` selects a project.
pub const DEFAULT_PROJECT_PATH_MARKER: &str = "/_canopy/p";

/// Default platform host suffix stripped before host-based resolution.
pub const DEFAULT_PLATFORM_SUFFIX: &str = ".appspot.com";

/// Infix separating a project id from a version/branch qualifier in host names.
pub const HOST_QUALIFIER_SEPARATOR: &str = "-dot-";
