//! Tree backends.
//!
//! Backends implement [`Tree`](super::Tree) for different storage types.

mod filesystem;
mod remote;

pub use filesystem::FilesystemTree;
pub use remote::RemoteTree;
