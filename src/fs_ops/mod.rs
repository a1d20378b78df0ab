//! Filesystem operations: low-level building blocks shared by the workflows.

pub mod helpers;
pub mod link;
pub mod scan;
pub mod space;

pub use helpers::with_hint;
pub use scan::{dir_size, scan, DirectoryStats};
pub use space::{available_space, format_bytes};
