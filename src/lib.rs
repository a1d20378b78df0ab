//! Core library for `junction_move`.
//!
//! Relocates a directory tree to another location, replaces the original path with a
//! directory link to the new location, and can later restore or repair that link.
//!
//! Layout:
//! - `workflow`: the migrate, restore and repair phase machines plus the batch driver
//! - `copy`: external copy tool supervision and progress estimation
//! - `fs_ops`: scanning, free space and link primitives
//! - `state`: state detection and marker files
//! - `validate` / `probe`: preconditions and occupancy checks

pub mod cancel;
pub mod cli;
pub mod config;
pub mod copy;
pub mod errors;
pub mod fs_ops;
pub mod output;
pub mod platform;
pub mod probe;
pub mod progress;
pub mod shutdown;
pub mod state;
pub mod task;
pub mod validate;
pub mod workflow;

pub use cancel::CancelToken;
pub use config::{default_config_path, path_has_symlink_ancestor, Config, LogLevel};
pub use errors::{ErrorKind, MoveError};
pub use progress::{ProgressUpdate, Reporter};
pub use state::{detect, MigrationState};
pub use task::{MigrationMode, MigrationTask};
pub use workflow::{migrate, repair, restore, run_batch, WorkflowOutcome, WorkflowSettings};
