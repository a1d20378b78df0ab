//! Config module.
//! Provides configuration types, default paths, XML loading, and validation.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{config_path, default_config_path, path_has_symlink_ancestor, CONFIG_ENV};
pub use types::{Config, LogLevel};
pub use xml::{
    create_template_config, ensure_default_config_exists, load_config, load_config_from_xml_path, LoadResult,
};

/// Defaults shared across submodules.
pub const THREADS_DEFAULT: u32 = 8;
pub const THREADS_MAX: u32 = 128;
pub const LARGE_FILE_THRESHOLD_MB_DEFAULT: u64 = 1024;
pub const SAMPLE_INTERVAL_MS_DEFAULT: u64 = 1000;
pub const SAMPLE_INTERVAL_MS_MIN: u64 = 100;
pub const COPY_TOOL_DEFAULT: &str = "auto";
