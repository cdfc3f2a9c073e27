//! Configuration system for sift.
//!
//! Provides TOML-based configuration with:
//! - `[database]`, `[embedding]`, `[vector]` and `[search]` sections, all optional
//! - Config file layering (user config dir + project-local `sift.toml`)
//! - Defaults that let an empty file produce a working keyword + mock-vector setup

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
