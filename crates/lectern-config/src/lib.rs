#![forbid(unsafe_code)]
#![warn(
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! File-backed configuration for the Lectern workspace.
//!
//! Layout: `model.rs` (typed sections and endpoint descriptors), `loader.rs`
//! (JSON file loading and `LECTERN_*` overrides), `validate.rs` (field checks),
//! `defaults.rs` (default values).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides, load, load_with_env, password_env_key, resolve_path};
pub use model::{
    DispatchSettings, EndpointDescriptor, EndpointRole, LecternConfig, LoggingSettings,
    RepairSettings, VpnProbeMethod, VpnSettings,
};
pub use validate::validate;
