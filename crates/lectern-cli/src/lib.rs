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
#![allow(clippy::redundant_pub_crate)]

//! Operator CLI for dispatching downloads and repairing audio libraries.
//!
//! Layout:
//! - `cli.rs`: argument parsing and command dispatch
//! - `context.rs`: configuration loading, shared state, and error types
//! - `commands/`: command handlers grouped by concern
//! - `output.rs`: renderers and formatting helpers
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod commands;
pub(crate) mod context;
pub(crate) mod output;

pub use cli::run;
