//! Binsmith - On-demand Go binaries
//!
//! Resolves a GitHub-hosted Go package at a version, cross-compiles it for
//! the requested platform, and caches the result so every later request for
//! the same binary is served from storage.

pub mod artifact;
pub mod builder;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod request;
pub mod resolver;
pub mod storage;
pub mod ui;

pub use error::{BinsmithError, BinsmithResult};
