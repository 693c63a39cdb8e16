//! AIS State Manager
//!
//! Backs up, deletes and restores AIStore cluster metadata kept on
//! Kubernetes persistent volumes, using short-lived helper pods bound to
//! each state volume.

pub mod archive;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod orchestrators;
pub mod prompt;
pub mod template;
pub mod wait;

pub use error::{Error, ErrorKind, Result};
